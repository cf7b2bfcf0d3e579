//! Content-addressed, process-local embedding cache: key is
//! `sha256(model_name || text)`, bounded by a configured LRU capacity, per
//! spec §4.1. No existing crate in the corpus ships an LRU map, so this is
//! a small from-scratch structure (a `dashmap` for storage plus an
//! access-order `VecDeque` for eviction) rather than a new dependency.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Mutex;

pub fn cache_key(model_name: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct EmbeddingCache {
    capacity: usize,
    entries: DashMap<String, Vec<f32>>,
    order: Mutex<VecDeque<String>>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let found = self.entries.get(key).map(|v| v.clone());
        if found.is_some() {
            self.touch(key);
        }
        found
    }

    pub fn put(&self, key: String, vector: Vec<f32>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), vector).is_none() {
            let mut order = self.order.lock().expect("cache order lock poisoned");
            order.push_back(key);
            while order.len() > self.capacity {
                if let Some(evicted) = order.pop_front() {
                    self.entries.remove(&evicted);
                }
            }
        } else {
            self.touch(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&self, key: &str) {
        let mut order = self.order.lock().expect("cache order lock poisoned");
        if let Some(pos) = order.iter().position(|k| k == key) {
            if let Some(entry) = order.remove(pos) {
                order.push_back(entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_when_over_capacity() {
        let cache = EmbeddingCache::new(2);
        cache.put("a".into(), vec![1.0]);
        cache.put("b".into(), vec![2.0]);
        cache.get("a"); // touch a, so b becomes least recently used
        cache.put("c".into(), vec![3.0]);

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn key_depends_on_both_model_and_text() {
        let k1 = cache_key("model-a", "hello");
        let k2 = cache_key("model-b", "hello");
        assert_ne!(k1, k2);
    }
}
