//! The polymorphic-over-backends facade (C1): `embed`, `list_models`,
//! `switch_default`, all content-addressed through [`EmbeddingCache`].

use std::collections::HashMap;
use std::sync::RwLock;

use crate::backend::EmbeddingBackend;
use crate::cache::{cache_key, EmbeddingCache};
use crate::error::{EmbeddingError, Result};

pub struct EmbeddingService {
    backends: HashMap<String, Box<dyn EmbeddingBackend>>,
    default_model: RwLock<String>,
    cache: EmbeddingCache,
}

impl EmbeddingService {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            backends: HashMap::new(),
            default_model: RwLock::new(String::new()),
            cache: EmbeddingCache::new(cache_capacity),
        }
    }

    /// Register a backend. The first one registered becomes the default
    /// model until `switch_default` is called.
    pub fn register(&mut self, backend: Box<dyn EmbeddingBackend>) {
        let name = backend.name().to_string();
        let is_first = self.backends.is_empty();
        self.backends.insert(name.clone(), backend);
        if is_first {
            *self.default_model.write().expect("lock poisoned") = name;
        }
    }

    pub fn default_model(&self) -> String {
        self.default_model.read().expect("lock poisoned").clone()
    }

    pub fn list_models(&self) -> Vec<(String, usize)> {
        self.backends
            .values()
            .map(|b| (b.name().to_string(), b.dimension()))
            .collect()
    }

    pub fn switch_default(&self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(EmbeddingError::UnknownModel(name.to_string()));
        }
        *self.default_model.write().expect("lock poisoned") = name.to_string();
        Ok(())
    }

    pub fn dimension_of(&self, model_name: &str) -> Result<usize> {
        self.backends
            .get(model_name)
            .map(|b| b.dimension())
            .ok_or_else(|| EmbeddingError::UnknownModel(model_name.to_string()))
    }

    /// Embed `texts` under the named model, serving cached vectors and only
    /// calling the backend for cache misses.
    pub async fn embed(&self, texts: &[String], model_name: &str) -> Result<Vec<Vec<f32>>> {
        let backend = self
            .backends
            .get(model_name)
            .ok_or_else(|| EmbeddingError::UnknownModel(model_name.to_string()))?;

        let mut result = vec![None; texts.len()];
        let mut misses = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let key = cache_key(model_name, text);
            if let Some(vector) = self.cache.get(&key) {
                result[i] = Some(vector);
            } else {
                misses.push((i, key, text.clone()));
            }
        }

        if !misses.is_empty() {
            let miss_texts: Vec<String> = misses.iter().map(|(_, _, t)| t.clone()).collect();
            let vectors = backend.embed_raw(&miss_texts).await?;
            if vectors.len() != misses.len() {
                return Err(EmbeddingError::Backend {
                    model: model_name.to_string(),
                    reason: format!(
                        "backend returned {} vectors for {} inputs",
                        vectors.len(),
                        misses.len()
                    ),
                });
            }
            for ((i, key, _), vector) in misses.into_iter().zip(vectors.into_iter()) {
                self.cache.put(key, vector.clone());
                result[i] = Some(vector);
            }
        }

        Ok(result.into_iter().map(|v| v.expect("every slot filled")).collect())
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;

    #[tokio::test]
    async fn embed_caches_results_across_calls() {
        let mut service = EmbeddingService::new(16);
        service.register(Box::new(LocalBackend::new("m1", 4)));

        let texts = vec!["hello".to_string()];
        let first = service.embed(&texts, "m1").await.unwrap();
        assert_eq!(service.cache_len(), 1);
        let second = service.embed(&texts, "m1").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unknown_model_is_an_error() {
        let service = EmbeddingService::new(16);
        let err = service.embed(&["x".to_string()], "nope").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::UnknownModel(_)));
    }

    #[test]
    fn switch_default_rejects_unknown_model() {
        let mut service = EmbeddingService::new(16);
        service.register(Box::new(LocalBackend::new("m1", 4)));
        assert!(service.switch_default("m2").is_err());
        assert!(service.switch_default("m1").is_ok());
        assert_eq!(service.default_model(), "m1");
    }
}
