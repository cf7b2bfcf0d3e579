//! Weighted multi-model cosine ranking from spec §4.3: score an item as
//! `Σ_m w_m · s_m` over enabled models, tie-break by newest `created_at`
//! then by stable id, drop anything under a configured floor.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// A scorable candidate: its per-model embeddings plus the fields ranking
/// needs for tie-breaking.
pub struct Scorable<'a> {
    pub id: &'a str,
    pub created_at: DateTime<Utc>,
    pub embeddings: &'a HashMap<String, Vec<f32>>,
}

/// Weighted score of one candidate against the query's per-model
/// embeddings, using only models present on both sides. Returns `None` if
/// no model overlaps (the candidate has no usable embedding at all).
pub fn score(
    candidate: &Scorable<'_>,
    query_embeddings: &HashMap<String, Vec<f32>>,
    weights: &HashMap<String, f32>,
) -> Option<f32> {
    let mut total = 0.0f32;
    let mut matched = false;
    for (model, query_vec) in query_embeddings {
        if let Some(candidate_vec) = candidate.embeddings.get(model) {
            let weight = weights.get(model).copied().unwrap_or(1.0);
            total += weight * cosine_similarity(query_vec, candidate_vec);
            matched = true;
        }
    }
    matched.then_some(total)
}

/// Per-model cosine similarity of one candidate against the query, over
/// every model the query was embedded under. A model the candidate has no
/// embedding for scores `0.0` rather than being omitted — spec §8
/// invariant 4: "missing-model scores are treated as zero".
pub fn per_model_scores(candidate: &Scorable<'_>, query_embeddings: &HashMap<String, Vec<f32>>) -> HashMap<String, f32> {
    query_embeddings
        .iter()
        .map(|(model, query_vec)| {
            let s = candidate
                .embeddings
                .get(model)
                .map(|candidate_vec| cosine_similarity(query_vec, candidate_vec))
                .unwrap_or(0.0);
            (model.clone(), s)
        })
        .collect()
}

/// Default weights: uniform over the given models, per spec §4.3.
pub fn uniform_weights(models: &[String]) -> HashMap<String, f32> {
    if models.is_empty() {
        return HashMap::new();
    }
    let w = 1.0 / models.len() as f32;
    models.iter().map(|m| (m.clone(), w)).collect()
}

/// Sort `(id, created_at, score)` triples by score desc, then newest
/// `created_at`, then id asc — the tie-break rule from spec §4.3.
pub fn sort_by_score_then_recency_then_id<T>(
    items: &mut [T],
    score_of: impl Fn(&T) -> f32,
    created_at_of: impl Fn(&T) -> DateTime<Utc>,
    id_of: impl Fn(&T) -> &str,
) {
    items.sort_by(|a, b| {
        score_of(b)
            .partial_cmp(&score_of(a))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| created_at_of(b).cmp(&created_at_of(a)))
            .then_with(|| id_of(a).cmp(id_of(b)))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn score_uses_only_overlapping_models() {
        let mut embeddings = HashMap::new();
        embeddings.insert("m1".to_string(), vec![1.0, 0.0]);
        let candidate = Scorable {
            id: "a",
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            embeddings: &embeddings,
        };
        let mut query = HashMap::new();
        query.insert("m1".to_string(), vec![1.0, 0.0]);
        query.insert("m2".to_string(), vec![0.0, 1.0]);
        let weights = uniform_weights(&["m1".to_string(), "m2".to_string()]);
        let s = score(&candidate, &query, &weights).unwrap();
        assert!((s - 0.5).abs() < 1e-6);
    }

    #[test]
    fn per_model_scores_reports_zero_for_a_model_the_candidate_lacks() {
        let mut embeddings = HashMap::new();
        embeddings.insert("m1".to_string(), vec![1.0, 0.0]);
        let candidate = Scorable {
            id: "a",
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            embeddings: &embeddings,
        };
        let mut query = HashMap::new();
        query.insert("m1".to_string(), vec![1.0, 0.0]);
        query.insert("m2".to_string(), vec![0.0, 1.0]);

        let scores = per_model_scores(&candidate, &query);
        assert!((scores["m1"] - 1.0).abs() < 1e-6);
        assert_eq!(scores["m2"], 0.0);
    }

    #[test]
    fn no_overlapping_model_yields_none() {
        let embeddings = HashMap::new();
        let candidate = Scorable {
            id: "a",
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            embeddings: &embeddings,
        };
        let mut query = HashMap::new();
        query.insert("m1".to_string(), vec![1.0, 0.0]);
        assert!(score(&candidate, &query, &HashMap::new()).is_none());
    }

    #[test]
    fn ties_break_by_recency_then_id() {
        let t_old = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let t_new = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let mut items = vec![("b", t_old, 1.0), ("a", t_new, 1.0), ("c", t_new, 1.0)];
        sort_by_score_then_recency_then_id(&mut items, |i| i.2, |i| i.1, |i| i.0);
        assert_eq!(items.iter().map(|i| i.0).collect::<Vec<_>>(), vec!["a", "c", "b"]);
    }
}
