//! Payload normalisation (spec §4.4): the chunking/clustering LLM calls may
//! wrap their list under different keys depending on prompt drift; accept
//! all documented shapes rather than failing on the "wrong" wrapper.

use serde_json::Value;

use crate::error::{DreamingError, Result};

/// Accepts `{ "chunks": [...] }`, `{ "data": { "chunks": [...] } }`,
/// `{ "items": [...] }`, or a bare array.
pub fn normalize_chunks_payload(value: &Value) -> Result<Vec<Value>> {
    if let Some(array) = value.as_array() {
        return Ok(array.clone());
    }
    if let Some(array) = value.get("chunks").and_then(Value::as_array) {
        return Ok(array.clone());
    }
    if let Some(array) = value.pointer("/data/chunks").and_then(Value::as_array) {
        return Ok(array.clone());
    }
    if let Some(array) = value.get("items").and_then(Value::as_array) {
        return Ok(array.clone());
    }
    Err(DreamingError::Validation(
        "chunking payload did not match any known shape (chunks/data.chunks/items/array)".to_string(),
    ))
}

/// Accepts `{ "clusters": [...] }`, `{ "data": { "clusters": [...] } }`, or
/// a bare array.
pub fn normalize_clusters_payload(value: &Value) -> Result<Vec<Value>> {
    if let Some(array) = value.as_array() {
        return Ok(array.clone());
    }
    if let Some(array) = value.get("clusters").and_then(Value::as_array) {
        return Ok(array.clone());
    }
    if let Some(array) = value.pointer("/data/clusters").and_then(Value::as_array) {
        return Ok(array.clone());
    }
    Err(DreamingError::Validation(
        "clustering payload did not match any known shape (clusters/data.clusters/array)".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_all_documented_chunk_shapes() {
        assert_eq!(normalize_chunks_payload(&json!([{"text": "a"}])).unwrap().len(), 1);
        assert_eq!(normalize_chunks_payload(&json!({"chunks": [{"text": "a"}]})).unwrap().len(), 1);
        assert_eq!(
            normalize_chunks_payload(&json!({"data": {"chunks": [{"text": "a"}]}})).unwrap().len(),
            1
        );
        assert_eq!(normalize_chunks_payload(&json!({"items": [{"text": "a"}]})).unwrap().len(), 1);
    }

    #[test]
    fn rejects_unknown_shape() {
        assert!(normalize_chunks_payload(&json!({"nope": []})).is_err());
    }

    #[test]
    fn accepts_all_documented_cluster_shapes() {
        assert_eq!(normalize_clusters_payload(&json!([{"summary_text": "a"}])).unwrap().len(), 1);
        assert_eq!(
            normalize_clusters_payload(&json!({"clusters": [{"summary_text": "a"}]})).unwrap().len(),
            1
        );
        assert_eq!(
            normalize_clusters_payload(&json!({"data": {"clusters": [{"summary_text": "a"}]}}))
                .unwrap()
                .len(),
            1
        );
    }
}
