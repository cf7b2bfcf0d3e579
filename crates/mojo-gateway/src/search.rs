//! `web_search` tool: Google Programmable Search JSON API, gated on the
//! two config values it actually needs (`search.google_search_engine_id`,
//! `llm_providers.google_api_key` — the same Google credential other
//! providers in this process already expect). Grounded on the reqwest
//! client-building style the teacher's own provider clients use, e.g.
//! `skynet-agent/src/vertex.rs`.

use mojo_core::config::AppConfig;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::GatewayError;

const ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

pub async fn web_search(config: &AppConfig, query: &str, max_results: usize) -> crate::error::Result<Value> {
    let engine_id = config.search.google_search_engine_id.as_deref().ok_or_else(|| {
        GatewayError::BadArguments {
            tool: "web_search".to_string(),
            reason: "web search is not configured: set search.google_search_engine_id".to_string(),
        }
    })?;
    let api_key = config.llm_providers.google_api_key.as_deref().ok_or_else(|| GatewayError::BadArguments {
        tool: "web_search".to_string(),
        reason: "web search is not configured: set llm_providers.google_api_key".to_string(),
    })?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .build()
        .map_err(|e| GatewayError::BadArguments { tool: "web_search".to_string(), reason: e.to_string() })?;

    let capped = max_results.clamp(1, 10);
    let params: [(&str, String); 4] = [
        ("key", api_key.to_string()),
        ("cx", engine_id.to_string()),
        ("q", query.to_string()),
        ("num", capped.to_string()),
    ];
    let response = client
        .get(ENDPOINT)
        .query(&params)
        .send()
        .await
        .map_err(|e| GatewayError::Backend { tool: "web_search".to_string(), reason: format!("search request failed: {e}") })?;

    if !response.status().is_success() {
        return Err(GatewayError::Backend {
            tool: "web_search".to_string(),
            reason: format!("search API returned HTTP {}", response.status()),
        });
    }

    let parsed: SearchResponse = response
        .json()
        .await
        .map_err(|e| GatewayError::Backend { tool: "web_search".to_string(), reason: format!("could not parse search response: {e}") })?;

    let results: Vec<Value> = parsed
        .items
        .into_iter()
        .map(|item| json!({ "title": item.title, "url": item.link, "snippet": item.snippet }))
        .collect();

    Ok(json!({ "query": query, "results": results }))
}
