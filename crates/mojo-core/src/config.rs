//! App Config (C9): a typed view over environment variables and an optional
//! TOML file, loaded once at startup. Mirrors the teacher's
//! `SkynetConfig::load` (figment, `Toml::file` merged with env overrides),
//! but the teacher's own `Env::prefixed("SKYNET_").split("_")` trick doesn't
//! carry over: that only works because every `SKYNET_*` var is the product
//! prefix followed by its nested struct path one segment at a time. Spec
//! §4.8's var names are bare and don't encode a struct path at all
//! (`GOOGLE_SEARCH_ENGINE_ID` lands on `search.google_search_engine_id`,
//! not `google.search_engine_id`), so each one is mapped to its field
//! explicitly via [`ENV_OVERRIDES`] / [`ENV_LIST_OVERRIDES`] below, fed to
//! figment as a `Serialized` provider instead of a naming-convention one.

use figment::{
    providers::{Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub llm_providers: LlmProvidersConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub dreaming: DreamingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub opencode: OpenCodeConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            llm_providers: LlmProvidersConfig::default(),
            memory: MemoryConfig::default(),
            dreaming: DreamingConfig::default(),
            search: SearchConfig::default(),
            opencode: OpenCodeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub server_host: String,
    #[serde(default = "default_port")]
    pub server_port: u16,
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_host: default_host(),
            server_port: default_port(),
            environment: default_environment(),
        }
    }
}

impl ServerConfig {
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8700
}
fn default_environment() -> String {
    "production".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mcp_require_auth: bool,
    pub mcp_api_key: Option<String>,
    #[serde(default)]
    pub oauth_enabled: bool,
    pub oauth_issuer: Option<String>,
    pub oauth_audience: Option<String>,
    pub oauth_jwks_uri: Option<String>,
    #[serde(default)]
    pub oauth_required_scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmProvidersConfig {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub lmstudio_base_url: Option<String>,
    pub lmstudio_api_key: Option<String>,
    /// task tag -> (provider, model), loaded separately from `llm_config.json`.
    #[serde(default)]
    pub task_routes: std::collections::HashMap<String, TaskRoute>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRoute {
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: String,
    #[serde(default = "default_embedding_device")]
    pub embedding_device: String,
    #[serde(default = "bool_true")]
    pub multi_model_enabled: bool,
    #[serde(default = "default_working_max_tokens")]
    pub working_max_tokens: usize,
    #[serde(default = "default_active_max_pages")]
    pub active_max_pages: usize,
    #[serde(default = "default_data_directory")]
    pub data_directory: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            embedding_model: default_embedding_model(),
            embedding_backend: default_embedding_backend(),
            embedding_device: default_embedding_device(),
            multi_model_enabled: true,
            working_max_tokens: default_working_max_tokens(),
            active_max_pages: default_active_max_pages(),
            data_directory: default_data_directory(),
        }
    }
}

fn default_embedding_model() -> String {
    "default".to_string()
}
fn default_embedding_backend() -> String {
    "local".to_string()
}
fn default_embedding_device() -> String {
    "cpu".to_string()
}
fn default_working_max_tokens() -> usize {
    2000
}
fn default_active_max_pages() -> usize {
    50
}
fn default_data_directory() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.memory")
}
fn bool_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DreamingConfig {
    #[serde(default = "bool_true")]
    pub dreaming_enabled: bool,
    #[serde(default = "default_dreaming_schedule")]
    pub dreaming_schedule: String,
    #[serde(default = "default_off_peak_start")]
    pub off_peak_start: String,
    #[serde(default = "default_off_peak_end")]
    pub off_peak_end: String,
}

impl Default for DreamingConfig {
    fn default() -> Self {
        Self {
            dreaming_enabled: true,
            dreaming_schedule: default_dreaming_schedule(),
            off_peak_start: default_off_peak_start(),
            off_peak_end: default_off_peak_end(),
        }
    }
}

fn default_dreaming_schedule() -> String {
    "0 3 * * *".to_string()
}
fn default_off_peak_start() -> String {
    "01:00".to_string()
}
fn default_off_peak_end() -> String {
    "05:00".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchConfig {
    pub google_search_engine_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenCodeConfig {
    pub opencode_mcp_tool_path: Option<String>,
    #[serde(default = "default_opencode_bin")]
    pub opencode_bin: String,
    pub opencode_server_password: Option<String>,
    pub global_mcp_bearer_token: Option<String>,
    #[serde(default = "default_global_mcp_tool_port")]
    pub global_mcp_tool_port: u16,
}

impl Default for OpenCodeConfig {
    fn default() -> Self {
        Self {
            opencode_mcp_tool_path: None,
            opencode_bin: default_opencode_bin(),
            opencode_server_password: None,
            global_mcp_bearer_token: None,
            global_mcp_tool_port: default_global_mcp_tool_port(),
        }
    }
}

fn default_opencode_bin() -> String {
    "opencode".to_string()
}
fn default_global_mcp_tool_port() -> u16 {
    4099
}

/// `(env var name, group field, field name)` for every scalar override spec
/// §4.8 documents. Checked with plain `std::env::var` rather than a figment
/// naming-convention provider because the flat names don't share one prefix
/// with their nested struct path.
const ENV_OVERRIDES: &[(&str, &str, &str)] = &[
    ("SERVER_HOST", "server", "server_host"),
    ("SERVER_PORT", "server", "server_port"),
    ("ENVIRONMENT", "server", "environment"),
    ("MCP_REQUIRE_AUTH", "auth", "mcp_require_auth"),
    ("MCP_API_KEY", "auth", "mcp_api_key"),
    ("OAUTH_ENABLED", "auth", "oauth_enabled"),
    ("OAUTH_ISSUER", "auth", "oauth_issuer"),
    ("OAUTH_AUDIENCE", "auth", "oauth_audience"),
    ("OAUTH_JWKS_URI", "auth", "oauth_jwks_uri"),
    ("OPENAI_API_KEY", "llm_providers", "openai_api_key"),
    ("ANTHROPIC_API_KEY", "llm_providers", "anthropic_api_key"),
    ("GOOGLE_API_KEY", "llm_providers", "google_api_key"),
    ("LMSTUDIO_BASE_URL", "llm_providers", "lmstudio_base_url"),
    ("LMSTUDIO_API_KEY", "llm_providers", "lmstudio_api_key"),
    ("EMBEDDING_MODEL", "memory", "embedding_model"),
    ("EMBEDDING_BACKEND", "memory", "embedding_backend"),
    ("EMBEDDING_DEVICE", "memory", "embedding_device"),
    ("MULTI_MODEL_ENABLED", "memory", "multi_model_enabled"),
    ("WORKING_MAX_TOKENS", "memory", "working_max_tokens"),
    ("ACTIVE_MAX_PAGES", "memory", "active_max_pages"),
    ("DATA_DIRECTORY", "memory", "data_directory"),
    ("DREAMING_ENABLED", "dreaming", "dreaming_enabled"),
    ("DREAMING_SCHEDULE", "dreaming", "dreaming_schedule"),
    ("OFF_PEAK_START", "dreaming", "off_peak_start"),
    ("OFF_PEAK_END", "dreaming", "off_peak_end"),
    ("GOOGLE_SEARCH_ENGINE_ID", "search", "google_search_engine_id"),
    ("OPENCODE_MCP_TOOL_PATH", "opencode", "opencode_mcp_tool_path"),
    ("OPENCODE_BIN", "opencode", "opencode_bin"),
    ("OPENCODE_SERVER_PASSWORD", "opencode", "opencode_server_password"),
    ("GLOBAL_MCP_BEARER_TOKEN", "opencode", "global_mcp_bearer_token"),
    ("GLOBAL_MCP_TOOL_PORT", "opencode", "global_mcp_tool_port"),
];

/// Overrides whose field is a `Vec<String>`, read as a comma-separated list.
const ENV_LIST_OVERRIDES: &[(&str, &str, &str)] = &[("OAUTH_REQUIRED_SCOPES", "auth", "oauth_required_scopes")];

/// Coerces a raw env var string the same way figment's own `Env` provider
/// does: booleans and integers parse through, everything else stays a string.
fn coerce_env_value(raw: &str) -> JsonValue {
    if let Ok(b) = raw.parse::<bool>() {
        return JsonValue::Bool(b);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return JsonValue::Number(n.into());
    }
    JsonValue::String(raw.to_string())
}

fn group_entry<'a>(root: &'a mut JsonMap<String, JsonValue>, group: &str) -> &'a mut JsonMap<String, JsonValue> {
    root.entry(group.to_string())
        .or_insert_with(|| JsonValue::Object(JsonMap::new()))
        .as_object_mut()
        .expect("group entries are always objects")
}

/// Builds the nested JSON overlay the documented flat env vars produce,
/// e.g. `GOOGLE_SEARCH_ENGINE_ID=abc` becomes `{"search": {"google_search_engine_id": "abc"}}`.
fn env_overrides() -> JsonValue {
    let mut root = JsonMap::new();
    for (var, group, field) in ENV_OVERRIDES {
        if let Ok(raw) = std::env::var(var) {
            group_entry(&mut root, group).insert(field.to_string(), coerce_env_value(&raw));
        }
    }
    for (var, group, field) in ENV_LIST_OVERRIDES {
        if let Ok(raw) = std::env::var(var) {
            let items: Vec<JsonValue> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| JsonValue::String(s.to_string()))
                .collect();
            group_entry(&mut root, group).insert(field.to_string(), JsonValue::Array(items));
        }
    }
    JsonValue::Object(root)
}

impl AppConfig {
    /// Load config from an optional TOML file, merged with bare-name env
    /// var overrides. Checks in order: explicit path argument >
    /// `MOJO_CONFIG` env var > `~/.memory/mojo.toml` > built-in defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("MOJO_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: AppConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Serialized::defaults(env_overrides()))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Merge `llm_config.json` (task tag -> provider+model) into the loaded
    /// config. Kept as an explicit second step per spec §4.8: it is its own
    /// file, not TOML-merged with the rest.
    pub fn load_llm_routes(mut self, llm_config_path: &str) -> Result<Self> {
        if !std::path::Path::new(llm_config_path).exists() {
            return Ok(self);
        }
        let routes: std::collections::HashMap<String, TaskRoute> = Figment::new()
            .merge(Json::file(llm_config_path))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;
        self.llm_providers.task_routes = routes;
        Ok(self)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.memory/mojo.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize tests that touch them so they
    // don't stomp on each other when the test binary runs them in parallel.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_are_usable_without_any_file_or_env() {
        let config = AppConfig::default();
        assert_eq!(config.server.server_port, 8700);
        assert!(config.memory.multi_model_enabled);
        assert_eq!(config.dreaming.dreaming_schedule, "0 3 * * *");
    }

    #[test]
    fn flat_env_vars_land_on_their_nested_field() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("GOOGLE_SEARCH_ENGINE_ID", "cse-123");
        std::env::set_var("GLOBAL_MCP_BEARER_TOKEN", "tok-abc");
        std::env::set_var("MULTI_MODEL_ENABLED", "false");
        std::env::set_var("WORKING_MAX_TOKENS", "4096");
        std::env::set_var("OAUTH_REQUIRED_SCOPES", "read, write");

        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Serialized::defaults(env_overrides()))
            .extract()
            .unwrap();

        std::env::remove_var("GOOGLE_SEARCH_ENGINE_ID");
        std::env::remove_var("GLOBAL_MCP_BEARER_TOKEN");
        std::env::remove_var("MULTI_MODEL_ENABLED");
        std::env::remove_var("WORKING_MAX_TOKENS");
        std::env::remove_var("OAUTH_REQUIRED_SCOPES");

        assert_eq!(config.search.google_search_engine_id.as_deref(), Some("cse-123"));
        assert_eq!(config.opencode.global_mcp_bearer_token.as_deref(), Some("tok-abc"));
        assert!(!config.memory.multi_model_enabled);
        assert_eq!(config.memory.working_max_tokens, 4096);
        assert_eq!(config.auth.oauth_required_scopes, vec!["read".to_string(), "write".to_string()]);
    }

    #[test]
    fn env_overrides_omits_a_var_that_is_not_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("GOOGLE_SEARCH_ENGINE_ID");
        let overrides = env_overrides();
        let search = overrides.get("search");
        let engine_id = search.and_then(|s| s.get("google_search_engine_id"));
        assert!(engine_id.is_none());
    }
}
