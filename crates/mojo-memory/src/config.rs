use std::collections::HashMap;
use std::path::PathBuf;

/// Tier/ranking knobs from spec §4.3. Construction is the caller's job
/// (figment-loaded `MojoConfig` in mojo-core feeds these in); this crate
/// only needs the resolved values.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub data_dir: PathBuf,
    pub working_max_tokens: usize,
    pub active_max_pages: usize,
    pub chunk_size_chars: usize,
    pub chunk_overlap_chars: usize,
    pub enabled_models: Vec<String>,
    pub model_weights: HashMap<String, f32>,
    pub score_floor: f32,
    pub multi_model_enabled: bool,
    pub default_model: String,
}

impl MemoryConfig {
    pub fn conversations_path(&self) -> PathBuf {
        self.data_dir.join("conversations_multi_model.json")
    }

    pub fn knowledge_path(&self) -> PathBuf {
        self.data_dir.join("knowledge_multi_model.json")
    }

    /// Models to embed/rank with for this call: every enabled model when
    /// multi-model is on, otherwise just the default model, per spec §4.3.
    pub fn active_models(&self) -> Vec<String> {
        if self.multi_model_enabled {
            self.enabled_models.clone()
        } else {
            vec![self.default_model.clone()]
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.memory"),
            working_max_tokens: 4000,
            active_max_pages: 50,
            chunk_size_chars: 1200,
            chunk_overlap_chars: 200,
            enabled_models: Vec::new(),
            model_weights: HashMap::new(),
            score_floor: 0.15,
            multi_model_enabled: true,
            default_model: String::new(),
        }
    }
}
