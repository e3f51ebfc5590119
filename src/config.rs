use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TarjamaError};

fn default_max_retries() -> u32 {
    1
}

fn default_seed() -> u64 {
    299792458
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Local directory the artifacts are cached in. The artifact URLs
    /// themselves are fixed in the catalog; only the cache location moves.
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Overall timeout for a single artifact download (seconds)
    pub timeout_secs: u64,
    /// Additional download attempts after a corrupt artifact is deleted.
    /// Kept small on purpose; a persistently corrupt remote must fail,
    /// not loop.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Client identifier sent with download requests. Some release hosts
    /// reject requests without a browser-like agent.
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Input token budget; longer inputs are truncated
    pub max_input_tokens: usize,
    /// Hard cap on generated tokens per request
    pub max_output_tokens: usize,
    /// Deadline for a single generation pass (seconds)
    pub generation_timeout_secs: u64,
    /// Sampling seed (greedy decoding makes this inert, but the logits
    /// processor requires one)
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: ".tarjama/models".to_string(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            max_retries: 1,
            user_agent: "Mozilla/5.0 (compatible; tarjama/0.1)".to_string(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: 128,
            max_output_tokens: 512,
            generation_timeout_secs: 120,
            seed: default_seed(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TarjamaError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| TarjamaError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TarjamaError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| TarjamaError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}
