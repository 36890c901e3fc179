//! Configuration file support

use std::fs;
use std::path::{Path, PathBuf};

use bloom_ai::{ClientConfig, GenerationConfig, Model};
use serde::{Deserialize, Serialize};

/// Configuration for bloom
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model id (default: gemini-3-pro-preview)
    pub model: Option<String>,
    /// API base URL
    pub base_url: Option<String>,
    /// API key (alternative to environment variables)
    pub api_key: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Upper bound on reply length in tokens
    pub max_output_tokens: Option<u32>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bloom")
    }

    /// Resolve the config file path: explicit flag, then BLOOM_CONFIG_PATH, then the default
    pub fn config_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Ok(path) = std::env::var("BLOOM_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from `path`, falling back to defaults with a warning
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Write the example config to `path` unless a file is already there
    pub fn init(path: &Path) -> std::io::Result<PathBuf> {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, example_config())?;
        Ok(path.to_path_buf())
    }

    /// Merge with CLI overrides (CLI takes precedence) into client settings
    pub fn client_config(&self, model_override: Option<String>) -> ClientConfig {
        let model_id = model_override
            .or_else(|| self.model.clone())
            .unwrap_or_else(|| bloom_ai::DEFAULT_MODEL_ID.to_string());

        let mut model = Model::gemini(model_id);
        if let Some(ref base_url) = self.base_url {
            model = model.with_base_url(base_url.as_str());
        }

        ClientConfig {
            api_key: self.api_key.clone().filter(|k| !k.trim().is_empty()),
            model,
            generation: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# bloom configuration file
# Place at ~/.config/bloom/config.toml (Linux), ~/Library/Application Support/bloom/config.toml (Mac)
# or %APPDATA%\bloom\config.toml (Windows), or point BLOOM_CONFIG_PATH at it

# Gemini model to use
model = "gemini-3-pro-preview"

# API endpoint
# base_url = "https://generativelanguage.googleapis.com/v1beta"

# Sampling settings (optional)
# temperature = 0.7
# max_output_tokens = 2048

# API key (optional - can also use API_KEY, GEMINI_API_KEY or GOOGLE_API_KEY)
# It's recommended to use environment variables instead for security
# api_key = "..."
"#
}
