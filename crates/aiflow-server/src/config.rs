use aiflow_runtime::RuntimeConfig;
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

/// Server configuration, read from the TOML file named by `AIFLOW_CONFIG`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub runtime: RuntimeConfig,
    pub completion: CompletionConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Unset means no corpora are available.
    pub base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            runtime: RuntimeConfig::default(),
            completion: CompletionConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
        }
    }
}

impl ServerConfig {
    /// Load from `AIFLOW_CONFIG` if set, then apply `BIND_ADDRESS` and
    /// `AIFLOW_API_KEY` overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var("AIFLOW_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        if let Ok(bind) = std::env::var("BIND_ADDRESS") {
            config.bind_address = bind;
        }
        if let Ok(key) = std::env::var("AIFLOW_API_KEY") {
            config.completion.api_key = Some(key);
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
