use serde::{Deserialize, Serialize};

/// Configuration for the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runs allowed to execute at the same time. Further runs wait.
    pub max_concurrent_runs: usize,
    /// Capacity of each streaming run's event channel.
    pub event_buffer_size: usize,
    /// Embedding model used when a corpus does not name one.
    pub default_embedding_model: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 16,
            event_buffer_size: 1024,
            default_embedding_model: "text-embedding-3-small".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: RuntimeConfig = serde_json::from_str(r#"{"max_concurrent_runs": 2}"#).unwrap();
        assert_eq!(config.max_concurrent_runs, 2);
        assert_eq!(config.event_buffer_size, 1024);
        assert_eq!(config.default_embedding_model, "text-embedding-3-small");
    }
}
