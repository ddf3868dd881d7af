use super::Config;
use anyhow::Result;
use tracing::warn;

use crate::memory::MemoryConfig;

/// Validation errors for configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate a configuration object, collecting every problem found.
pub fn validate_config(config: &Config) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();
    let memory = &config.memory;

    for (field, message) in MemoryConfig::resolve(memory).problems() {
        errors.push(ConfigValidationError {
            path: format!("memory.{field}"),
            message,
        });
    }

    if let Some(base_url) = memory.remote.as_ref().and_then(|r| r.base_url.as_deref()) {
        if let Err(e) = url::Url::parse(base_url) {
            errors.push(ConfigValidationError {
                path: "memory.remote.baseUrl".to_string(),
                message: format!("Invalid URL: {e}"),
            });
        }
    }

    if memory.api_key().is_none() {
        warn!(
            provider = %memory.provider.unwrap_or_default(),
            "no embedding API key configured"
        );
    }

    if let Some(agent_id) = memory.agent_id.as_deref() {
        if agent_id.is_empty() || agent_id.contains(['/', '\\']) {
            errors.push(ConfigValidationError {
                path: "memory.agentId".to_string(),
                message: "Agent id must be a non-empty file name".to_string(),
            });
        }
    }

    errors
}

/// Validate configuration and return Result.
pub fn validate_config_object(config: &Config) -> Result<()> {
    let errors = validate_config(config);
    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        anyhow::bail!("Configuration validation failed:\n{}", messages.join("\n"));
    }
}
