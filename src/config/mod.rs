mod defaults;
mod io;
mod types;
mod validation;

pub use defaults::*;
pub use io::*;
pub use types::*;
pub use validation::*;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Top-level configuration for the memory engine binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Agent workspace holding `MEMORY.md` and `memory/`.
    pub workspace: Option<String>,
    #[serde(default)]
    pub memory: MemorySearchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,

    /// State directory for persistent data.
    #[serde(skip)]
    pub state_dir: PathBuf,
}

impl Config {
    /// Load configuration from file, environment, and defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(find_config_file)
            .unwrap_or_else(|| PathBuf::from("mylobster.json"));

        let mut config = if config_path.exists() {
            info!("Loading config from {}", config_path.display());
            read_config_file(&config_path)?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.state_dir = resolve_state_dir();

        Ok(config)
    }

    /// Write default configuration to a file.
    pub fn write_default(path: &str) -> Result<()> {
        write_config_file(std::path::Path::new(path), &Config::default())
    }

    /// Workspace directory, defaulting to the current directory.
    pub fn workspace_dir(&self) -> PathBuf {
        self.workspace
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Path of the SQLite index, or `None` when persistence is disabled.
    pub fn memory_store_path(&self) -> Option<PathBuf> {
        match self.memory.store.as_ref().and_then(|s| s.path.as_deref()) {
            Some(":memory:") => None,
            Some(path) => Some(PathBuf::from(path)),
            None => {
                let agent_id = self.memory.agent_id.as_deref().unwrap_or(DEFAULT_AGENT_ID);
                Some(
                    self.state_dir
                        .join("memory")
                        .join(format!("{agent_id}.sqlite")),
                )
            }
        }
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(workspace) = std::env::var("MYLOBSTER_WORKSPACE") {
            self.workspace = Some(workspace);
        }

        if let Ok(provider) = std::env::var("MYLOBSTER_MEMORY_PROVIDER") {
            if let Ok(kind) = provider.parse() {
                self.memory.provider = Some(kind);
            }
        }

        let key_var = match self.memory.provider.unwrap_or_default() {
            EmbeddingProviderKind::Openai => "OPENAI_API_KEY",
            EmbeddingProviderKind::Gemini => "GEMINI_API_KEY",
            EmbeddingProviderKind::Mistral => "MISTRAL_API_KEY",
            EmbeddingProviderKind::Voyage => "VOYAGE_API_KEY",
        };
        if let Ok(key) = std::env::var(key_var) {
            self.memory.apply_api_key(&key);
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            memory: MemorySearchConfig::default(),
            logging: LoggingConfig::default(),
            state_dir: resolve_state_dir(),
        }
    }
}

/// Find the configuration file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let candidates = [
        PathBuf::from("mylobster.json"),
        PathBuf::from("mylobster.yaml"),
        PathBuf::from("mylobster.yml"),
        PathBuf::from("mylobster.toml"),
    ];

    for path in &candidates {
        if path.exists() {
            return Some(path.clone());
        }
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".mylobster").join("config.json");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

/// Resolve the state directory for persistent data.
fn resolve_state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MYLOBSTER_STATE_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir()
        .map(|h| h.join(".mylobster"))
        .unwrap_or_else(|| PathBuf::from(".mylobster"))
}
