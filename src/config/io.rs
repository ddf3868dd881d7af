use anyhow::{bail, Context, Result};
use std::path::Path;

use super::Config;

/// Maximum size for a config file (10 MB).
pub const MAX_CONFIG_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Read and parse a configuration file.
///
/// The format is picked from the extension: `.yaml`/`.yml`, `.toml`, and
/// anything else is parsed as JSON5 (which accepts plain JSON).
pub fn read_config_file(path: &Path) -> Result<Config> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Cannot stat config file '{}'", path.display()))?;

    if metadata.len() > MAX_CONFIG_FILE_BYTES {
        bail!(
            "Config file '{}' is {} bytes, exceeds limit of {} bytes",
            path.display(),
            metadata.len(),
            MAX_CONFIG_FILE_BYTES,
        );
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;

    parse_config(&content, path.extension().and_then(|e| e.to_str()))
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

/// Parse configuration text in the format named by `ext`.
pub fn parse_config(content: &str, ext: Option<&str>) -> Result<Config> {
    let config = match ext {
        Some("yaml") | Some("yml") => serde_yaml::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        _ => json5::from_str(content)?,
    };
    Ok(config)
}

/// Write configuration to a JSON file.
pub fn write_config_file(path: &Path, config: &Config) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file '{}'", path.display()))?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn read_json5_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("mylobster.json");
        fs::write(
            &file,
            r#"{
                // comments are allowed
                memory: { chunking: { tokens: 200, overlap: 20 } },
            }"#,
        )
        .unwrap();

        let config = read_config_file(&file).unwrap();
        let chunking = config.memory.chunking.unwrap();
        assert_eq!(chunking.tokens, Some(200));
        assert_eq!(chunking.overlap, Some(20));
    }

    #[test]
    fn read_yaml_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("mylobster.yaml");
        fs::write(
            &file,
            "memory:\n  query:\n    maxResults: 3\n    minScore: 0.5\n",
        )
        .unwrap();

        let config = read_config_file(&file).unwrap();
        let query = config.memory.query.unwrap();
        assert_eq!(query.max_results, Some(3));
        assert_eq!(query.min_score, Some(0.5));
    }

    #[test]
    fn read_toml_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("mylobster.toml");
        fs::write(&file, "[memory]\nprovider = \"gemini\"\n").unwrap();

        let config = read_config_file(&file).unwrap();
        assert_eq!(
            config.memory.provider,
            Some(crate::config::EmbeddingProviderKind::Gemini)
        );
    }

    #[test]
    fn reject_oversized_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("huge.json");
        let content = "x".repeat((MAX_CONFIG_FILE_BYTES + 1) as usize);
        fs::write(&file, content).unwrap();

        let result = read_config_file(&file);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds limit"));
    }

    #[test]
    fn write_then_read_default() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("mylobster.json");
        write_config_file(&file, &Config::default()).unwrap();

        let config = read_config_file(&file).unwrap();
        assert!(config.memory.chunking.is_none());
    }
}
