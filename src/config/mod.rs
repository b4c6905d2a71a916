// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a file (YAML or JSON)
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config = parse_config(path, &contents)?;
    config.validate()?;
    Ok(config)
}

/// Like [`load_config`], but a missing file yields the built-in defaults.
pub async fn load_config_or_default<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    if tokio::fs::metadata(path).await.is_err() {
        tracing::warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }
    load_config(path).await
}

fn parse_config(path: &Path, contents: &str) -> Result<Config> {
    let ext = path.extension().and_then(|s| s.to_str());
    let config = if ext == Some("yaml") || ext == Some("yml") {
        serde_yaml::from_str(contents).context("Failed to parse YAML config")?
    } else {
        serde_json::from_str(contents).context("Failed to parse JSON config")?
    };
    Ok(config)
}
