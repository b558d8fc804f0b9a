//! Initialize the configuration directory: create ~/.signbot, a default config and the bundled gesture mapping.
//!
//! Layout mirrors `crates/lib/config/`: `config/config.json` → `~/.signbot/config.json`,
//! `config/animationsMapping.json` → `~/.signbot/animationsMapping.json`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;

static DEFAULT_CONFIG: &str = include_str!("../config/config.json");
static DEFAULT_MAPPING: &str = include_str!("../config/animationsMapping.json");

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` from the default template if missing (no secret; set SIGNBOT_DIRECT_LINE_SECRET or edit the file).
/// - Writes the bundled `animationsMapping.json` next to it if missing.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, DEFAULT_CONFIG)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let (cfg, _) = config::load_config(Some(config_path.to_path_buf()))?;
    let mapping = config::resolve_mapping_path(&cfg, config_path);
    if !mapping.exists() {
        if let Some(dir) = mapping.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating mapping directory {}", dir.display()))?;
        }
        std::fs::write(&mapping, DEFAULT_MAPPING)
            .with_context(|| format!("writing default mapping to {}", mapping.display()))?;
        log::info!("wrote bundled gesture mapping to {}", mapping.display());
    } else {
        log::debug!("gesture mapping already exists at {}, skipping", mapping.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::AnimationMapping;

    #[test]
    fn bundled_files_parse() {
        let cfg: config::Config = serde_json::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(cfg.direct_line.endpoint, config::DEFAULT_ENDPOINT);
        assert!(cfg.direct_line.secret.is_none());
        let m = AnimationMapping::from_json(DEFAULT_MAPPING).unwrap();
        assert_eq!(m.clip_for("hello"), Some("Hello"));
    }

    #[test]
    fn init_creates_config_and_mapping_once() {
        let dir = std::env::temp_dir().join(format!("signbot-init-{}", uuid::Uuid::new_v4()));
        let config_path = dir.join("config.json");
        let out = init_config_dir(&config_path).unwrap();
        assert_eq!(out, dir);
        assert!(config_path.exists());
        let mapping = dir.join("animationsMapping.json");
        assert!(mapping.exists());

        std::fs::write(&mapping, r#"{ "custom": "Custom" }"#).unwrap();
        init_config_dir(&config_path).unwrap();
        let kept = AnimationMapping::load(&mapping).unwrap();
        assert_eq!(kept.clip_for("custom"), Some("Custom"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
