//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.signbot/config.json`) and environment.
//! The Direct Line secret is normally supplied through `SIGNBOT_DIRECT_LINE_SECRET`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default Direct Line endpoint (the v4 bot framework still serves the v3 Direct Line API).
pub const DEFAULT_ENDPOINT: &str = "https://directline.botframework.com/v3/directline";

/// Channel id stamped on every outgoing activity.
pub const DEFAULT_CHANNEL_ID: &str = "DirectLineChannelId";

/// File name of the word → clip mapping.
pub const MAPPING_FILE_NAME: &str = "animationsMapping.json";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Bot service connection settings.
    #[serde(default)]
    pub direct_line: DirectLineConfig,

    /// Gesture playback settings.
    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Direct Line endpoint, credential and identity used for outgoing activities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectLineConfig {
    /// Base URL (default the public Direct Line v3 endpoint). Overridden by SIGNBOT_DIRECT_LINE_ENDPOINT env.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer secret from the bot's Direct Line channel. Overridden by SIGNBOT_DIRECT_LINE_SECRET env.
    pub secret: Option<String>,

    /// `from.id` of outgoing activities. When absent a random `user-<uuid>` is used per client
    /// instead of one fixed id (e.g. "ASLBotId") shared by every install.
    pub user_id: Option<String>,

    /// `from.name` of outgoing activities (default "Signbot User"; set e.g. "ASLBot" for a named bot user).
    #[serde(default = "default_user_name")]
    pub user_name: String,

    #[serde(default = "default_channel_id")]
    pub channel_id: String,

    /// Upper bound for each HTTP request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl DirectLineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Playback settings (animation mapping location).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackConfig {
    /// Path to the word → clip JSON file. Relative paths are resolved against the config file's parent.
    #[serde(default)]
    pub mapping_path: Option<PathBuf>,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_user_name() -> String {
    "Signbot User".to_string()
}

fn default_channel_id() -> String {
    DEFAULT_CHANNEL_ID.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for DirectLineConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            secret: None,
            user_id: None,
            user_name: default_user_name(),
            channel_id: default_channel_id(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the Direct Line secret: env SIGNBOT_DIRECT_LINE_SECRET overrides config.
pub fn resolve_secret(config: &Config) -> Option<String> {
    non_empty_env("SIGNBOT_DIRECT_LINE_SECRET").or_else(|| {
        config
            .direct_line
            .secret
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the endpoint: env SIGNBOT_DIRECT_LINE_ENDPOINT overrides config. Trailing slashes are dropped.
pub fn resolve_endpoint(config: &Config) -> String {
    non_empty_env("SIGNBOT_DIRECT_LINE_ENDPOINT")
        .unwrap_or_else(|| config.direct_line.endpoint.trim().to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Apply env overrides to the Direct Line section so the relay sees the effective values.
pub fn resolve_direct_line(config: &Config) -> DirectLineConfig {
    DirectLineConfig {
        endpoint: resolve_endpoint(config),
        secret: resolve_secret(config),
        ..config.direct_line.clone()
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("SIGNBOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".signbot").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

fn config_parent(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Resolve the mapping file: `playback.mappingPath` if set (relative to the config file's parent),
/// otherwise `animationsMapping.json` next to the config file.
pub fn resolve_mapping_path(config: &Config, config_path: &Path) -> PathBuf {
    let parent = config_parent(config_path);
    match &config.playback.mapping_path {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.clone()
            } else {
                parent.join(p)
            }
        }
        _ => parent.join(MAPPING_FILE_NAME),
    }
}

/// Load config from the given path (or the default path). Missing file => default config.
/// Returns the config and the path that was used (for resolving the mapping file).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Env overrides are process-wide; tests that set them take this lock.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    const SECRET_VAR: &str = "SIGNBOT_DIRECT_LINE_SECRET";
    const ENDPOINT_VAR: &str = "SIGNBOT_DIRECT_LINE_ENDPOINT";

    fn with_env<T>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        for (name, value) in vars {
            match value {
                Some(v) => std::env::set_var(name, v),
                None => std::env::remove_var(name),
            }
        }
        let out = f();
        for (name, _) in vars {
            std::env::remove_var(name);
        }
        out
    }

    fn file_config() -> Config {
        let mut config = Config::default();
        config.direct_line.endpoint = " https://file.test/v3/directline/ ".to_string();
        config.direct_line.secret = Some(" FILE ".to_string());
        config
    }

    #[test]
    fn env_secret_and_endpoint_win_over_file() {
        let resolved = with_env(
            &[
                (SECRET_VAR, Some("ENVSECRET")),
                (ENDPOINT_VAR, Some("https://env.test/directline//")),
            ],
            || resolve_direct_line(&file_config()),
        );
        assert_eq!(resolved.secret.as_deref(), Some("ENVSECRET"));
        assert_eq!(resolved.endpoint, "https://env.test/directline");
        assert_eq!(resolved.channel_id, DEFAULT_CHANNEL_ID);
    }

    #[test]
    fn file_values_used_when_env_unset_or_blank() {
        let config = file_config();
        let (secret, endpoint) = with_env(&[(SECRET_VAR, Some("   ")), (ENDPOINT_VAR, None)], || {
            (resolve_secret(&config), resolve_endpoint(&config))
        });
        assert_eq!(secret.as_deref(), Some("FILE"));
        assert_eq!(endpoint, "https://file.test/v3/directline");
    }

    #[test]
    fn blank_secret_everywhere_resolves_to_none() {
        let mut config = Config::default();
        config.direct_line.secret = Some("  ".to_string());
        let resolved = with_env(&[(SECRET_VAR, Some("")), (ENDPOINT_VAR, Some(""))], || {
            resolve_direct_line(&config)
        });
        assert!(resolved.secret.is_none());
        assert_eq!(resolved.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn default_direct_line_settings() {
        let d = DirectLineConfig::default();
        assert_eq!(d.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(d.channel_id, "DirectLineChannelId");
        assert_eq!(d.timeout(), Duration::from_secs(30));
        assert!(d.secret.is_none());
    }

    #[test]
    fn parses_camel_case_file() {
        let json = r#"{
            "directLine": { "endpoint": "https://example.test/", "secret": " ABC ", "userId": "ASLBotId", "timeoutSecs": 5 },
            "playback": { "mappingPath": "gestures/map.json" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.direct_line.user_id.as_deref(), Some("ASLBotId"));
        assert_eq!(config.direct_line.timeout_secs, 5);
        assert_eq!(config.direct_line.user_name, "Signbot User");
        assert_eq!(
            config.playback.mapping_path,
            Some(PathBuf::from("gestures/map.json"))
        );
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let d = DirectLineConfig {
            timeout_secs: 0,
            ..DirectLineConfig::default()
        };
        assert_eq!(d.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn resolve_mapping_path_default() {
        let config = Config::default();
        let path = Path::new("/home/user/.signbot/config.json");
        assert_eq!(
            resolve_mapping_path(&config, path),
            PathBuf::from("/home/user/.signbot/animationsMapping.json")
        );
    }

    #[test]
    fn resolve_mapping_path_override_relative() {
        let mut config = Config::default();
        config.playback.mapping_path = Some(PathBuf::from("gestures/map.json"));
        let path = Path::new("/home/user/.signbot/config.json");
        assert_eq!(
            resolve_mapping_path(&config, path),
            PathBuf::from("/home/user/.signbot/gestures/map.json")
        );
    }

    #[test]
    fn resolve_mapping_path_override_absolute() {
        let mut config = Config::default();
        config.playback.mapping_path = Some(PathBuf::from("/assets/map.json"));
        let path = Path::new("config.json");
        assert_eq!(
            resolve_mapping_path(&config, path),
            PathBuf::from("/assets/map.json")
        );
    }

    #[test]
    fn load_config_missing_file_uses_defaults() {
        let path = std::env::temp_dir()
            .join(format!("signbot-missing-{}", uuid::Uuid::new_v4()))
            .join("config.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.direct_line.endpoint, DEFAULT_ENDPOINT);
    }
}
