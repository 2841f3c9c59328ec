use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api;

const DEFAULT_ENV_PREFIX: &str = "DIGEST";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub browse: BrowseConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    api::DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowseConfig {
    // Channel to open on startup; empty means "first listed channel".
    #[serde(default)]
    pub channel_id: String,
    #[serde(default = "default_thread_limit")]
    pub thread_limit: u32,
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            thread_limit: default_thread_limit(),
        }
    }
}

fn default_thread_limit() -> u32 {
    api::THREAD_LIST_MAX
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UiConfig {
    #[serde(default)]
    pub timestamps: TimestampMode,
}

// The reporting pipeline is KST-centric (daily entries are keyed by KST
// date), so that is the default timezone for display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimestampMode {
    #[default]
    Kst,
    Local,
    Utc,
}

impl TimestampMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "kst" => Some(Self::Kst),
            "local" => Some(Self::Local),
            "utc" => Some(Self::Utc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_config(cfg, load_env(prefix));

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

// Later layers only win where they differ from the defaults, so an env pass
// with nothing set never resets a value the file configured.
fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.server.base_url.is_empty() && other.server.base_url != default_base_url() {
        base.server.base_url = other.server.base_url;
    }
    if other.server.timeout != default_timeout() {
        base.server.timeout = other.server.timeout;
    }

    if !other.browse.channel_id.is_empty() {
        base.browse.channel_id = other.browse.channel_id;
    }
    if other.browse.thread_limit != 0 && other.browse.thread_limit != default_thread_limit() {
        base.browse.thread_limit = other.browse.thread_limit;
    }

    if other.ui.timestamps != TimestampMode::default() {
        base.ui.timestamps = other.ui.timestamps;
    }

    base
}

fn load_env(prefix: &str) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    let mut cfg = Config::default();
    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }
    cfg
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "server.base_url" => cfg.server.base_url = value,
        "server.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.server.timeout = duration;
            }
        }
        "browse.channel_id" => cfg.browse.channel_id = value,
        "browse.thread_limit" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.browse.thread_limit = parsed;
            }
        }
        "ui.timestamps" => {
            if let Some(mode) = TimestampMode::parse(&value) {
                cfg.ui.timestamps = mode;
            }
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("digest-tui").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    // Loads with a path that cannot exist, so a developer's real config file
    // never leaks into the assertions.
    fn load_isolated(prefix: &str) -> Config {
        let dir = tempdir().unwrap();
        load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some(prefix.to_string()),
        })
        .unwrap()
    }

    #[test]
    fn load_defaults_without_files() {
        let cfg = load_isolated("DIGEST_TEST_DEFAULTS");
        assert_eq!(cfg.server.base_url, "http://127.0.0.1:8000");
        assert_eq!(cfg.server.timeout, Duration::from_secs(20));
        assert_eq!(cfg.browse.thread_limit, 200);
        assert!(cfg.browse.channel_id.is_empty());
        assert_eq!(cfg.ui.timestamps, TimestampMode::Kst);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            concat!(
                "server:\n",
                "  base_url: http://10.0.0.5:9000\n",
                "  timeout: 5s\n",
                "browse:\n",
                "  channel_id: C0FFEE\n",
                "  thread_limit: 50\n",
                "ui:\n",
                "  timestamps: utc\n",
            ),
        )
        .unwrap();

        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("DIGEST_TEST_FILE".to_string()),
        })
        .unwrap();
        assert_eq!(cfg.server.base_url, "http://10.0.0.5:9000");
        assert_eq!(cfg.server.timeout, Duration::from_secs(5));
        assert_eq!(cfg.browse.channel_id, "C0FFEE");
        assert_eq!(cfg.browse.thread_limit, 50);
        assert_eq!(cfg.ui.timestamps, TimestampMode::Utc);
    }

    #[test]
    fn env_overrides() {
        env::set_var("DIGEST_TEST_ENV_SERVER__BASE_URL", "http://192.168.1.9:8000");
        env::set_var("DIGEST_TEST_ENV_BROWSE__CHANNEL_ID", "C123");
        env::set_var("DIGEST_TEST_ENV_UI__TIMESTAMPS", "local");
        let cfg = load_isolated("DIGEST_TEST_ENV");
        env::remove_var("DIGEST_TEST_ENV_SERVER__BASE_URL");
        env::remove_var("DIGEST_TEST_ENV_BROWSE__CHANNEL_ID");
        env::remove_var("DIGEST_TEST_ENV_UI__TIMESTAMPS");

        assert_eq!(cfg.server.base_url, "http://192.168.1.9:8000");
        assert_eq!(cfg.browse.channel_id, "C123");
        assert_eq!(cfg.ui.timestamps, TimestampMode::Local);
    }

    #[test]
    fn env_wins_over_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "browse:\n  channel_id: CFILE\n").unwrap();

        env::set_var("DIGEST_TEST_BOTH_BROWSE__CHANNEL_ID", "CENV");
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("DIGEST_TEST_BOTH".to_string()),
        })
        .unwrap();
        env::remove_var("DIGEST_TEST_BOTH_BROWSE__CHANNEL_ID");

        assert_eq!(cfg.browse.channel_id, "CENV");
    }

    #[test]
    fn file_timeout_survives_empty_env_pass() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "server:\n  timeout: 45s\n").unwrap();

        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("DIGEST_TEST_KEEP".to_string()),
        })
        .unwrap();
        assert_eq!(cfg.server.timeout, Duration::from_secs(45));
    }

    #[test]
    fn timestamp_mode_parses_known_values() {
        assert_eq!(TimestampMode::parse("KST"), Some(TimestampMode::Kst));
        assert_eq!(TimestampMode::parse(" utc "), Some(TimestampMode::Utc));
        assert_eq!(TimestampMode::parse("seoul"), None);
    }
}
