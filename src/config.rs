//! Configuration for herald.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (HERALD_HOME, HERALD_BOT_TOKEN, HERALD_CHANNEL_ID,
//!    HERALD_ADMIN_CHAT_ID, HERALD_DB_PATH)
//! 2. Config file (.herald/config.yaml, or $HERALD_HOME/config.yaml)
//! 3. Defaults (~/.herald)
//!
//! Config file discovery:
//! - Searches current directory and parents for .herald/config.yaml
//! - A relative `storage.db_path` is resolved against the config file's directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::TelegramConfig;
use crate::core::{DedupSettings, DiscoverySettings, Limits};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const DB_FILE: &str = "herald.db";

/// Missing or invalid settings that make it pointless to start
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Bot token is not configured (set HERALD_BOT_TOKEN or telegram.bot_token)")]
    MissingBotToken,

    #[error("Channel is not configured (set HERALD_CHANNEL_ID or telegram.channel_id)")]
    MissingChannel,

    #[error("Admin chat is not configured (set HERALD_ADMIN_CHAT_ID or telegram.admin_chat_id)")]
    MissingAdminChat,

    #[error("Invalid admin chat id: {0}")]
    InvalidAdminChat(String),
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub version: Option<String>,
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub dedup: DedupSettings,
    #[serde(default)]
    pub limits: Limits,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramSection {
    pub bot_token: Option<String>,
    /// `@channel` or numeric id; YAML numbers are accepted too
    pub channel_id: Option<serde_yaml::Value>,
    pub admin_chat_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSection {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_scheduler_interval")]
    pub interval_seconds: u64,
}

fn default_scheduler_interval() -> u64 {
    30
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            interval_seconds: default_scheduler_interval(),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Agent state directory (database, lock file)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub db_path: PathBuf,
    #[serde(skip_serializing)]
    pub bot_token: Option<String>,
    pub channel_id: Option<String>,
    pub admin_chat_id: Option<i64>,
    pub scheduler_interval_seconds: u64,
    pub discovery: DiscoverySettings,
    pub dedup: DedupSettings,
    pub limits: Limits,
}

impl ResolvedConfig {
    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_seconds.max(1))
    }

    /// Credentials needed to deliver anything
    pub fn telegram(&self) -> Result<TelegramConfig, ConfigError> {
        let bot_token = self
            .bot_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingBotToken)?;
        let channel_id = self
            .channel_id
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or(ConfigError::MissingChannel)?;

        Ok(TelegramConfig {
            bot_token,
            channel_id,
            admin_chat_id: self.admin_chat_id,
        })
    }

    /// The operator's chat, needed for moderation
    pub fn admin_chat(&self) -> Result<i64, ConfigError> {
        self.admin_chat_id.ok_or(ConfigError::MissingAdminChat)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.home.join("herald.lock")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".herald").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Merge environment, config file and defaults.
///
/// `env` looks up a variable; empty values count as unset.
pub fn resolve<F>(
    env: F,
    default_home: PathBuf,
    config_file: Option<(PathBuf, ConfigFile)>,
) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    let home = env("HERALD_HOME")
        .map(PathBuf::from)
        .unwrap_or(default_home);

    let (config_path, file) = match config_file {
        Some((path, file)) => (Some(path), file),
        None => (None, ConfigFile::default()),
    };

    let db_path = if let Some(path) = env("HERALD_DB_PATH") {
        PathBuf::from(path)
    } else if let (Some(path), Some(config_path)) = (&file.storage.db_path, &config_path) {
        let dir = config_path.parent().unwrap_or(Path::new("."));
        resolve_path(dir, path)
    } else {
        home.join(DB_FILE)
    };

    let admin_chat_id = match env("HERALD_ADMIN_CHAT_ID") {
        Some(raw) => Some(
            raw.trim()
                .parse::<i64>()
                .map_err(|_| ConfigError::InvalidAdminChat(raw.clone()))?,
        ),
        None => file.telegram.admin_chat_id,
    };

    Ok(ResolvedConfig {
        home,
        config_file: config_path,
        db_path,
        bot_token: env("HERALD_BOT_TOKEN")
            .or_else(|| env("TELEGRAM_BOT_TOKEN"))
            .or(file.telegram.bot_token),
        channel_id: env("HERALD_CHANNEL_ID")
            .or_else(|| file.telegram.channel_id.as_ref().and_then(yaml_scalar)),
        admin_chat_id,
        scheduler_interval_seconds: file.scheduler.interval_seconds,
        discovery: file.discovery,
        dedup: file.dedup,
        limits: file.limits,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".herald");

    let env = |key: &str| std::env::var(key).ok();

    // Walk up from the current directory first, then fall back to the home dir
    let config_path = find_config_file().or_else(|| {
        let home = env("HERALD_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_home.clone());
        Some(home.join("config.yaml")).filter(|p| p.exists())
    });

    let config_file = match config_path {
        Some(path) => {
            let file = load_config_file(&path)?;
            Some((path, file))
        }
        None => None,
    };

    resolve(env, default_home, config_file)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(env_of(&[]), PathBuf::from("/home/u/.herald"), None).unwrap();

        assert_eq!(config.home, PathBuf::from("/home/u/.herald"));
        assert_eq!(config.db_path, PathBuf::from("/home/u/.herald/herald.db"));
        assert_eq!(config.scheduler_interval(), Duration::from_secs(30));
        assert_eq!(config.discovery.max_candidates, 3);
        assert_eq!(config.dedup.body_prefix_chars, 200);
        assert!(config.config_file.is_none());
        assert!(matches!(config.telegram(), Err(ConfigError::MissingBotToken)));
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let herald_dir = temp.path().join(".herald");
        std::fs::create_dir_all(&herald_dir).unwrap();

        let config_path = herald_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
telegram:
  bot_token: "123:abc"
  channel_id: -1001234567890
  admin_chat_id: 42
storage:
  db_path: data/posts.db
scheduler:
  interval_seconds: 10
discovery:
  max_candidates: 2
  feeds:
    - https://example.com/rss
dedup:
  similarity_prefix_chars: 80
limits:
  send_timeout_seconds: 5
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version.as_deref(), Some("1.0"));

        let config = resolve(
            env_of(&[]),
            PathBuf::from("/unused"),
            Some((config_path.clone(), parsed)),
        )
        .unwrap();

        assert_eq!(config.db_path, herald_dir.join("data/posts.db"));
        assert_eq!(config.scheduler_interval_seconds, 10);
        assert_eq!(config.discovery.max_candidates, 2);
        assert_eq!(config.discovery.attempt_budget, 5);
        assert_eq!(config.dedup.similarity_prefix_chars, 80);
        assert_eq!(config.dedup.body_prefix_chars, 200);
        assert_eq!(config.limits.send_timeout(), Duration::from_secs(5));

        let telegram = config.telegram().unwrap();
        assert_eq!(telegram.bot_token, "123:abc");
        assert_eq!(telegram.channel_id, "-1001234567890");
        assert_eq!(telegram.admin_chat_id, Some(42));
    }

    #[test]
    fn test_env_overrides_file() {
        let file: ConfigFile = serde_yaml::from_str(
            "telegram:\n  bot_token: from-file\n  channel_id: \"@file\"\n  admin_chat_id: 1\n",
        )
        .unwrap();

        let config = resolve(
            env_of(&[
                ("HERALD_HOME", "/srv/herald"),
                ("TELEGRAM_BOT_TOKEN", "fallback"),
                ("HERALD_CHANNEL_ID", "@env"),
                ("HERALD_ADMIN_CHAT_ID", "7"),
            ]),
            PathBuf::from("/unused"),
            Some((PathBuf::from("/etc/.herald/config.yaml"), file)),
        )
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/srv/herald"));
        assert_eq!(config.bot_token.as_deref(), Some("fallback"));
        assert_eq!(config.channel_id.as_deref(), Some("@env"));
        assert_eq!(config.admin_chat_id, Some(7));
    }

    #[test]
    fn test_invalid_admin_chat() {
        let result = resolve(
            env_of(&[("HERALD_ADMIN_CHAT_ID", "admin")]),
            PathBuf::from("/h"),
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_channel_is_fatal() {
        let config = resolve(
            env_of(&[("HERALD_BOT_TOKEN", "t")]),
            PathBuf::from("/h"),
            None,
        )
        .unwrap();
        assert!(matches!(config.telegram(), Err(ConfigError::MissingChannel)));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/./subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
