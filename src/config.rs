//! Configuration for the diagnostics harness
//!
//! Loads configuration from config.yml file

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default constants (fallback if config.yml not found)
pub const SESSION_FILE: &str = "telegram_session.session";
pub const LOCK_FILE: &str = "telegram_session.lock";
pub const SECRETS_FILE: &str = ".env";
pub const CONNECT_ATTEMPTS: u32 = 5;
pub const CONNECT_BACKOFF_MS: u64 = 1000;
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const MAX_CODE_ATTEMPTS: u32 = 3;
pub const DEFAULT_MESSAGE_LIMIT: usize = 10;
pub const DEFAULT_DIALOG_LIMIT: usize = 10;

/// YAML config structures
#[derive(Debug, Deserialize)]
struct YamlConfig {
    telegram: Option<TelegramConfig>,
    session: Option<SessionConfig>,
    limits: Option<LimitsConfig>,
}

/// Raw `telegram:` section. Values may be `${VAR}` placeholders.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub api_id: Option<String>,
    pub api_hash: Option<String>,
    pub phone: Option<String>,
    pub session: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionConfig {
    file: Option<PathBuf>,
    lock_file: Option<PathBuf>,
    secrets_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct LimitsConfig {
    connect_attempts: Option<u32>,
    connect_backoff_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    max_code_attempts: Option<u32>,
    default_message_limit: Option<usize>,
    default_dialog_limit: Option<usize>,
}

/// Deserialize a value that can be either a string or a number
fn deserialize_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {:?}",
            other
        ))),
    }
}

/// Connection and authentication bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthLimits {
    pub connect_attempts: u32,
    pub connect_backoff: Duration,
    pub request_timeout: Duration,
    pub max_code_attempts: u32,
}

impl Default for AuthLimits {
    fn default() -> Self {
        Self {
            connect_attempts: CONNECT_ATTEMPTS,
            connect_backoff: Duration::from_millis(CONNECT_BACKOFF_MS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            max_code_attempts: MAX_CODE_ATTEMPTS,
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub session_file: PathBuf,
    pub lock_file: PathBuf,
    pub secrets_file: PathBuf,
    pub limits: AuthLimits,
    pub default_message_limit: usize,
    pub default_dialog_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config {
    /// Load configuration from config.yml or use defaults
    pub fn new() -> Self {
        Self::load_from_file("config.yml")
            .or_else(|_| Self::load_from_file("../config.yml"))
            .unwrap_or_else(|_| Self::defaults())
    }

    /// Load from an explicit path, or fall back to [`Config::new`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::new()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let yaml: YamlConfig = serde_yaml::from_str(&content)?;
        Ok(Self::from_yaml(yaml))
    }

    fn from_yaml(yaml: YamlConfig) -> Self {
        let defaults = Self::defaults();
        let mut config = Self {
            telegram: yaml.telegram.unwrap_or_default(),
            ..defaults
        };

        if let Some(session) = yaml.session {
            if let Some(file) = session.file {
                config.session_file = file;
            }
            if let Some(lock_file) = session.lock_file {
                config.lock_file = lock_file;
            }
            if let Some(secrets_file) = session.secrets_file {
                config.secrets_file = secrets_file;
            }
        }

        if let Some(limits) = yaml.limits {
            let auth = &mut config.limits;
            // Zero attempts would never connect.
            auth.connect_attempts = limits.connect_attempts.unwrap_or(CONNECT_ATTEMPTS).max(1);
            auth.connect_backoff =
                Duration::from_millis(limits.connect_backoff_ms.unwrap_or(CONNECT_BACKOFF_MS));
            auth.request_timeout =
                Duration::from_secs(limits.request_timeout_secs.unwrap_or(REQUEST_TIMEOUT_SECS).max(1));
            auth.max_code_attempts = limits.max_code_attempts.unwrap_or(MAX_CODE_ATTEMPTS).max(1);
            config.default_message_limit = limits
                .default_message_limit
                .unwrap_or(DEFAULT_MESSAGE_LIMIT)
                .max(1);
            config.default_dialog_limit = limits
                .default_dialog_limit
                .unwrap_or(DEFAULT_DIALOG_LIMIT)
                .max(1);
        }

        config
    }

    /// Create config with defaults (fallback)
    fn defaults() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            session_file: PathBuf::from(SESSION_FILE),
            lock_file: PathBuf::from(LOCK_FILE),
            secrets_file: PathBuf::from(SECRETS_FILE),
            limits: AuthLimits::default(),
            default_message_limit: DEFAULT_MESSAGE_LIMIT,
            default_dialog_limit: DEFAULT_DIALOG_LIMIT,
        }
    }
}

/// Resolve a `${VAR}` placeholder against the environment.
///
/// Plain values pass through; unresolvable placeholders become `None`.
pub fn expand_placeholder(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        return std::env::var(var_name).ok();
    }
    Some(value.to_string())
}

/// Parse a configured duration override given in whole seconds.
pub fn parse_timeout_secs(raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| Error::InvalidArgument(format!("invalid timeout '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex};

    static ENV_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    fn write_temp(name: &str, yaml: &str) -> PathBuf {
        let temp_file = std::env::temp_dir().join(name);
        std::fs::write(&temp_file, yaml).unwrap();
        temp_file
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.session_file, PathBuf::from(SESSION_FILE));
        assert_eq!(config.secrets_file, PathBuf::from(SECRETS_FILE));
        assert_eq!(config.limits, AuthLimits::default());
    }

    #[test]
    fn auth_limits_default_values() {
        let limits = AuthLimits::default();
        assert_eq!(limits.connect_attempts, 5);
        assert_eq!(limits.max_code_attempts, 3);
        assert_eq!(limits.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
telegram:
  api_id: 12345
  api_hash: "test_hash"
  phone: "+1234567890"

session:
  file: "diag.session"
  secrets_file: "scripts/.env"

limits:
  connect_attempts: 2
  connect_backoff_ms: 10
  request_timeout_secs: 5
  max_code_attempts: 4
  default_message_limit: 20
"#;
        let temp_file = write_temp("tg_diag_config_full.yml", yaml);
        let config = Config::load_from_file(&temp_file).unwrap();

        assert_eq!(config.telegram.api_id.as_deref(), Some("12345"));
        assert_eq!(config.telegram.api_hash.as_deref(), Some("test_hash"));
        assert_eq!(config.telegram.phone.as_deref(), Some("+1234567890"));
        assert_eq!(config.session_file, PathBuf::from("diag.session"));
        assert_eq!(config.lock_file, PathBuf::from(LOCK_FILE));
        assert_eq!(config.secrets_file, PathBuf::from("scripts/.env"));
        assert_eq!(config.limits.connect_attempts, 2);
        assert_eq!(config.limits.connect_backoff, Duration::from_millis(10));
        assert_eq!(config.limits.request_timeout, Duration::from_secs(5));
        assert_eq!(config.limits.max_code_attempts, 4);
        assert_eq!(config.default_message_limit, 20);
        assert_eq!(config.default_dialog_limit, DEFAULT_DIALOG_LIMIT);

        std::fs::remove_file(temp_file).ok();
    }

    #[test]
    fn zero_limits_are_clamped() {
        let yaml = r#"
limits:
  connect_attempts: 0
  max_code_attempts: 0
  request_timeout_secs: 0
"#;
        let temp_file = write_temp("tg_diag_config_zero.yml", yaml);
        let config = Config::load_from_file(&temp_file).unwrap();

        assert_eq!(config.limits.connect_attempts, 1);
        assert_eq!(config.limits.max_code_attempts, 1);
        assert_eq!(config.limits.request_timeout, Duration::from_secs(1));

        std::fs::remove_file(temp_file).ok();
    }

    #[test]
    fn api_id_accepts_string() {
        let yaml = r#"
telegram:
  api_id: "${TELEGRAM_API_ID}"
"#;
        let temp_file = write_temp("tg_diag_config_placeholder.yml", yaml);
        let config = Config::load_from_file(&temp_file).unwrap();
        assert_eq!(config.telegram.api_id.as_deref(), Some("${TELEGRAM_API_ID}"));
        std::fs::remove_file(temp_file).ok();
    }

    #[test]
    fn api_id_rejects_list() {
        let yaml = r#"
telegram:
  api_id: [1, 2]
"#;
        let temp_file = write_temp("tg_diag_config_bad_id.yml", yaml);
        assert!(Config::load_from_file(&temp_file).is_err());
        std::fs::remove_file(temp_file).ok();
    }

    #[test]
    fn expand_placeholder_reads_environment() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::set_var("TG_DIAG_TEST_PLACEHOLDER", "from_env");

        assert_eq!(
            expand_placeholder(Some("${TG_DIAG_TEST_PLACEHOLDER}")).as_deref(),
            Some("from_env")
        );
        assert_eq!(expand_placeholder(Some("literal")).as_deref(), Some("literal"));
        assert_eq!(expand_placeholder(Some("${TG_DIAG_TEST_UNSET_VAR}")), None);
        assert_eq!(expand_placeholder(None), None);

        std::env::remove_var("TG_DIAG_TEST_PLACEHOLDER");
    }

    #[test]
    fn parse_timeout_secs_rejects_zero_and_garbage() {
        assert_eq!(parse_timeout_secs("15").unwrap(), Duration::from_secs(15));
        assert!(parse_timeout_secs("0").is_err());
        assert!(parse_timeout_secs("soon").is_err());
    }

    #[test]
    fn load_from_file_fails_on_missing_file() {
        let result = Config::load_from_file("/nonexistent/path/config.yml");
        assert!(matches!(result, Err(Error::IoError(_))));
    }

    #[test]
    fn load_from_file_fails_on_invalid_yaml() {
        let temp_file = write_temp("tg_diag_config_invalid.yml", "{ invalid yaml [");
        let result = Config::load_from_file(&temp_file);
        assert!(matches!(result, Err(Error::SerializationError(_))));
        std::fs::remove_file(temp_file).ok();
    }

    #[test]
    fn load_without_path_falls_back() {
        let config = Config::load(None).unwrap();
        assert!(config.limits.connect_attempts >= 1);
    }
}
