//! Configuration management for QuickChat
//!
//! Every value can be overridden from a TOML file or from
//! `QUICKCHAT_<SECTION>_<KEY>` environment variables.

use chrono::format::{Item, StrftimeItems};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Longest verification timeout the provider accepts
pub const MAX_VERIFICATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Main client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Phone authentication
    pub auth: AuthConfig,

    /// Chat list rendering
    pub chat: ChatConfig,

    /// Profile setup
    pub profile: ProfileConfig,

    /// Local storage
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Phone authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// How long the provider may take before failing a challenge itself
    #[serde(with = "humantime_serde")]
    pub verification_timeout: Duration,

    /// Name of the local "signed in" flag
    pub signed_in_flag: String,
}

/// Chat list configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Text shown when a conversation has no message yet
    pub no_message_text: String,

    /// Time shown when a conversation has no message yet
    pub no_message_time: String,

    /// Name shown when a conversation entry has none
    pub unknown_peer_name: String,

    /// strftime pattern for the last message time
    pub time_format: String,

    /// Offset from UTC used to render times, in minutes
    pub utc_offset_minutes: i32,
}

/// Profile configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// JPEG quality for uploaded profile pictures (1-100)
    pub jpeg_quality: u8,
}

/// Local storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for on-device state
    pub data_dir: PathBuf,

    /// File name of the flag store inside `data_dir`
    pub flags_file: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            verification_timeout: Duration::from_secs(60),
            signed_in_flag: "isSignedIn".to_string(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            no_message_text: "No message".to_string(),
            no_message_time: "--:--".to_string(),
            unknown_peer_name: "Unknown".to_string(),
            time_format: "%H:%M".to_string(),
            utc_offset_minutes: 0,
        }
    }
}

impl ChatConfig {
    /// Offset used for rendering, UTC if the configured one is out of range
    pub fn display_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self { jpeg_quality: 100 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            flags_file: "app_prefs.json".to_string(),
        }
    }
}

impl StorageConfig {
    /// Full path of the flag store file
    pub fn flags_path(&self) -> PathBuf {
        self.data_dir.join(&self.flags_file)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn parse_env<T>(key: &str, expected: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => Ok(Some(value)),
            Err(e) => Err(ConfigError::InvalidEnv {
                key: key.to_string(),
                reason: e.to_string(),
                value: raw,
                expected,
            }),
        },
        Err(_) => Ok(None),
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: QUICKCHAT_<SECTION>_<KEY>
    /// Example: QUICKCHAT_AUTH_VERIFICATION_TIMEOUT_SECS=30
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Auth config
        if let Some(secs) = parse_env::<u64>(
            "QUICKCHAT_AUTH_VERIFICATION_TIMEOUT_SECS",
            "number of seconds",
        )? {
            config.auth.verification_timeout = Duration::from_secs(secs);
        }
        if let Ok(flag) = env::var("QUICKCHAT_AUTH_SIGNED_IN_FLAG") {
            config.auth.signed_in_flag = flag;
        }

        // Chat config
        if let Some(offset) =
            parse_env::<i32>("QUICKCHAT_CHAT_UTC_OFFSET_MINUTES", "offset in minutes")?
        {
            config.chat.utc_offset_minutes = offset;
        }
        if let Ok(format) = env::var("QUICKCHAT_CHAT_TIME_FORMAT") {
            config.chat.time_format = format;
        }

        // Profile config
        if let Some(quality) = parse_env::<u8>("QUICKCHAT_PROFILE_JPEG_QUALITY", "JPEG quality")? {
            config.profile.jpeg_quality = quality;
        }

        // Storage config
        if let Ok(data_dir) = env::var("QUICKCHAT_STORAGE_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(data_dir);
        }

        // Logging config
        if let Ok(level) = env::var("QUICKCHAT_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(json) = parse_env::<bool>("QUICKCHAT_LOG_JSON", "boolean")? {
            config.logging.json_format = json;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate auth config
        if self.auth.verification_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "verification_timeout must be greater than 0".to_string(),
            ));
        }
        if self.auth.verification_timeout > MAX_VERIFICATION_TIMEOUT {
            return Err(ConfigError::ValidationFailed(format!(
                "verification_timeout must not exceed {:?}",
                MAX_VERIFICATION_TIMEOUT
            )));
        }
        if self.auth.signed_in_flag.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "signed_in_flag must not be empty".to_string(),
            ));
        }

        // Validate chat config
        if FixedOffset::east_opt(self.chat.utc_offset_minutes.saturating_mul(60)).is_none() {
            return Err(ConfigError::ValidationFailed(format!(
                "utc_offset_minutes out of range: {}",
                self.chat.utc_offset_minutes
            )));
        }
        if self.chat.time_format.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "time_format must not be empty".to_string(),
            ));
        }
        if StrftimeItems::new(&self.chat.time_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::ValidationFailed(format!(
                "time_format {:?} is not a valid strftime pattern",
                self.chat.time_format
            )));
        }

        // Validate profile config
        if !(1..=100).contains(&self.profile.jpeg_quality) {
            return Err(ConfigError::ValidationFailed(format!(
                "jpeg_quality must be between 1 and 100, got {}",
                self.profile.jpeg_quality
            )));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Render as TOML, in the format `from_file` reads
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = self.to_toml()?;

        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.auth.verification_timeout, Duration::from_secs(60));
        assert_eq!(config.auth.signed_in_flag, "isSignedIn");
        assert_eq!(config.chat.no_message_text, "No message");
        assert_eq!(config.chat.no_message_time, "--:--");
        assert_eq!(config.profile.jpeg_quality, 100);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ClientConfig::default();

        config.auth.verification_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        config = ClientConfig::default();
        config.auth.verification_timeout = Duration::from_secs(600);
        assert!(config.validate().is_err());

        config = ClientConfig::default();
        config.profile.jpeg_quality = 0;
        assert!(config.validate().is_err());

        config = ClientConfig::default();
        config.chat.utc_offset_minutes = 24 * 60;
        assert!(config.validate().is_err());

        config = ClientConfig::default();
        config.auth.signed_in_flag = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_time_format_validation() {
        let mut config = ClientConfig::default();
        config.chat.time_format = "%Q".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("%Q"));

        config.chat.time_format = "%H:%M:%S %z".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = ClientConfig::default();

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quickchat.toml");

        let mut config = ClientConfig::default();
        config.chat.utc_offset_minutes = 330;
        config.auth.verification_timeout = Duration::from_secs(30);
        config.save_to_file(&path).unwrap();

        let loaded = ClientConfig::from_file(&path).unwrap();
        assert_eq!(loaded.chat.utc_offset_minutes, 330);
        assert_eq!(loaded.auth.verification_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[profile]\njpeg_quality = 80\n").unwrap();

        let loaded = ClientConfig::from_file(&path).unwrap();
        assert_eq!(loaded.profile.jpeg_quality, 80);
        assert_eq!(loaded.chat.unknown_peer_name, "Unknown");
    }

    #[test]
    fn test_file_errors_name_the_path() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = ClientConfig::from_file(&missing).unwrap_err();
        assert!(matches!(&err, ConfigError::Read { path, .. } if path == &missing));

        let malformed = dir.path().join("malformed.toml");
        std::fs::write(&malformed, "[chat]\nutc_offset_minutes = \"east\"\n").unwrap();
        let err = ClientConfig::from_file(&malformed).unwrap_err();
        assert!(matches!(&err, ConfigError::Parse { path, .. } if path == &malformed));
        assert!(err.to_string().contains("malformed.toml"));
    }

    #[test]
    fn test_bad_env_value_names_the_key() {
        const KEY: &str = "QUICKCHAT_TEST_ONLY_OFFSET";
        env::set_var(KEY, "east");
        let err = parse_env::<i32>(KEY, "offset in minutes").unwrap_err();
        env::remove_var(KEY);

        assert!(matches!(&err, ConfigError::InvalidEnv { key, value, .. } if key == KEY && value == "east"));
        assert!(err.to_string().starts_with("QUICKCHAT_TEST_ONLY_OFFSET=\"east\""));
    }

    #[test]
    fn test_display_offset() {
        let mut chat = ChatConfig::default();
        assert_eq!(chat.display_offset().local_minus_utc(), 0);
        chat.utc_offset_minutes = -300;
        assert_eq!(chat.display_offset().local_minus_utc(), -18_000);
    }

    #[test]
    fn test_flags_path() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/tmp/qc"),
            flags_file: "prefs.json".to_string(),
        };
        assert_eq!(storage.flags_path(), PathBuf::from("/tmp/qc/prefs.json"));
    }
}
