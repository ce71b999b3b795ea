//! Configuration for the `Taskboard` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;

use taskboard_proto::profile::UserId;
use taskboard_proto::task::MAX_TASK_TITLE_LENGTH;

use crate::backend::memory::DEFAULT_FEED_CAPACITY;
use crate::board::TaskFilter;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A value was out of range or unrecognised.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Config key.
        key: &'static str,
        /// Rejected value.
        value: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    session: SessionFileConfig,
    board: BoardFileConfig,
    feed: FeedFileConfig,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    user: Option<String>,
    display_name: Option<String>,
}

/// `[board]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BoardFileConfig {
    max_title_len: Option<usize>,
    default_filter: Option<String>,
    timestamp_format: Option<String>,
}

/// `[feed]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct FeedFileConfig {
    capacity: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Per-session settings consumed by [`Session::start`](crate::session::Session::start).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Name announced on the presence channel and stored on the profile.
    pub display_name: Option<String>,
    /// Maximum task title length in characters.
    pub max_title_len: usize,
    /// Filter shown when the board opens.
    pub default_filter: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            display_name: None,
            max_title_len: MAX_TASK_TITLE_LENGTH,
            default_filter: "all".to_string(),
        }
    }
}

impl SessionConfig {
    /// Resolves [`default_filter`](Self::default_filter) for `viewer`,
    /// falling back to [`TaskFilter::All`] for unknown names.
    #[must_use]
    pub fn initial_filter(&self, viewer: &UserId) -> TaskFilter {
        TaskFilter::parse(&self.default_filter, viewer).unwrap_or_default()
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    // -- Session --
    /// User to sign in as.
    pub user: Option<String>,
    /// Display name for the signed-in user.
    pub display_name: Option<String>,

    // -- Board --
    /// Maximum task title length in characters.
    pub max_title_len: usize,
    /// Filter shown when the board opens.
    pub default_filter: String,
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,

    // -- Feed --
    /// Events buffered per subscriber before it lags.
    pub feed_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user: None,
            display_name: None,
            max_title_len: MAX_TASK_TITLE_LENGTH,
            default_filter: "all".to_string(),
            timestamp_format: "%H:%M:%S".to_string(),
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if a resolved value is out of range.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        config.validate()?;
        Ok(config)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            user: cli.user.clone().or_else(|| file.session.user.clone()),
            display_name: cli
                .display_name
                .clone()
                .or_else(|| file.session.display_name.clone()),
            max_title_len: file
                .board
                .max_title_len
                .unwrap_or(defaults.max_title_len),
            default_filter: cli
                .filter
                .clone()
                .or_else(|| file.board.default_filter.clone())
                .unwrap_or(defaults.default_filter),
            timestamp_format: file
                .board
                .timestamp_format
                .clone()
                .unwrap_or(defaults.timestamp_format),
            feed_capacity: file.feed.capacity.unwrap_or(defaults.feed_capacity),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_title_len == 0 || self.max_title_len > MAX_TASK_TITLE_LENGTH {
            return Err(ConfigError::InvalidValue {
                key: "board.max_title_len",
                value: self.max_title_len.to_string(),
            });
        }
        if TaskFilter::parse(&self.default_filter, &UserId::new("")).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "board.default_filter",
                value: self.default_filter.clone(),
            });
        }
        if self.feed_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "feed.capacity",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Settings for one session.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            display_name: self.display_name.clone(),
            max_title_len: self.max_title_len,
            default_filter: self.default_filter.clone(),
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Collaborative task board with live sync and presence")]
pub struct CliArgs {
    /// User to sign in as.
    #[arg(long, env = "TASKBOARD_USER")]
    pub user: Option<String>,

    /// Display name announced to other users.
    #[arg(long, env = "TASKBOARD_DISPLAY_NAME")]
    pub display_name: Option<String>,

    /// Path to config file (default: `~/.config/taskboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Initial task filter (all, active, completed, assigned).
    #[arg(long)]
    pub filter: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKBOARD_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskboard.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("taskboard").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
