//! Configuration for the `taskboard` CLI.
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
use std::time::Duration;

use taskboard_proto::model::Priority;

use crate::remote::RemoteConfig;

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

    /// The backend URL is not a `ws://` or `wss://` URL.
    #[error("invalid server url {url:?}: {reason}")]
    InvalidUrl {
        /// URL as configured.
        url: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A command needs credentials that were not configured.
    #[error("missing {0} (pass --{0} or set it in the environment)")]
    MissingCredential(&'static str),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    account: AccountFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    url: Option<String>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

/// `[account]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AccountFileConfig {
    email: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Default backend URL.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:9400/ws";

/// Fully resolved client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Backend WebSocket URL.
    pub server_url: String,
    /// Account email.
    pub email: Option<String>,
    /// Account password. Never read from the config file.
    pub password: Option<String>,
    /// Timeout for connecting to the backend.
    pub connect_timeout: Duration,
    /// Timeout for each backend request.
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            email: None,
            password: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// Otherwise the default path (`~/.config/taskboard/config.toml`) is
    /// tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            server_url: cli
                .server_url
                .clone()
                .or_else(|| file.server.url.clone())
                .unwrap_or(defaults.server_url),
            email: cli.email.clone().or_else(|| file.account.email.clone()),
            password: cli.password.clone(),
            connect_timeout: file
                .server
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            request_timeout: file
                .server
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
        }
    }

    /// Connection settings for the backend.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] unless `server_url` parses as a
    /// `ws://` or `wss://` URL.
    pub fn to_remote_config(&self) -> Result<RemoteConfig, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidUrl {
            url: self.server_url.clone(),
            reason,
        };
        let url = url::Url::parse(&self.server_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }
        Ok(RemoteConfig {
            url: self.server_url.clone(),
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        })
    }

    /// The configured email and password.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] naming the first missing
    /// one.
    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        let email = self
            .email
            .as_deref()
            .ok_or(ConfigError::MissingCredential("email"))?;
        let password = self
            .password
            .as_deref()
            .ok_or(ConfigError::MissingCredential("password"))?;
        Ok((email, password))
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Todo lists with a priority board")]
pub struct CliArgs {
    /// What to do.
    #[command(subcommand)]
    pub command: Command,

    /// WebSocket URL of the taskboard server.
    #[arg(long, env = "TASKBOARD_URL", global = true)]
    pub server_url: Option<String>,

    /// Account email.
    #[arg(long, env = "TASKBOARD_EMAIL", global = true)]
    pub email: Option<String>,

    /// Account password.
    #[arg(long, env = "TASKBOARD_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Path to config file (default: `~/.config/taskboard/config.toml`).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKBOARD_LOG", global = true)]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskboard.log`).
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,
}

/// CLI subcommands.
#[derive(clap::Subcommand, Debug, Clone, Default, PartialEq, Eq)]
pub enum Command {
    /// Create an account.
    SignUp,
    /// Show every list with its tasks, column by column.
    #[default]
    Lists,
    /// Create a list.
    AddList {
        /// List name.
        name: String,
    },
    /// Rename a list.
    RenameList {
        /// List id.
        id: String,
        /// New name.
        name: String,
    },
    /// Delete a list and all of its tasks.
    DeleteList {
        /// List id.
        id: String,
    },
    /// Add a task to a list.
    AddTask {
        /// List id.
        list_id: String,
        /// Task title.
        #[arg(long)]
        title: String,
        /// Task description.
        #[arg(long)]
        description: String,
        /// Due date, `YYYY-MM-DD`.
        #[arg(long)]
        due: String,
        /// Low, Medium or High.
        #[arg(long)]
        priority: Priority,
    },
    /// Delete a task.
    DeleteTask {
        /// Task id.
        id: String,
    },
    /// Move a task between columns (`{list_id}-{priority}`).
    Move {
        /// Task id.
        task_id: String,
        /// Column the task is in.
        from: String,
        /// Column to move it to.
        to: String,
    },
    /// Print the board after every change until Ctrl-C.
    Watch,
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
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("taskboard").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
