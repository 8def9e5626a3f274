//! Server settings: bind address and the two per-connection limits.
//!
//! Values come from `--flags`, then `TASKBOARD_SERVER_*` variables, then the
//! `[server]` table of `taskboard-server/config.toml` in the user config
//! directory, then [`ServerConfig::default`].

use std::path::{Path, PathBuf};

/// Directory name under the platform config dir.
const CONFIG_DIR: &str = "taskboard-server";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A limit was configured as zero, which would refuse every request.
    #[error("{0} must be at least 1")]
    ZeroLimit(&'static str),
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    server: FileSettings,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileSettings {
    bind_addr: Option<String>,
    max_frame_size: Option<usize>,
    max_watchers_per_session: Option<usize>,
}

/// Command line of `taskboard-server`.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Taskboard document store and identity server")]
pub struct ServerCliArgs {
    /// Address to listen on.
    #[arg(short, long, env = "TASKBOARD_SERVER_ADDR")]
    pub bind: Option<String>,

    /// Config file to read instead of the default location.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Largest request frame accepted, in bytes.
    #[arg(long, env = "TASKBOARD_SERVER_MAX_FRAME")]
    pub max_frame_size: Option<usize>,

    /// Live queries one connection may hold at once.
    #[arg(long, env = "TASKBOARD_SERVER_MAX_WATCHERS")]
    pub max_watchers_per_session: Option<usize>,

    #[arg(long, default_value = "info", env = "TASKBOARD_SERVER_LOG")]
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Frames above this size get a `ResourceExhausted` failure.
    pub max_frame_size: usize,
    /// Subscribe requests beyond this count get a `ResourceExhausted` failure.
    pub max_watchers_per_session: usize,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9400".to_string(),
            max_frame_size: 256 * 1024,
            max_watchers_per_session: 64,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Reads the config file and layers the command line over it.
    ///
    /// A missing file at the default location counts as empty; a missing
    /// `--config` file does not.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or if a
    /// limit resolves to zero.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = read_config_file(cli.config.as_deref())?;
        Self::resolve(cli, file.server)
    }

    fn resolve(cli: &ServerCliArgs, file: FileSettings) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            bind_addr: cli
                .bind
                .clone()
                .or(file.bind_addr)
                .unwrap_or(defaults.bind_addr),
            max_frame_size: cli
                .max_frame_size
                .or(file.max_frame_size)
                .unwrap_or(defaults.max_frame_size),
            max_watchers_per_session: cli
                .max_watchers_per_session
                .or(file.max_watchers_per_session)
                .unwrap_or(defaults.max_watchers_per_session),
            log_level: cli.log_level.clone(),
        };
        if config.max_frame_size == 0 {
            return Err(ConfigError::ZeroLimit("max_frame_size"));
        }
        if config.max_watchers_per_session == 0 {
            return Err(ConfigError::ZeroLimit("max_watchers_per_session"));
        }
        Ok(config)
    }
}

fn read_config_file(explicit: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match dirs::config_dir() {
            Some(dir) => (dir.join(CONFIG_DIR).join("config.toml"), false),
            None => return Ok(ConfigFile::default()),
        },
    };
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            Ok(ConfigFile::default())
        }
        Err(source) => Err(ConfigError::ReadFile { path, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(toml: &str) -> FileSettings {
        toml::from_str::<ConfigFile>(toml).unwrap().server
    }

    #[test]
    fn file_limits_feed_the_server() {
        let config = ServerConfig::resolve(
            &ServerCliArgs::default(),
            settings("[server]\nmax_watchers_per_session = 8\n"),
        )
        .unwrap();
        assert_eq!(config.max_watchers_per_session, 8);
        assert_eq!(config.max_frame_size, 256 * 1024);
        assert_eq!(config.bind_addr, "0.0.0.0:9400");
    }

    #[test]
    fn flags_beat_the_file() {
        let cli = ServerCliArgs {
            bind: Some("127.0.0.1:0".to_string()),
            max_frame_size: Some(4096),
            ..Default::default()
        };
        let config = ServerConfig::resolve(
            &cli,
            settings("[server]\nbind_addr = \"0.0.0.0:80\"\nmax_frame_size = 1024\n"),
        )
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:0");
        assert_eq!(config.max_frame_size, 4096);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let err = ServerConfig::resolve(
            &ServerCliArgs::default(),
            settings("[server]\nmax_watchers_per_session = 0\n"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroLimit("max_watchers_per_session")));

        let cli = ServerCliArgs {
            max_frame_size: Some(0),
            ..Default::default()
        };
        let err = ServerConfig::resolve(&cli, FileSettings::default()).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroLimit("max_frame_size")));
    }

    #[test]
    fn misspelled_keys_are_rejected() {
        assert!(toml::from_str::<ConfigFile>("[server]\nmax_watchers = 3\n").is_err());
    }

    #[test]
    fn named_config_file_must_exist() {
        let result = read_config_file(Some(Path::new("/nonexistent/taskboard.toml")));
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
