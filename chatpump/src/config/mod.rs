//! Configuration system for `ChatPump`.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/chatpump/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use chatpump_proto::command::{CommandError, CommandSet, DEFAULT_COMMAND_TOKENS};

use crate::sweeper::DEFAULT_SWEEP_INTERVAL;

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

    /// A command token in the configuration is malformed.
    #[error("invalid command token: {0}")]
    Command(#[from] CommandError),

    /// A value is out of its accepted range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Dotted key of the offending setting.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    engine: EngineFileConfig,
    registry: RegistryFileConfig,
    replay: ReplayFileConfig,
    bot: BotFileConfig,
}

/// `[engine]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct EngineFileConfig {
    sweep_interval_secs: Option<u64>,
    consumer_workers: Option<usize>,
    command_tokens: Option<Vec<String>>,
    enable_edits: Option<bool>,
    shutdown_timeout_secs: Option<u64>,
}

/// `[registry]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RegistryFileConfig {
    activation_token: Option<String>,
    deactivation_token: Option<String>,
}

/// `[replay]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ReplayFileConfig {
    edit_window_secs: Option<u64>,
}

/// `[bot]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BotFileConfig {
    id: Option<String>,
    name: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Settings shared by every conversation coordinator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period of the editable-message sweep.
    pub sweep_interval: Duration,
    /// Consumer workers per conversation.
    pub consumer_workers: usize,
    /// Reserved command tokens routed to the command handler.
    pub commands: CommandSet,
    /// Whether edit notifications update the cache.
    pub enable_edits: bool,
    /// How long shutdown waits for each task before giving up on it.
    pub shutdown_timeout: Duration,
    /// Bot-sent content that registers a conversation.
    pub activation_token: String,
    /// Bot-sent content that deregisters a conversation.
    pub deactivation_token: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            consumer_workers: 1,
            commands: CommandSet::default(),
            enable_edits: true,
            shutdown_timeout: Duration::from_secs(5),
            activation_token: DEFAULT_COMMAND_TOKENS[0].to_string(),
            deactivation_token: DEFAULT_COMMAND_TOKENS[1].to_string(),
        }
    }
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Engine settings.
    pub engine: EngineConfig,
    /// How long replayed messages stay editable.
    pub edit_window: Duration,
    /// Member id of the bot's account in the replay transport.
    pub bot_id: String,
    /// Display name of the bot's account in the replay transport.
    pub bot_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            edit_window: Duration::from_secs(60 * 60),
            bot_id: "chatpump".to_string(),
            bot_name: "ChatPump".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. If no `--config` is given, the default path
    /// (`~/.config/chatpump/config.toml`) is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// or if a resolved value is invalid.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve an `AppConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let sweep_interval = cli
            .sweep_interval_secs
            .or(file.engine.sweep_interval_secs)
            .map_or(defaults.engine.sweep_interval, Duration::from_secs);
        if sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "engine.sweep_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }

        let consumer_workers = cli
            .workers
            .or(file.engine.consumer_workers)
            .unwrap_or(defaults.engine.consumer_workers);
        if consumer_workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "engine.consumer_workers",
                reason: "must be at least 1".to_string(),
            });
        }

        let commands = match &file.engine.command_tokens {
            Some(tokens) => CommandSet::new(tokens)?,
            None => defaults.engine.commands,
        };

        let activation_token = normalize_token(
            "registry.activation_token",
            file.registry.activation_token.as_deref(),
            defaults.engine.activation_token,
        )?;
        let deactivation_token = normalize_token(
            "registry.deactivation_token",
            file.registry.deactivation_token.as_deref(),
            defaults.engine.deactivation_token,
        )?;
        if activation_token == deactivation_token {
            return Err(ConfigError::InvalidValue {
                key: "registry.deactivation_token",
                reason: "must differ from the activation token".to_string(),
            });
        }

        Ok(Self {
            engine: EngineConfig {
                sweep_interval,
                consumer_workers,
                commands,
                enable_edits: file
                    .engine
                    .enable_edits
                    .unwrap_or(defaults.engine.enable_edits),
                shutdown_timeout: file
                    .engine
                    .shutdown_timeout_secs
                    .map_or(defaults.engine.shutdown_timeout, Duration::from_secs),
                activation_token,
                deactivation_token,
            },
            edit_window: file
                .replay
                .edit_window_secs
                .map_or(defaults.edit_window, Duration::from_secs),
            bot_id: cli
                .bot_id
                .clone()
                .or_else(|| file.bot.id.clone())
                .unwrap_or(defaults.bot_id),
            bot_name: cli
                .bot_name
                .clone()
                .or_else(|| file.bot.name.clone())
                .unwrap_or(defaults.bot_name),
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Replays chat events through the ChatPump engine")]
pub struct CliArgs {
    /// Path to config file (default: `~/.config/chatpump/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// JSON-lines event script to replay (`-` for stdin).
    #[arg(short, long, default_value = "-")]
    pub script: PathBuf,

    /// Member id of the bot's account.
    #[arg(long, env = "CHATPUMP_BOT_ID")]
    pub bot_id: Option<String>,

    /// Display name of the bot's account.
    #[arg(long, env = "CHATPUMP_BOT_NAME")]
    pub bot_name: Option<String>,

    /// Seconds between cache sweeps.
    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,

    /// Consumer workers per conversation.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "CHATPUMP_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/chatpump.log`, `-` for stderr).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn normalize_token(
    key: &'static str,
    value: Option<&str>,
    default: String,
) -> Result<String, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    let token = raw.trim().to_lowercase();
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidValue {
            key,
            reason: format!("{raw:?} is not a single word"),
        });
    }
    Ok(token)
}

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
        config_dir.join("chatpump").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
