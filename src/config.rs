//! Configuration module for echo-telemetry.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::telemetry::channel::DEFAULT_QUEUE_CAPACITY;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "echo-telemetry")]
#[command(author = "echo-telemetry authors")]
#[command(version = "0.1.0")]
#[command(about = "Integer echo over TCP with a JSON telemetry side-channel", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of runtime worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long, global = true)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept echo connections
    Server {
        /// Port to accept echo connections on
        #[arg(short, long)]
        port: Option<u16>,

        /// Port to serve the telemetry channel on
        #[arg(short, long)]
        metrics_port: Option<u16>,
    },

    /// Send random integers to a server and check the echoes
    Client {
        /// Server address
        address: Option<String>,

        /// Server port
        port: Option<u16>,

        /// Port to serve the telemetry channel on
        #[arg(short, long)]
        metrics_port: Option<u16>,

        /// Stop after this many exchanges
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// Pause between exchanges in milliseconds
        #[arg(short, long)]
        interval_ms: Option<u64>,
    },

    /// Connect to a telemetry channel and print every record
    Tester {
        /// Telemetry source address
        address: String,

        /// Telemetry source port
        port: u16,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_bind_host")]
    pub host: String,
    /// Echo port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Telemetry port; telemetry is off when unset
    pub metrics_port: Option<u16>,
    /// Maximum number of concurrent echo connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Number of worker threads
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_bind_host(),
            port: default_port(),
            metrics_port: None,
            max_connections: default_max_connections(),
            workers: None,
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Server host to connect to
    #[serde(default = "default_client_host")]
    pub host: String,
    /// Server port to connect to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Telemetry port; telemetry is off when unset
    pub metrics_port: Option<u16>,
    /// Pause between exchanges in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Integers are drawn from `[0, max_value)`
    #[serde(default = "default_max_value")]
    pub max_value: i64,
    /// Stop after this many exchanges (unset = run until error)
    pub count: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_client_host(),
            port: default_port(),
            metrics_port: None,
            interval_ms: default_interval_ms(),
            max_value: default_max_value(),
            count: None,
        }
    }
}

/// Telemetry channel configuration
#[derive(Debug, Deserialize)]
pub struct TelemetryConfig {
    /// Host the telemetry listener binds to
    #[serde(default = "default_bind_host")]
    pub host: String,
    /// Emission interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Records queued ahead of the writer
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Series emitted by the server
    #[serde(default = "default_server_series")]
    pub server_series: Vec<SeriesConfig>,
    /// Series emitted by the client
    #[serde(default = "default_client_series")]
    pub client_series: Vec<SeriesConfig>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            host: default_bind_host(),
            interval_ms: default_interval_ms(),
            queue_capacity: default_queue_capacity(),
            server_series: default_server_series(),
            client_series: default_client_series(),
        }
    }
}

/// One synthetic series: values are drawn uniformly from `[min, max)`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeriesConfig {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

impl SeriesConfig {
    fn new(name: &str, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            min,
            max,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty()
            || !self.min.is_finite()
            || !self.max.is_finite()
            || self.min >= self.max
            || !(self.max - self.min).is_finite()
        {
            return Err(ConfigError::InvalidSeries(self.clone()));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_client_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9999
}

fn default_max_connections() -> usize {
    10000
}

fn default_interval_ms() -> u64 {
    1000 // 1 second
}

fn default_max_value() -> i64 {
    100
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_server_series() -> Vec<SeriesConfig> {
    vec![SeriesConfig::new("stat1", 0.0, 100.0)]
}

fn default_client_series() -> Vec<SeriesConfig> {
    vec![
        SeriesConfig::new("ping", 6.0, 10.0),
        SeriesConfig::new("stat1", 1.0, 6.0),
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub workers: Option<usize>,
    pub log_level: String,
    pub mode: Mode,
}

/// What this process runs as.
#[derive(Debug, Clone)]
pub enum Mode {
    Server(ServerOptions),
    Client(ClientOptions),
    Tester(TesterOptions),
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub listen: String,
    pub max_connections: usize,
    pub telemetry: Option<TelemetryOptions>,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub server: String,
    pub interval: Duration,
    pub max_value: i64,
    pub count: Option<u64>,
    pub telemetry: Option<TelemetryOptions>,
}

#[derive(Debug, Clone)]
pub struct TesterOptions {
    pub connect: String,
}

#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    pub listen: String,
    pub interval: Duration,
    pub queue_capacity: usize,
    pub series: Vec<SeriesConfig>,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence) and validate.
    pub fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let TomlConfig {
            server,
            client,
            telemetry,
            logging,
        } = toml_config;

        let mode = match cli.command {
            Command::Server {
                port,
                metrics_port,
            } => {
                let telemetry = metrics_port
                    .or(server.metrics_port)
                    .map(|metrics_port| {
                        telemetry_options(&telemetry, metrics_port, &telemetry.server_series)
                    })
                    .transpose()?;
                if server.max_connections == 0 {
                    return Err(ConfigError::Invalid("server.max_connections must be positive"));
                }
                Mode::Server(ServerOptions {
                    listen: join_host_port(&server.host, port.unwrap_or(server.port)),
                    max_connections: server.max_connections,
                    telemetry,
                })
            }

            Command::Client {
                address,
                port,
                metrics_port,
                count,
                interval_ms,
            } => {
                let telemetry = metrics_port
                    .or(client.metrics_port)
                    .map(|metrics_port| {
                        telemetry_options(&telemetry, metrics_port, &telemetry.client_series)
                    })
                    .transpose()?;
                if client.max_value <= 0 {
                    return Err(ConfigError::Invalid("client.max_value must be positive"));
                }
                Mode::Client(ClientOptions {
                    server: join_host_port(
                        &address.unwrap_or(client.host),
                        port.unwrap_or(client.port),
                    ),
                    interval: Duration::from_millis(interval_ms.unwrap_or(client.interval_ms)),
                    max_value: client.max_value,
                    count: count.or(client.count),
                    telemetry,
                })
            }

            Command::Tester { address, port } => Mode::Tester(TesterOptions {
                connect: join_host_port(&address, port),
            }),
        };

        Ok(Config {
            workers: cli.workers.or(server.workers),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                logging.level
            },
            mode,
        })
    }
}

fn telemetry_options(
    telemetry: &TelemetryConfig,
    port: u16,
    series: &[SeriesConfig],
) -> Result<TelemetryOptions, ConfigError> {
    if telemetry.interval_ms == 0 {
        return Err(ConfigError::Invalid("telemetry.interval_ms must be positive"));
    }
    if telemetry.queue_capacity == 0 {
        return Err(ConfigError::Invalid("telemetry.queue_capacity must be positive"));
    }
    for s in series {
        s.validate()?;
    }

    Ok(TelemetryOptions {
        listen: join_host_port(&telemetry.host, port),
        interval: Duration::from_millis(telemetry.interval_ms),
        queue_capacity: telemetry.queue_capacity,
        series: series.to_vec(),
    })
}

/// `host:port`, bracketing bare IPv6 literals.
fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Invalid telemetry series {0:?}: needs a name and finite min < max")]
    InvalidSeries(SeriesConfig),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(args: &[&str], toml_str: &str) -> Result<Config, ConfigError> {
        let cli = CliArgs::try_parse_from(args).unwrap();
        let toml_config: TomlConfig = toml::from_str(toml_str).unwrap();
        Config::resolve(cli, toml_config)
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.metrics_port, None);
        assert_eq!(config.client.interval_ms, 1000);
        assert_eq!(config.telemetry.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.telemetry.server_series.len(), 1);
        assert_eq!(config.telemetry.client_series.len(), 2);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 7000
            metrics_port = 7001
            workers = 4

            [client]
            interval_ms = 250
            count = 10

            [telemetry]
            interval_ms = 500

            [[telemetry.server_series]]
            name = "load"
            min = 0.5
            max = 1.5

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.metrics_port, Some(7001));
        assert_eq!(config.server.workers, Some(4));
        assert_eq!(config.client.interval_ms, 250);
        assert_eq!(config.client.count, Some(10));
        assert_eq!(config.telemetry.interval_ms, 500);
        assert_eq!(config.telemetry.server_series, vec![SeriesConfig::new("load", 0.5, 1.5)]);
        assert_eq!(config.telemetry.client_series, default_client_series());
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_server_defaults() {
        let config = resolve(&["echo-telemetry", "server"], "").unwrap();
        match config.mode {
            Mode::Server(options) => {
                assert_eq!(options.listen, "0.0.0.0:9999");
                assert_eq!(options.max_connections, 10000);
                assert!(options.telemetry.is_none());
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let config = resolve(
            &["echo-telemetry", "--log-level", "trace", "server", "-p", "8000", "-m", "8001"],
            "[server]\nport = 7000\nmetrics_port = 7001\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();
        assert_eq!(config.log_level, "trace");
        match config.mode {
            Mode::Server(options) => {
                assert_eq!(options.listen, "0.0.0.0:8000");
                let telemetry = options.telemetry.unwrap();
                assert_eq!(telemetry.listen, "0.0.0.0:8001");
                assert_eq!(telemetry.interval, Duration::from_secs(1));
                assert_eq!(telemetry.series, default_server_series());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_client_arguments() {
        let config = resolve(
            &["echo-telemetry", "client", "10.0.0.5", "9000", "-m", "9100", "-n", "3", "-i", "0"],
            "",
        )
        .unwrap();
        match config.mode {
            Mode::Client(options) => {
                assert_eq!(options.server, "10.0.0.5:9000");
                assert_eq!(options.count, Some(3));
                assert_eq!(options.interval, Duration::ZERO);
                assert_eq!(options.max_value, 100);
                let telemetry = options.telemetry.unwrap();
                assert_eq!(telemetry.series, default_client_series());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_tester_arguments() {
        let config = resolve(&["echo-telemetry", "tester", "::1", "9100"], "").unwrap();
        match config.mode {
            Mode::Tester(options) => assert_eq!(options.connect, "[::1]:9100"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_tester_requires_address() {
        assert!(CliArgs::try_parse_from(["echo-telemetry", "tester"]).is_err());
    }

    #[test]
    fn test_invalid_series_rejected() {
        let result = resolve(
            &["echo-telemetry", "server", "-m", "9100"],
            "[[telemetry.server_series]]\nname = \"bad\"\nmin = 5.0\nmax = 5.0\n",
        );
        assert!(matches!(result, Err(ConfigError::InvalidSeries(_))));
    }

    #[test]
    fn test_series_width_must_be_finite() {
        let result = resolve(
            &["echo-telemetry", "server", "-m", "9100"],
            "[[telemetry.server_series]]\nname = \"wide\"\nmin = -1e308\nmax = 1e308\n",
        );
        assert!(matches!(result, Err(ConfigError::InvalidSeries(_))));
    }

    #[test]
    fn test_series_ignored_without_metrics_port() {
        let result = resolve(
            &["echo-telemetry", "server"],
            "[[telemetry.server_series]]\nname = \"bad\"\nmin = 5.0\nmax = 1.0\n",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = resolve(
            &["echo-telemetry", "client", "-m", "9100"],
            "[telemetry]\ninterval_ms = 0\n",
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
