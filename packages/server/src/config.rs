//! Process-wide configuration: flags with environment fallback, validated
//! before the listener binds.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::network::config::{ConnectionConfig, NetworkConfig};

/// socket-server: a real-time messaging hub.
#[derive(Debug, Clone, Parser)]
#[command(name = "socket-server", version, about)]
pub struct Config {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Bind address.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Shared symmetric secret used to verify bearer tokens (HS256).
    #[arg(long, env = "VERIFICATION_SECRET")]
    pub verification_secret: String,

    /// Bearer token required on every administrative HTTP endpoint.
    #[arg(long, env = "ADMIN_TOKEN")]
    pub admin_token: String,

    /// Path to the external handler binary. If unset, the handler bridge
    /// is disabled: events are logged but never dispatched.
    #[arg(long, env = "HANDLER_BIN")]
    pub handler_bin: Option<PathBuf>,

    /// Working directory the handler process is spawned in.
    #[arg(long, env = "HANDLER_CWD")]
    pub handler_cwd: Option<PathBuf>,

    /// Command name argument passed to the handler alongside the payload path.
    #[arg(long, env = "HANDLER_COMMAND", default_value = "process")]
    pub handler_command: String,

    /// Directory payload files are written to.
    #[arg(long, env = "TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Enables verbose (debug-level) logging.
    #[arg(long, env = "DEBUG", default_value_t = false)]
    pub debug: bool,

    /// Allowed CORS origins. A single `*` allows any origin.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    /// Bounded per-connection send-lane capacity before a slow recipient
    /// is evicted rather than blocking the broadcast fan-out.
    #[arg(long, env = "OUTBOUND_CHANNEL_CAPACITY", default_value_t = 256)]
    pub outbound_channel_capacity: usize,

    /// Seconds a connection may stay silent (no frame, no pong) before it
    /// is closed for inactivity.
    #[arg(long, env = "READ_DEADLINE_SECS", default_value_t = 60)]
    pub read_deadline_secs: u64,

    /// Interval, in seconds, between transport-level heartbeat pings.
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value_t = 30)]
    pub heartbeat_interval_secs: u64,
}

impl Config {
    /// Resolves the effective payload directory, defaulting to
    /// `$TMPDIR/socket-server-payloads`.
    #[must_use]
    pub fn resolved_temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("socket-server-payloads"))
    }

    /// Builds the network configuration consumed by `NetworkModule`.
    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            tls: None,
            connection: ConnectionConfig {
                outbound_channel_capacity: self.outbound_channel_capacity,
                read_deadline: Duration::from_secs(self.read_deadline_secs),
                heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
                ..ConnectionConfig::default()
            },
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Validates required fields are non-empty. Flags take precedence over
    /// environment variables through `clap`'s `env` attribute, so this
    /// only needs to catch empty-string values that `clap` would accept.
    ///
    /// # Errors
    ///
    /// Returns a description of the first missing field encountered.
    pub fn validate(&self) -> Result<(), String> {
        if self.verification_secret.trim().is_empty() {
            return Err("verification secret must not be empty".to_string());
        }
        if self.admin_token.trim().is_empty() {
            return Err("admin token must not be empty".to_string());
        }
        Ok(())
    }
}
