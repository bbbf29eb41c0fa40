//! Network configuration types for the messaging hub.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level network configuration for the server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
    /// Per-connection settings.
    pub connection: ConnectionConfig,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Maximum time to wait for an HTTP request to complete.
    pub request_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            tls: None,
            connection: ConnectionConfig::default(),
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// TLS certificate configuration.
///
/// No `Default` impl because certificate paths have no sensible defaults.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_cert_path: Option<PathBuf>,
}

/// Per-connection configuration controlling backpressure, deadlines, and
/// heartbeat cadence (spec §4.2, §4.6, §5).
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bounded send-lane capacity. Overflow evicts the client rather than
    /// dropping individual messages (spec §9: drop-client-on-overflow).
    pub outbound_channel_capacity: usize,
    /// Maximum time a single send may take before it is considered failed.
    pub write_timeout: Duration,
    /// A connection silent for this long (no frame, no pong) is closed.
    pub read_deadline: Duration,
    /// Interval between transport-level heartbeat pings.
    pub heartbeat_interval: Duration,
    /// Overall deadline for one broadcast fan-out across all recipients.
    pub broadcast_deadline: Duration,
    /// A send exceeding this latency *and* erroring marks its recipient
    /// for eviction rather than merely "suspect".
    pub eviction_latency_threshold: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_channel_capacity: 256,
            write_timeout: Duration::from_millis(500),
            read_deadline: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(30),
            broadcast_deadline: Duration::from_secs(1),
            eviction_latency_threshold: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_config_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 0);
        assert!(config.tls.is_none());
        assert_eq!(config.cors_origins, vec!["*"]);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn connection_config_defaults_match_spec() {
        let config = ConnectionConfig::default();
        assert_eq!(config.outbound_channel_capacity, 256);
        assert_eq!(config.write_timeout, Duration::from_millis(500));
        assert_eq!(config.read_deadline, Duration::from_secs(60));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.broadcast_deadline, Duration::from_secs(1));
        assert_eq!(config.eviction_latency_threshold, Duration::from_millis(500));
    }

    #[test]
    fn tls_config_no_default() {
        let tls = TlsConfig {
            cert_path: PathBuf::from("/tmp/cert.pem"),
            key_path: PathBuf::from("/tmp/key.pem"),
            ca_cert_path: None,
        };
        assert_eq!(tls.cert_path, PathBuf::from("/tmp/cert.pem"));
        assert!(tls.ca_cert_path.is_none());
    }
}
