//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. This separation allows the caller to finish wiring
//! shared state before traffic is accepted.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use socket_server_core::TokenVerifier;

use crate::config::Config;
use crate::handler_bridge::HandlerBridge;
use crate::hub::Hub;

use super::config::NetworkConfig;
use super::handlers::{
    broadcast_handler, configure_channel_handler, health_handler, kick_handler,
    list_channel_members_handler, list_channels_handler, list_clients_handler, liveness_handler,
    readiness_handler, ws_upgrade_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;

/// Manages the full HTTP/WebSocket server lifecycle.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- allocates the hub, verifier, handler bridge, shutdown
///    controller
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is
///    signalled
pub struct NetworkModule {
    config: NetworkConfig,
    admin_token: Arc<str>,
    listener: Option<TcpListener>,
    hub: Arc<Hub>,
    verifier: Arc<TokenVerifier>,
    handler_bridge: Arc<HandlerBridge>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let network_config = config.network_config();
        let hub = Arc::new(Hub::new(network_config.connection.clone()));
        let verifier = Arc::new(TokenVerifier::new(config.verification_secret.clone()));
        let handler_bridge = Arc::new(HandlerBridge::new(
            config.handler_bin.clone(),
            config.handler_cwd.clone(),
            config.handler_command.clone(),
            config.resolved_temp_dir(),
        ));

        Self {
            config: network_config,
            admin_token: Arc::from(config.admin_token.as_str()),
            listener: None,
            hub,
            verifier,
            handler_bridge,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the hub.
    #[must_use]
    pub fn hub(&self) -> Arc<Hub> {
        Arc::clone(&self.hub)
    }

    /// Returns a shared reference to the handler bridge, so the sweep
    /// task can be spawned alongside `serve()`.
    #[must_use]
    pub fn handler_bridge(&self) -> Arc<HandlerBridge> {
        Arc::clone(&self.handler_bridge)
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    fn app_state(&self) -> AppState {
        AppState {
            hub: Arc::clone(&self.hub),
            verifier: Arc::clone(&self.verifier),
            handler_bridge: Arc::clone(&self.handler_bridge),
            admin_token: Arc::clone(&self.admin_token),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
        }
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health`, `/health/live`, `/health/ready` -- health probes
    /// - `GET /ws` -- WebSocket upgrade
    /// - `GET /clients`, `GET /channels`, `GET /channels/{name}/clients`
    ///   -- admin read endpoints
    /// - `POST /clients/{id}/kick`, `POST /broadcast`, `POST /channels`
    ///   -- admin write endpoints
    #[must_use]
    pub fn build_router(&self) -> Router {
        let state = self.app_state();
        let layers = build_http_layers(&self.config);

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/ws", get(ws_upgrade_handler))
            .route("/clients", get(list_clients_handler))
            .route("/clients/{id}/kick", post(kick_handler))
            .route("/channels", get(list_channels_handler).post(configure_channel_handler))
            .route("/channels/{name}/clients", get(list_channel_members_handler))
            .route("/broadcast", post(broadcast_handler))
            .layer(layers)
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the
    /// configured port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Starts serving connections until the shutdown signal fires.
    ///
    /// Consumes `self` because the listener is moved into the server.
    ///
    /// After the shutdown signal:
    /// 1. Health state transitions to Draining
    /// 2. Waits up to 30 seconds for in-flight sessions to complete
    /// 3. Health state transitions to Stopped
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let shutdown_ctrl = Arc::clone(&self.shutdown);
        let hub = Arc::clone(&self.hub);
        let config = self.config.clone();
        let router = self.build_router();
        let listener = self
            .listener
            .expect("start() must be called before serve()");

        shutdown_ctrl.set_ready();

        if let Some(ref tls_config) = config.tls {
            serve_tls(listener, router, tls_config, hub, shutdown_ctrl, shutdown).await
        } else {
            serve_plain(listener, router, hub, shutdown_ctrl, shutdown).await
        }
    }
}

/// Serves plain HTTP/WS connections using axum's built-in server.
async fn serve_plain(
    listener: TcpListener,
    router: Router,
    hub: Arc<Hub>,
    shutdown_ctrl: Arc<ShutdownController>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("Serving plain HTTP/WS connections");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    drain_connections(hub, shutdown_ctrl).await;
    Ok(())
}

/// Serves TLS connections using `axum-server` with rustls.
///
/// Reuses the pre-bound TCP listener by converting it to a `std::net::TcpListener`.
#[cfg(feature = "tls")]
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls_config: &super::config::TlsConfig,
    hub: Arc<Hub>,
    shutdown_ctrl: Arc<ShutdownController>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls_config.cert_path, &tls_config.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!("Serving TLS connections on {}", addr);

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    drain_connections(hub, shutdown_ctrl).await;
    Ok(())
}

#[cfg(not(feature = "tls"))]
async fn serve_tls(
    _listener: TcpListener,
    _router: Router,
    _tls_config: &super::config::TlsConfig,
    _hub: Arc<Hub>,
    _shutdown_ctrl: Arc<ShutdownController>,
    _shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    anyhow::bail!("TLS was requested but the `tls` feature is not enabled")
}

/// Drains all sessions and transitions to Stopped state.
///
/// Broadcasts a close to every connected client, then waits for
/// in-flight sessions to finish tearing down (up to 30 seconds).
async fn drain_connections(hub: Arc<Hub>, shutdown_ctrl: Arc<ShutdownController>) {
    shutdown_ctrl.trigger_shutdown();

    let clients = hub.all_clients();
    let count = clients.len();
    if count > 0 {
        info!("Draining {} connections", count);
        for client in &clients {
            let _ = client.try_send(crate::client::OutboundMessage::Close);
        }
    }

    let drained = shutdown_ctrl.wait_for_drain(Duration::from_secs(30)).await;
    if drained {
        info!("All connections drained successfully");
    } else {
        warn!("Drain timeout expired with in-flight requests remaining");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            port: 0,
            host: "127.0.0.1".to_string(),
            verification_secret: "secret".to_string(),
            admin_token: "token".to_string(),
            handler_bin: None,
            handler_cwd: None,
            handler_command: "process".to_string(),
            temp_dir: None,
            debug: false,
            cors_origins: vec!["*".to_string()],
            outbound_channel_capacity: 256,
            read_deadline_secs: 60,
            heartbeat_interval_secs: 30,
        }
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = NetworkModule::new(&test_config());
        assert!(module.listener.is_none());
    }

    #[test]
    fn hub_returns_shared_arc() {
        let module = NetworkModule::new(&test_config());
        let h1 = module.hub();
        let h2 = module.hub();
        assert!(Arc::ptr_eq(&h1, &h2));
    }

    #[test]
    fn shutdown_controller_returns_shared_arc() {
        let module = NetworkModule::new(&test_config());
        let s1 = module.shutdown_controller();
        let s2 = module.shutdown_controller();
        assert!(Arc::ptr_eq(&s1, &s2));
    }

    #[test]
    fn build_router_creates_router() {
        let module = NetworkModule::new(&test_config());
        let _router = module.build_router();
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = NetworkModule::new(&test_config());
        let port = module.start().await.expect("start should succeed");
        assert!(port > 0, "OS-assigned port should be > 0");
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    #[should_panic(expected = "start() must be called before serve()")]
    async fn serve_panics_without_start() {
        let module = NetworkModule::new(&test_config());
        let _ = module.serve(std::future::pending::<()>()).await;
    }
}
