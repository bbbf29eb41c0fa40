//! HTTP and WebSocket handler definitions for the messaging hub.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod admin;
pub mod health;
pub mod websocket;

pub use admin::{
    broadcast_handler, configure_channel_handler, kick_handler, list_channel_members_handler,
    list_channels_handler, list_clients_handler,
};
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use websocket::ws_upgrade_handler;

use std::sync::Arc;

use socket_server_core::TokenVerifier;

use crate::handler_bridge::HandlerBridge;
use crate::hub::Hub;

use super::{NetworkConfig, ShutdownController};

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Registry of clients and channels; orchestrates connect/disconnect.
    pub hub: Arc<Hub>,
    /// Verifies bearer credentials presented by clients during `authenticate`.
    pub verifier: Arc<TokenVerifier>,
    /// Bridges inbound events to the external handler process.
    pub handler_bridge: Arc<HandlerBridge>,
    /// Shared secret compared constant-time against the admin surface's
    /// bearer header (spec §4.8).
    pub admin_token: Arc<str>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Network configuration (bind address, TLS, per-connection settings).
    pub config: Arc<NetworkConfig>,
}
