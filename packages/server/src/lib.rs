//! socket-server — a real-time `WebSocket` messaging hub with client/channel
//! registries, authenticated sessions, broadcast fan-out with backpressure
//! eviction, an external handler-process bridge, and an admin HTTP surface.

pub mod broadcast;
pub mod channel;
pub mod client;
pub mod config;
pub mod handler_bridge;
pub mod hub;
pub mod network;
pub mod session;

pub use broadcast::BroadcastTemplate;
pub use channel::{Channel, ChannelRegistry};
pub use client::{ClientId, ClientRecord, Identity};
pub use config::Config;
pub use handler_bridge::HandlerBridge;
pub use hub::{ClientNotFound, Hub};
pub use network::{NetworkConfig, NetworkModule};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
