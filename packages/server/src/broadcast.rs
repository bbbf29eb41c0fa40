//! Broadcast Engine: fan-out with per-recipient deadlines and slow-peer
//! eviction (spec §4.6).
//!
//! Each recipient gets its own short-lived send task so a single slow
//! lane cannot starve the others (spec §9: "do not serialize the fan-out
//! through a single writer"). `tokio::task::JoinSet` collects completions
//! as they arrive; anything still outstanding when the overall deadline
//! elapses is left running and simply not retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::warn;

use crate::client::{ClientId, ClientRecord, OutboundMessage, SendError};
use crate::network::config::ConnectionConfig;
use crate::session::frames::ServerFrame;

/// The fixed content of a broadcast message, identical across every
/// recipient except the per-recipient `id` field (spec invariant: "byte
/// for byte identical data payload").
#[derive(Debug, Clone)]
pub struct BroadcastTemplate {
    pub channel: Option<String>,
    pub event: String,
    pub data: Value,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl BroadcastTemplate {
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            channel: None,
            event: event.into(),
            data,
            user_id: None,
            username: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    #[must_use]
    pub fn with_sender(mut self, user_id: Option<String>, username: Option<String>) -> Self {
        self.user_id = user_id;
        self.username = username;
        self
    }

    /// Renders this template as a frame addressed to `id`. Exposed to the
    /// admin surface for single-client targeted sends; the fan-out path
    /// below calls it once per recipient.
    pub(crate) fn to_frame(&self, id: ClientId) -> ServerFrame {
        ServerFrame {
            id: id.0,
            channel: self.channel.clone(),
            event: self.event.clone(),
            data: self.data.clone(),
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Client ids marked for eviction after a completed fan-out.
pub type EvictionList = Vec<ClientId>;

/// Dispatches `template` to every client in `recipients`.
///
/// Returns the ids of recipients that should be evicted: those whose
/// individual send both errored and exceeded
/// `config.eviction_latency_threshold` (spec §4.6 step 4). Recipients
/// still in flight when `config.broadcast_deadline` elapses are left
/// running and are neither counted as delivered nor evicted.
pub async fn fan_out(
    recipients: Vec<Arc<ClientRecord>>,
    template: BroadcastTemplate,
    config: &ConnectionConfig,
) -> EvictionList {
    if recipients.is_empty() {
        return Vec::new();
    }

    let mut set = JoinSet::new();
    for client in recipients {
        let template = template.clone();
        let write_timeout = config.write_timeout;
        set.spawn(async move {
            let frame = template.to_frame(client.id);
            let start = Instant::now();
            let result = client
                .send_timeout(OutboundMessage::Frame(frame), write_timeout)
                .await;
            (client.id, result, start.elapsed())
        });
    }

    let mut evicted = Vec::new();
    let sleep = tokio::time::sleep(config.broadcast_deadline);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            () = &mut sleep => break,
            joined = set.join_next() => {
                match joined {
                    None => break,
                    Some(Ok((id, result, elapsed))) => {
                        record_result(id, result, elapsed, config.eviction_latency_threshold, &mut evicted);
                    }
                    Some(Err(join_err)) => {
                        warn!(error = %join_err, "broadcast send task panicked");
                    }
                }
            }
        }
    }

    evicted
}

fn record_result(
    id: ClientId,
    result: Result<(), SendError>,
    elapsed: Duration,
    eviction_threshold: Duration,
    evicted: &mut EvictionList,
) {
    match result {
        Ok(()) => {}
        Err(SendError::Closed) => {
            // Already gone; nothing further to evict.
        }
        Err(SendError::Full | SendError::Timeout) => {
            if elapsed >= eviction_threshold {
                warn!(client_id = %id, ?elapsed, "evicting slow peer");
                evicted.push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientRecord;
    use serde_json::json;

    fn client(id: u64, capacity: usize) -> (Arc<ClientRecord>, tokio::sync::mpsc::Receiver<OutboundMessage>) {
        let config = ConnectionConfig {
            outbound_channel_capacity: capacity,
            ..ConnectionConfig::default()
        };
        let (record, rx) = ClientRecord::new(ClientId(id), None, None, &config);
        (Arc::new(record), rx)
    }

    #[tokio::test]
    async fn delivers_identical_data_to_every_recipient() {
        let (a, mut rx_a) = client(1, 8);
        let (b, mut rx_b) = client(2, 8);
        let template = BroadcastTemplate::new("chat", json!({"text": "hi"})).with_channel("room1");

        let config = ConnectionConfig::default();
        let evicted = fan_out(vec![a.clone(), b.clone()], template, &config).await;
        assert!(evicted.is_empty());

        let OutboundMessage::Frame(frame_a) = rx_a.try_recv().unwrap() else {
            panic!("expected frame")
        };
        let OutboundMessage::Frame(frame_b) = rx_b.try_recv().unwrap() else {
            panic!("expected frame")
        };
        assert_eq!(frame_a.data, frame_b.data);
        assert_eq!(frame_a.event, frame_b.event);
        assert_ne!(frame_a.id, frame_b.id);
    }

    #[tokio::test]
    async fn empty_recipient_set_is_a_noop() {
        let config = ConnectionConfig::default();
        let evicted = fan_out(Vec::new(), BroadcastTemplate::new("x", Value::Null), &config).await;
        assert!(evicted.is_empty());
    }

    #[tokio::test]
    async fn slow_saturated_lane_is_evicted() {
        let config = ConnectionConfig {
            outbound_channel_capacity: 1,
            write_timeout: Duration::from_millis(20),
            eviction_latency_threshold: Duration::from_millis(10),
            broadcast_deadline: Duration::from_millis(200),
            ..ConnectionConfig::default()
        };
        let (record, _rx) = ClientRecord::new(ClientId(9), None, None, &config);
        let client = Arc::new(record);
        // Saturate the lane; nothing ever drains it, so the next send
        // times out.
        client.try_send(OutboundMessage::Close).unwrap();

        let evicted = fan_out(
            vec![client.clone()],
            BroadcastTemplate::new("chat", Value::Null),
            &config,
        )
        .await;
        assert_eq!(evicted, vec![ClientId(9)]);
    }

    #[tokio::test]
    async fn closed_recipient_is_not_evicted() {
        let (client, _rx) = client(1, 8);
        client.close();
        let config = ConnectionConfig::default();
        let evicted = fan_out(
            vec![client],
            BroadcastTemplate::new("chat", Value::Null),
            &config,
        )
        .await;
        assert!(evicted.is_empty());
    }
}
