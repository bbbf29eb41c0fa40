//! The Session Loop: one task per connection driving the reader,
//! heartbeater, and writer activities described in spec §4.5.
//!
//! All three are modeled as branches of a single `tokio::select!` loop
//! rather than three separate tasks: each branch reacts to its own event
//! (an outbound message ready to write, an inbound frame, a heartbeat
//! tick) and a branch that decides to terminate simply breaks the loop,
//! which is the same "first to exit triggers teardown" behavior the
//! two-activity description calls for, without a second dependency on
//! `futures-util` to split the socket into independently ownable halves.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use serde_json::json;
use tracing::{debug, warn};

use socket_server_core::{HandlerAuth, HandlerData, HandlerPayload, TokenVerifier};
use uuid::Uuid;

use crate::broadcast::BroadcastTemplate;
use crate::client::{ClientRecord, Identity, OutboundMessage};
use crate::handler_bridge::HandlerBridge;
use crate::hub::Hub;
#[cfg(test)]
use crate::network::config::ConnectionConfig;
use crate::network::ShutdownController;
use crate::session::frames::{parse_client_frame, ClientAction, ServerFrame};

/// Drives one connection end to end: registers it with the hub, runs the
/// session loop until termination, then tears it down.
pub async fn run_session(
    mut socket: WebSocket,
    hub: Arc<Hub>,
    verifier: Arc<TokenVerifier>,
    handler_bridge: Arc<HandlerBridge>,
    shutdown: Arc<ShutdownController>,
    remote_addr: Option<String>,
    user_agent: Option<String>,
) {
    // Held for the connection's whole lifetime so `wait_for_drain` blocks
    // on graceful shutdown until every reader below has torn down.
    let _in_flight = shutdown.in_flight_guard();

    let (client, mut outbound_rx) = hub.register(remote_addr, user_agent);
    let connected = ServerFrame::new(client.id, "connected", json!({"id": client.id.0}));
    let _ = client.try_send(OutboundMessage::Frame(connected));

    let config = hub.connection_config().clone();
    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    heartbeat.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    None => break,
                    Some(msg) => {
                        if write_outbound(&mut socket, msg).await.is_break() {
                            break;
                        }
                    }
                }
            }
            incoming = tokio::time::timeout(config.read_deadline, socket.recv()) => {
                match incoming {
                    Err(_) => {
                        warn!(client_id = %client.id, "read deadline exceeded");
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(err))) => {
                        debug!(client_id = %client.id, error = %err, "websocket read error");
                        break;
                    }
                    Ok(Some(Ok(frame))) => {
                        client.touch();
                        if handle_inbound(frame, &mut socket, &client, &hub, &verifier, &handler_bridge)
                            .await
                            .is_break()
                        {
                            break;
                        }
                    }
                }
            }
            _ = heartbeat.tick() => {
                if !client.is_alive() {
                    break;
                }
                if client.last_activity().elapsed() > config.read_deadline {
                    warn!(client_id = %client.id, "no activity within read deadline, closing");
                    client.mark_closing();
                    break;
                }
                if socket.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }

        if !client.is_alive() {
            break;
        }
    }

    client.close();
    hub.deregister(client.id);
}

async fn write_outbound(socket: &mut WebSocket, msg: OutboundMessage) -> std::ops::ControlFlow<()> {
    use std::ops::ControlFlow;
    match msg {
        OutboundMessage::Frame(frame) => match frame.to_json() {
            Ok(text) => {
                if socket.send(WsMessage::Text(text.into())).await.is_err() {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to serialize outbound frame");
                ControlFlow::Continue(())
            }
        },
        OutboundMessage::Ping => {
            if socket.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        }
        OutboundMessage::Close => {
            let _ = socket.send(WsMessage::Close(None)).await;
            ControlFlow::Break(())
        }
    }
}

async fn handle_inbound(
    frame: WsMessage,
    socket: &mut WebSocket,
    client: &Arc<ClientRecord>,
    hub: &Arc<Hub>,
    verifier: &Arc<TokenVerifier>,
    handler_bridge: &Arc<HandlerBridge>,
) -> std::ops::ControlFlow<()> {
    use std::ops::ControlFlow;
    match frame {
        WsMessage::Text(text) => {
            handle_text_frame(&text, client, hub, verifier, handler_bridge).await;
            ControlFlow::Continue(())
        }
        WsMessage::Ping(payload) => {
            let _ = socket.send(WsMessage::Pong(payload)).await;
            ControlFlow::Continue(())
        }
        WsMessage::Pong(_) => ControlFlow::Continue(()),
        WsMessage::Close(_) => ControlFlow::Break(()),
        WsMessage::Binary(_) => {
            let _ = client.try_send(OutboundMessage::Frame(ServerFrame::error(
                client.id,
                "binary frames are not supported",
            )));
            ControlFlow::Continue(())
        }
    }
}

async fn handle_text_frame(
    text: &str,
    client: &Arc<ClientRecord>,
    hub: &Arc<Hub>,
    verifier: &Arc<TokenVerifier>,
    handler_bridge: &Arc<HandlerBridge>,
) {
    let action = match parse_client_frame(text) {
        Ok(action) => action,
        Err(err) => {
            let _ = client.try_send(OutboundMessage::Frame(ServerFrame::error(
                client.id,
                err.to_string(),
            )));
            return;
        }
    };

    match action {
        ClientAction::Authenticate { token } => {
            handle_authenticate(token, client, verifier, handler_bridge).await;
        }
        ClientAction::JoinChannel { channel, data } => {
            handle_join(channel, data, client, hub);
        }
        ClientAction::LeaveChannel { channel, data: _ } => {
            handle_leave(&channel, client, hub);
        }
        ClientAction::SendMessage {
            channel,
            event,
            data,
        } => {
            handle_send_message(channel, event, data, client, hub, handler_bridge).await;
        }
        ClientAction::Ping => {
            client.touch();
            let _ = client.try_send(OutboundMessage::Frame(ServerFrame::new(
                client.id,
                "pong",
                serde_json::Value::Null,
            )));
        }
        ClientAction::Unknown { action, raw } => {
            let payload = handler_payload_for(&action, client, None, raw);
            handler_bridge.dispatch(&payload).await;
        }
    }
}

async fn handle_authenticate(
    token: String,
    client: &Arc<ClientRecord>,
    verifier: &Arc<TokenVerifier>,
    handler_bridge: &Arc<HandlerBridge>,
) {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    let status;
    match verifier.verify_at(&token, now) {
        Ok(claims) => {
            let identity = Identity {
                user_id: claims.user_id.clone(),
                username: claims.username.clone(),
                email: claims.email.clone(),
            };
            match client.set_identity(identity) {
                Ok(()) => {
                    status = "success";
                    let _ = client.try_send(OutboundMessage::Frame(ServerFrame::new(
                        client.id,
                        "authenticated",
                        json!({"user_id": claims.user_id, "username": claims.username}),
                    )));
                }
                Err(_) => {
                    status = "failed";
                    let _ = client.try_send(OutboundMessage::Frame(ServerFrame::error(
                        client.id,
                        "identity cannot be reassigned to a different user",
                    )));
                }
            }
        }
        Err(err) => {
            status = "failed";
            let _ = client.try_send(OutboundMessage::Frame(ServerFrame::error(
                client.id,
                err.to_string(),
            )));
        }
    }

    let payload = handler_payload_for(
        "client_authentication",
        client,
        None,
        json!({"status": status}),
    );
    handler_bridge.dispatch(&payload).await;
}

fn handle_join(channel: String, data: serde_json::Value, client: &Arc<ClientRecord>, hub: &Arc<Hub>) {
    let ch = hub.channels().get_or_create(&channel);
    if ch.require_auth && client.user_id().is_none() {
        let _ = client.try_send(OutboundMessage::Frame(ServerFrame::error(
            client.id,
            "Channel requires authentication",
        )));
        return;
    }
    ch.add_member(client.id);
    client.join(channel.clone(), data.clone());
    let _ = client.try_send(OutboundMessage::Frame(
        ServerFrame::new(client.id, "joined_channel", data).with_channel(channel),
    ));
}

fn handle_leave(channel: &str, client: &Arc<ClientRecord>, hub: &Arc<Hub>) {
    if let Some(ch) = hub.channels().lookup(channel) {
        ch.remove_member(client.id);
    }
    client.leave(channel);
    let _ = client.try_send(OutboundMessage::Frame(
        ServerFrame::new(client.id, "left_channel", serde_json::Value::Null)
            .with_channel(channel.to_string()),
    ));
}

async fn handle_send_message(
    channel: String,
    event: String,
    data: serde_json::Value,
    client: &Arc<ClientRecord>,
    hub: &Arc<Hub>,
    handler_bridge: &Arc<HandlerBridge>,
) {
    if let Some(ch) = hub.channels().lookup(&channel) {
        if ch.require_auth && client.user_id().is_none() {
            let _ = client.try_send(OutboundMessage::Frame(ServerFrame::error(
                client.id,
                "Channel requires authentication",
            )));
            return;
        }
    }

    let identity = client.identity();
    let template = BroadcastTemplate::new(event.clone(), data.clone()).with_sender(
        identity.as_ref().map(|i| i.user_id.clone()),
        identity.as_ref().map(|i| i.username.clone()),
    );
    hub.broadcast_to_channel(&channel, template).await;

    let payload = handler_payload_for(
        "send_message",
        client,
        Some((channel, event, data)),
        json!({}),
    );
    handler_bridge.dispatch(&payload).await;
}

fn handler_payload_for(
    action: &str,
    client: &Arc<ClientRecord>,
    message: Option<(String, String, serde_json::Value)>,
    extra: serde_json::Value,
) -> HandlerPayload {
    let identity = client.identity();
    let (channel, event, payload) = match message {
        Some((channel, event, payload)) => (Some(channel), event, payload),
        None => (None, action.to_string(), extra),
    };

    HandlerPayload {
        message_id: Uuid::new_v4(),
        timestamp: chrono::Utc::now(),
        action: action.to_string(),
        auth: HandlerAuth {
            user_id: identity.as_ref().map(|i| i.user_id.clone()),
            username: identity.as_ref().map(|i| i.username.clone()),
            email: identity.as_ref().map(|i| i.email.clone()),
        },
        data: HandlerData {
            channel,
            event,
            payload,
            original_timestamp: chrono::Utc::now(),
        },
    }
}
