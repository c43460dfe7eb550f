//! Session socket
//!
//! The first text frame must be an `offer`. After the answer, text frames
//! carry control messages, binary frames from the client carry raw
//! microphone PCM, and the server streams media and events back.

use crate::http::AppState;
use crate::protocol::{encode_media, ControlMessage, ServerEvent};
use crate::registry::SessionRegistry;
use crate::error::ServerError;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use persona_core::SessionId;
use persona_me::{ChannelSink, Outbound, SessionCommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Time a client has to send its offer after the upgrade
const OFFER_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let offer = match tokio::time::timeout(OFFER_TIMEOUT, wait_for_offer(&mut sender, &mut receiver)).await {
        Ok(Some(offer)) => offer,
        Ok(None) => {
            debug!("Socket closed before offer");
            return;
        }
        Err(_) => {
            let _ = send_event(&mut sender, &ServerEvent::error("negotiation_failed", "No offer received")).await;
            let _ = sender.close().await;
            return;
        }
    };

    let (sink, outbound) = ChannelSink::new(state.outbound_queue_depth);
    let (answer, id) = match state.registry.on_connect(&offer, Arc::new(sink)).await {
        Ok(connected) => connected,
        Err(e) => {
            warn!("Connection refused: {}", e);
            let _ = send_event(&mut sender, &ServerEvent::from(&e)).await;
            let _ = sender.close().await;
            return;
        }
    };

    if send_event(&mut sender, &ServerEvent::Answer { session_id: id, sdp: answer })
        .await
        .is_err()
    {
        state.registry.on_disconnect(id).await;
        return;
    }

    let (replies_tx, replies_rx) = mpsc::unbounded_channel();
    let mut writer = tokio::spawn(write_loop(sender, outbound, replies_rx, id));

    loop {
        tokio::select! {
            _ = &mut writer => {
                debug!(session = %id, "Writer finished");
                break;
            }
            message = receiver.next() => {
                let Some(message) = message else { break };
                match message {
                    Ok(Message::Text(text)) => {
                        if let Err(e) = handle_text(&state.registry, id, &text).await {
                            debug!(session = %id, "Control message rejected: {}", e);
                            let _ = replies_tx.send(ServerEvent::from(&e));
                            if matches!(e, ServerError::SessionNotFound(_)) {
                                break;
                            }
                        }
                    }
                    Ok(Message::Binary(data)) => {
                        let command = SessionCommand::AudioInput(Bytes::from(data));
                        if let Err(e) = state.registry.send_command(id, command).await {
                            let _ = replies_tx.send(ServerEvent::from(&e));
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!(session = %id, "Client closed the socket");
                        break;
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Err(e) => {
                        debug!(session = %id, "Socket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    state.registry.on_disconnect(id).await;
    writer.abort();
    info!(session = %id, "Socket closed");
}

async fn wait_for_offer(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
) -> Option<String> {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ControlMessage::parse(&text) {
                Ok(ControlMessage::Offer { sdp }) => return Some(sdp),
                Ok(_) => {
                    let event = ServerEvent::error("negotiation_required", "Send an offer first");
                    send_event(sender, &event).await.ok()?;
                }
                Err(e) => send_event(sender, &ServerEvent::from(&e)).await.ok()?,
            },
            Ok(Message::Binary(_)) => {
                let event = ServerEvent::error("negotiation_required", "Send an offer first");
                send_event(sender, &event).await.ok()?;
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

async fn handle_text(registry: &SessionRegistry, id: SessionId, text: &str) -> Result<(), ServerError> {
    let message = match ControlMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            registry.metrics().control_message(true);
            return Err(e);
        }
    };
    registry.on_control_message(id, message).await
}

async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
    mut replies: mpsc::UnboundedReceiver<ServerEvent>,
    id: SessionId,
) {
    loop {
        let message = tokio::select! {
            biased;
            Some(event) = replies.recv() => Message::Text(event.to_json()),
            item = outbound.recv() => match item {
                Some(Outbound::Media(frame)) => Message::Binary(encode_media(&frame).to_vec()),
                Some(Outbound::Update(update)) => Message::Text(ServerEvent::from(update).to_json()),
                None => break,
            },
        };

        if let Err(e) = sender.send(message).await {
            debug!(session = %id, "Write failed: {}", e);
            break;
        }
    }
    let _ = sender.close().await;
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &ServerEvent) -> Result<(), axum::Error> {
    sender.send(Message::Text(event.to_json())).await
}
