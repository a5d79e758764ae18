//! WebSocket handler for live settlement updates
//!
//! Sends the current snapshot on connect and a fresh one after every change
//! to the watched settlement.

use crate::dto::settlement::SnapshotResponse;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::{Message, Session};
use clubpay_core::models::SettlementId;
use clubpay_services::{SettlementEventKind, SettlementLedger};
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// WebSocket message types
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    /// Current state of the settlement
    #[serde(rename = "snapshot")]
    Snapshot(SnapshotResponse),
    /// The settlement was deleted; the server closes the socket after this
    #[serde(rename = "deleted")]
    Deleted { settlement_id: SettlementId },
    /// Error message
    #[serde(rename = "error")]
    Error { message: String },
    /// Ping/pong for keepalive
    #[serde(rename = "pong")]
    Pong,
}

async fn send(session: &mut Session, msg: &WsMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => session.text(json).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize WebSocket message: {}", e);
            true
        }
    }
}

async fn snapshot_message(ledger: &SettlementLedger, id: SettlementId) -> WsMessage {
    match ledger.snapshot(id).await {
        Ok(snapshot) => WsMessage::Snapshot(snapshot.into()),
        Err(e) => WsMessage::Error {
            message: e.to_string(),
        },
    }
}

/// WebSocket connection handler
///
/// GET /ws/settlements/{id}
pub async fn ws_settlement_handler(
    req: HttpRequest,
    body: web::Payload,
    path: web::Path<SettlementId>,
    ledger: web::Data<SettlementLedger>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, session, msg_stream) = actix_ws::handle(&req, body)?;
    let settlement_id = path.into_inner();

    let client_ip = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();

    info!(client = %client_ip, settlement_id, "WebSocket connection established");

    let ledger = ledger.into_inner();
    actix_web::rt::spawn(async move {
        ws_session(session, msg_stream, ledger, settlement_id, client_ip).await;
    });

    Ok(response)
}

async fn ws_session(
    mut session: Session,
    mut msg_stream: actix_ws::MessageStream,
    ledger: Arc<SettlementLedger>,
    settlement_id: SettlementId,
    client_ip: String,
) {
    // Subscribe before the first read so no change slips between them
    let mut events = ledger.subscribe();

    let initial = snapshot_message(&ledger, settlement_id).await;
    let missing = matches!(initial, WsMessage::Error { .. });
    if !send(&mut session, &initial).await || missing {
        debug!(client = %client_ip, settlement_id, "Closing feed after initial message");
        let _ = session.close(None).await;
        return;
    }

    let mut ping_interval = interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            Some(msg) = msg_stream.next() => {
                match msg {
                    Ok(Message::Text(text)) => {
                        debug!(client = %client_ip, "Received text: {}", text);
                        if text.contains("ping") && !send(&mut session, &WsMessage::Pong).await {
                            break;
                        }
                    }
                    Ok(Message::Ping(msg)) => {
                        if session.pong(&msg).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(reason)) => {
                        info!(client = %client_ip, "Client closed connection: {:?}", reason);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(client = %client_ip, "WebSocket error: {}", e);
                        break;
                    }
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) if event.settlement_id != settlement_id => {}
                    Ok(event) if event.kind == SettlementEventKind::Deleted => {
                        let _ = send(&mut session, &WsMessage::Deleted { settlement_id }).await;
                        break;
                    }
                    Ok(_) => {
                        let msg = snapshot_message(&ledger, settlement_id).await;
                        if !send(&mut session, &msg).await {
                            warn!(client = %client_ip, "Failed to send update, closing connection");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(client = %client_ip, skipped, "Feed lagged, resending snapshot");
                        let msg = snapshot_message(&ledger, settlement_id).await;
                        if !send(&mut session, &msg).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            _ = ping_interval.tick() => {
                if session.ping(b"").await.is_err() {
                    warn!(client = %client_ip, "Failed to send ping, closing connection");
                    break;
                }
            }
        }
    }

    info!(client = %client_ip, settlement_id, "WebSocket connection closed");
    let _ = session.close(None).await;
}
