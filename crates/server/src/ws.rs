//! WebSocket push endpoint for real-time notifications.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use bestflow_shared::{
    ConnectedInfo, PushFrame, RawFrame, ServerEvent, UnreadCountPayload, FRAME_PING, FRAME_PONG,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::Session;
use crate::problem::ApiProblem;
use crate::service;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiProblem> {
    let session = params
        .token
        .as_deref()
        .and_then(|token| state.sessions.resolve(token))
        .ok_or_else(|| {
            tracing::warn!("push connection rejected: invalid token");
            ApiProblem::unauthorized("Could not validate credentials")
        })?;

    tracing::info!(user_id = %session.user_id, "push connection authenticated");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, session, state)))
}

/// Serve one authenticated push connection until either side goes away.
async fn handle_socket(socket: WebSocket, session: Session, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn_id = state.hub.attach(&session.user_id, tx.clone()).await;

    // Task to forward queued frames to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(json) = rx.recv().await {
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let count = service::unread_count(&state, &session.user_id, session.role);
    let greeting = [
        ServerEvent::Connected(ConnectedInfo {
            message: "WebSocket connection established".to_string(),
        }),
        ServerEvent::UnreadCount(UnreadCountPayload { count }),
    ];
    for event in greeting {
        queue(&tx, event);
    }

    // Main receive loop; silence longer than the ping interval triggers a ping
    loop {
        match tokio::time::timeout(state.ping_interval, receiver.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => match RawFrame::parse(text.as_str()) {
                Ok(frame) if frame.frame_type == FRAME_PING => {
                    if !queue(&tx, ServerEvent::Pong) {
                        break;
                    }
                }
                Ok(frame) if frame.frame_type == FRAME_PONG => {}
                Ok(frame) => {
                    tracing::debug!(frame_type = %frame.frame_type, "ignoring client frame");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "ignoring malformed client frame");
                }
            },
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(error = %e, "push connection read failed");
                break;
            }
            Ok(Some(Ok(_))) => {}
            Err(_) => {
                if !queue(&tx, ServerEvent::Ping) {
                    break;
                }
            }
        }
    }

    // Cleanup
    state.hub.unregister(&session.user_id, conn_id).await;
    drop(tx);
    send_task.abort();
    tracing::info!(user_id = %session.user_id, %conn_id, "push connection closed");
}

/// Queue a frame for this connection. False once the writer is gone.
fn queue(tx: &mpsc::UnboundedSender<String>, event: ServerEvent) -> bool {
    match PushFrame::now(event).to_json() {
        Ok(json) => tx.send(json).is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode push frame");
            true
        }
    }
}
