//! One WebSocket connection per observer.
//!
//! On connect the observer receives the current program text and pin levels,
//! then every broadcast event. Inbound text frames are parsed and forwarded to
//! the session manager; parse failures are answered on this connection only.

use crate::session::SessionHandle;
use crate::web::api::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use pinwire_shared::{parse_client_message, DiagnosticKind, ServerMessage};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

pub async fn observer_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| observe(socket, state))
}

async fn observe(socket: WebSocket, state: AppState) {
    let observer = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let greeting = match state.session.connect().await {
        Ok(greeting) => greeting,
        Err(e) => {
            tracing::error!(%observer, "Cannot greet observer: {}", e);
            return;
        }
    };
    tracing::info!(%observer, observers = state.broadcaster.observer_count(), "Observer connected");
    for message in greeting.messages() {
        if send(&mut sink, &message).await.is_err() {
            return;
        }
    }
    let mut events = greeting.events;

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_text(&state.session, text.as_str()).await {
                        if send(&mut sink, &reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(%observer, "Observer socket error: {}", e);
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(event) => {
                    if send(&mut sink, &event.to_message()).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%observer, skipped, "Observer lagging, events skipped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    tracing::info!(%observer, "Observer disconnected");
}

/// Parses one inbound frame and forwards it. Returns the diagnostic to send
/// back to the sender, if any.
pub async fn handle_text(session: &SessionHandle, text: &str) -> Option<ServerMessage> {
    match parse_client_message(text) {
        Ok(message) => match session.dispatch(message).await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!("Cannot forward observer message: {}", e);
                Some(ServerMessage::Diagnostic {
                    kind: e.diagnostic_kind().unwrap_or(DiagnosticKind::ServiceUnavailable),
                    message: e.to_string(),
                })
            }
        },
        Err(e) => {
            tracing::warn!("Rejected observer message: {}", e);
            Some(ServerMessage::Diagnostic {
                kind: e.kind(),
                message: e.to_string(),
            })
        }
    }
}

async fn send<S>(sink: &mut S, message: &ServerMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = serde_json::to_string(message).map_err(|e| {
        tracing::error!("Failed to encode message: {}", e);
    })?;
    sink.send(Message::Text(text.into())).await.map_err(|_| ())
}
