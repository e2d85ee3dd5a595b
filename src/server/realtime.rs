//! WebSocket channel pushing session status to dashboard browsers.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::status::{self, StatusEvent};
use crate::whatsapp::session::SessionManager;
use crate::whatsapp::ConnectionState;

/// WebSocket upgrade handler for `/socket`.
pub async fn socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Statuses describing the session as it is right now.
///
/// Queries the connection state once. Errors are logged and produce nothing.
pub async fn current_state_events(session: &SessionManager) -> Vec<StatusEvent> {
    let client = session.client().await;
    match client.get_state().await {
        Ok(Some(state)) => {
            let mut events = vec![StatusEvent::message(state.as_str())];
            if state == ConnectionState::Connected {
                events.push(StatusEvent::Authenticated(status::AUTHENTICATED.to_owned()));
            }
            events
        }
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(error = %e, "failed to query WhatsApp state");
            Vec::new()
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    info!(%connection_id, "dashboard connected");

    let (mut sender, mut receiver) = socket.split();
    // Subscribe first so nothing published during the greeting is lost.
    let mut updates = BroadcastStream::new(state.session.hub().subscribe());

    // Greet before querying the state, which can take a full request timeout.
    if send_event(&mut sender, &StatusEvent::message(status::CONNECTING))
        .await
        .is_err()
    {
        debug!(%connection_id, "dashboard gone before greeting");
        return;
    }
    for event in &current_state_events(&state.session).await {
        if send_event(&mut sender, event).await.is_err() {
            debug!(%connection_id, "dashboard gone during greeting");
            return;
        }
    }

    loop {
        tokio::select! {
            update = updates.next() => match update {
                Some(Ok(event)) => {
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(%connection_id, skipped, "dashboard lagging, statuses dropped");
                }
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(%connection_id, error = %e, "dashboard socket error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    info!(%connection_id, "dashboard disconnected");
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &StatusEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).unwrap_or_default();
    sender.send(Message::Text(text)).await
}
