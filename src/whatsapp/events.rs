//! Event listener for the WhatsApp sidecar.
//!
//! Long-polls the sidecar's `/events/poll` endpoint and forwards decoded
//! lifecycle and message events to the owning client's channel.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{ClientEvent, IncomingMessage, SessionCredentials};

/// Long-poll timeout for the HTTP client (seconds).
const POLL_TIMEOUT_SECS: u64 = 60;

/// Initial reconnect backoff (milliseconds).
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum reconnect backoff (milliseconds).
const MAX_BACKOFF_MS: u64 = 30_000;

/// Event as emitted by the sidecar.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Qr {
        qr: String,
    },
    Authenticated {
        #[serde(default)]
        session: Option<serde_json::Value>,
    },
    AuthFailure {
        #[serde(default)]
        message: String,
    },
    Ready,
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Message {
        id: String,
        from: String,
        #[serde(default)]
        body: String,
    },
}

impl From<WireEvent> for ClientEvent {
    fn from(event: WireEvent) -> Self {
        match event {
            WireEvent::Qr { qr } => Self::Qr(qr),
            WireEvent::Authenticated { session } => {
                Self::Authenticated(session.filter(|s| !s.is_null()).map(SessionCredentials))
            }
            WireEvent::AuthFailure { message } => Self::AuthFailure(message),
            WireEvent::Ready => Self::Ready,
            WireEvent::Disconnected { reason } => Self::Disconnected(reason),
            WireEvent::Message { id, from, body } => {
                Self::Message(IncomingMessage { id, from, body })
            }
        }
    }
}

/// Decode one sidecar event. Unknown or malformed events yield `None`.
pub fn decode_event(value: serde_json::Value) -> Option<ClientEvent> {
    match serde_json::from_value::<WireEvent>(value) {
        Ok(event) => Some(event.into()),
        Err(e) => {
            debug!(error = %e, "skipping unrecognised sidecar event");
            None
        }
    }
}

/// Reconnect delay doubling from [`INITIAL_BACKOFF_MS`] up to [`MAX_BACKOFF_MS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Backoff {
    next_ms: u64,
}

impl Backoff {
    fn new() -> Self {
        Self {
            next_ms: INITIAL_BACKOFF_MS,
        }
    }

    /// Delay to wait now; doubles the following one.
    fn delay(&mut self) -> Duration {
        let delay = Duration::from_millis(self.next_ms);
        self.next_ms = self.next_ms.saturating_mul(2).min(MAX_BACKOFF_MS);
        delay
    }

    /// Back to the initial delay after the sidecar answered.
    fn reset(&mut self) {
        self.next_ms = INITIAL_BACKOFF_MS;
    }
}

/// Spawn an event listener that forwards events to the given channel.
///
/// Returns immediately. The listener runs as a background Tokio task,
/// reconnects with exponential backoff, and exits once the receiver is gone.
pub fn spawn_event_listener(
    base_url: String,
    event_tx: mpsc::Sender<ClientEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let poll_url = format!("{base_url}/events/poll");
        let mut backoff = Backoff::new();

        loop {
            info!(url = %poll_url, "connecting to WhatsApp event stream");

            match poll_events(&poll_url, &event_tx, &mut backoff).await {
                Ok(()) => {
                    info!("WhatsApp event stream closed");
                    break;
                }
                Err(e) => {
                    let delay = backoff.delay();
                    warn!(error = %e, ?delay, "WhatsApp event stream error, reconnecting");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    })
}

/// Poll the sidecar for events in a loop. Returns `Err` on non-timeout
/// network errors so the caller can reconnect with backoff. Every answered
/// poll resets `backoff`.
async fn poll_events(
    poll_url: &str,
    event_tx: &mpsc::Sender<ClientEvent>,
    backoff: &mut Backoff,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(POLL_TIMEOUT_SECS))
        .build()?;

    loop {
        match client.get(poll_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let batch = resp.json::<Vec<serde_json::Value>>().await?;
                backoff.reset();
                for event in batch.into_iter().filter_map(decode_event) {
                    debug!(?event, "received WhatsApp event");
                    if event_tx.send(event).await.is_err() {
                        // Receiver dropped: the client was torn down.
                        return Ok(());
                    }
                }
            }
            Ok(resp) => {
                debug!(status = %resp.status(), "event poll returned non-200");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Err(e) if e.is_timeout() => continue,
            Err(e) => return Err(e.into()),
        }

        if event_tx.is_closed() {
            return Ok(());
        }
    }
}
