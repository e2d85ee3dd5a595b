//! Status fan-out to connected dashboard browsers.
//!
//! Lifecycle listeners are registered once by the session manager, which
//! publishes here; every browser connection holds its own subscription and
//! drops it on disconnect.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Greeting sent to every new browser connection.
pub const CONNECTING: &str = "Connecting...";

/// Status sent alongside a fresh QR code.
pub const QR_RECEIVED: &str = "QR Code received, scan please!";

/// Status sent when the sidecar reports an authentication failure.
pub const AUTH_FAILURE: &str = "Auth failure, restarting...";

/// Status sent when the session becomes ready.
pub const READY: &str = "Whatsapp is ready!";

/// Status sent to a browser that connects while the session is already up.
pub const AUTHENTICATED: &str = "Whatsapp is authenticated!";

/// Default broadcast buffer per subscriber.
pub const DEFAULT_CAPACITY: usize = 64;

/// Event pushed to the dashboard.
///
/// Serialises as `{"event": "<name>", "data": "<payload>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum StatusEvent {
    /// Free-form status line.
    Message(String),
    /// QR image as a `data:` URI.
    Qr(String),
    /// Session is ready.
    Ready(String),
    /// Session was already authenticated when the browser connected.
    Authenticated(String),
}

impl StatusEvent {
    /// Shorthand for a [`StatusEvent::Message`].
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message(text.into())
    }
}

/// Broadcast hub for [`StatusEvent`]s.
#[derive(Debug, Clone)]
pub struct StatusHub {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusHub {
    /// Create a hub buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to every current subscriber. Having none is fine.
    pub fn publish(&self, event: StatusEvent) {
        match self.tx.send(event) {
            Ok(receivers) => debug!(receivers, "status event published"),
            Err(_) => debug!("status event dropped, no dashboard connected"),
        }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
