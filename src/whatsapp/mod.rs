//! WhatsApp adapter: client contract, sidecar HTTP client, event listener,
//! and the session manager that owns the single live client.
//!
//! The WhatsApp Web protocol itself lives in a sidecar process
//! (`whatsapp-web.js` style bridge) reachable over local HTTP on port 3001.
//! This module only describes what the rest of the crate consumes from it.

pub mod client;
pub mod events;
pub mod session;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Errors from the WhatsApp adapter.
#[derive(Debug, thiserror::Error)]
pub enum WhatsAppError {
    /// HTTP request to the sidecar failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The sidecar answered but reported a failure.
    #[error("bridge error: {0}")]
    Bridge(String),

    /// A QR payload could not be rendered as an image.
    #[error("QR render failed: {0}")]
    Render(String),
}

/// Connection state reported by the sidecar.
///
/// Serialised as the upper-case state name used by WhatsApp Web.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectionState {
    /// Session is connected and usable.
    Connected,
    /// Socket is opening.
    Opening,
    /// Device pairing in progress.
    Pairing,
    /// No linked device.
    Unpaired,
    /// No linked device and the QR code expired.
    UnpairedIdle,
    /// Session opened in another browser.
    Conflict,
    /// Connection timed out.
    Timeout,
    /// Browser not launched yet.
    Unlaunched,
    /// Blocked by a proxy.
    ProxyBlock,
    /// Account blocked for terms-of-service violations.
    TosBlock,
    /// Business account blocked for terms-of-service violations.
    SmbTosBlock,
    /// WhatsApp Web version no longer supported.
    DeprecatedVersion,
    /// Any state this crate does not know by name.
    Other(String),
}

impl ConnectionState {
    /// The wire name of the state, e.g. `"CONNECTED"`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connected => "CONNECTED",
            Self::Opening => "OPENING",
            Self::Pairing => "PAIRING",
            Self::Unpaired => "UNPAIRED",
            Self::UnpairedIdle => "UNPAIRED_IDLE",
            Self::Conflict => "CONFLICT",
            Self::Timeout => "TIMEOUT",
            Self::Unlaunched => "UNLAUNCHED",
            Self::ProxyBlock => "PROXYBLOCK",
            Self::TosBlock => "TOS_BLOCK",
            Self::SmbTosBlock => "SMB_TOS_BLOCK",
            Self::DeprecatedVersion => "DEPRECATED_VERSION",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ConnectionState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "CONNECTED" => Self::Connected,
            "OPENING" => Self::Opening,
            "PAIRING" => Self::Pairing,
            "UNPAIRED" => Self::Unpaired,
            "UNPAIRED_IDLE" => Self::UnpairedIdle,
            "CONFLICT" => Self::Conflict,
            "TIMEOUT" => Self::Timeout,
            "UNLAUNCHED" => Self::Unlaunched,
            "PROXYBLOCK" => Self::ProxyBlock,
            "TOS_BLOCK" => Self::TosBlock,
            "SMB_TOS_BLOCK" => Self::SmbTosBlock,
            "DEPRECATED_VERSION" => Self::DeprecatedVersion,
            _ => Self::Other(s),
        }
    }
}

impl From<ConnectionState> for String {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Other(s) => s,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat known to the session (direct conversation or group).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Serialized chat id, e.g. `6281234567890@c.us` or `1203630@g.us`.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Whether this chat is a group.
    #[serde(default)]
    pub is_group: bool,
}

/// Delivery receipt returned by the sidecar for a sent message.
///
/// Fields the crate does not interpret are kept in `extra` so the receipt
/// can be handed back to HTTP callers unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageReceipt {
    /// Serialized message id.
    #[serde(default)]
    pub id: String,
    /// Recipient address.
    #[serde(default)]
    pub to: String,
    /// Message body as sent.
    #[serde(default)]
    pub body: String,
    /// Unix timestamp (seconds) assigned by WhatsApp.
    #[serde(default)]
    pub timestamp: i64,
    /// Everything else the sidecar reported.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A message received by the session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IncomingMessage {
    /// Serialized message id, used to quote the message in replies.
    pub id: String,
    /// Sender chat id.
    pub from: String,
    /// Text body.
    #[serde(default)]
    pub body: String,
}

/// Opaque credentials handed out by the sidecar after authentication.
#[derive(Clone, PartialEq)]
pub struct SessionCredentials(pub serde_json::Value);

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionCredentials([REDACTED])")
    }
}

/// Lifecycle and message events emitted by a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A new QR payload is available for linking.
    Qr(String),
    /// Authentication succeeded.
    Authenticated(Option<SessionCredentials>),
    /// Authentication failed.
    AuthFailure(String),
    /// The session is ready.
    Ready,
    /// The session was lost.
    Disconnected(String),
    /// A message arrived.
    Message(IncomingMessage),
}

/// Operations the bridge consumes from a WhatsApp session.
#[async_trait]
pub trait WhatsAppClient: Send + Sync {
    /// Begin session establishment. Lifecycle events follow asynchronously.
    async fn initialize(&self) -> Result<(), WhatsAppError>;

    /// Tear the session down.
    async fn destroy(&self) -> Result<(), WhatsAppError>;

    /// Send a text message to a chat address.
    async fn send_message(&self, to: &str, text: &str) -> Result<MessageReceipt, WhatsAppError>;

    /// Check whether an address belongs to a WhatsApp user.
    async fn is_registered_user(&self, address: &str) -> Result<bool, WhatsAppError>;

    /// List every chat known to the session.
    async fn get_chats(&self) -> Result<Vec<Chat>, WhatsAppError>;

    /// Current connection state, `None` when the session has none yet.
    async fn get_state(&self) -> Result<Option<ConnectionState>, WhatsAppError>;

    /// Reply to an incoming message, quoting it.
    async fn reply(&self, message: &IncomingMessage, text: &str) -> Result<(), WhatsAppError>;
}

/// Creates client instances wired to an event sender.
///
/// The session manager calls this once at startup and once per restart.
pub trait ClientFactory: Send + Sync {
    /// Build a new, uninitialised client whose events go to `events`.
    fn create(&self, events: mpsc::Sender<ClientEvent>) -> Arc<dyn WhatsAppClient>;
}
