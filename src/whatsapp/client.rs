//! HTTP client for the WhatsApp Web sidecar.
//!
//! Every session operation goes through this client, which talks to the
//! Node.js bridge over HTTP on port 3001. Lifecycle events arrive through
//! the long-poll listener in [`super::events`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    events, Chat, ClientEvent, ClientFactory, ConnectionState, IncomingMessage, MessageReceipt,
    WhatsAppClient, WhatsAppError,
};

/// Default port the WhatsApp bridge listens on.
pub const DEFAULT_BRIDGE_PORT: u16 = 3001;

/// HTTP connect timeout for the reqwest client.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout for normal operations.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Response envelope from the bridge HTTP API.
#[derive(Deserialize)]
struct BridgeResponse<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

/// Client for one WhatsApp session hosted by the sidecar.
pub struct BridgeClient {
    client: reqwest::Client,
    base_url: String,
    events: mpsc::Sender<ClientEvent>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeClient {
    /// Create a client pointing at `base_url`, delivering events to `events`.
    pub fn new(base_url: impl Into<String>, events: mpsc::Sender<ClientEvent>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            client,
            base_url,
            events,
            listener: Mutex::new(None),
        }
    }

    /// Returns the base URL of the sidecar.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a request and unwrap the bridge envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, WhatsAppError> {
        let resp = request.send().await?;
        let status = resp.status();
        let body: BridgeResponse<T> = match resp.json().await {
            Ok(body) => body,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(WhatsAppError::Bridge(format!(
                    "sidecar returned HTTP {status}"
                )))
            }
        };

        if !status.is_success() || !body.success {
            let reason = body
                .error
                .unwrap_or_else(|| format!("sidecar returned HTTP {status}"));
            return Err(WhatsAppError::Bridge(reason));
        }
        Ok(body.data)
    }
}

#[async_trait]
impl WhatsAppClient for BridgeClient {
    async fn initialize(&self) -> Result<(), WhatsAppError> {
        {
            let mut listener = self.listener.lock().await;
            if listener.is_none() {
                *listener = Some(events::spawn_event_listener(
                    self.base_url.clone(),
                    self.events.clone(),
                ));
            }
        }
        self.call::<serde_json::Value>(self.client.post(self.url("/initialize")))
            .await?;
        debug!(base_url = %self.base_url, "WhatsApp session initialising");
        Ok(())
    }

    async fn destroy(&self) -> Result<(), WhatsAppError> {
        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
        }
        self.call::<serde_json::Value>(self.client.post(self.url("/destroy")))
            .await?;
        debug!(base_url = %self.base_url, "WhatsApp session destroyed");
        Ok(())
    }

    async fn send_message(&self, to: &str, text: &str) -> Result<MessageReceipt, WhatsAppError> {
        let body = serde_json::json!({ "chatId": to, "text": text });
        let receipt = self
            .call::<MessageReceipt>(self.client.post(self.url("/send")).json(&body))
            .await?
            .ok_or_else(|| WhatsAppError::Bridge("sidecar returned no receipt".to_owned()))?;
        debug!(to, id = %receipt.id, "message sent via WhatsApp");
        Ok(receipt)
    }

    async fn is_registered_user(&self, address: &str) -> Result<bool, WhatsAppError> {
        let request = self
            .client
            .get(self.url("/registered"))
            .query(&[("address", address)]);
        Ok(self.call::<bool>(request).await?.unwrap_or(false))
    }

    async fn get_chats(&self) -> Result<Vec<Chat>, WhatsAppError> {
        Ok(self
            .call::<Vec<Chat>>(self.client.get(self.url("/chats")))
            .await?
            .unwrap_or_default())
    }

    async fn get_state(&self) -> Result<Option<ConnectionState>, WhatsAppError> {
        self.call::<ConnectionState>(self.client.get(self.url("/state")))
            .await
    }

    async fn reply(&self, message: &IncomingMessage, text: &str) -> Result<(), WhatsAppError> {
        let body = serde_json::json!({
            "chatId": message.from,
            "messageId": message.id,
            "text": text,
        });
        self.call::<serde_json::Value>(self.client.post(self.url("/reply")).json(&body))
            .await?;
        debug!(to = %message.from, "reply sent via WhatsApp");
        Ok(())
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.abort();
        }
    }
}

/// Builds [`BridgeClient`]s against one sidecar.
#[derive(Debug, Clone)]
pub struct BridgeClientFactory {
    base_url: String,
}

impl BridgeClientFactory {
    /// Factory for the sidecar at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Factory for the sidecar on `http://127.0.0.1:{port}`.
    pub fn with_port(port: u16) -> Self {
        Self::new(format!("http://127.0.0.1:{port}"))
    }
}

impl Default for BridgeClientFactory {
    fn default() -> Self {
        Self::with_port(DEFAULT_BRIDGE_PORT)
    }
}

impl ClientFactory for BridgeClientFactory {
    fn create(&self, events: mpsc::Sender<ClientEvent>) -> Arc<dyn WhatsAppClient> {
        Arc::new(BridgeClient::new(self.base_url.clone(), events))
    }
}
