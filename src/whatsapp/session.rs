//! Ownership of the single live WhatsApp client.
//!
//! The [`SessionManager`] creates the client, registers lifecycle handling
//! exactly once, and replaces the client wholesale when the sidecar reports
//! a disconnect. Callers fetch the current client per operation through
//! [`SessionManager::client`] and never keep it across a restart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{ClientEvent, ClientFactory, SessionCredentials, WhatsAppClient};
use crate::commands::CommandTable;
use crate::qr;
use crate::status::{self, StatusEvent, StatusHub};

/// Buffer size for client event channels.
const EVENT_BUFFER: usize = 64;

/// The live client plus the task tagging its events.
struct ClientSlot {
    client: Arc<dyn WhatsAppClient>,
    generation: u64,
    forwarder: JoinHandle<()>,
}

/// Credentials captured from the last successful authentication.
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    /// Opaque credentials, if the sidecar shared them.
    pub credentials: Option<SessionCredentials>,
    /// When the `authenticated` event was handled.
    pub received_at: DateTime<Utc>,
}

/// Owns the process-wide WhatsApp client and its lifecycle.
pub struct SessionManager {
    factory: Arc<dyn ClientFactory>,
    slot: RwLock<ClientSlot>,
    events_tx: mpsc::Sender<(u64, ClientEvent)>,
    credentials: RwLock<Option<StoredCredentials>>,
    hub: StatusHub,
    commands: Arc<CommandTable>,
    restarts: AtomicU64,
}

impl SessionManager {
    /// Create the client, start the event dispatch loop and initialise the session.
    ///
    /// Initialisation failures are logged; the dashboard keeps showing
    /// "Connecting..." until the sidecar produces events.
    pub async fn start(
        factory: Arc<dyn ClientFactory>,
        hub: StatusHub,
        commands: Arc<CommandTable>,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let slot = spawn_client(factory.as_ref(), 0, events_tx.clone());

        let manager = Arc::new(Self {
            factory,
            slot: RwLock::new(slot),
            events_tx,
            credentials: RwLock::new(None),
            hub,
            commands,
            restarts: AtomicU64::new(0),
        });

        tokio::spawn(run_dispatch(Arc::downgrade(&manager), events_rx));

        let client = manager.client().await;
        match client.initialize().await {
            Ok(()) => info!("WhatsApp session initialising"),
            Err(e) => error!(error = %e, "failed to initialise WhatsApp session"),
        }

        manager
    }

    /// The current client. Re-fetch it for every operation.
    pub async fn client(&self) -> Arc<dyn WhatsAppClient> {
        Arc::clone(&self.slot.read().await.client)
    }

    /// Generation of the current client; bumped by every restart.
    pub async fn generation(&self) -> u64 {
        self.slot.read().await.generation
    }

    /// Number of restarts performed since startup.
    pub fn restart_count(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    /// Credentials from the last `authenticated` event, held in memory only.
    pub async fn credentials(&self) -> Option<StoredCredentials> {
        self.credentials.read().await.clone()
    }

    /// The hub lifecycle statuses are published to.
    pub fn hub(&self) -> &StatusHub {
        &self.hub
    }

    /// Destroy the current client and replace it with a freshly initialised one.
    ///
    /// Holds the slot's write lock for the whole swap, so no caller observes a
    /// half-replaced session. Calls already running against the old client
    /// fail with whatever error the sidecar returns.
    pub async fn restart(&self, reason: &str) {
        let mut slot = self.slot.write().await;
        info!(generation = slot.generation, reason, "restarting WhatsApp session");

        if let Err(e) = slot.client.destroy().await {
            warn!(error = %e, "failed to destroy WhatsApp session");
        }
        slot.forwarder.abort();

        let generation = slot.generation.saturating_add(1);
        let next = spawn_client(self.factory.as_ref(), generation, self.events_tx.clone());
        if let Err(e) = next.client.initialize().await {
            error!(error = %e, generation, "failed to initialise WhatsApp session");
        }
        *slot = next;
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    /// Destroy the current client for process shutdown.
    pub async fn shutdown(&self) {
        let slot = self.slot.read().await;
        slot.forwarder.abort();
        if let Err(e) = slot.client.destroy().await {
            warn!(error = %e, "failed to destroy WhatsApp session on shutdown");
        }
        info!("WhatsApp session shut down");
    }

    async fn handle_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::Qr(payload) => match qr::to_data_uri(&payload) {
                Ok(uri) => {
                    info!("QR code received");
                    self.hub.publish(StatusEvent::Qr(uri));
                    self.hub.publish(StatusEvent::message(status::QR_RECEIVED));
                }
                Err(e) => warn!(error = %e, "failed to render QR code"),
            },
            ClientEvent::Authenticated(credentials) => {
                info!("WhatsApp session authenticated");
                *self.credentials.write().await = Some(StoredCredentials {
                    credentials,
                    received_at: Utc::now(),
                });
            }
            ClientEvent::AuthFailure(reason) => {
                warn!(reason = %reason, "WhatsApp authentication failed");
                self.hub.publish(StatusEvent::message(status::AUTH_FAILURE));
            }
            ClientEvent::Ready => {
                info!("WhatsApp session ready");
                self.hub.publish(StatusEvent::Ready(status::READY.to_owned()));
                self.hub.publish(StatusEvent::message(status::READY));
            }
            ClientEvent::Disconnected(reason) => {
                warn!(reason = %reason, "WhatsApp session disconnected");
                self.restart(&reason).await;
            }
            ClientEvent::Message(message) => {
                if !self.commands.matches(&message.body) {
                    return;
                }
                let client = self.client().await;
                let commands = Arc::clone(&self.commands);
                tokio::spawn(async move {
                    if let Err(e) = commands.dispatch(client.as_ref(), &message).await {
                        warn!(error = %e, from = %message.from, trigger = %message.body, "command failed");
                    }
                });
            }
        }
    }
}

/// Create a client for `generation` and a task that tags its events.
fn spawn_client(
    factory: &dyn ClientFactory,
    generation: u64,
    sink: mpsc::Sender<(u64, ClientEvent)>,
) -> ClientSlot {
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
    let client = factory.create(tx);
    let forwarder = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if sink.send((generation, event)).await.is_err() {
                break;
            }
        }
    });
    ClientSlot {
        client,
        generation,
        forwarder,
    }
}

/// Single consumer of every client event for the life of the manager.
async fn run_dispatch(manager: Weak<SessionManager>, mut events: mpsc::Receiver<(u64, ClientEvent)>) {
    while let Some((generation, event)) = events.recv().await {
        let Some(manager) = manager.upgrade() else {
            break;
        };
        let current = manager.generation().await;
        if generation != current {
            debug!(generation, current, ?event, "dropping event from replaced session");
            continue;
        }
        manager.handle_event(event).await;
    }
    debug!("session event dispatch stopped");
}
