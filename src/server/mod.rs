//! HTTP surface: dashboard page, send endpoint, and the realtime status socket.

pub mod realtime;
pub mod send;

use std::future::Future;
use std::sync::Arc;

use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::whatsapp::session::SessionManager;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8000;

/// Dashboard page served on `/`.
const DASHBOARD: &str = include_str!("dashboard.html");

/// State shared by every handler.
pub struct AppState {
    /// Owner of the live WhatsApp client.
    pub session: Arc<SessionManager>,
    /// Country code substituted for a leading `0` in phone numbers.
    pub default_country_code: String,
}

/// Build the application router.
pub fn router(state: Arc<AppState>, cors: bool) -> Router {
    let mut router = Router::new()
        .route("/", get(dashboard))
        .route("/sendmessage", post(send::send_message))
        .route("/socket", get(realtime::socket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

/// Serve `app` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the listener fails while serving.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "App running on {addr}");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server failed: {e}"))
}

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD)
}
