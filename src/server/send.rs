//! `POST /sendmessage`: validate, normalise, check registration, send.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::AppState;
use crate::phone;
use crate::whatsapp::{MessageReceipt, WhatsAppError};

/// Message for an unregistered recipient.
pub const NOT_REGISTERED: &str = "The number is not registered";

/// Message for a missing or empty field.
pub const INVALID_VALUE: &str = "Invalid value";

/// Raw send request, as posted.
///
/// Fields stay untyped so a number or object in either field fails
/// validation like a missing one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendRequest {
    /// Recipient phone number in any common notation.
    #[serde(default)]
    pub number: Option<Value>,
    /// Text to send.
    #[serde(default)]
    pub message: Option<Value>,
}

impl SendRequest {
    /// Check both fields are non-empty strings.
    ///
    /// # Errors
    ///
    /// Returns a map from field name to error message for every bad field.
    pub fn validate(self) -> Result<(String, String), BTreeMap<String, String>> {
        let mut errors = BTreeMap::new();
        let number = non_empty(self.number, "number", &mut errors);
        let message = non_empty(self.message, "message", &mut errors);
        match (number, message) {
            (Some(number), Some(message)) if errors.is_empty() => Ok((number, message)),
            _ => Err(errors),
        }
    }
}

fn non_empty(
    value: Option<Value>,
    field: &str,
    errors: &mut BTreeMap<String, String>,
) -> Option<String> {
    match value {
        Some(Value::String(v)) if !v.is_empty() => Some(v),
        _ => {
            errors.insert(field.to_owned(), INVALID_VALUE.to_owned());
            None
        }
    }
}

/// Body extractor accepting JSON or urlencoded forms.
///
/// Any other content type, no content type, or a body that does not parse
/// yields `T::default()`, leaving the verdict to validation.
#[derive(Debug)]
pub struct JsonOrForm<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default + Send,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();

        if content_type.starts_with("application/json") {
            let bytes = Bytes::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            let value = serde_json::from_slice::<T>(&bytes).unwrap_or_else(|e| {
                debug!(error = %e, "unparsable JSON body, treating as empty");
                T::default()
            });
            Ok(Self(value))
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let value = match Form::<T>::from_request(req, state).await {
                Ok(Form(value)) => value,
                Err(e) => {
                    debug!(error = %e, "unparsable form body, treating as empty");
                    T::default()
                }
            };
            Ok(Self(value))
        } else {
            Ok(Self(T::default()))
        }
    }
}

/// Failure outcomes of a send request.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// One or more fields were missing or empty.
    #[error("invalid request")]
    Validation(BTreeMap<String, String>),

    /// The recipient is not on WhatsApp.
    #[error("the number is not registered")]
    NotRegistered,

    /// The sidecar failed the registration check or the send.
    #[error(transparent)]
    Transport(#[from] WhatsAppError),
}

impl IntoResponse for SendError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "status": false, "message": errors })),
            )
                .into_response(),
            Self::NotRegistered => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "status": false, "message": NOT_REGISTERED })),
            )
                .into_response(),
            Self::Transport(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": false, "response": e.to_string() })),
            )
                .into_response(),
        }
    }
}

/// Handler for `POST /sendmessage`.
///
/// Every request triggers its own send attempt; there is no deduplication.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    JsonOrForm(request): JsonOrForm<SendRequest>,
) -> Result<Json<serde_json::Value>, SendError> {
    let (number, message) = request.validate().map_err(|errors| {
        warn!(?errors, "rejecting send request");
        SendError::Validation(errors)
    })?;

    let address = phone::format_number(&number, &state.default_country_code);

    let client = state.session.client().await;
    if !client.is_registered_user(&address).await? {
        warn!(%address, "the number is not registered");
        return Err(SendError::NotRegistered);
    }

    let client = state.session.client().await;
    let receipt: MessageReceipt = client.send_message(&address, &message).await.map_err(|e| {
        warn!(error = %e, %address, "send failed");
        SendError::Transport(e)
    })?;
    info!(%address, id = %receipt.id, "message sent");

    Ok(Json(json!({ "status": true, "response": receipt })))
}
