//! QR payload rendering for the login dashboard.

use base64::Engine;
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};

use crate::whatsapp::WhatsAppError;

/// Minimum rendered edge length in pixels.
const MIN_DIMENSION: u32 = 264;

/// Render a pairing payload as an SVG `data:` URI usable in an `<img src>`.
///
/// # Errors
///
/// Returns [`WhatsAppError::Render`] if the payload does not fit in a QR code.
pub fn to_data_uri(payload: &str) -> Result<String, WhatsAppError> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)
        .map_err(|e| WhatsAppError::Render(e.to_string()))?;

    let image = code
        .render::<svg::Color>()
        .min_dimensions(MIN_DIMENSION, MIN_DIMENSION)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .quiet_zone(true)
        .build();

    let encoded = base64::engine::general_purpose::STANDARD.encode(image.as_bytes());
    Ok(format!("data:image/svg+xml;base64,{encoded}"))
}
