use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::StatusResponse;

/// Connection state reported by the bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Seconds since the Unix epoch; the bridge may send a fractional value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_time: Option<f64>,
    /// Base64 encoded image of the pairing code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code_image: Option<String>,
    /// Raw pairing payload the image encodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    /// Last bridge-side error, if the server reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionStatus {
    /// Returns `None` when the response omits `connected`.
    pub fn from_response(response: StatusResponse) -> Option<Self> {
        Some(Self {
            connected: response.connected?,
            phone_number: response.phone_number,
            connection_time: response.connection_time,
            qr_code_image: response.qr_code_image,
            qr_code: response.qr_code,
            error: response.error,
        })
    }

    pub fn connected_since(&self) -> Option<DateTime<Utc>> {
        self.connection_time.and_then(epoch_seconds_to_utc)
    }

    pub fn decode_qr_image(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        self.qr_code_image
            .as_deref()
            .filter(|payload| !payload.is_empty())
            .map(decode_base64_image)
    }
}

pub fn decode_base64_image(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(payload.trim())
}

/// Zero, negative and non-finite values carry no usable time.
pub fn epoch_seconds_to_utc(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}
