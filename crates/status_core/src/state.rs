//! Derivation of the render model from the outcome of a status fetch.

use serde::Serialize;
use shared::domain::{decode_base64_image, ConnectionStatus};

use crate::error::StatusError;

/// What the widget currently shows. Exactly one variant is active; a new
/// outcome replaces the previous one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RenderState {
    #[default]
    Loading,
    Connected {
        phone_number: Option<String>,
        connection_time: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        bridge_error: Option<String>,
    },
    Disconnected {
        qr_code_image: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        qr_code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        bridge_error: Option<String>,
    },
    Error {
        message: String,
    },
}

impl RenderState {
    pub fn from_status(status: ConnectionStatus) -> Self {
        let bridge_error = non_empty(status.error);
        if status.connected {
            Self::Connected {
                phone_number: status.phone_number,
                connection_time: status.connection_time,
                bridge_error,
            }
        } else {
            Self::Disconnected {
                qr_code_image: non_empty(status.qr_code_image),
                qr_code: non_empty(status.qr_code),
                bridge_error,
            }
        }
    }

    pub fn from_outcome(outcome: Result<ConnectionStatus, StatusError>) -> Self {
        match outcome {
            Ok(status) => Self::from_status(status),
            Err(err) => Self::error(err.describe()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Error {
            message: if message.trim().is_empty() {
                "unknown error".to_string()
            } else {
                message
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn qr_image_bytes(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        match self {
            Self::Disconnected {
                qr_code_image: Some(image),
                ..
            } => Some(decode_base64_image(image)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Controls {
    pub refresh: bool,
    pub simulate_connect: bool,
    pub simulate_disconnect: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            refresh: true,
            simulate_connect: true,
            simulate_disconnect: true,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
