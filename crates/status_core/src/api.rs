//! HTTP transport for the bridge's status and simulation endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::ConnectionStatus,
    protocol::{
        ActionResponse, SendMessageRequest, SendMessageResponse, SendMessageStatus,
        SimulateConnectRequest, StatusResponse,
    },
};
use tracing::debug;

use crate::error::{Result, StatusError};

pub const STATUS_PATH: &str = "/api/status";
pub const SIMULATE_CONNECT_PATH: &str = "/api/simulate_connect";
pub const SIMULATE_DISCONNECT_PATH: &str = "/api/simulate_disconnect";
pub const SEND_MESSAGE_PATH: &str = "/send";

const ERROR_BODY_SNIPPET_CHARS: usize = 200;

/// Simulation calls answered with `success: false` resolve to `StatusError::Rejected`.
#[async_trait]
pub trait BridgeApi: Send + Sync {
    async fn fetch_status(&self) -> Result<ConnectionStatus>;
    async fn simulate_connect(&self, phone: &str) -> Result<()>;
    async fn simulate_disconnect(&self) -> Result<()>;
    /// Returns the server's confirmation message.
    async fn send_message(&self, phone: &str, message: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct HttpBridgeApi {
    http: Client,
    server_url: String,
}

impl HttpBridgeApi {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), server_url)
    }

    /// `None` leaves timing out to the underlying transport.
    pub fn with_timeout(server_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, server_url))
    }

    pub fn with_client(http: Client, server_url: impl Into<String>) -> Self {
        let server_url: String = server_url.into();
        Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.server_url)
    }

    async fn read_action_response(response: Response) -> Result<()> {
        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<ActionResponse>(&body) {
            Ok(ActionResponse {
                success: false,
                error,
            }) => Err(StatusError::Rejected(
                error.unwrap_or_else(|| "unknown error".to_string()),
            )),
            Ok(_) if status.is_success() => Ok(()),
            Ok(_) => Err(StatusError::HttpStatus {
                status,
                body: snippet(&body),
            }),
            Err(_) if !status.is_success() => Err(StatusError::HttpStatus {
                status,
                body: snippet(&body),
            }),
            Err(err) => Err(StatusError::Decode(err)),
        }
    }
}

#[async_trait]
impl BridgeApi for HttpBridgeApi {
    async fn fetch_status(&self) -> Result<ConnectionStatus> {
        let url = self.endpoint(STATUS_PATH);
        debug!(%url, "fetching bridge status");
        let response = self.http.get(url).send().await?;
        let body: StatusResponse = read_json(response).await?;
        ConnectionStatus::from_response(body).ok_or(StatusError::MissingField("connected"))
    }

    async fn simulate_connect(&self, phone: &str) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint(SIMULATE_CONNECT_PATH))
            .json(&SimulateConnectRequest {
                phone: phone.to_string(),
            })
            .send()
            .await?;
        Self::read_action_response(response).await
    }

    async fn simulate_disconnect(&self) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint(SIMULATE_DISCONNECT_PATH))
            .send()
            .await?;
        Self::read_action_response(response).await
    }

    async fn send_message(&self, phone: &str, message: &str) -> Result<String> {
        let response = self
            .http
            .post(self.endpoint(SEND_MESSAGE_PATH))
            .json(&SendMessageRequest {
                phone: phone.to_string(),
                message: message.to_string(),
            })
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<SendMessageResponse>(&body) {
            Ok(SendMessageResponse {
                status: SendMessageStatus::Error,
                message,
            }) => Err(StatusError::Rejected(message)),
            Ok(SendMessageResponse { message, .. }) if status.is_success() => Ok(message),
            Ok(_) => Err(StatusError::HttpStatus {
                status,
                body: snippet(&body),
            }),
            Err(_) if !status.is_success() => Err(StatusError::HttpStatus {
                status,
                body: snippet(&body),
            }),
            Err(err) => Err(StatusError::Decode(err)),
        }
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(StatusError::HttpStatus {
            status,
            body: snippet(&body),
        });
    }
    Ok(serde_json::from_str(&body)?)
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= ERROR_BODY_SNIPPET_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(ERROR_BODY_SNIPPET_CHARS).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
