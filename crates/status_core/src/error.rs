use reqwest::StatusCode;
use shared::error::{ErrorKind, FailureReport};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded with {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("response is missing the `{0}` field")]
    MissingField(&'static str),
    #[error("{0}")]
    Rejected(String),
}

impl StatusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::HttpStatus { .. } | Self::Decode(_) => ErrorKind::Transport,
            Self::MissingField(_) | Self::Rejected(_) => ErrorKind::LogicalFailure,
        }
    }

    /// Display text followed by every `source()` not already part of it.
    pub fn describe(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = cause.source();
        }
        message
    }

    pub fn report(&self) -> FailureReport {
        FailureReport::new(self.kind(), self.describe())
    }
}

pub type Result<T> = std::result::Result<T, StatusError>;
