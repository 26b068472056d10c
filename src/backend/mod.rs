pub mod client;

pub use client::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigPayload, RemoteConfig};
use crate::types::FleetStatus;

/// How a failure is surfaced to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network unreachable, or a non-2xx response without a usable body.
    Transport,
    /// Non-2xx response carrying a structured `{error}` / `{message}` body.
    Backend,
    /// 2xx response whose body does not have the expected shape.
    Decode,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("backend returned HTTP {status}")]
    Status { status: u16 },

    #[error("{message}")]
    Backend { status: u16, message: String },

    #[error("unexpected response from backend: {0}")]
    Decode(String),
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "network",
            ErrorKind::Backend => "backend",
            ErrorKind::Decode => "response",
        }
    }
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unreachable(_) | ApiError::Status { .. } => ErrorKind::Transport,
            ApiError::Backend { .. } => ErrorKind::Backend,
            ApiError::Decode(_) => ErrorKind::Decode,
        }
    }

    /// True when no response was received at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ApiError::Unreachable(_))
    }
}

/// `{message}` / `{error}` body returned by the command endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendReply {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BackendReply {
    #[cfg(test)]
    pub fn message(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            error: None,
        }
    }
}

/// The backend HTTP API the console consumes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FleetApi: Send + Sync {
    async fn fetch_config(&self) -> Result<RemoteConfig, ApiError>;
    async fn save_config(&self, payload: ConfigPayload) -> Result<BackendReply, ApiError>;
    async fn fetch_status(&self) -> Result<FleetStatus, ApiError>;
    async fn start_bots(&self) -> Result<BackendReply, ApiError>;
    async fn shutdown(&self) -> Result<BackendReply, ApiError>;
}
