use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ApiError, BackendReply, FleetApi};
use crate::config::{ConfigPayload, RemoteConfig};
use crate::types::FleetStatus;

/// JSON-over-HTTP client for the fleet backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str) -> Result<Value, ApiError> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Unreachable(e.to_string()))?;
        read_json(resp).await
    }

    async fn post_command(&self, path: &str, body: Option<&ConfigPayload>) -> Result<BackendReply, ApiError> {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let mut request = self.client.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| ApiError::Unreachable(e.to_string()))?;
        read_reply(resp).await
    }
}

async fn read_body(resp: Response) -> Result<(u16, String), ApiError> {
    let status = resp.status().as_u16();
    let text = resp
        .text()
        .await
        .map_err(|e| ApiError::Unreachable(e.to_string()))?;
    Ok((status, text))
}

async fn read_json(resp: Response) -> Result<Value, ApiError> {
    let (status, text) = read_body(resp).await?;
    if !(200..300).contains(&status) {
        return Err(error_from_body(status, &text));
    }
    serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
}

async fn read_reply(resp: Response) -> Result<BackendReply, ApiError> {
    let (status, text) = read_body(resp).await?;
    if !(200..300).contains(&status) {
        return Err(error_from_body(status, &text));
    }

    // An empty or non-JSON 2xx body still counts as success.
    let reply: BackendReply = serde_json::from_str(&text).unwrap_or_default();
    match reply.error {
        Some(error) => Err(ApiError::Backend { status, message: error }),
        None => Ok(reply),
    }
}

/// Classifies a non-2xx response by whether its body is a structured reply.
pub fn error_from_body(status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<BackendReply>(body) {
        Ok(BackendReply { error: Some(message), .. })
        | Ok(BackendReply { message: Some(message), .. }) => {
            ApiError::Backend { status, message }
        }
        _ => ApiError::Status { status },
    }
}

#[async_trait]
impl FleetApi for HttpBackend {
    async fn fetch_config(&self) -> Result<RemoteConfig, ApiError> {
        let body = self.get_json("/api/config").await?;
        RemoteConfig::from_json(body).map_err(ApiError::Decode)
    }

    async fn save_config(&self, payload: ConfigPayload) -> Result<BackendReply, ApiError> {
        self.post_command("/api/config", Some(&payload)).await
    }

    async fn fetch_status(&self) -> Result<FleetStatus, ApiError> {
        let body = self.get_json("/api/status").await?;
        FleetStatus::from_json(body).map_err(|e| {
            warn!("Discarding status response: {}", e);
            ApiError::Decode(e)
        })
    }

    async fn start_bots(&self) -> Result<BackendReply, ApiError> {
        self.post_command("/api/start_bots", None).await
    }

    async fn shutdown(&self) -> Result<BackendReply, ApiError> {
        self.post_command("/api/shutdown", None).await
    }
}
