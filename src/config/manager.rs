use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::fields::{ConfigField, EditRejection};
use super::local::{ConfigPayload, LocalConfig};
use crate::backend::{ApiError, FleetApi};
use crate::notifications::{NoticeBoard, NoticeSource, Severity};

const SAVE_SUCCESS_FALLBACK: &str = "Configuration saved";

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded,
    /// The backend could not be read; the form holds defaults.
    Defaulted(ApiError),
}

/// Result of applying a batch of `key=value` edits.
#[derive(Debug, Default)]
pub struct AssignmentReport {
    pub applied: Vec<ConfigField>,
    pub rejected: Vec<EditRejection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub success: bool,
    pub message: String,
    /// Exactly what was sent.
    pub payload: ConfigPayload,
}

/// Owns the edit form and performs the load / save round trip.
pub struct ConfigSynchronizer {
    api: Arc<dyn FleetApi>,
    form: RwLock<LocalConfig>,
    /// Most recent normalized configuration; source of fallbacks on save.
    last_valid: RwLock<LocalConfig>,
    notices: NoticeBoard,
}

impl ConfigSynchronizer {
    pub fn new(api: Arc<dyn FleetApi>, notices: NoticeBoard) -> Self {
        Self {
            api,
            form: RwLock::new(LocalConfig::default()),
            last_valid: RwLock::new(LocalConfig::default()),
            notices,
        }
    }

    /// Replaces the form wholesale with the backend's configuration, or with
    /// defaults when it cannot be fetched. Never fails.
    pub async fn load(&self) -> LoadOutcome {
        match self.api.fetch_config().await {
            Ok(remote) => {
                let config = LocalConfig::from_remote(&remote);
                *self.form.write().await = config.clone();
                *self.last_valid.write().await = config;
                info!("Configuration loaded from backend");
                LoadOutcome::Loaded
            }
            Err(e) => {
                warn!("Failed to load configuration, using defaults: {}", e);
                *self.form.write().await = LocalConfig::default();
                *self.last_valid.write().await = LocalConfig::default();
                self.notices
                    .post(
                        NoticeSource::Config,
                        Severity::Warning,
                        format!("Could not load configuration ({}); showing defaults", e),
                    )
                    .await;
                LoadOutcome::Defaulted(e)
            }
        }
    }

    pub async fn form(&self) -> LocalConfig {
        self.form.read().await.clone()
    }

    pub async fn edit(&self, field: ConfigField, input: &str) -> Result<(), EditRejection> {
        let mut form = self.form.write().await;
        form.edit(field, input)
    }

    pub async fn edit_by_key(&self, key: &str, input: &str) -> Result<ConfigField, EditRejection> {
        let field = ConfigField::from_key(key)
            .ok_or_else(|| EditRejection::UnknownField(key.to_string()))?;
        self.edit(field, input).await?;
        Ok(field)
    }

    /// Applies `key=value` assignments in order. A rejected assignment is
    /// reported and skipped; the rest still apply.
    pub async fn apply_assignments(&self, assignments: &[String]) -> AssignmentReport {
        let mut report = AssignmentReport::default();
        for assignment in assignments {
            let result = match assignment.split_once('=') {
                Some((key, value)) => self.edit_by_key(key, value).await,
                None => Err(EditRejection::MalformedAssignment(assignment.clone())),
            };
            match result {
                Ok(field) => report.applied.push(field),
                Err(rejection) => {
                    warn!("Edit rejected: {}", rejection);
                    report.rejected.push(rejection);
                }
            }
        }
        report
    }

    /// Normalizes the form, writes the normalized values back, and sends
    /// them in a single request. The normalized form is kept whatever the
    /// network outcome.
    pub async fn save(&self) -> SaveOutcome {
        let (normalized, had_pending) = {
            let mut form = self.form.write().await;
            let mut last_valid = self.last_valid.write().await;
            let had_pending = form.has_pending();
            let normalized = form.normalized(&last_valid);
            *form = normalized.clone();
            *last_valid = normalized.clone();
            (normalized, had_pending)
        };

        if had_pending {
            self.notices
                .post(
                    NoticeSource::Config,
                    Severity::Info,
                    "Incomplete values were replaced with the last valid ones".to_string(),
                )
                .await;
        }

        let payload = normalized.to_payload();
        info!(symbols = %normalized.symbols().join(","), "Saving configuration");

        match self.api.save_config(payload.clone()).await {
            Ok(reply) => {
                let message = reply
                    .message
                    .unwrap_or_else(|| SAVE_SUCCESS_FALLBACK.to_string());
                self.notices
                    .post(NoticeSource::Config, Severity::Success, message.clone())
                    .await;
                SaveOutcome { success: true, message, payload }
            }
            Err(e) => {
                let message = match &e {
                    ApiError::Backend { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                warn!("Configuration save failed: {}", message);
                self.notices
                    .post(NoticeSource::Config, Severity::Error, message.clone())
                    .await;
                SaveOutcome { success: false, message, payload }
            }
        }
    }
}
