use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

const MAX_NOTICES: usize = 50;

/// Notice severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Success => "OK",
            Severity::Warning => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

/// Which component posted a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeSource {
    Config,
    Status,
    Fleet,
}

/// A transient, operator-visible message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub id: u64,
    pub source: NoticeSource,
    pub severity: Severity,
    pub message: String,
    pub posted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Notice {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Auto-expiring notice board shared by the console components.
#[derive(Clone)]
pub struct NoticeBoard {
    notices: Arc<RwLock<Vec<Notice>>>,
    next_id: Arc<AtomicU64>,
    ttl: Duration,
}

impl NoticeBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            notices: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            ttl,
        }
    }

    pub async fn post(&self, source: NoticeSource, severity: Severity, message: String) -> u64 {
        self.post_at(source, severity, message, Utc::now()).await
    }

    pub async fn post_at(
        &self,
        source: NoticeSource,
        severity: Severity,
        message: String,
        now: DateTime<Utc>,
    ) -> u64 {
        match severity {
            Severity::Error => error!(?source, "{}", message),
            Severity::Warning => warn!(?source, "{}", message),
            Severity::Info | Severity::Success => info!(?source, "{}", message),
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let notice = Notice {
            id,
            source,
            severity,
            message,
            posted_at: now,
            expires_at: now + self.ttl,
        };

        let mut notices = self.notices.write().await;
        notices.insert(0, notice);
        if notices.len() > MAX_NOTICES {
            notices.truncate(MAX_NOTICES);
        }
        id
    }

    /// Unexpired notices, newest first. Expired ones are dropped.
    pub async fn active(&self) -> Vec<Notice> {
        self.active_at(Utc::now()).await
    }

    pub async fn active_at(&self, now: DateTime<Utc>) -> Vec<Notice> {
        let mut notices = self.notices.write().await;
        notices.retain(|n| !n.is_expired_at(now));
        notices.clone()
    }

    pub async fn clear_source(&self, source: NoticeSource) {
        self.notices.write().await.retain(|n| n.source != source);
    }
}
