use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::{ApiError, FleetApi};
use crate::cache::StatusCache;
use crate::notifications::{NoticeBoard, NoticeSource, Severity};
use crate::types::StatusSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollState {
    /// No snapshot has ever been available.
    NoData,
    /// Snapshot from the most recent poll.
    Fresh,
    /// Snapshot from an earlier poll; the latest attempt failed.
    Stale,
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollState::NoData => write!(f, "No data"),
            PollState::Fresh => write!(f, "Live"),
            PollState::Stale => write!(f, "Stale"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Refreshed { bots_running: bool, symbols: usize },
    Failed { error: ApiError, state: PollState },
}

/// What the view renders: the retained snapshot and how much to trust it.
#[derive(Debug, Clone, PartialEq)]
pub struct PollView {
    pub state: PollState,
    pub snapshot: StatusSnapshot,
    pub last_error: Option<ApiError>,
}

pub struct StatusPoller {
    api: Arc<dyn FleetApi>,
    cache: StatusCache,
    notices: NoticeBoard,
    view: RwLock<PollView>,
    event_tx: broadcast::Sender<PollEvent>,
}

impl StatusPoller {
    /// Rehydrates the last snapshot from `cache` before any network traffic.
    pub fn new(api: Arc<dyn FleetApi>, cache: StatusCache, notices: NoticeBoard) -> Self {
        let cached = cache.load();
        let state = if cached.is_empty() {
            PollState::NoData
        } else {
            info!(symbols = cached.len(), "Rehydrated status snapshot from cache");
            PollState::Stale
        };

        let (event_tx, _) = broadcast::channel(64);
        Self {
            api,
            cache,
            notices,
            view: RwLock::new(PollView {
                state,
                snapshot: StatusSnapshot::cached(cached),
                last_error: None,
            }),
            event_tx,
        }
    }

    /// One fetch. On failure the retained snapshot is left untouched.
    pub async fn poll_once(&self) -> PollState {
        match self.api.fetch_status().await {
            Ok(status) => {
                let bots_running = status.bots_running;
                let snapshot = StatusSnapshot::fetched(status, Utc::now());
                let symbols = snapshot.statuses.len();

                if let Err(e) = self.cache.store(&snapshot.statuses) {
                    warn!("Failed to write status cache: {}", e);
                }

                {
                    let mut view = self.view.write().await;
                    view.state = PollState::Fresh;
                    view.snapshot = snapshot;
                    view.last_error = None;
                }

                self.notices.clear_source(NoticeSource::Status).await;
                debug!(symbols, bots_running, "Status refreshed");
                let _ = self.event_tx.send(PollEvent::Refreshed { bots_running, symbols });
                PollState::Fresh
            }
            Err(e) => {
                let state = {
                    let mut view = self.view.write().await;
                    if view.state != PollState::NoData {
                        view.state = PollState::Stale;
                    }
                    view.last_error = Some(e.clone());
                    view.state
                };

                self.notices
                    .post(
                        NoticeSource::Status,
                        Severity::Warning,
                        format!("Status poll failed: {}", e),
                    )
                    .await;
                let _ = self.event_tx.send(PollEvent::Failed { error: e, state });
                state
            }
        }
    }

    pub async fn view(&self) -> PollView {
        self.view.read().await.clone()
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.view.read().await.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.event_tx.subscribe()
    }

    /// Polls every `period`, the first time one `period` from now; the
    /// initial poll belongs to session initialization. The loop lives exactly
    /// as long as the returned handle.
    pub fn spawn(self: &Arc<Self>, period: Duration) -> PollHandle {
        let poller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                poller.poll_once().await;
            }
        });

        info!(period_secs = period.as_secs_f64(), "Status polling started");
        PollHandle { handle }
    }
}

/// Scoped ownership of the poll task. Dropping it cancels the timer.
pub struct PollHandle {
    handle: JoinHandle<()>,
}

impl PollHandle {
    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.handle.abort();
        debug!("Status polling stopped");
    }
}
