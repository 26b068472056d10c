pub mod render;

pub use render::*;

use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use crate::backend::FleetApi;
use crate::cache::StatusCache;
use crate::config::{ConfigSynchronizer, ConsoleSettings, LoadOutcome};
use crate::engine::{FleetController, PollEvent, PollState, StatusPoller};
use crate::notifications::NoticeBoard;

/// The three independently owned state containers a view drives.
pub struct ConsoleSession {
    pub config: Arc<ConfigSynchronizer>,
    pub poller: Arc<StatusPoller>,
    pub fleet: Arc<FleetController>,
    pub notices: NoticeBoard,
}

impl ConsoleSession {
    pub fn new(api: Arc<dyn FleetApi>, cache: StatusCache, settings: &ConsoleSettings) -> Self {
        let notices = NoticeBoard::new(settings.notice_ttl());
        Self {
            config: Arc::new(ConfigSynchronizer::new(Arc::clone(&api), notices.clone())),
            poller: Arc::new(StatusPoller::new(Arc::clone(&api), cache, notices.clone())),
            fleet: Arc::new(FleetController::new(api, notices.clone())),
            notices,
        }
    }

    /// One poll, seeding the fleet belief if it succeeded.
    pub async fn poll_and_seed(&self) -> PollState {
        let state = self.poller.poll_once().await;
        if state == PollState::Fresh {
            if let Some(running) = self.poller.snapshot().await.bots_running {
                self.fleet.seed(running);
            }
        }
        state
    }

    /// Config load and the first poll run concurrently; neither waits on
    /// the other.
    pub async fn initialize(&self) -> (LoadOutcome, PollState) {
        let (loaded, polled) = tokio::join!(self.config.load(), self.poll_and_seed());
        info!(config = ?loaded, poll = %polled, belief = %self.fleet.belief(), "Console session initialized");
        (loaded, polled)
    }

    /// Current status screen.
    pub async fn status_screen(&self) -> String {
        let view = self.poller.view().await;
        let notices = self.notices.active().await;
        render_status(&view, self.fleet.belief(), &notices)
    }

    /// Seeds the fleet from refresh events and hands a fresh screen to
    /// `redraw` after each event, until `shutdown` resolves or the poller is
    /// gone. Queued events are drained before `shutdown` is checked. Returns
    /// the number of redraws.
    pub async fn watch<F>(
        &self,
        mut events: broadcast::Receiver<PollEvent>,
        shutdown: F,
        mut redraw: impl FnMut(&str),
    ) -> usize
    where
        F: Future,
    {
        tokio::pin!(shutdown);
        let mut redraws = 0;

        loop {
            tokio::select! {
                biased;
                event = events.recv() => {
                    match event {
                        Ok(PollEvent::Refreshed { bots_running, .. }) => {
                            self.fleet.seed(bots_running);
                        }
                        Ok(PollEvent::Failed { .. }) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Display fell behind the poller");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    }
                    redraw(&self.status_screen().await);
                    redraws += 1;
                }
                _ = &mut shutdown => {
                    info!("Shutting down...");
                    break;
                }
            }
        }
        redraws
    }
}
