use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{ApiError, BackendReply, FleetApi};
use crate::notifications::{NoticeBoard, NoticeSource, Severity};

/// The console's belief about whether the fleet is running. Seeded once from
/// a poll, afterwards moved only by commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum FleetBelief {
    Unknown = 0,
    Running = 1,
    Stopped = 2,
}

impl FleetBelief {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => FleetBelief::Running,
            2 => FleetBelief::Stopped,
            _ => FleetBelief::Unknown,
        }
    }

    fn from_running(running: bool) -> Self {
        if running {
            FleetBelief::Running
        } else {
            FleetBelief::Stopped
        }
    }
}

impl std::fmt::Display for FleetBelief {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FleetBelief::Unknown => write!(f, "Unknown"),
            FleetBelief::Running => write!(f, "Running"),
            FleetBelief::Stopped => write!(f, "Stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FleetCommand {
    Start,
    Shutdown,
}

impl FleetCommand {
    pub fn allowed_in(&self, belief: FleetBelief) -> bool {
        match self {
            FleetCommand::Start => belief == FleetBelief::Stopped,
            FleetCommand::Shutdown => belief == FleetBelief::Running,
        }
    }
}

impl std::fmt::Display for FleetCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FleetCommand::Start => write!(f, "start"),
            FleetCommand::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FleetError {
    #[error("another fleet command is already in flight")]
    Busy,

    #[error("cannot {command} while the fleet is {belief}")]
    NotAllowed {
        command: FleetCommand,
        belief: FleetBelief,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandReport {
    pub command: FleetCommand,
    pub success: bool,
    pub message: String,
    pub belief: FleetBelief,
}

pub struct FleetController {
    api: Arc<dyn FleetApi>,
    notices: NoticeBoard,
    belief: AtomicU8,
    seeded: AtomicBool,
    in_flight: AtomicBool,
}

/// Releases the in-flight flag when a command completes or is cancelled.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl FleetController {
    pub fn new(api: Arc<dyn FleetApi>, notices: NoticeBoard) -> Self {
        Self {
            api,
            notices,
            belief: AtomicU8::new(FleetBelief::Unknown as u8),
            seeded: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn belief(&self) -> FleetBelief {
        FleetBelief::from_u8(self.belief.load(Ordering::Acquire))
    }

    /// Whether any poll has ever reported the fleet's state.
    pub fn is_seeded(&self) -> bool {
        self.seeded.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Applies the first successful poll's running flag. Returns whether this
    /// call did the seeding; every later call is ignored.
    pub fn seed(&self, bots_running: bool) -> bool {
        if self
            .seeded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let belief = FleetBelief::from_running(bots_running);
        info!(%belief, "Fleet state seeded from status poll");
        self.set_belief(belief);
        true
    }

    pub async fn start(&self) -> Result<CommandReport, FleetError> {
        let _guard = self.begin(FleetCommand::Start)?;
        info!("Starting fleet");

        let (success, message) = match self.api.start_bots().await {
            Ok(reply) => {
                self.set_belief(FleetBelief::Running);
                (true, reply_text(reply, "Fleet started"))
            }
            Err(e) => {
                warn!("Fleet start failed: {}", e);
                self.set_belief(FleetBelief::Stopped);
                (false, error_text(&e))
            }
        };

        Ok(self.report(FleetCommand::Start, success, message).await)
    }

    pub async fn shutdown(&self) -> Result<CommandReport, FleetError> {
        let _guard = self.begin(FleetCommand::Shutdown)?;
        info!("Shutting down fleet");

        let (success, message) = match self.api.shutdown().await {
            Ok(reply) => {
                self.set_belief(FleetBelief::Stopped);
                (true, reply_text(reply, "Fleet shutdown requested"))
            }
            Err(e) if e.is_unreachable() => {
                warn!("Shutdown request could not be sent: {}", e);
                (false, error_text(&e))
            }
            Err(e) => {
                warn!("Backend reported a shutdown error, treating fleet as stopped: {}", e);
                self.set_belief(FleetBelief::Stopped);
                (true, format!("Fleet marked stopped ({})", error_text(&e)))
            }
        };

        Ok(self.report(FleetCommand::Shutdown, success, message).await)
    }

    fn begin(&self, command: FleetCommand) -> Result<InFlight<'_>, FleetError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FleetError::Busy);
        }
        let guard = InFlight(&self.in_flight);

        let belief = self.belief();
        if !command.allowed_in(belief) {
            return Err(FleetError::NotAllowed { command, belief });
        }
        Ok(guard)
    }

    fn set_belief(&self, belief: FleetBelief) {
        self.belief.store(belief as u8, Ordering::Release);
    }

    async fn report(&self, command: FleetCommand, success: bool, message: String) -> CommandReport {
        let severity = if success { Severity::Success } else { Severity::Error };
        self.notices
            .post(NoticeSource::Fleet, severity, message.clone())
            .await;

        CommandReport {
            command,
            success,
            message,
            belief: self.belief(),
        }
    }
}

fn reply_text(reply: BackendReply, fallback: &str) -> String {
    reply.message.unwrap_or_else(|| fallback.to_string())
}

fn error_text(error: &ApiError) -> String {
    match error {
        ApiError::Backend { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockFleetApi;
    use std::time::Duration;

    fn controller(mock: MockFleetApi) -> FleetController {
        FleetController::new(Arc::new(mock), NoticeBoard::new(chrono::Duration::seconds(5)))
    }

    #[test]
    fn test_seed_happens_once() {
        let fleet = controller(MockFleetApi::new());
        assert_eq!(fleet.belief(), FleetBelief::Unknown);

        assert!(fleet.seed(true));
        assert!(fleet.is_seeded());
        assert_eq!(fleet.belief(), FleetBelief::Running);

        assert!(!fleet.seed(false));
        assert_eq!(fleet.belief(), FleetBelief::Running);
    }

    #[test]
    fn test_commands_disallowed_while_unknown() {
        let fleet = controller(MockFleetApi::new());
        assert!(!fleet.is_seeded());
        assert!(!FleetCommand::Start.allowed_in(fleet.belief()));
        assert!(!FleetCommand::Shutdown.allowed_in(fleet.belief()));

        let err = tokio_test::block_on(fleet.start()).unwrap_err();
        assert_eq!(
            err,
            FleetError::NotAllowed { command: FleetCommand::Start, belief: FleetBelief::Unknown }
        );
    }

    #[tokio::test]
    async fn test_start_rejected_leaves_fleet_stopped() {
        let mut mock = MockFleetApi::new();
        mock.expect_start_bots()
            .times(1)
            .returning(|| Err(ApiError::Backend { status: 400, message: "already running".into() }));
        let fleet = controller(mock);
        fleet.seed(false);

        let report = fleet.start().await.unwrap();

        assert!(!report.success);
        assert_eq!(report.message, "already running");
        assert_eq!(fleet.belief(), FleetBelief::Stopped);
        assert!(!fleet.is_busy());
    }

    #[tokio::test]
    async fn test_start_success() {
        let mut mock = MockFleetApi::new();
        mock.expect_start_bots()
            .times(1)
            .returning(|| Ok(BackendReply::message("Started 3 bots")));
        let fleet = controller(mock);
        fleet.seed(false);

        let report = fleet.start().await.unwrap();
        assert!(report.success);
        assert_eq!(report.belief, FleetBelief::Running);
        assert_eq!(report.message, "Started 3 bots");
    }

    #[tokio::test]
    async fn test_shutdown_http_500_still_stops() {
        let mut mock = MockFleetApi::new();
        mock.expect_shutdown()
            .times(1)
            .returning(|| Err(ApiError::Status { status: 500 }));
        let fleet = controller(mock);
        fleet.seed(true);

        let report = fleet.shutdown().await.unwrap();

        assert!(report.success);
        assert_eq!(fleet.belief(), FleetBelief::Stopped);
    }

    #[tokio::test]
    async fn test_unsent_shutdown_keeps_belief() {
        let mut mock = MockFleetApi::new();
        mock.expect_shutdown()
            .times(1)
            .returning(|| Err(ApiError::Unreachable("connection refused".into())));
        let fleet = controller(mock);
        fleet.seed(true);

        let report = fleet.shutdown().await.unwrap();

        assert!(!report.success);
        assert_eq!(fleet.belief(), FleetBelief::Running);
    }

    #[tokio::test]
    async fn test_seed_after_command_is_ignored() {
        let mut mock = MockFleetApi::new();
        mock.expect_shutdown().times(1).returning(|| Ok(BackendReply::default()));
        let fleet = controller(mock);
        fleet.seed(true);
        fleet.shutdown().await.unwrap();

        assert!(!fleet.seed(true));
        assert_eq!(fleet.belief(), FleetBelief::Stopped);
    }

    #[tokio::test]
    async fn test_second_command_while_in_flight_is_busy() {
        struct SlowApi;

        #[async_trait::async_trait]
        impl FleetApi for SlowApi {
            async fn fetch_config(&self) -> Result<crate::config::RemoteConfig, ApiError> {
                Err(ApiError::Status { status: 404 })
            }
            async fn save_config(
                &self,
                _payload: crate::config::ConfigPayload,
            ) -> Result<BackendReply, ApiError> {
                Err(ApiError::Status { status: 404 })
            }
            async fn fetch_status(&self) -> Result<crate::types::FleetStatus, ApiError> {
                Err(ApiError::Status { status: 404 })
            }
            async fn start_bots(&self) -> Result<BackendReply, ApiError> {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(BackendReply::default())
            }
            async fn shutdown(&self) -> Result<BackendReply, ApiError> {
                Ok(BackendReply::default())
            }
        }

        let fleet = Arc::new(FleetController::new(
            Arc::new(SlowApi),
            NoticeBoard::new(chrono::Duration::seconds(5)),
        ));
        fleet.seed(false);

        let first = {
            let fleet = Arc::clone(&fleet);
            tokio::spawn(async move { fleet.start().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(fleet.is_busy());
        assert_eq!(fleet.start().await.unwrap_err(), FleetError::Busy);

        let report = first.await.unwrap().unwrap();
        assert!(report.success);
        assert!(!fleet.is_busy());
        assert!(FleetCommand::Shutdown.allowed_in(fleet.belief()));
    }
}
