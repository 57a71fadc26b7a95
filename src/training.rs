//! Training job trigger and poll-until-terminal workflow.
use anyhow::Result;
use chrono::Local;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::api::{DataSource, StatusReport};
use crate::error::TransportError;
use crate::schedule::ScheduledTask;
use crate::storage::{Store, LAST_TRAIN_RUN_KEY};

pub const TRIGGERING_MESSAGE: &str = "Triggering training...";
pub const TRIGGERED_MESSAGE: &str = "Training triggered successfully. Starting polling...";
pub const TRIGGER_FAILED_MESSAGE: &str = "Failed to trigger training. Check server logs.";
pub const UNREACHABLE_MESSAGE: &str = "Error connecting to AI server.";
pub const INACTIVE_MESSAGE: &str = "Model training is currently inactive.";

/// Status as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStatus {
    Idle,
    Queued,
    Training,
    Complete,
    Error,
    Unknown(String),
}

impl ServerStatus {
    /// Case-insensitive; also accepts the AI server's own vocabulary.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "idle" => ServerStatus::Idle,
            "queued" => ServerStatus::Queued,
            "training" | "running" => ServerStatus::Training,
            "complete" | "success" => ServerStatus::Complete,
            "error" | "failed" => ServerStatus::Error,
            _ => ServerStatus::Unknown(raw.to_string()),
        }
    }
}

/// What the training panel shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    Idle,
    Queued,
    Training,
    Success,
    Error,
    Unknown,
}

impl TrainingPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrainingPhase::Success | TrainingPhase::Error)
    }
}

impl fmt::Display for TrainingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrainingPhase::Idle => "Idle",
            TrainingPhase::Queued => "Queued",
            TrainingPhase::Training => "Training",
            TrainingPhase::Success => "Success",
            TrainingPhase::Error => "Error",
            TrainingPhase::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Mount,
    Poll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckTicket {
    seq: u64,
    kind: CheckKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Phase updated; polling continues if `polling`.
    Applied { phase: TrainingPhase, polling: bool },
    /// Server reported completion; the caller persists the timestamp.
    Completed,
    /// Another check is still in flight; its answer will be applied instead.
    Skipped,
    Stale,
}

#[derive(Debug, Clone)]
pub struct TrainingState {
    phase: TrainingPhase,
    message: String,
    polling: bool,
    last_success: Option<String>,
    issued: u64,
    in_flight: Option<u64>,
    live: bool,
}

impl TrainingState {
    pub fn new(last_success: Option<String>) -> Self {
        Self {
            phase: TrainingPhase::Idle,
            message: INACTIVE_MESSAGE.to_string(),
            polling: false,
            last_success,
            issued: 0,
            in_flight: None,
            live: true,
        }
    }

    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn last_success(&self) -> Option<&str> {
        self.last_success.as_deref()
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// `None` after close or while an earlier check is still outstanding.
    /// At most one check is in flight, so the one that answers is always the
    /// latest issued.
    pub fn begin_check(&mut self, kind: CheckKind) -> Option<CheckTicket> {
        if !self.live || self.in_flight.is_some() {
            return None;
        }
        self.issued += 1;
        self.in_flight = Some(self.issued);
        Some(CheckTicket {
            seq: self.issued,
            kind,
        })
    }

    /// Force `Queued` and invalidate every check still in flight.
    pub fn begin_trigger(&mut self) -> bool {
        if !self.live {
            return false;
        }
        self.issued += 1;
        self.in_flight = None;
        self.phase = TrainingPhase::Queued;
        self.message = TRIGGERING_MESSAGE.to_string();
        true
    }

    pub fn finish_trigger(&mut self, result: &Result<serde_json::Value, TransportError>) {
        if !self.live {
            return;
        }
        match result {
            Ok(_) => {
                self.message = TRIGGERED_MESSAGE.to_string();
                self.polling = true;
            }
            Err(_) => {
                self.phase = TrainingPhase::Error;
                self.message = TRIGGER_FAILED_MESSAGE.to_string();
                self.polling = false;
            }
        }
    }

    pub fn complete_check(
        &mut self,
        ticket: CheckTicket,
        result: Result<StatusReport, TransportError>,
    ) -> CheckOutcome {
        if !self.live || self.in_flight != Some(ticket.seq) {
            return CheckOutcome::Stale;
        }
        self.in_flight = None;
        if ticket.kind == CheckKind::Poll && !self.polling {
            return CheckOutcome::Stale;
        }
        let report = match result {
            Ok(report) => report,
            Err(_) => {
                self.phase = TrainingPhase::Error;
                self.message = UNREACHABLE_MESSAGE.to_string();
                self.polling = false;
                return CheckOutcome::Applied {
                    phase: self.phase,
                    polling: false,
                };
            }
        };
        self.message = report.message;
        match ServerStatus::parse(&report.status) {
            ServerStatus::Complete => {
                self.phase = TrainingPhase::Success;
                self.polling = false;
                return CheckOutcome::Completed;
            }
            ServerStatus::Error => {
                self.phase = TrainingPhase::Error;
                self.polling = false;
            }
            ServerStatus::Idle => {
                self.phase = TrainingPhase::Idle;
                self.polling = false;
            }
            ServerStatus::Training => {
                self.phase = TrainingPhase::Training;
                self.polling = true;
            }
            ServerStatus::Queued => {
                self.phase = TrainingPhase::Queued;
                self.polling = true;
            }
            ServerStatus::Unknown(raw) => {
                debug!(status = %raw, "unrecognised training status");
                self.phase = TrainingPhase::Unknown;
            }
        }
        CheckOutcome::Applied {
            phase: self.phase,
            polling: self.polling,
        }
    }

    pub fn record_success(&mut self, stamp: String) {
        self.last_success = Some(stamp);
    }

    pub fn close(&mut self) {
        self.live = false;
        self.in_flight = None;
        self.polling = false;
    }
}

/// Locale-style timestamp, e.g. `3/14/2025, 9:05:07 PM`.
pub fn success_timestamp() -> String {
    Local::now().format("%-m/%-d/%Y, %-I:%M:%S %p").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSnapshot {
    pub phase: TrainingPhase,
    pub message: String,
    pub polling: bool,
    pub last_success: Option<String>,
}

#[derive(Clone)]
pub struct TrainingController {
    source: Arc<dyn DataSource>,
    store: Store,
    state: Arc<Mutex<TrainingState>>,
}

impl TrainingController {
    /// Reads the last successful run from the store; does not contact the
    /// backend. Call `mount` for the initial status check.
    pub async fn open(source: Arc<dyn DataSource>, store: Store) -> Result<Self> {
        let last_success = store.get(LAST_TRAIN_RUN_KEY).await?;
        Ok(Self {
            source,
            store,
            state: Arc::new(Mutex::new(TrainingState::new(last_success))),
        })
    }

    /// Initial status check. Leaves polling on if a run is already going.
    pub async fn mount(&self) -> TrainingSnapshot {
        self.check(CheckKind::Mount).await;
        self.snapshot().await
    }

    /// Trigger a new run. Polling starts on success regardless of the
    /// previous phase.
    #[instrument(skip_all)]
    pub async fn start(&self) -> TrainingSnapshot {
        if !self.state.lock().await.begin_trigger() {
            return self.snapshot().await;
        }
        info!("triggering training run");
        let result = self.source.trigger_training().await;
        match &result {
            Ok(body) => debug!(%body, "training triggered"),
            Err(err) => error!(?err, "failed to trigger training"),
        }
        self.state.lock().await.finish_trigger(&result);
        self.snapshot().await
    }

    #[instrument(skip_all, fields(kind = ?kind))]
    pub async fn check(&self, kind: CheckKind) -> CheckOutcome {
        let ticket = {
            let mut state = self.state.lock().await;
            if !state.is_live() {
                return CheckOutcome::Stale;
            }
            match state.begin_check(kind) {
                Some(ticket) => ticket,
                None => {
                    debug!("status check already in flight");
                    return CheckOutcome::Skipped;
                }
            }
        };
        let result = self.source.training_status().await;
        if let Err(err) = &result {
            warn!(?err, "training status check failed");
        }

        // Hold the lock through the store write so nobody observes polling
        // stopped before the timestamp is durable.
        let mut state = self.state.lock().await;
        let outcome = state.complete_check(ticket, result);
        if outcome == CheckOutcome::Completed {
            let stamp = success_timestamp();
            match self.store.set(LAST_TRAIN_RUN_KEY, &stamp).await {
                Ok(()) => info!(last_success = %stamp, "training completed"),
                Err(err) => error!(?err, "failed to persist last training run"),
            }
            state.record_success(stamp);
        }
        outcome
    }

    /// Poll every `every` until polling stops, then return the final phase.
    /// Ticks do not wait for the previous round trip; a tick that finds a
    /// check still outstanding is skipped.
    pub async fn poll_until_terminal(&self, every: Duration) -> TrainingSnapshot {
        let mut ticker = time::interval_at(Instant::now() + every, every);
        loop {
            if !self.state.lock().await.is_polling() {
                break;
            }
            ticker.tick().await;
            if !self.state.lock().await.is_polling() {
                break;
            }
            let this = self.clone();
            tokio::spawn(async move {
                this.check(CheckKind::Poll).await;
            });
        }
        self.snapshot().await
    }

    /// Background poller bound to the returned handle.
    pub fn spawn_poller(&self, every: Duration) -> ScheduledTask {
        let this = self.clone();
        ScheduledTask::every("training-poll", every, move || {
            let this = this.clone();
            async move {
                if this.is_polling().await {
                    this.check(CheckKind::Poll).await;
                }
            }
        })
    }

    pub async fn is_polling(&self) -> bool {
        self.state.lock().await.is_polling()
    }

    pub async fn close(&self) {
        self.state.lock().await.close();
    }

    pub async fn snapshot(&self) -> TrainingSnapshot {
        let state = self.state.lock().await;
        TrainingSnapshot {
            phase: state.phase(),
            message: state.message().to_string(),
            polling: state.is_polling(),
            last_success: state.last_success().map(str::to_string),
        }
    }
}
