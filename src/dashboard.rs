//! Multi-resource summary view: plants, ports and logistics fetched together
//! and replaced wholesale on every refresh.
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::api::DataSource;
use crate::model::{Record, ResourceKind};
use crate::paginate::dedup_by_key;
use crate::schedule::ScheduledTask;
use crate::views::DashboardSummary;

pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch data from API.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated,
    Failed,
    /// A refresh was already in flight.
    Skipped,
    Stale,
}

#[derive(Debug, Default)]
struct DashboardState {
    plants: Vec<Record>,
    ports: Vec<Record>,
    logistics: Vec<Record>,
    loaded: bool,
    error: Option<String>,
    issued: u64,
    in_flight: Option<u64>,
    closed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    /// False until the first refresh finished, successfully or not.
    pub loaded: bool,
    pub error: Option<String>,
    pub summary: DashboardSummary,
}

#[derive(Clone)]
pub struct DashboardController {
    source: Arc<dyn DataSource>,
    state: Arc<Mutex<DashboardState>>,
}

impl DashboardController {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(DashboardState::default())),
        }
    }

    /// Fetch all three collections concurrently. Any failure keeps the
    /// previous data and sets the warning. Only one refresh runs at a time.
    #[instrument(skip_all)]
    pub async fn refresh(&self) -> RefreshOutcome {
        let seq = {
            let mut state = self.state.lock().await;
            if state.closed {
                return RefreshOutcome::Stale;
            }
            if state.in_flight.is_some() {
                debug!("dashboard refresh already in flight");
                return RefreshOutcome::Skipped;
            }
            state.issued += 1;
            state.in_flight = Some(state.issued);
            state.issued
        };

        let result = futures::try_join!(
            self.source.fetch_all(ResourceKind::Plants),
            self.source.fetch_all(ResourceKind::Ports),
            self.source.fetch_all(ResourceKind::Logistics),
        );

        let mut state = self.state.lock().await;
        if state.closed || state.in_flight != Some(seq) {
            debug!(seq, "discarded stale dashboard refresh");
            return RefreshOutcome::Stale;
        }
        state.in_flight = None;
        state.loaded = true;
        match result {
            Ok((plants, ports, logistics)) => {
                state.plants = dedup_by_key(&ResourceKind::Plants.natural_key(), plants);
                state.ports = ports;
                state.logistics = dedup_by_key(&ResourceKind::Logistics.natural_key(), logistics);
                state.error = None;
                info!(
                    plants = state.plants.len(),
                    ports = state.ports.len(),
                    logistics = state.logistics.len(),
                    "dashboard refreshed"
                );
                RefreshOutcome::Updated
            }
            Err(err) => {
                warn!(?err, "dashboard refresh failed");
                state.error = Some(FETCH_FAILED_MESSAGE.to_string());
                RefreshOutcome::Failed
            }
        }
    }

    pub fn spawn_refresh(&self, every: Duration) -> ScheduledTask {
        let this = self.clone();
        ScheduledTask::every("dashboard-refresh", every, move || {
            let this = this.clone();
            async move {
                this.refresh().await;
            }
        })
    }

    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.in_flight = None;
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        let state = self.state.lock().await;
        DashboardSnapshot {
            loaded: state.loaded,
            error: state.error.clone(),
            summary: DashboardSummary::compute(&state.plants, &state.ports, &state.logistics),
        }
    }
}
