//! Incremental pagination with first-seen-wins deduplication.
//!
//! A `ListState` accumulates records for one resource view. Requests are
//! issued through `PageTicket`s carrying a sequence number. Load-more and
//! refresh each allow one outstanding request, so the ticket that answers is
//! always the latest issued on its path; nothing applies once the list is
//! closed. `ListController` drives the state against a `DataSource`.
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::api::DataSource;
use crate::error::TransportError;
use crate::model::{KeySpec, PageCursor, PageRequest, Record, ResourceKind};
use crate::schedule::ScheduledTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    LoadMore,
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTicket {
    seq: u64,
    page: u32,
    kind: FetchKind,
}

impl PageTicket {
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn kind(&self) -> FetchKind {
        self.kind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// `added` new records were appended; duplicates were dropped.
    Merged { added: usize },
    /// The page was empty. Nothing more to load.
    Exhausted,
    Failed,
    /// A newer request was issued or the list was closed; result dropped.
    Stale,
}

/// What a view shows for a list.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewStatus {
    Loading,
    Error(String),
    Populated,
}

#[derive(Debug, Clone)]
pub struct ListState {
    key: KeySpec,
    records: Vec<Record>,
    seen: HashSet<String>,
    cursor: PageCursor,
    exhausted: bool,
    error: Option<String>,
    issued: u64,
    more_in_flight: Option<u64>,
    refresh_in_flight: Option<u64>,
    live: bool,
}

impl ListState {
    pub fn new(key: KeySpec, page_size: u32) -> Self {
        Self {
            key,
            records: Vec::new(),
            seen: HashSet::new(),
            cursor: PageCursor::new(page_size),
            exhausted: false,
            error: None,
            issued: 0,
            more_in_flight: None,
            refresh_in_flight: None,
            live: true,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    /// True while any page request is outstanding.
    pub fn is_loading(&self) -> bool {
        self.more_in_flight.is_some() || self.refresh_in_flight.is_some()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn status(&self) -> ViewStatus {
        if let Some(err) = &self.error {
            return ViewStatus::Error(err.clone());
        }
        let nothing_yet = self.cursor.page == 0 && !self.exhausted;
        if self.records.is_empty() && (self.is_loading() || nothing_yet) {
            return ViewStatus::Loading;
        }
        ViewStatus::Populated
    }

    /// Start fetching the page after the cursor. `None` while a load-more is
    /// outstanding, once exhausted, or after close. An outstanding refresh
    /// does not block it.
    pub fn begin_load_more(&mut self) -> Option<PageTicket> {
        if self.more_in_flight.is_some() || self.exhausted || !self.live {
            return None;
        }
        Some(self.issue(self.cursor.next_page(), FetchKind::LoadMore))
    }

    /// Start re-fetching page 1. `None` while a refresh is outstanding or
    /// after close.
    pub fn begin_refresh(&mut self) -> Option<PageTicket> {
        if self.refresh_in_flight.is_some() || !self.live {
            return None;
        }
        Some(self.issue(1, FetchKind::Refresh))
    }

    fn slot(&mut self, kind: FetchKind) -> &mut Option<u64> {
        match kind {
            FetchKind::LoadMore => &mut self.more_in_flight,
            FetchKind::Refresh => &mut self.refresh_in_flight,
        }
    }

    fn issue(&mut self, page: u32, kind: FetchKind) -> PageTicket {
        self.issued += 1;
        let seq = self.issued;
        *self.slot(kind) = Some(seq);
        PageTicket {
            seq,
            page,
            kind,
        }
    }

    pub fn request_for(&self, ticket: &PageTicket) -> PageRequest {
        PageRequest {
            page: ticket.page,
            limit: self.cursor.size,
        }
    }

    pub fn complete(
        &mut self,
        ticket: PageTicket,
        result: Result<Vec<Record>, TransportError>,
    ) -> MergeOutcome {
        if !self.live || *self.slot(ticket.kind) != Some(ticket.seq) {
            return MergeOutcome::Stale;
        }
        *self.slot(ticket.kind) = None;
        match result {
            Ok(records) if records.is_empty() => {
                self.error = None;
                match ticket.kind {
                    FetchKind::LoadMore => {
                        self.exhausted = true;
                        MergeOutcome::Exhausted
                    }
                    FetchKind::Refresh => MergeOutcome::Merged { added: 0 },
                }
            }
            Ok(records) => {
                self.error = None;
                let added = self.merge(records);
                if ticket.kind == FetchKind::LoadMore {
                    self.cursor.page = ticket.page;
                }
                MergeOutcome::Merged { added }
            }
            Err(err) => {
                self.error = Some(err.to_string());
                MergeOutcome::Failed
            }
        }
    }

    /// Append records whose key has not been seen. Returns how many were added.
    pub fn merge(&mut self, records: Vec<Record>) -> usize {
        let before = self.records.len();
        for record in records {
            if self.seen.insert(self.key.key_of(&record)) {
                self.records.push(record);
            }
        }
        self.records.len() - before
    }

    /// Tear the list down. Results arriving later are ignored.
    pub fn close(&mut self) {
        self.live = false;
        self.more_in_flight = None;
        self.refresh_in_flight = None;
    }
}

/// First-seen-wins deduplication of a single batch.
pub fn dedup_by_key(key: &KeySpec, records: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(key.key_of(record)))
        .collect()
}

/// Point-in-time copy of a list for rendering.
#[derive(Debug, Clone)]
pub struct ListSnapshot {
    pub resource: ResourceKind,
    pub records: Vec<Record>,
    pub cursor: PageCursor,
    pub loading: bool,
    pub exhausted: bool,
    pub status: ViewStatus,
}

#[derive(Clone)]
pub struct ListController {
    source: Arc<dyn DataSource>,
    resource: ResourceKind,
    state: Arc<Mutex<ListState>>,
}

impl ListController {
    pub fn new(source: Arc<dyn DataSource>, resource: ResourceKind, page_size: u32) -> Self {
        Self::with_key(source, resource, resource.natural_key(), page_size)
    }

    pub fn with_key(
        source: Arc<dyn DataSource>,
        resource: ResourceKind,
        key: KeySpec,
        page_size: u32,
    ) -> Self {
        Self {
            source,
            resource,
            state: Arc::new(Mutex::new(ListState::new(key, page_size))),
        }
    }

    pub fn resource(&self) -> ResourceKind {
        self.resource
    }

    /// Initial load when the view mounts: page 1 through the load-more path.
    pub async fn mount(&self) -> Option<MergeOutcome> {
        self.load_more().await
    }

    /// Fetch the next page. `None` when the call was a no-op.
    #[instrument(skip_all, fields(resource = %self.resource))]
    pub async fn load_more(&self) -> Option<MergeOutcome> {
        let (ticket, request) = {
            let mut state = self.state.lock().await;
            let ticket = state.begin_load_more()?;
            (ticket, state.request_for(&ticket))
        };
        Some(self.run(ticket, request).await)
    }

    /// Re-fetch page 1 and merge anything new. `None` when a refresh is
    /// already in flight.
    #[instrument(skip_all, fields(resource = %self.resource))]
    pub async fn refresh(&self) -> Option<MergeOutcome> {
        let (ticket, request) = {
            let mut state = self.state.lock().await;
            let ticket = state.begin_refresh()?;
            (ticket, state.request_for(&ticket))
        };
        Some(self.run(ticket, request).await)
    }

    async fn run(&self, ticket: PageTicket, request: PageRequest) -> MergeOutcome {
        debug!(page = request.page, limit = request.limit, kind = ?ticket.kind(), "fetching page");
        let result = self.source.fetch_page(self.resource, request).await;
        if let Err(err) = &result {
            warn!(?err, page = request.page, "page fetch failed");
        }
        let outcome = self.state.lock().await.complete(ticket, result);
        match outcome {
            MergeOutcome::Merged { added } => {
                info!(page = request.page, added, "page merged")
            }
            MergeOutcome::Exhausted => info!(page = request.page, "no more pages"),
            MergeOutcome::Stale => debug!(page = request.page, "discarded stale page"),
            MergeOutcome::Failed => {}
        }
        outcome
    }

    /// Re-fetch page 1 every `every` until the returned task is dropped.
    pub fn spawn_refresh(&self, every: Duration) -> ScheduledTask {
        let this = self.clone();
        ScheduledTask::every("list-refresh", every, move || {
            let this = this.clone();
            async move {
                this.refresh().await;
            }
        })
    }

    pub async fn close(&self) {
        self.state.lock().await.close();
    }

    pub async fn snapshot(&self) -> ListSnapshot {
        let state = self.state.lock().await;
        ListSnapshot {
            resource: self.resource,
            records: state.records().to_vec(),
            cursor: state.cursor(),
            loading: state.is_loading(),
            exhausted: state.is_exhausted(),
            status: state.status(),
        }
    }
}
