mod common;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use steelvis::api::{DataSource, StatusReport};
use steelvis::error::TransportError;
use steelvis::model::{KeySpec, PageRequest, Record, ResourceKind};
use steelvis::paginate::{ListController, MergeOutcome, ViewStatus};
use steelvis::upload::UploadTable;
use tokio::sync::Notify;

use common::{records, unavailable, RecordingSource};

fn ids(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_i64))
        .collect()
}

fn id_list(source: Arc<dyn DataSource>) -> ListController {
    ListController::with_key(source, ResourceKind::Trains, KeySpec::new(["id"]), 2)
}

#[tokio::test]
async fn load_more_merges_pages_until_empty() {
    let source = RecordingSource::with_pages(vec![
        Ok(records(json!([{"id": 1}, {"id": 2}]))),
        Ok(records(json!([{"id": 2}, {"id": 3}]))),
        Ok(Vec::new()),
    ]);
    let list = id_list(Arc::new(source.clone()));

    assert_eq!(list.mount().await, Some(MergeOutcome::Merged { added: 2 }));
    assert_eq!(list.load_more().await, Some(MergeOutcome::Merged { added: 1 }));
    assert_eq!(list.load_more().await, Some(MergeOutcome::Exhausted));
    // exhausted lists issue nothing
    assert_eq!(list.load_more().await, None);

    let snap = list.snapshot().await;
    assert_eq!(ids(&snap.records), vec![1, 2, 3]);
    assert!(snap.exhausted);
    assert!(!snap.loading);
    assert_eq!(snap.cursor.page, 2);
    assert_eq!(snap.status, ViewStatus::Populated);

    let calls = source.page_calls().await;
    let pages: Vec<u32> = calls.iter().map(|(_, req)| req.page).collect();
    assert_eq!(pages, vec![1, 2, 3]);
    assert!(calls
        .iter()
        .all(|(kind, req)| *kind == ResourceKind::Trains && req.limit == 2));
}

#[tokio::test]
async fn failed_page_keeps_cursor_and_retries_same_page() {
    let source = RecordingSource::with_pages(vec![
        Ok(records(json!([{"id": 1}]))),
        Err(unavailable()),
        Ok(records(json!([{"id": 2}]))),
    ]);
    let list = id_list(Arc::new(source.clone()));

    list.mount().await;
    assert_eq!(list.load_more().await, Some(MergeOutcome::Failed));
    let snap = list.snapshot().await;
    assert_eq!(ids(&snap.records), vec![1]);
    assert_eq!(snap.cursor.page, 1);
    assert!(!snap.exhausted);
    assert!(matches!(snap.status, ViewStatus::Error(_)));

    assert_eq!(list.load_more().await, Some(MergeOutcome::Merged { added: 1 }));
    let snap = list.snapshot().await;
    assert_eq!(ids(&snap.records), vec![1, 2]);
    assert_eq!(snap.status, ViewStatus::Populated);

    let pages: Vec<u32> = source.page_calls().await.iter().map(|(_, r)| r.page).collect();
    assert_eq!(pages, vec![1, 2, 2]);
}

#[tokio::test]
async fn first_page_failure_shows_error_state() {
    let source = RecordingSource::with_pages(vec![Err(unavailable())]);
    let list = id_list(Arc::new(source));

    assert_eq!(list.mount().await, Some(MergeOutcome::Failed));
    let snap = list.snapshot().await;
    assert!(snap.records.is_empty());
    assert_eq!(snap.cursor.page, 0);
    assert!(matches!(snap.status, ViewStatus::Error(_)));
}

#[tokio::test]
async fn refresh_appends_only_new_rows() {
    let source = RecordingSource::with_pages(vec![
        Ok(records(json!([{"id": 1}, {"id": 2}]))),
        Ok(records(json!([{"id": 9}, {"id": 1}]))),
    ]);
    let list = id_list(Arc::new(source.clone()));

    list.mount().await;
    assert_eq!(list.refresh().await, Some(MergeOutcome::Merged { added: 1 }));

    let snap = list.snapshot().await;
    assert_eq!(ids(&snap.records), vec![1, 2, 9]);
    // refresh never advances the cursor
    assert_eq!(snap.cursor.page, 1);
    let pages: Vec<u32> = source.page_calls().await.iter().map(|(_, r)| r.page).collect();
    assert_eq!(pages, vec![1, 1]);
}

#[tokio::test]
async fn scheduled_refresh_runs_until_dropped() {
    let source = RecordingSource::with_pages(vec![
        Ok(records(json!([{"id": 1}]))),
        Ok(records(json!([{"id": 1}, {"id": 5}]))),
    ]);
    let list = id_list(Arc::new(source.clone()));
    list.mount().await;

    let task = list.spawn_refresh(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(45)).await;
    drop(task);
    let calls_after_drop = source.page_calls().await.len();
    assert!(calls_after_drop >= 3, "expected refreshes, got {calls_after_drop} calls");

    let snap = list.snapshot().await;
    assert_eq!(ids(&snap.records), vec![1, 5]);
    // empty refresh pages do not mark the list exhausted
    assert!(!snap.exhausted);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(source.page_calls().await.len(), calls_after_drop);
}

/// Blocks page 2 until released; every other page answers immediately.
#[derive(Clone)]
struct GatedSource {
    release: Arc<Notify>,
    first_page: Vec<Record>,
    second_page: Vec<Record>,
}

#[async_trait]
impl DataSource for GatedSource {
    async fn fetch_page(
        &self,
        _resource: ResourceKind,
        page: PageRequest,
    ) -> Result<Vec<Record>, TransportError> {
        if page.page == 2 {
            self.release.notified().await;
            return Ok(self.second_page.clone());
        }
        Ok(self.first_page.clone())
    }

    async fn fetch_all(&self, _resource: ResourceKind) -> Result<Vec<Record>, TransportError> {
        Ok(Vec::new())
    }

    async fn trigger_training(&self) -> Result<Value, TransportError> {
        Ok(Value::Null)
    }

    async fn training_status(&self) -> Result<StatusReport, TransportError> {
        Ok(StatusReport::new("Idle", ""))
    }

    async fn upload_table(
        &self,
        _table: UploadTable,
        _file_name: &str,
        _bytes: Vec<u8>,
    ) -> Result<Value, TransportError> {
        Ok(Value::Null)
    }
}

fn gated() -> (GatedSource, Arc<Notify>) {
    let release = Arc::new(Notify::new());
    let source = GatedSource {
        release: release.clone(),
        first_page: records(json!([{"id": 1}, {"id": 7}])),
        second_page: records(json!([{"id": 20}, {"id": 21}])),
    };
    (source, release)
}

#[tokio::test]
async fn refresh_does_not_discard_in_flight_load_more() {
    let (source, release) = gated();
    let list = id_list(Arc::new(source));
    list.mount().await;

    let pending = {
        let list = list.clone();
        tokio::spawn(async move { list.load_more().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(list.snapshot().await.loading);

    assert_eq!(list.refresh().await, Some(MergeOutcome::Merged { added: 0 }));
    assert!(list.snapshot().await.loading);
    release.notify_one();
    assert_eq!(pending.await.unwrap(), Some(MergeOutcome::Merged { added: 2 }));

    let snap = list.snapshot().await;
    assert_eq!(ids(&snap.records), vec![1, 7, 20, 21]);
    assert_eq!(snap.cursor.page, 2);
    assert!(!snap.loading);
}

/// Answers every page after a fixed delay: page n holds ids n*10 and n*10+1,
/// page 3 onwards is empty.
#[derive(Clone, Default)]
struct SlowSource {
    latency: Duration,
    page_calls: Arc<tokio::sync::Mutex<Vec<u32>>>,
}

#[async_trait]
impl DataSource for SlowSource {
    async fn fetch_page(
        &self,
        _resource: ResourceKind,
        page: PageRequest,
    ) -> Result<Vec<Record>, TransportError> {
        self.page_calls.lock().await.push(page.page);
        tokio::time::sleep(self.latency).await;
        let base = i64::from(page.page) * 10;
        if page.page > 2 {
            return Ok(Vec::new());
        }
        Ok(records(json!([{"id": base}, {"id": base + 1}])))
    }

    async fn fetch_all(&self, _resource: ResourceKind) -> Result<Vec<Record>, TransportError> {
        Ok(Vec::new())
    }

    async fn trigger_training(&self) -> Result<Value, TransportError> {
        Ok(Value::Null)
    }

    async fn training_status(&self) -> Result<StatusReport, TransportError> {
        Ok(StatusReport::new("Idle", ""))
    }

    async fn upload_table(
        &self,
        _table: UploadTable,
        _file_name: &str,
        _bytes: Vec<u8>,
    ) -> Result<Value, TransportError> {
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn refresh_slower_than_its_interval_still_lands() {
    let source = SlowSource {
        latency: Duration::from_millis(50),
        ..Default::default()
    };
    let list = id_list(Arc::new(source.clone()));

    let task = list.spawn_refresh(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(300)).await;

    let snap = list.snapshot().await;
    assert_eq!(ids(&snap.records), vec![10, 11]);
    assert_eq!(snap.status, ViewStatus::Populated);
    // overlapping ticks were skipped instead of piling up requests
    let refreshes = source.page_calls.lock().await.len();
    assert!(refreshes <= 6, "expected coalesced refreshes, got {refreshes}");

    // load more is not starved by the running refresh timer
    assert_eq!(list.load_more().await, Some(MergeOutcome::Merged { added: 0 }));
    assert_eq!(list.load_more().await, Some(MergeOutcome::Merged { added: 2 }));
    assert_eq!(list.load_more().await, Some(MergeOutcome::Exhausted));
    drop(task);

    let snap = list.snapshot().await;
    assert_eq!(ids(&snap.records), vec![10, 11, 20, 21]);
    assert!(snap.exhausted);
    assert_eq!(snap.cursor.page, 2);
}

#[tokio::test]
async fn closed_list_ignores_late_pages() {
    let (source, release) = gated();
    let list = id_list(Arc::new(source));
    list.mount().await;

    let pending = {
        let list = list.clone();
        tokio::spawn(async move { list.load_more().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    list.close().await;
    release.notify_one();

    assert_eq!(pending.await.unwrap(), Some(MergeOutcome::Stale));
    assert_eq!(ids(&list.snapshot().await.records), vec![1, 7]);
    assert_eq!(list.refresh().await, None);
    assert_eq!(list.load_more().await, None);
}

#[tokio::test]
async fn natural_key_dedup_for_vessels() {
    let source = RecordingSource::with_pages(vec![
        Ok(records(json!([
            {"vessel_id": "V1", "load_port": "Paradip", "vessel_name": "Ocean Star"},
            {"vessel_id": "V1", "load_port": "Haldia", "vessel_name": "Ocean Star"}
        ]))),
        Ok(records(json!([
            {"vessel_id": "V1", "load_port": "Paradip", "vessel_name": "renamed"}
        ]))),
    ]);
    let list = ListController::new(Arc::new(source), ResourceKind::Vessels, 20);
    list.mount().await;
    assert_eq!(list.load_more().await, Some(MergeOutcome::Merged { added: 0 }));

    let snap = list.snapshot().await;
    assert_eq!(snap.records.len(), 2);
    assert_eq!(snap.records[0]["vessel_name"], json!("Ocean Star"));
}
