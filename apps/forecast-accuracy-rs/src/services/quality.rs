//! Sensor health classification and stale-repeat cleanup.

use serde::Serialize;

use crate::services::upstream::SensorSample;
use crate::store::{ReadingField, ReadingRecord, ReadingStore, RecordFilter, StoreResult};
use crate::time::Bucket;

/// How many trailing `actual` values the cleanup pass inspects.
pub const CLEANUP_WINDOW: usize = 12;

/// How many stored `actual` values the stuck check compares against.
pub const STUCK_HISTORY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorHealth {
    Healthy,
    Stuck,
    Offline,
}

impl SensorHealth {
    pub fn writes_actual(self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// `recent_actuals` is newest first. A value equal to both of the last two
/// stored values is treated as a frozen device.
pub fn classify(sample: &SensorSample, recent_actuals: &[f64]) -> SensorHealth {
    if !sample.online {
        return SensorHealth::Offline;
    }
    match recent_actuals {
        [latest, previous, ..] if sample.value == *latest && sample.value == *previous => {
            SensorHealth::Stuck
        }
        _ => SensorHealth::Healthy,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaleRun {
    pub value: f64,
    pub kept: Bucket,
    pub removed: Vec<Bucket>,
}

/// Finds maximal runs of identical `actual` values in chronologically ordered
/// records. The first record of each run is kept; the rest are stale.
pub fn find_stale_runs(records: &[ReadingRecord]) -> Vec<StaleRun> {
    let mut runs = Vec::new();
    let mut current: Option<StaleRun> = None;

    for record in records {
        let Some(value) = record.actual else {
            continue;
        };
        match current.as_mut() {
            Some(run) if run.value == value => run.removed.push(record.bucket()),
            _ => {
                if let Some(done) = current.take() {
                    if !done.removed.is_empty() {
                        runs.push(done);
                    }
                }
                current = Some(StaleRun {
                    value,
                    kept: record.bucket(),
                    removed: Vec::new(),
                });
            }
        }
    }
    if let Some(done) = current {
        if !done.removed.is_empty() {
            runs.push(done);
        }
    }
    runs
}

/// Deletes stale repeats among the last [`CLEANUP_WINDOW`] stored actuals and
/// returns how many records were removed.
pub async fn cleanup_stale_repeats(store: &dyn ReadingStore) -> StoreResult<u64> {
    let mut recent = store
        .query_recent(CLEANUP_WINDOW, RecordFilter::Has(ReadingField::Actual))
        .await?;
    recent.sort_by_key(|record| record.target_time);

    let runs = find_stale_runs(&recent);
    let stale: Vec<Bucket> = runs
        .iter()
        .flat_map(|run| run.removed.iter().copied())
        .collect();
    if stale.is_empty() {
        tracing::info!(inspected = recent.len(), "no stale sensor repeats found");
        return Ok(0);
    }

    for run in &runs {
        tracing::info!(
            value = run.value,
            kept = %run.kept,
            removed = run.removed.len(),
            "removing stale sensor repeats"
        );
    }
    store.delete_by_ids(&stale).await
}
