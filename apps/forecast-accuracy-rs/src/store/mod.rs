//! Reading record storage: one mergeable record per hourly bucket.

mod memory;
mod postgres;

pub use memory::MemoryReadingStore;
pub use postgres::PgReadingStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::time::Bucket;

/// Records expire this many days after their bucket unless configured otherwise.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingField {
    Actual,
    ForecastA,
    ForecastB,
}

impl ReadingField {
    pub const ALL: [ReadingField; 3] = [Self::Actual, Self::ForecastA, Self::ForecastB];

    pub fn column(self) -> &'static str {
        match self {
            Self::Actual => "actual",
            Self::ForecastA => "forecast_a",
            Self::ForecastB => "forecast_b",
        }
    }

    /// Name used on the wire (`forecast_A` / `forecast_B`).
    pub fn label(self) -> &'static str {
        match self {
            Self::Actual => "actual",
            Self::ForecastA => "forecast_A",
            Self::ForecastB => "forecast_B",
        }
    }

    pub fn get(self, record: &ReadingRecord) -> Option<f64> {
        match self {
            Self::Actual => record.actual,
            Self::ForecastA => record.forecast_a,
            Self::ForecastB => record.forecast_b,
        }
    }

    pub fn set(self, record: &mut ReadingRecord, value: Option<f64>) {
        match self {
            Self::Actual => record.actual = value,
            Self::ForecastA => record.forecast_a = value,
            Self::ForecastB => record.forecast_b = value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct ReadingRecord {
    pub target_time: DateTime<Utc>,
    pub actual: Option<f64>,
    #[serde(rename = "forecast_A")]
    pub forecast_a: Option<f64>,
    #[serde(rename = "forecast_B")]
    pub forecast_b: Option<f64>,
}

impl ReadingRecord {
    pub fn empty(bucket: Bucket) -> Self {
        Self {
            target_time: bucket.instant(),
            actual: None,
            forecast_a: None,
            forecast_b: None,
        }
    }

    pub fn bucket(&self) -> Bucket {
        Bucket::floor(self.target_time)
    }
}

/// Fields to merge into a record. `None` leaves the stored value untouched;
/// `Some(None)` explicitly stores null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingPatch {
    pub actual: Option<Option<f64>>,
    pub forecast_a: Option<Option<f64>>,
    pub forecast_b: Option<Option<f64>>,
}

impl ReadingPatch {
    pub fn actual(value: f64) -> Self {
        Self {
            actual: Some(Some(value)),
            ..Self::default()
        }
    }

    pub fn forecasts(forecast_a: Option<f64>, forecast_b: Option<f64>) -> Self {
        Self {
            forecast_a: Some(forecast_a),
            forecast_b: Some(forecast_b),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actual.is_none() && self.forecast_a.is_none() && self.forecast_b.is_none()
    }

    pub fn apply(&self, record: &mut ReadingRecord) {
        if let Some(value) = self.actual {
            record.actual = value;
        }
        if let Some(value) = self.forecast_a {
            record.forecast_a = value;
        }
        if let Some(value) = self.forecast_b {
            record.forecast_b = value;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFilter {
    Any,
    Has(ReadingField),
}

impl RecordFilter {
    pub fn matches(self, record: &ReadingRecord) -> bool {
        match self {
            Self::Any => true,
            Self::Has(field) => field.get(record).is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    All,
    Before(DateTime<Utc>),
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct IndexInfo {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store schema setup failed: {0}")]
    Schema(String),
    #[error("invalid store request: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Merges `patch` into the record for `bucket`, creating it when absent.
    async fn upsert_partial(&self, bucket: Bucket, patch: &ReadingPatch) -> StoreResult<()>;

    /// Records with `from <= target_time <= to`, ascending.
    async fn query_range(&self, from: Bucket, to: Bucket) -> StoreResult<Vec<ReadingRecord>>;

    /// Up to `limit` records matching `filter`, newest first.
    async fn query_recent(
        &self,
        limit: usize,
        filter: RecordFilter,
    ) -> StoreResult<Vec<ReadingRecord>>;

    /// Records with `target_time >= since` matching `filter`, ascending.
    async fn query_since(
        &self,
        since: DateTime<Utc>,
        filter: RecordFilter,
    ) -> StoreResult<Vec<ReadingRecord>>;

    async fn get(&self, bucket: Bucket) -> StoreResult<Option<ReadingRecord>>;

    async fn delete_by_ids(&self, ids: &[Bucket]) -> StoreResult<u64>;

    async fn delete_range(&self, scope: DeleteScope) -> StoreResult<u64>;

    /// Drops secondary indexes and recreates the canonical set.
    async fn rebuild_indexes(&self) -> StoreResult<Vec<IndexInfo>>;
}

pub type SharedStore = Arc<dyn ReadingStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bucket(hour: u32) -> Bucket {
        Bucket::floor(
            Utc.with_ymd_and_hms(2025, 5, 1, hour, 0, 0)
                .single()
                .expect("utc"),
        )
    }

    #[test]
    fn patch_only_touches_supplied_fields() {
        let mut record = ReadingRecord::empty(bucket(1));
        ReadingPatch::actual(10.5).apply(&mut record);
        ReadingPatch::forecasts(Some(11.0), None).apply(&mut record);

        assert_eq!(record.actual, Some(10.5));
        assert_eq!(record.forecast_a, Some(11.0));
        assert_eq!(record.forecast_b, None);

        ReadingPatch::default().apply(&mut record);
        assert_eq!(record.actual, Some(10.5));
    }

    #[test]
    fn record_serializes_with_provider_labels() {
        let mut record = ReadingRecord::empty(bucket(2));
        record.forecast_b = Some(3.0);
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["forecast_B"], serde_json::json!(3.0));
        assert!(value["forecast_A"].is_null());
        assert!(value.get("forecast_a").is_none());
    }

    #[test]
    fn filter_checks_field_presence() {
        let mut record = ReadingRecord::empty(bucket(3));
        assert!(RecordFilter::Any.matches(&record));
        assert!(!RecordFilter::Has(ReadingField::Actual).matches(&record));
        ReadingField::Actual.set(&mut record, Some(1.0));
        assert!(RecordFilter::Has(ReadingField::Actual).matches(&record));
    }
}
