use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{
    DeleteScope, IndexInfo, ReadingPatch, ReadingRecord, ReadingStore, RecordFilter, StoreResult,
};
use crate::time::Bucket;

/// In-process store for local runs (`memory://`) and tests. Same merge
/// semantics as the Postgres store; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryReadingStore {
    records: RwLock<BTreeMap<Bucket, ReadingRecord>>,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn upsert_partial(&self, bucket: Bucket, patch: &ReadingPatch) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .entry(bucket)
            .or_insert_with(|| ReadingRecord::empty(bucket));
        patch.apply(record);
        Ok(())
    }

    async fn query_range(&self, from: Bucket, to: Bucket) -> StoreResult<Vec<ReadingRecord>> {
        if to < from {
            return Ok(Vec::new());
        }
        let records = self.records.read().await;
        Ok(records.range(from..=to).map(|(_, r)| r.clone()).collect())
    }

    async fn query_recent(
        &self,
        limit: usize,
        filter: RecordFilter,
    ) -> StoreResult<Vec<ReadingRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .rev()
            .filter(|record| filter.matches(record))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn query_since(
        &self,
        since: DateTime<Utc>,
        filter: RecordFilter,
    ) -> StoreResult<Vec<ReadingRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|record| record.target_time >= since && filter.matches(record))
            .cloned()
            .collect())
    }

    async fn get(&self, bucket: Bucket) -> StoreResult<Option<ReadingRecord>> {
        Ok(self.records.read().await.get(&bucket).cloned())
    }

    async fn delete_by_ids(&self, ids: &[Bucket]) -> StoreResult<u64> {
        let mut records = self.records.write().await;
        let mut deleted = 0;
        for id in ids {
            if records.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn delete_range(&self, scope: DeleteScope) -> StoreResult<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        match scope {
            DeleteScope::All => records.clear(),
            DeleteScope::Before(cutoff) => records.retain(|_, r| r.target_time >= cutoff),
        }
        Ok((before - records.len()) as u64)
    }

    async fn rebuild_indexes(&self) -> StoreResult<Vec<IndexInfo>> {
        Ok(vec![IndexInfo {
            name: "memory_btree".to_string(),
            definition: "ordered map keyed by target_time".to_string(),
        }])
    }
}
