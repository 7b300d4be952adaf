use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::store::{DeleteScope, SharedStore, StoreResult};

/// Removes readings older than the retention horizon on a fixed interval.
pub struct RetentionService {
    store: SharedStore,
    retention_days: u32,
    interval: Duration,
}

impl RetentionService {
    pub fn new(store: SharedStore, retention_days: u32, interval: Duration) -> Self {
        Self {
            store,
            retention_days,
            interval,
        }
    }

    pub fn start(self, cancel: CancellationToken) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = self.sweep(Utc::now()).await {
                            tracing::warn!("retention sweep failed: {err:#}");
                        }
                    }
                }
            }
        });
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let cutoff = retention_cutoff(now, self.retention_days);
        let deleted = self.store.delete_range(DeleteScope::Before(cutoff)).await?;
        if deleted > 0 {
            tracing::info!(deleted, %cutoff, "expired readings removed");
        }
        Ok(deleted)
    }
}

pub fn retention_cutoff(now: DateTime<Utc>, retention_days: u32) -> DateTime<Utc> {
    now - chrono::Duration::days(i64::from(retention_days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryReadingStore, ReadingPatch, ReadingStore};
    use crate::time::Bucket;
    use chrono::TimeZone;
    use std::sync::Arc;

    #[tokio::test]
    async fn sweep_removes_only_expired_records() {
        let now = Utc
            .with_ymd_and_hms(2025, 6, 30, 12, 0, 0)
            .single()
            .expect("utc");
        let store = Arc::new(MemoryReadingStore::new());
        let old = Bucket::floor(now - chrono::Duration::days(31));
        let edge = Bucket::floor(now - chrono::Duration::days(30));
        let fresh = Bucket::floor(now - chrono::Duration::days(2));
        for bucket in [old, edge, fresh] {
            store
                .upsert_partial(bucket, &ReadingPatch::actual(1.0))
                .await
                .expect("seed");
        }

        let service = RetentionService::new(store.clone(), 30, Duration::from_secs(3600));
        assert_eq!(service.sweep(now).await.expect("sweep"), 1);
        assert!(store.get(old).await.expect("get").is_none());
        assert!(store.get(edge).await.expect("get").is_some());
        assert!(store.get(fresh).await.expect("get").is_some());
    }
}
