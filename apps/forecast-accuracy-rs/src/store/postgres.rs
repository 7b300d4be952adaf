use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::OnceCell;

use super::{
    DeleteScope, IndexInfo, ReadingPatch, ReadingRecord, ReadingStore, RecordFilter, StoreError,
    StoreResult,
};
use crate::time::Bucket;

const TABLE: &str = "temperature_readings";

const CANONICAL_INDEXES: [(&str, &str); 1] = [(
    "temperature_readings_actual_recent_idx",
    "CREATE INDEX IF NOT EXISTS temperature_readings_actual_recent_idx \
     ON temperature_readings (target_time DESC) WHERE actual IS NOT NULL",
)];

#[derive(sqlx::FromRow)]
struct ReadingRow {
    target_time: DateTime<Utc>,
    actual: Option<f64>,
    forecast_a: Option<f64>,
    forecast_b: Option<f64>,
}

impl From<ReadingRow> for ReadingRecord {
    fn from(row: ReadingRow) -> Self {
        Self {
            target_time: row.target_time,
            actual: row.actual,
            forecast_a: row.forecast_a,
            forecast_b: row.forecast_b,
        }
    }
}

/// Postgres-backed store. The pool connects lazily and the schema bootstrap
/// runs once per process; a failed bootstrap is retried on the next call.
pub struct PgReadingStore {
    pool: PgPool,
    schema: OnceCell<()>,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema: OnceCell::new(),
        }
    }

    async fn ready(&self) -> StoreResult<&PgPool> {
        self.schema
            .get_or_try_init(|| async {
                ensure_schema(&self.pool).await.map_err(|err| {
                    tracing::error!(error = %err, "reading store schema setup failed");
                    StoreError::Schema(err.to_string())
                })
            })
            .await?;
        Ok(&self.pool)
    }
}

async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS temperature_readings (
            target_time timestamptz PRIMARY KEY,
            actual double precision NULL,
            forecast_a double precision NULL,
            forecast_b double precision NULL,
            updated_at timestamptz NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;
    for (_, ddl) in CANONICAL_INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }
    tracing::info!(table = TABLE, "reading store schema ready");
    Ok(())
}

fn filter_clause(filter: RecordFilter) -> String {
    match filter {
        RecordFilter::Any => "TRUE".to_string(),
        RecordFilter::Has(field) => format!("{} IS NOT NULL", field.column()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn upsert_partial(&self, bucket: Bucket, patch: &ReadingPatch) -> StoreResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let pool = self.ready().await?;
        sqlx::query(
            r#"
            INSERT INTO temperature_readings (target_time, actual, forecast_a, forecast_b, updated_at)
            VALUES ($1, $3, $5, $7, NOW())
            ON CONFLICT (target_time) DO UPDATE SET
                actual = CASE WHEN $2 THEN EXCLUDED.actual ELSE temperature_readings.actual END,
                forecast_a = CASE WHEN $4 THEN EXCLUDED.forecast_a ELSE temperature_readings.forecast_a END,
                forecast_b = CASE WHEN $6 THEN EXCLUDED.forecast_b ELSE temperature_readings.forecast_b END,
                updated_at = NOW()
            "#,
        )
        .bind(bucket.instant())
        .bind(patch.actual.is_some())
        .bind(patch.actual.flatten())
        .bind(patch.forecast_a.is_some())
        .bind(patch.forecast_a.flatten())
        .bind(patch.forecast_b.is_some())
        .bind(patch.forecast_b.flatten())
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn query_range(&self, from: Bucket, to: Bucket) -> StoreResult<Vec<ReadingRecord>> {
        let pool = self.ready().await?;
        let rows: Vec<ReadingRow> = sqlx::query_as(
            r#"
            SELECT target_time, actual, forecast_a, forecast_b
            FROM temperature_readings
            WHERE target_time >= $1
              AND target_time <= $2
            ORDER BY target_time ASC
            "#,
        )
        .bind(from.instant())
        .bind(to.instant())
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(ReadingRecord::from).collect())
    }

    async fn query_recent(
        &self,
        limit: usize,
        filter: RecordFilter,
    ) -> StoreResult<Vec<ReadingRecord>> {
        let pool = self.ready().await?;
        let limit = i64::try_from(limit)
            .map_err(|_| StoreError::Invalid(format!("limit {limit} out of range")))?;
        let sql = format!(
            "SELECT target_time, actual, forecast_a, forecast_b \
             FROM temperature_readings \
             WHERE {} \
             ORDER BY target_time DESC \
             LIMIT $1",
            filter_clause(filter)
        );
        let rows: Vec<ReadingRow> = sqlx::query_as(&sql).bind(limit).fetch_all(pool).await?;
        Ok(rows.into_iter().map(ReadingRecord::from).collect())
    }

    async fn query_since(
        &self,
        since: DateTime<Utc>,
        filter: RecordFilter,
    ) -> StoreResult<Vec<ReadingRecord>> {
        let pool = self.ready().await?;
        let sql = format!(
            "SELECT target_time, actual, forecast_a, forecast_b \
             FROM temperature_readings \
             WHERE target_time >= $1 AND {} \
             ORDER BY target_time ASC",
            filter_clause(filter)
        );
        let rows: Vec<ReadingRow> = sqlx::query_as(&sql).bind(since).fetch_all(pool).await?;
        Ok(rows.into_iter().map(ReadingRecord::from).collect())
    }

    async fn get(&self, bucket: Bucket) -> StoreResult<Option<ReadingRecord>> {
        let pool = self.ready().await?;
        let row: Option<ReadingRow> = sqlx::query_as(
            r#"
            SELECT target_time, actual, forecast_a, forecast_b
            FROM temperature_readings
            WHERE target_time = $1
            "#,
        )
        .bind(bucket.instant())
        .fetch_optional(pool)
        .await?;
        Ok(row.map(ReadingRecord::from))
    }

    async fn delete_by_ids(&self, ids: &[Bucket]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let pool = self.ready().await?;
        let keys: Vec<DateTime<Utc>> = ids.iter().map(|bucket| bucket.instant()).collect();
        let result = sqlx::query("DELETE FROM temperature_readings WHERE target_time = ANY($1)")
            .bind(keys)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_range(&self, scope: DeleteScope) -> StoreResult<u64> {
        let pool = self.ready().await?;
        let result = match scope {
            DeleteScope::All => {
                sqlx::query("DELETE FROM temperature_readings")
                    .execute(pool)
                    .await?
            }
            DeleteScope::Before(cutoff) => {
                sqlx::query("DELETE FROM temperature_readings WHERE target_time < $1")
                    .bind(cutoff)
                    .execute(pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn rebuild_indexes(&self) -> StoreResult<Vec<IndexInfo>> {
        let pool = self.ready().await?;
        let secondary: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT c.relname::text
            FROM pg_index i
            JOIN pg_class c ON c.oid = i.indexrelid
            JOIN pg_class t ON t.oid = i.indrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            WHERE t.relname = $1
              AND n.nspname = current_schema()
              AND NOT i.indisprimary
            "#,
        )
        .bind(TABLE)
        .fetch_all(pool)
        .await?;

        for name in &secondary {
            match sqlx::query(&format!("DROP INDEX IF EXISTS {}", quote_ident(name)))
                .execute(pool)
                .await
            {
                Ok(_) => tracing::info!(index = %name, "dropped index"),
                Err(err) => tracing::warn!(index = %name, error = %err, "failed to drop index"),
            }
        }

        for (name, ddl) in CANONICAL_INDEXES {
            sqlx::query(ddl).execute(pool).await?;
            tracing::info!(index = name, "created index");
        }
        sqlx::query(&format!("REINDEX TABLE {TABLE}"))
            .execute(pool)
            .await?;

        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT indexname::text, indexdef
            FROM pg_indexes
            WHERE tablename = $1
              AND schemaname = current_schema()
            ORDER BY indexname
            "#,
        )
        .bind(TABLE)
        .fetch_all(pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, definition)| IndexInfo { name, definition })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ReadingField;

    #[test]
    fn filter_clause_uses_static_column_names() {
        assert_eq!(filter_clause(RecordFilter::Any), "TRUE");
        assert_eq!(
            filter_clause(RecordFilter::Has(ReadingField::ForecastB)),
            "forecast_b IS NOT NULL"
        );
    }

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("plain_idx"), "\"plain_idx\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
