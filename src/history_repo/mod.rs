// SQLite history of summary reports. The flat mapping is stored as JSON text.

use crate::models::{HistoryEntry, SummaryMap, SummaryReport, TemplateFailure};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

pub struct HistoryRepo {
    pool: SqlitePool,
    retention_ms: i64,
}

impl HistoryRepo {
    pub async fn connect(path: &str, retention_days: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        let retention_ms = (retention_days as i64) * 24 * 60 * 60 * 1000;
        Ok(Self { pool, retention_ms })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS summary_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at INTEGER NOT NULL,
                window_start INTEGER NOT NULL,
                window_end INTEGER NOT NULL,
                summary_data TEXT NOT NULL,
                failure_data TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_summary_created_at ON summary_history(created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores one report; `created_at` is epoch milliseconds.
    #[instrument(skip(self, report), fields(repo = "history", operation = "save_report", values_count = report.values.len()))]
    pub async fn save_report(&self, report: &SummaryReport, created_at: i64) -> anyhow::Result<()> {
        let summary_data = serde_json::to_string(&report.values)?;
        let failure_data = serde_json::to_string(&report.failures)?;
        sqlx::query(
            "INSERT INTO summary_history (created_at, window_start, window_end, summary_data, failure_data) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(created_at)
        .bind(report.window.start())
        .bind(report.window.end())
        .bind(&summary_data)
        .bind(&failure_data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent `limit` entries, oldest first.
    pub async fn get_recent(&self, limit: u32) -> anyhow::Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            "SELECT created_at, window_start, window_end, summary_data, failure_data
             FROM summary_history ORDER BY id DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = rows
            .iter()
            .map(Self::parse_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        out.reverse();
        Ok(out)
    }

    /// Entries with created_at in [from_ts, to_ts), ascending.
    #[instrument(skip(self), fields(repo = "history", operation = "get_by_time_range"))]
    pub async fn get_by_time_range(
        &self,
        from_ts: i64,
        to_ts: i64,
    ) -> anyhow::Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            "SELECT created_at, window_start, window_end, summary_data, failure_data
             FROM summary_history WHERE created_at >= $1 AND created_at < $2 ORDER BY created_at ASC",
        )
        .bind(from_ts)
        .bind(to_ts)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_row).collect()
    }

    #[instrument(skip(self), fields(repo = "history", operation = "prune_old_data"))]
    pub async fn prune_old_data(&self) -> anyhow::Result<u64> {
        let cutoff = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_millis() as i64)
            - self.retention_ms;
        self.prune_before(cutoff).await
    }

    /// Deletes entries created before `cutoff_ts`; returns rows removed.
    pub async fn prune_before(&self, cutoff_ts: i64) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM summary_history WHERE created_at < $1")
            .bind(cutoff_ts)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    fn parse_row(row: &SqliteRow) -> anyhow::Result<HistoryEntry> {
        let summary_data: String = row.try_get("summary_data")?;
        let failure_data: String = row.try_get("failure_data")?;
        let values: SummaryMap = serde_json::from_str(&summary_data)?;
        let failures: Vec<TemplateFailure> = serde_json::from_str(&failure_data)?;
        Ok(HistoryEntry {
            created_at: row.try_get("created_at")?,
            window_start: row.try_get("window_start")?,
            window_end: row.try_get("window_end")?,
            values,
            failures,
        })
    }
}
