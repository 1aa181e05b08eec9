//! SQLite-based persistence store

use crate::core::{FailureKind, LogLine, Run, RunStatus, TaskRun};
use crate::persistence::RunStore;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// SQLite run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Open (or create) a store at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            // concurrent read/write for the recorder and history queries
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Private in-memory database, mostly for tests
    pub async fn in_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database, so keep one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Default database location under the user's data directory
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        let db_dir = data_dir.join("hop");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;
        Ok(db_dir.join("hop.sqlite"))
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                pipeline_id TEXT NOT NULL,
                status TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT
            );

            CREATE TABLE IF NOT EXISTS task_runs (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                status TEXT NOT NULL,
                exit_code INTEGER,
                failure TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT,
                FOREIGN KEY(run_id) REFERENCES runs(id)
            );

            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_run_id TEXT NOT NULL,
                level TEXT NOT NULL DEFAULT 'info',
                message TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                FOREIGN KEY(task_run_id) REFERENCES task_runs(id)
            );

            CREATE INDEX IF NOT EXISTS idx_runs_pipeline ON runs(pipeline_id);
            CREATE INDEX IF NOT EXISTS idx_task_runs_run ON task_runs(run_id);
            CREATE INDEX IF NOT EXISTS idx_logs_task_run ON logs(task_run_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize schema")?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn run_from_row(row: &SqliteRow) -> Result<Run> {
        Ok(Run {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            pipeline_id: row.get("pipeline_id"),
            status: row.get::<String, _>("status").parse()?,
            started_at: Self::from_naive(row.get("start_time")),
            ended_at: row.get::<Option<NaiveDateTime>, _>("end_time").map(Self::from_naive),
        })
    }

    fn task_run_from_row(row: &SqliteRow) -> Result<TaskRun> {
        Ok(TaskRun {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            run_id: Uuid::parse_str(&row.get::<String, _>("run_id"))?,
            task_id: row.get("task_id"),
            status: row.get::<String, _>("status").parse()?,
            exit_code: row.get("exit_code"),
            failure: row
                .get::<Option<String>, _>("failure")
                .map(|f| f.parse::<FailureKind>())
                .transpose()?,
            started_at: Self::from_naive(row.get("start_time")),
            ended_at: row.get::<Option<NaiveDateTime>, _>("end_time").map(Self::from_naive),
        })
    }
}

#[async_trait::async_trait]
impl RunStore for SqliteRunStore {
    async fn create_run(&self, run: &Run) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO runs (id, pipeline_id, status, start_time, end_time)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(run.id.to_string())
        .bind(&run.pipeline_id)
        .bind(run.status.as_str())
        .bind(Self::to_naive(run.started_at))
        .bind(run.ended_at.map(Self::to_naive))
        .execute(&self.pool)
        .await
        .context("Failed to create run")?;

        Ok(())
    }

    async fn finish_run(&self, run_id: Uuid, status: RunStatus, ended_at: DateTime<Utc>) -> Result<()> {
        // Terminal rows are never rewritten
        let result = sqlx::query(
            "UPDATE runs SET status = ?1, end_time = ?2 \
             WHERE id = ?3 AND status NOT IN ('completed', 'failed')",
        )
            .bind(status.as_str())
            .bind(Self::to_naive(ended_at))
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to finish run")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Unknown or already finished run {}", run_id);
        }
        Ok(())
    }

    async fn create_task_run(&self, task_run: &TaskRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO task_runs (id, run_id, task_id, status, exit_code, failure, start_time, end_time)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(task_run.id.to_string())
        .bind(task_run.run_id.to_string())
        .bind(&task_run.task_id)
        .bind(task_run.status.as_str())
        .bind(task_run.exit_code)
        .bind(task_run.failure.map(|f| f.as_str()))
        .bind(Self::to_naive(task_run.started_at))
        .bind(task_run.ended_at.map(Self::to_naive))
        .execute(&self.pool)
        .await
        .context("Failed to create task-run")?;

        Ok(())
    }

    async fn finish_task_run(
        &self,
        task_run_id: Uuid,
        status: RunStatus,
        exit_code: Option<i32>,
        failure: Option<FailureKind>,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE task_runs
            SET status = ?1, exit_code = ?2, failure = ?3, end_time = ?4
            WHERE id = ?5 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(status.as_str())
        .bind(exit_code)
        .bind(failure.map(|f| f.as_str()))
        .bind(Self::to_naive(ended_at))
        .bind(task_run_id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to finish task-run")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Unknown or already finished task-run {}", task_run_id);
        }
        Ok(())
    }

    async fn append_log(&self, line: &LogLine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO logs (task_run_id, level, message, timestamp)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(line.task_run_id.to_string())
        .bind(line.level.as_str())
        .bind(&line.message)
        .bind(Self::to_naive(line.timestamp))
        .execute(&self.pool)
        .await
        .context("Failed to append log line")?;

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<Run>> {
        let row = sqlx::query(
            "SELECT id, pipeline_id, status, start_time, end_time FROM runs WHERE id = ?1",
        )
        .bind(run_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load run")?;

        row.as_ref().map(Self::run_from_row).transpose()
    }

    async fn list_runs(&self, pipeline_id: Option<&str>, limit: usize) -> Result<Vec<Run>> {
        let rows = sqlx::query(
            r#"
            SELECT id, pipeline_id, status, start_time, end_time
            FROM runs
            WHERE ?1 IS NULL OR pipeline_id = ?1
            ORDER BY start_time DESC
            LIMIT ?2
            "#,
        )
        .bind(pipeline_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(Self::run_from_row).collect()
    }

    async fn task_runs(&self, run_id: Uuid) -> Result<Vec<TaskRun>> {
        let rows = sqlx::query(
            r#"
            SELECT id, run_id, task_id, status, exit_code, failure, start_time, end_time
            FROM task_runs
            WHERE run_id = ?1
            ORDER BY start_time ASC
            "#,
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list task-runs")?;

        rows.iter().map(Self::task_run_from_row).collect()
    }

    async fn logs(&self, task_run_id: Uuid) -> Result<Vec<LogLine>> {
        let rows = sqlx::query(
            r#"
            SELECT task_run_id, level, message, timestamp
            FROM logs
            WHERE task_run_id = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(task_run_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load logs")?;

        rows.iter()
            .map(|row| {
                Ok(LogLine {
                    task_run_id: Uuid::parse_str(&row.get::<String, _>("task_run_id"))?,
                    level: row.get::<String, _>("level").parse()?,
                    message: row.get("message"),
                    timestamp: Self::from_naive(row.get("timestamp")),
                })
            })
            .collect()
    }
}
