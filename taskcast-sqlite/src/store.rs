use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use taskcast_core::types::{
    CleanupConfig, EventQueryOptions, Level, LongTermStore, SeriesMode, Task, TaskAuthConfig,
    TaskError, TaskEvent, TaskStatus, WebhookConfig,
};

/// Table names derived from a configurable prefix.
#[derive(Debug, Clone)]
struct TableNames {
    tasks: String,
    events: String,
}

impl TableNames {
    fn new(prefix: &str) -> Self {
        Self {
            tasks: format!("{prefix}_tasks"),
            events: format!("{prefix}_events"),
        }
    }
}

fn json_col(value: &JsonValue) -> Option<String> {
    if value.is_null() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_json_col(raw: Option<String>) -> Option<JsonValue> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

/// SQLite-backed long-term store for tasks and events.
///
/// Single-file / single-process deployments only: SQLite has no native
/// JSON column type, so JSON-valued fields are stored as serialized TEXT.
pub struct SqliteLongTermStore {
    pool: SqlitePool,
    tables: TableNames,
}

impl SqliteLongTermStore {
    /// Create a new store with the given connection pool and optional table prefix.
    ///
    /// If `prefix` is `None`, falls back to the `TASKCAST_SQLITE_PREFIX` env var,
    /// then to `"taskcast"`.
    pub fn new(pool: SqlitePool, prefix: Option<&str>) -> Self {
        let resolved = prefix
            .map(|s| s.to_string())
            .or_else(|| std::env::var("TASKCAST_SQLITE_PREFIX").ok())
            .unwrap_or_else(|| "taskcast".to_string());
        Self {
            pool,
            tables: TableNames::new(&resolved),
        }
    }

    /// Run the initial migration to create tables and indexes.
    pub async fn migrate(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let tasks = &self.tables.tasks;
        let events = &self.tables.events;

        let migration = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {tasks} (
              id TEXT PRIMARY KEY,
              type TEXT,
              status TEXT NOT NULL,
              params TEXT,
              result TEXT,
              error TEXT,
              metadata TEXT,
              auth_config TEXT,
              webhooks TEXT,
              cleanup TEXT,
              created_at INTEGER NOT NULL,
              updated_at INTEGER NOT NULL,
              completed_at INTEGER,
              ttl INTEGER
            );

            CREATE TABLE IF NOT EXISTS {events} (
              id TEXT PRIMARY KEY,
              task_id TEXT NOT NULL REFERENCES {tasks}(id) ON DELETE CASCADE,
              idx INTEGER NOT NULL,
              timestamp INTEGER NOT NULL,
              type TEXT NOT NULL,
              level TEXT NOT NULL,
              data TEXT,
              series_id TEXT,
              series_mode TEXT,
              UNIQUE(task_id, idx)
            );

            CREATE INDEX IF NOT EXISTS {events}_task_id_idx ON {events}(task_id, idx);
            CREATE INDEX IF NOT EXISTS {events}_task_id_timestamp ON {events}(task_id, timestamp);
            "#
        );

        for stmt in migration.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn row_to_task(row: &SqliteRow) -> Task {
        let status_str: String = row.get("status");
        let status: TaskStatus =
            serde_json::from_value(JsonValue::String(status_str)).unwrap_or(TaskStatus::Pending);

        let created_at_i64: i64 = row.get("created_at");
        let updated_at_i64: i64 = row.get("updated_at");
        let completed_at_i64: Option<i64> = row.get("completed_at");
        let ttl_i64: Option<i64> = row.get("ttl");

        let params = parse_json_col(row.get("params"));
        let result = parse_json_col(row.get("result"));
        let error = parse_json_col(row.get("error"));
        let metadata = parse_json_col(row.get("metadata"));
        let auth_config = parse_json_col(row.get("auth_config"));
        let webhooks = parse_json_col(row.get("webhooks"));
        let cleanup = parse_json_col(row.get("cleanup"));

        Task {
            id: row.get("id"),
            r#type: row.get("type"),
            status,
            params: params.and_then(|v| serde_json::from_value(v).ok()),
            result: result.and_then(|v| serde_json::from_value(v).ok()),
            error: error.and_then(|v| serde_json::from_value::<TaskError>(v).ok()),
            metadata: metadata.and_then(|v| serde_json::from_value(v).ok()),
            auth_config: auth_config
                .and_then(|v| serde_json::from_value::<TaskAuthConfig>(v).ok()),
            webhooks: webhooks
                .and_then(|v| serde_json::from_value::<Vec<WebhookConfig>>(v).ok()),
            cleanup: cleanup.and_then(|v| serde_json::from_value::<CleanupConfig>(v).ok()),
            created_at: created_at_i64 as f64,
            updated_at: updated_at_i64 as f64,
            completed_at: completed_at_i64.map(|v| v as f64),
            ttl: ttl_i64.map(|v| v as u64),
        }
    }

    fn row_to_event(row: &SqliteRow) -> TaskEvent {
        let level_str: String = row.get("level");
        let level: Level =
            serde_json::from_value(JsonValue::String(level_str)).unwrap_or(Level::Info);

        let idx: i64 = row.get("idx");
        let timestamp_i64: i64 = row.get("timestamp");
        let data = parse_json_col(row.get("data"));

        let series_mode_str: Option<String> = row.get("series_mode");
        let series_mode: Option<SeriesMode> = series_mode_str
            .and_then(|s| serde_json::from_value(JsonValue::String(s)).ok());

        TaskEvent {
            id: row.get("id"),
            task_id: row.get("task_id"),
            index: idx as u64,
            timestamp: timestamp_i64 as f64,
            r#type: row.get("type"),
            level,
            data: data.unwrap_or(JsonValue::Null),
            series_id: row.get("series_id"),
            series_mode,
        }
    }
}

#[async_trait]
impl LongTermStore for SqliteLongTermStore {
    async fn save_task(
        &self,
        task: Task,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let tasks_table = &self.tables.tasks;

        let params_json = task.params.as_ref().and_then(|p| {
            serde_json::to_value(p).ok().and_then(|v| json_col(&v))
        });
        let result_json = task.result.as_ref().and_then(|r| {
            serde_json::to_value(r).ok().and_then(|v| json_col(&v))
        });
        let error_json = task.error.as_ref().and_then(|e| {
            serde_json::to_value(e).ok().and_then(|v| json_col(&v))
        });
        let metadata_json = task.metadata.as_ref().and_then(|m| {
            serde_json::to_value(m).ok().and_then(|v| json_col(&v))
        });
        let auth_config_json = task.auth_config.as_ref().and_then(|a| {
            serde_json::to_value(a).ok().and_then(|v| json_col(&v))
        });
        let webhooks_json = task.webhooks.as_ref().and_then(|w| {
            serde_json::to_value(w).ok().and_then(|v| json_col(&v))
        });
        let cleanup_json = task.cleanup.as_ref().and_then(|c| {
            serde_json::to_value(c).ok().and_then(|v| json_col(&v))
        });

        let created_at = task.created_at as i64;
        let updated_at = task.updated_at as i64;
        let completed_at = task.completed_at.map(|v| v as i64);
        let ttl = task.ttl.map(|v| v as i64);

        let sql = format!(
            r#"
            INSERT INTO {tasks_table} (
                id, type, status, params, result, error, metadata,
                auth_config, webhooks, cleanup, created_at, updated_at, completed_at, ttl
            ) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            )
            ON CONFLICT (id) DO UPDATE SET
                status = excluded.status,
                result = excluded.result,
                error = excluded.error,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at,
                completed_at = excluded.completed_at
            "#
        );

        let status_str =
            serde_json::to_value(&task.status).map(|v| v.as_str().unwrap_or("pending").to_string())?;

        sqlx::query(&sql)
            .bind(&task.id)
            .bind(&task.r#type)
            .bind(&status_str)
            .bind(&params_json)
            .bind(&result_json)
            .bind(&error_json)
            .bind(&metadata_json)
            .bind(&auth_config_json)
            .bind(&webhooks_json)
            .bind(&cleanup_json)
            .bind(created_at)
            .bind(updated_at)
            .bind(completed_at)
            .bind(ttl)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_task(
        &self,
        task_id: &str,
    ) -> Result<Option<Task>, Box<dyn std::error::Error + Send + Sync>> {
        let tasks_table = &self.tables.tasks;
        let sql = format!("SELECT * FROM {tasks_table} WHERE id = ?");

        let row = sqlx::query(&sql)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_task))
    }

    async fn save_event(
        &self,
        event: TaskEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let events_table = &self.tables.events;

        let sql = format!(
            r#"
            INSERT INTO {events_table} (
                id, task_id, idx, timestamp, type, level, data, series_id, series_mode
            ) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?
            )
            ON CONFLICT (id) DO NOTHING
            "#
        );

        let level_str =
            serde_json::to_value(&event.level).map(|v| v.as_str().unwrap_or("info").to_string())?;
        let series_mode_str: Option<String> = event.series_mode.as_ref().and_then(|sm| {
            serde_json::to_value(sm)
                .ok()
                .and_then(|v| v.as_str().map(|s| s.to_string()))
        });

        let idx = event.index as i64;
        let timestamp = event.timestamp as i64;
        let data_json = json_col(&event.data);

        sqlx::query(&sql)
            .bind(&event.id)
            .bind(&event.task_id)
            .bind(idx)
            .bind(timestamp)
            .bind(&event.r#type)
            .bind(&level_str)
            .bind(&data_json)
            .bind(&event.series_id)
            .bind(&series_mode_str)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_events(
        &self,
        task_id: &str,
        opts: Option<EventQueryOptions>,
    ) -> Result<Vec<TaskEvent>, Box<dyn std::error::Error + Send + Sync>> {
        let events_table = &self.tables.events;
        let since = opts.as_ref().and_then(|o| o.since.as_ref());
        let limit = opts.as_ref().and_then(|o| o.limit);

        let limit_clause = limit.map(|l| format!("LIMIT {l}")).unwrap_or_default();

        let rows = if let Some(since) = since {
            if let Some(ref id) = since.id {
                // Not found anchors at idx = -1, i.e. "all events".
                let anchor_sql = format!("SELECT idx FROM {events_table} WHERE id = ?");
                let anchor_row = sqlx::query(&anchor_sql)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
                let anchor_idx: i64 = anchor_row.as_ref().map(|r| r.get("idx")).unwrap_or(-1);

                let sql = format!(
                    "SELECT * FROM {events_table} WHERE task_id = ? AND idx > ? ORDER BY idx ASC {limit_clause}"
                );
                sqlx::query(&sql)
                    .bind(task_id)
                    .bind(anchor_idx)
                    .fetch_all(&self.pool)
                    .await?
            } else if let Some(index) = since.index {
                let sql = format!(
                    "SELECT * FROM {events_table} WHERE task_id = ? AND idx > ? ORDER BY idx ASC {limit_clause}"
                );
                sqlx::query(&sql)
                    .bind(task_id)
                    .bind(index as i64)
                    .fetch_all(&self.pool)
                    .await?
            } else if let Some(timestamp) = since.timestamp {
                let sql = format!(
                    "SELECT * FROM {events_table} WHERE task_id = ? AND timestamp > ? ORDER BY idx ASC {limit_clause}"
                );
                sqlx::query(&sql)
                    .bind(task_id)
                    .bind(timestamp as i64)
                    .fetch_all(&self.pool)
                    .await?
            } else {
                let sql = format!(
                    "SELECT * FROM {events_table} WHERE task_id = ? ORDER BY idx ASC {limit_clause}"
                );
                sqlx::query(&sql).bind(task_id).fetch_all(&self.pool).await?
            }
        } else {
            let sql = format!(
                "SELECT * FROM {events_table} WHERE task_id = ? ORDER BY idx ASC {limit_clause}"
            );
            sqlx::query(&sql).bind(task_id).fetch_all(&self.pool).await?
        };

        Ok(rows.iter().map(Self::row_to_event).collect())
    }
}
