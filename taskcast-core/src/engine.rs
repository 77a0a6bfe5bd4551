use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::series::process_series;
use crate::state_machine::{can_transition, is_terminal};
use crate::types::{
    BroadcastProvider, CleanupConfig, EventQueryOptions, Level, LongTermStore, ShortTermStore,
    Task, TaskAuthConfig, TaskcastHooks, TaskError, TaskEvent, TaskStatus, WebhookConfig,
};

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid transition: {from:?} \u{2192} {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Cannot publish to task in terminal status: {0:?}")]
    TaskTerminal(TaskStatus),

    #[error("{0}")]
    Store(#[from] Box<dyn std::error::Error + Send + Sync>),
}

// ─── Input types ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct CreateTaskInput {
    pub id: Option<String>,
    pub r#type: Option<String>,
    pub params: Option<HashMap<String, serde_json::Value>>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    pub ttl: Option<u64>,
    pub webhooks: Option<Vec<WebhookConfig>>,
    pub cleanup: Option<CleanupConfig>,
    pub auth_config: Option<TaskAuthConfig>,
}

pub struct PublishEventInput {
    pub r#type: String,
    pub level: Level,
    pub data: serde_json::Value,
    pub series_id: Option<String>,
    pub series_mode: Option<crate::types::SeriesMode>,
}

pub struct TransitionPayload {
    pub result: Option<HashMap<String, serde_json::Value>>,
    pub error: Option<TaskError>,
}

// ─── TaskEngineOptions ───────────────────────────────────────────────────────

pub struct TaskEngineOptions {
    pub short_term: Arc<dyn ShortTermStore>,
    pub broadcast: Arc<dyn BroadcastProvider>,
    pub long_term: Option<Arc<dyn LongTermStore>>,
    pub hooks: Option<Arc<dyn TaskcastHooks>>,
}

// ─── TaskEngine ──────────────────────────────────────────────────────────────

pub struct TaskEngine {
    short_term: Arc<dyn ShortTermStore>,
    broadcast: Arc<dyn BroadcastProvider>,
    long_term: Option<Arc<dyn LongTermStore>>,
    hooks: Option<Arc<dyn TaskcastHooks>>,
}

impl TaskEngine {
    pub fn new(opts: TaskEngineOptions) -> Self {
        Self {
            short_term: opts.short_term,
            broadcast: opts.broadcast,
            long_term: opts.long_term,
            hooks: opts.hooks,
        }
    }

    #[tracing::instrument(skip(self, input), fields(task_id = input.id.as_deref()))]
    pub async fn create_task(&self, input: CreateTaskInput) -> Result<Task, EngineError> {
        let now = now_millis();
        let task = Task {
            id: input.id.unwrap_or_else(|| ulid::Ulid::new().to_string()),
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            r#type: input.r#type,
            params: input.params,
            metadata: input.metadata,
            ttl: input.ttl,
            webhooks: input.webhooks,
            cleanup: input.cleanup,
            auth_config: input.auth_config,
            result: None,
            error: None,
            completed_at: None,
        };

        self.short_term.save_task(task.clone()).await?;

        if let Some(ref long_term) = self.long_term {
            long_term.save_task(task.clone()).await?;
        }

        if let Some(ttl) = task.ttl {
            self.short_term.set_ttl(&task.id, ttl).await?;
        }

        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<Task>, EngineError> {
        let from_short = self.short_term.get_task(task_id).await?;
        if from_short.is_some() {
            return Ok(from_short);
        }
        if let Some(ref long_term) = self.long_term {
            return Ok(long_term.get_task(task_id).await?);
        }
        Ok(None)
    }

    #[tracing::instrument(skip(self, payload))]
    pub async fn transition_task(
        &self,
        task_id: &str,
        to: TaskStatus,
        payload: Option<TransitionPayload>,
    ) -> Result<Task, EngineError> {
        let task = self
            .get_task(task_id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;

        if !can_transition(&task.status, &to) {
            return Err(EngineError::InvalidTransition {
                from: task.status.clone(),
                to,
            });
        }

        let now = now_millis();
        let new_result = payload
            .as_ref()
            .and_then(|p| p.result.clone())
            .or(task.result);
        let new_error = payload.as_ref().and_then(|p| p.error.clone()).or(task.error);
        let new_completed_at = if is_terminal(&to) {
            Some(now)
        } else {
            task.completed_at
        };

        let updated = Task {
            status: to.clone(),
            updated_at: now,
            completed_at: new_completed_at,
            result: new_result,
            error: new_error,
            ..task
        };

        self.short_term.save_task(updated.clone()).await?;

        if let Some(ref long_term) = self.long_term {
            long_term.save_task(updated.clone()).await?;
        }

        self.emit(
            task_id,
            PublishEventInput {
                r#type: "taskcast:status".to_string(),
                level: Level::Info,
                data: serde_json::json!({
                    "status": to,
                    "result": updated.result,
                    "error": updated.error,
                }),
                series_id: None,
                series_mode: None,
            },
        )
        .await?;

        if let Some(ref hooks) = self.hooks {
            match (&to, &updated.error) {
                (TaskStatus::Failed, Some(error)) => hooks.on_task_failed(&updated, error),
                (TaskStatus::Timeout, _) => hooks.on_task_timeout(&updated),
                _ => {}
            }
        }

        Ok(updated)
    }

    #[tracing::instrument(skip(self, input), fields(event_type = %input.r#type))]
    pub async fn publish_event(
        &self,
        task_id: &str,
        input: PublishEventInput,
    ) -> Result<TaskEvent, EngineError> {
        let task = self
            .get_task(task_id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;

        if is_terminal(&task.status) {
            return Err(EngineError::TaskTerminal(task.status));
        }

        self.emit(task_id, input).await
    }

    pub async fn get_events(
        &self,
        task_id: &str,
        opts: Option<EventQueryOptions>,
    ) -> Result<Vec<TaskEvent>, EngineError> {
        Ok(self.short_term.get_events(task_id, opts).await?)
    }

    pub async fn subscribe(
        &self,
        task_id: &str,
        handler: Box<dyn Fn(TaskEvent) + Send + Sync>,
    ) -> Box<dyn Fn() + Send + Sync> {
        self.broadcast.subscribe(task_id, handler).await
    }

    // ─── Private ─────────────────────────────────────────────────────────

    async fn emit(
        &self,
        task_id: &str,
        input: PublishEventInput,
    ) -> Result<TaskEvent, EngineError> {
        let index = self.short_term.next_index(task_id).await?;
        let raw = TaskEvent {
            id: ulid::Ulid::new().to_string(),
            task_id: task_id.to_string(),
            index,
            timestamp: now_millis(),
            r#type: input.r#type,
            level: input.level,
            data: input.data,
            series_id: input.series_id,
            series_mode: input.series_mode,
        };

        let is_latest_series = matches!(
            event_series_mode(&raw),
            Some(crate::types::SeriesMode::Latest)
        );
        let event = process_series(raw, self.short_term.as_ref()).await?;

        // `latest` mode already wrote (appended or replaced) the event inside
        // SeriesProcessor via replace_last_series_event; every other mode is a
        // plain append here. Exactly one write-through path per event.
        if !is_latest_series {
            self.short_term
                .append_event(task_id, event.clone())
                .await?;
        }
        self.broadcast.publish(task_id, event.clone()).await?;

        if let Some(ref long_term) = self.long_term {
            let long_term = Arc::clone(long_term);
            let event_clone = event.clone();
            let hooks = self.hooks.clone();
            tokio::spawn(async move {
                if let Err(err) = long_term.save_event(event_clone.clone()).await {
                    tracing::warn!(event_id = %event_clone.id, error = %err, "long-term save_event failed");
                    if let Some(hooks) = hooks {
                        hooks.on_event_dropped(&event_clone, &err.to_string());
                    }
                }
            });
        }

        Ok(event)
    }

}

fn event_series_mode(event: &TaskEvent) -> Option<crate::types::SeriesMode> {
    match (&event.series_id, &event.series_mode) {
        (Some(_), Some(mode)) => Some(mode.clone()),
        _ => None,
    }
}

fn now_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX epoch")
        .as_millis() as f64
}

// ─── Tests ───────────────────────────────────────────────────────────────────
