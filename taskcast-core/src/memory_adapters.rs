use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::types::{BroadcastProvider, EventQueryOptions, ShortTermStore, Task, TaskEvent};

// ─── MemoryBroadcastProvider ────────────────────────────────────────────────

type Handler = Arc<dyn Fn(TaskEvent) + Send + Sync>;

pub struct MemoryBroadcastProvider {
    listeners: Arc<RwLock<HashMap<String, Vec<Handler>>>>,
}

impl MemoryBroadcastProvider {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryBroadcastProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BroadcastProvider for MemoryBroadcastProvider {
    async fn publish(
        &self,
        channel: &str,
        event: TaskEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let handlers = {
            let listeners = self.listeners.read().unwrap();
            listeners.get(channel).cloned()
        };
        if let Some(handlers) = handlers {
            for handler in &handlers {
                handler(event.clone());
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
        handler: Box<dyn Fn(TaskEvent) + Send + Sync>,
    ) -> Box<dyn Fn() + Send + Sync> {
        let handler: Handler = Arc::from(handler);
        {
            let mut listeners = self.listeners.write().unwrap();
            listeners
                .entry(channel.to_string())
                .or_default()
                .push(Arc::clone(&handler));
        }

        let listeners = Arc::clone(&self.listeners);
        let channel = channel.to_string();
        // Store the pointer address as usize for Send + Sync compatibility.
        // This is only used for identity comparison, never dereferenced.
        let handler_addr = Arc::as_ptr(&handler) as *const () as usize;

        Box::new(move || {
            let mut listeners = listeners.write().unwrap();
            if let Some(handlers) = listeners.get_mut(&channel) {
                handlers.retain(|h| (Arc::as_ptr(h) as *const () as usize) != handler_addr);
            }
        })
    }
}

// ─── MemoryShortTermStore ───────────────────────────────────────────────────

pub struct MemoryShortTermStore {
    tasks: RwLock<HashMap<String, Task>>,
    events: RwLock<HashMap<String, Vec<TaskEvent>>>,
    series_latest: RwLock<HashMap<String, TaskEvent>>,
    index_counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

impl MemoryShortTermStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            events: RwLock::new(HashMap::new()),
            series_latest: RwLock::new(HashMap::new()),
            index_counters: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryShortTermStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShortTermStore for MemoryShortTermStore {
    async fn save_task(
        &self,
        task: Task,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut tasks = self.tasks.write().unwrap();
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get_task(
        &self,
        task_id: &str,
    ) -> Result<Option<Task>, Box<dyn std::error::Error + Send + Sync>> {
        let tasks = self.tasks.read().unwrap();
        Ok(tasks.get(task_id).cloned())
    }

    async fn append_event(
        &self,
        task_id: &str,
        event: TaskEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut events = self.events.write().unwrap();
        events
            .entry(task_id.to_string())
            .or_default()
            .push(event);
        Ok(())
    }

    async fn get_events(
        &self,
        task_id: &str,
        opts: Option<EventQueryOptions>,
    ) -> Result<Vec<TaskEvent>, Box<dyn std::error::Error + Send + Sync>> {
        let events = self.events.read().unwrap();
        let all = match events.get(task_id) {
            Some(v) => v.clone(),
            None => return Ok(vec![]),
        };

        let mut result = all;

        if let Some(ref opts) = opts {
            if let Some(ref since) = opts.since {
                if let Some(ref id) = since.id {
                    // since.id takes priority
                    let idx = result.iter().position(|e| &e.id == id);
                    result = match idx {
                        Some(i) => result[i + 1..].to_vec(),
                        None => result,
                    };
                } else if let Some(index) = since.index {
                    // since.index is second priority
                    result.retain(|e| e.index > index);
                } else if let Some(timestamp) = since.timestamp {
                    // since.timestamp is third priority
                    result.retain(|e| e.timestamp > timestamp);
                }
            }

            if let Some(limit) = opts.limit {
                result.truncate(limit as usize);
            }
        }

        Ok(result)
    }

    async fn set_ttl(
        &self,
        _task_id: &str,
        _ttl_seconds: u64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // no-op in memory adapter
        Ok(())
    }

    async fn get_series_latest(
        &self,
        task_id: &str,
        series_id: &str,
    ) -> Result<Option<TaskEvent>, Box<dyn std::error::Error + Send + Sync>> {
        let series = self.series_latest.read().unwrap();
        let key = format!("{task_id}:{series_id}");
        Ok(series.get(&key).cloned())
    }

    async fn set_series_latest(
        &self,
        task_id: &str,
        series_id: &str,
        event: TaskEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut series = self.series_latest.write().unwrap();
        let key = format!("{task_id}:{series_id}");
        series.insert(key, event);
        Ok(())
    }

    async fn replace_last_series_event(
        &self,
        task_id: &str,
        series_id: &str,
        mut event: TaskEvent,
    ) -> Result<TaskEvent, Box<dyn std::error::Error + Send + Sync>> {
        let key = format!("{task_id}:{series_id}");

        let prev = {
            let series = self.series_latest.read().unwrap();
            series.get(&key).cloned()
        };

        if let Some(prev) = prev {
            // The series' slot keeps the index of the first publish; only
            // id/data/timestamp come from the latest publish.
            event.index = prev.index;
            let mut events = self.events.write().unwrap();
            if let Some(task_events) = events.get_mut(task_id) {
                if let Some(idx) = task_events.iter().rposition(|e| e.id == prev.id) {
                    task_events[idx] = event.clone();
                }
            }
        } else {
            self.append_event(task_id, event.clone()).await?;
        }

        let mut series = self.series_latest.write().unwrap();
        series.insert(key, event.clone());
        Ok(event)
    }

    async fn next_index(
        &self,
        task_id: &str,
    ) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        let counter = {
            let mut counters = self.index_counters.write().unwrap();
            counters
                .entry(task_id.to_string())
                .or_insert_with(|| Arc::new(AtomicU64::new(0)))
                .clone()
        };
        Ok(counter.fetch_add(1, Ordering::SeqCst))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
