use crate::filter::matches_type;
use crate::state_machine::is_terminal;
use crate::types::{CleanupRule, Task, TaskEvent};

/// Returns `true` if the given task matches the cleanup rule at time `now` (ms).
///
/// A task matches when:
/// 1. The task is in a terminal status.
/// 2. If the rule specifies `match.status`, the task's status must be in that list.
/// 3. If the rule specifies `match.task_types`, the task must have a type that matches.
/// 4. If the rule specifies `trigger.after_ms`, enough time must have elapsed since completion.
pub fn matches_cleanup_rule(task: &Task, rule: &CleanupRule, now: f64) -> bool {
    if !is_terminal(&task.status) {
        return false;
    }

    if let Some(ref rule_match) = rule.r#match {
        if let Some(ref statuses) = rule_match.status {
            if !statuses.contains(&task.status) {
                return false;
            }
        }

        if let Some(ref task_types) = rule_match.task_types {
            match &task.r#type {
                Some(t) => {
                    if !matches_type(t, Some(task_types)) {
                        return false;
                    }
                }
                None => return false,
            }
        }
    }

    if let Some(after_ms) = rule.trigger.after_ms {
        let completed_at = task.completed_at.unwrap_or(task.updated_at);
        let elapsed = now - completed_at;
        if elapsed < after_ms as f64 {
            return false;
        }
    }

    true
}

/// Filters events that should be cleaned up according to the rule's `event_filter`.
///
/// If the rule has no `event_filter`, all events are returned (meaning all match for cleanup).
/// Otherwise, only events matching **all** specified filter criteria are returned.
pub fn filter_events_for_cleanup(
    events: &[TaskEvent],
    rule: &CleanupRule,
    _now: f64,
    completed_at: Option<f64>,
) -> Vec<TaskEvent> {
    let ef = match &rule.event_filter {
        Some(ef) => ef,
        None => return events.to_vec(),
    };

    events
        .iter()
        .filter(|event| {
            if let Some(ref types) = ef.types {
                if !matches_type(&event.r#type, Some(types)) {
                    return false;
                }
            }

            if let Some(ref levels) = ef.levels {
                if !levels.contains(&event.level) {
                    return false;
                }
            }

            if let Some(ref series_modes) = ef.series_mode {
                match &event.series_mode {
                    Some(sm) => {
                        if !series_modes.contains(sm) {
                            return false;
                        }
                    }
                    None => return false,
                }
            }

            if let Some(older_than_ms) = ef.older_than_ms {
                if let Some(completed) = completed_at {
                    let cutoff = completed - older_than_ms as f64;
                    if event.timestamp >= cutoff {
                        return false;
                    }
                }
            }

            true
        })
        .cloned()
        .collect()
}
