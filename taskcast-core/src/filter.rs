use crate::types::{SubscribeFilter, TaskEvent};

/// A task event annotated with its filtered (post-filter) index and raw (original) index.
#[derive(Debug, Clone)]
pub struct FilteredEvent {
    pub filtered_index: u64,
    pub raw_index: u64,
    pub event: TaskEvent,
}

/// Returns `true` if `event_type` matches at least one of the given patterns.
///
/// - `None` patterns means "no filter" and matches everything.
/// - An empty slice matches nothing.
/// - `"*"` matches any type.
/// - `"prefix.*"` matches any type that starts with `"prefix."` (but NOT `"prefix"` exactly).
/// - Otherwise, an exact string match is required.
pub fn matches_type(event_type: &str, patterns: Option<&[String]>) -> bool {
    let patterns = match patterns {
        None => return true,
        Some(p) => p,
    };
    if patterns.is_empty() {
        return false;
    }
    patterns.iter().any(|pattern| {
        if pattern == "*" {
            return true;
        }
        if let Some(prefix) = pattern.strip_suffix(".*") {
            // "llm.*" matches "llm.delta", "llm.delta.chunk" but NOT "llm"
            return event_type.starts_with(&format!("{}.", prefix));
        }
        event_type == pattern
    })
}

/// Returns `true` if the given event passes the subscribe filter.
pub fn matches_filter(event: &TaskEvent, filter: &SubscribeFilter) -> bool {
    let include_status = filter.include_status.unwrap_or(true);

    if !include_status && event.r#type == "taskcast:status" {
        return false;
    }

    if let Some(ref types) = filter.types {
        if !matches_type(&event.r#type, Some(types)) {
            return false;
        }
    }

    if let Some(ref levels) = filter.levels {
        if !levels.contains(&event.level) {
            return false;
        }
    }

    true
}

/// Applies the subscribe filter to a list of events, assigning each matching event
/// a monotonically increasing `filtered_index`. If a `since.index` cursor is present,
/// events whose `filtered_index` is <= that cursor value are skipped from the result
/// (but still counted for indexing purposes).
pub fn apply_filtered_index(
    events: &[TaskEvent],
    filter: &SubscribeFilter,
) -> Vec<FilteredEvent> {
    let since_index = filter
        .since
        .as_ref()
        .and_then(|s| s.index);

    let mut filtered_counter: u64 = 0;
    let mut result = Vec::new();

    for event in events {
        if !matches_filter(event, filter) {
            continue;
        }

        let current_filtered_index = filtered_counter;
        filtered_counter += 1;

        // since.index: skip events where filteredIndex <= since.index
        if let Some(idx) = since_index {
            if current_filtered_index <= idx {
                continue;
            }
        }

        result.push(FilteredEvent {
            filtered_index: current_filtered_index,
            raw_index: event.index,
            event: event.clone(),
        });
    }

    result
}
