use crate::types::{SeriesMode, ShortTermStore, TaskEvent};

/// Process a task event through its series mode logic.
///
/// - If the event has no `series_id` or `series_mode`, it is returned unchanged.
/// - `keep-all`: returned unchanged with no store interaction.
/// - `accumulate`: merges `data.text` (string concatenation) with the previous
///   series event, then stores the merged event as the series latest.
/// - `latest`: replaces the last series event in the store and returns it; the
///   returned event's `index` is the first publish's index, not this one's.
pub async fn process_series(
    event: TaskEvent,
    store: &dyn ShortTermStore,
) -> Result<TaskEvent, Box<dyn std::error::Error + Send + Sync>> {
    let (series_id, series_mode) = match (&event.series_id, &event.series_mode) {
        (Some(sid), Some(mode)) => (sid.clone(), mode.clone()),
        _ => return Ok(event),
    };

    match series_mode {
        SeriesMode::KeepAll => Ok(event),

        SeriesMode::Accumulate => {
            let prev = store
                .get_series_latest(&event.task_id, &series_id)
                .await?;

            let merged = if let Some(prev) = prev {
                // Try to concatenate text fields if both prev and new data are
                // objects containing a string "text" key.
                let should_concat = prev
                    .data
                    .as_object()
                    .and_then(|po| po.get("text")?.as_str().map(|s| s.to_string()))
                    .and_then(|prev_text| {
                        event
                            .data
                            .as_object()
                            .and_then(|no| no.get("text")?.as_str().map(|s| s.to_string()))
                            .map(|new_text| (prev_text, new_text))
                    });

                if let Some((prev_text, new_text)) = should_concat {
                    let mut new_data = event
                        .data
                        .as_object()
                        .cloned()
                        .unwrap_or_default();
                    new_data.insert(
                        "text".to_string(),
                        serde_json::Value::String(prev_text + &new_text),
                    );
                    TaskEvent {
                        data: serde_json::Value::Object(new_data),
                        ..event
                    }
                } else {
                    event
                }
            } else {
                event
            };

            store
                .set_series_latest(&merged.task_id, &series_id, merged.clone())
                .await?;
            Ok(merged)
        }

        SeriesMode::Latest => {
            let final_event = store
                .replace_last_series_event(&event.task_id, &series_id, event)
                .await?;
            Ok(final_event)
        }
    }
}
