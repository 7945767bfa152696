use anyhow::Result;
use uuid::Uuid;

use crate::store::LabStore;

/// Open an action log entry, with metadata (context info)
pub async fn log_event_with_metadata(
    store: &dyn LabStore,
    action_type: &str,
    status: &str,
    lab_id: Uuid,
    error_message: Option<&str>,
    metadata: Option<serde_json::Value>,
) -> Result<Uuid> {
    let log_id = store
        .insert_action_log(action_type, status, lab_id, error_message, metadata)
        .await?;
    tracing::debug!("📝 [logger] {} - {} ({})", action_type, status, log_id);
    Ok(log_id)
}

/// Log event completion with duration
pub async fn log_event_complete(
    store: &dyn LabStore,
    log_id: Uuid,
    status: &str,
    duration_ms: i32,
    error_message: Option<&str>,
) -> Result<()> {
    store
        .complete_action_log(log_id, status, duration_ms, error_message)
        .await
}

/// Elapsed milliseconds since `start`, clamped to the column type.
pub fn elapsed_ms(start: std::time::Instant) -> i32 {
    i32::try_from(start.elapsed().as_millis()).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn event_is_opened_then_completed() {
        let store = MemoryStore::new();
        let lab_id = Uuid::new_v4();

        let log_id = log_event_with_metadata(
            &store,
            "DEPLOY_LAB",
            "in_progress",
            lab_id,
            None,
            Some(serde_json::json!({"users": 2})),
        )
        .await
        .unwrap();
        log_event_complete(&store, log_id, "failed", 12, Some("boom"))
            .await
            .unwrap();

        let logs = store.action_logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id, log_id);
        assert_eq!(logs[0].status, "failed");
        assert_eq!(logs[0].duration_ms, Some(12));
        assert_eq!(logs[0].error_message.as_deref(), Some("boom"));
        assert_eq!(logs[0].metadata, Some(serde_json::json!({"users": 2})));
        assert!(logs[0].completed_at.is_some());
    }
}
