use anyhow::Result;
use labforge_common::{LabStatus, NodeStatus, SliceStatus};
use uuid::Uuid;

use crate::store::{LabStore, StateTransition};

/// Record a state transition in the history table. History is best effort.
async fn log_state_transition(
    store: &dyn LabStore,
    entity: &'static str,
    entity_id: Uuid,
    from_status: &str,
    to_status: &str,
    reason: &str,
) {
    let transition = StateTransition {
        entity,
        entity_id,
        from_status: from_status.to_string(),
        to_status: to_status.to_string(),
        reason: reason.to_string(),
    };
    if let Err(e) = store.insert_state_transition(transition).await {
        tracing::warn!(
            "⚠️ [state_machine] failed to record {} {} {} -> {}: {:#}",
            entity,
            entity_id,
            from_status,
            to_status,
            e
        );
    }
}

async fn transition_lab(
    store: &dyn LabStore,
    lab_id: Uuid,
    to: LabStatus,
    reason: &str,
) -> Result<bool> {
    // Current status BEFORE update, for the history row
    let prev = store.get_lab(lab_id).await?.map(|l| l.status);

    let changed = store
        .transition_lab(lab_id, &LabStatus::sources_of(to), to)
        .await?;

    let from = prev.map_or("unknown", |s| s.as_str());
    if changed {
        tracing::info!("🔄 [state_machine] lab {}: {} -> {}", lab_id, from, to);
        log_state_transition(store, "lab", lab_id, from, to.as_str(), reason).await;
    } else {
        tracing::warn!(
            "⚠️ [state_machine] lab {}: no transition {} -> {} (current_status={:?})",
            lab_id,
            from,
            to,
            prev
        );
    }
    Ok(changed)
}

/// Claim a lab for a deployment run. Accepted from any status (explicit redeploy).
pub async fn lab_to_deploying(store: &dyn LabStore, lab_id: Uuid, reason: &str) -> Result<bool> {
    transition_lab(store, lab_id, LabStatus::Deploying, reason).await
}

/// Transition DEPLOYING -> ACTIVE.
pub async fn lab_to_active(store: &dyn LabStore, lab_id: Uuid, reason: &str) -> Result<bool> {
    transition_lab(store, lab_id, LabStatus::Active, reason).await
}

/// Transition to DEPLOYFAILED (any status).
pub async fn lab_to_deployfailed(store: &dyn LabStore, lab_id: Uuid, reason: &str) -> Result<bool> {
    transition_lab(store, lab_id, LabStatus::DeployFailed, reason).await
}

/// Transition DEPLOYING -> ACTIVE (idempotent).
pub async fn slice_to_active(store: &dyn LabStore, slice_id: Uuid, reason: &str) -> Result<bool> {
    let changed = store
        .transition_slice(slice_id, SliceStatus::Deploying, SliceStatus::Active)
        .await?;
    if changed {
        log_state_transition(
            store,
            "slice",
            slice_id,
            SliceStatus::Deploying.as_str(),
            SliceStatus::Active.as_str(),
            reason,
        )
        .await;
    }
    Ok(changed)
}

async fn log_node_activation(store: &dyn LabStore, entity: &'static str, id: Uuid, reason: &str) {
    log_state_transition(
        store,
        entity,
        id,
        NodeStatus::Deploying.as_str(),
        NodeStatus::Active.as_str(),
        reason,
    )
    .await;
}

pub async fn network_to_active(
    store: &dyn LabStore,
    node_id: Uuid,
    cloud_attrs: &serde_json::Value,
    reason: &str,
) -> Result<bool> {
    let changed = store.mark_network_active(node_id, cloud_attrs).await?;
    if changed {
        log_node_activation(store, "network", node_id, reason).await;
    }
    Ok(changed)
}

pub async fn instance_to_active(
    store: &dyn LabStore,
    node_id: Uuid,
    public_ip: Option<&str>,
    cloud_attrs: &serde_json::Value,
    reason: &str,
) -> Result<bool> {
    let changed = store
        .mark_instance_active(node_id, public_ip, cloud_attrs)
        .await?;
    if changed {
        log_node_activation(store, "instance", node_id, reason).await;
    }
    Ok(changed)
}

pub async fn router_to_active(
    store: &dyn LabStore,
    node_id: Uuid,
    public_ip: Option<&str>,
    cloud_attrs: &serde_json::Value,
    reason: &str,
) -> Result<bool> {
    let changed = store
        .mark_router_active(node_id, public_ip, cloud_attrs)
        .await?;
    if changed {
        log_node_activation(store, "router", node_id, reason).await;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use labforge_common::Topology;

    #[tokio::test]
    async fn lab_cannot_become_active_without_claim() {
        let store = MemoryStore::new();
        let scenario = store.add_scenario("s", Topology::default()).await;
        let lab = store.add_lab("lab", scenario.id).await;

        assert!(!lab_to_active(&store, lab.id, "test").await.unwrap());
        assert!(lab_to_deploying(&store, lab.id, "test").await.unwrap());
        assert!(lab_to_active(&store, lab.id, "test").await.unwrap());

        let history = store.state_transitions().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].from_status, "created");
        assert_eq!(history[0].to_status, "deploying");
        assert_eq!(history[1].to_status, "active");
    }

    #[tokio::test]
    async fn failure_is_reachable_from_created() {
        let store = MemoryStore::new();
        let scenario = store.add_scenario("s", Topology::default()).await;
        let lab = store.add_lab("lab", scenario.id).await;

        assert!(lab_to_deployfailed(&store, lab.id, "boundary").await.unwrap());
        let lab = store.get_lab(lab.id).await.unwrap().unwrap();
        assert_eq!(lab.status, LabStatus::DeployFailed);
    }

    #[tokio::test]
    async fn unknown_lab_is_not_transitioned() {
        let store = MemoryStore::new();
        assert!(!lab_to_deploying(&store, Uuid::new_v4(), "test").await.unwrap());
        assert!(store.state_transitions().await.is_empty());
    }
}
