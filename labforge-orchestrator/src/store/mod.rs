//! Entity persistence used by the deployment engine.
//!
//! Provisioning code only talks to [`LabStore`], which hands out plain entity values.
//! [`PgStore`] backs the service; [`MemoryStore`] backs tests and local runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use labforge_common::{
    CloudConfig, Gid, InstanceNode, Lab, LabStatus, NetworkNode, NewInstanceNode, NewNetworkNode,
    NewRouterNode, NewSlice, ProviderDetail, RouterNode, Scenario, Slice, SliceCloudAttrs,
    SliceStatus,
};
use serde::Serialize;
use uuid::Uuid;

/// One row of the action log: a unit of orchestrator work with its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ActionLog {
    pub id: Uuid,
    pub action_type: String,
    pub status: String,
    pub lab_id: Uuid,
    pub error_message: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub duration_ms: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A status change applied to a lab, slice or node.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StateTransition {
    pub entity: &'static str,
    pub entity_id: Uuid,
    pub from_status: String,
    pub to_status: String,
    pub reason: String,
}

#[async_trait]
pub trait LabStore: Send + Sync {
    // --- Labs / inputs ---
    async fn get_lab(&self, id: Uuid) -> Result<Option<Lab>>;

    /// Conditional status update: applied only when the current status is in `from`.
    /// Returns whether a row changed.
    async fn transition_lab(&self, id: Uuid, from: &[LabStatus], to: LabStatus) -> Result<bool>;

    async fn count_labs_by_status(&self) -> Result<Vec<(LabStatus, i64)>>;

    async fn get_cloud_config(&self, id: Uuid) -> Result<Option<CloudConfig>>;

    async fn update_cloud_config_detail(&self, id: Uuid, detail: &ProviderDetail) -> Result<()>;

    async fn get_scenario(&self, id: Uuid) -> Result<Option<Scenario>>;

    // --- Slices ---
    /// Slices of a lab in creation order.
    async fn list_slices(&self, lab_id: Uuid) -> Result<Vec<Slice>>;

    /// New slices start in `deploying` with empty cloud attributes.
    async fn insert_slice(&self, new: NewSlice) -> Result<Slice>;

    async fn update_slice_cloud_attrs(&self, id: Uuid, attrs: &SliceCloudAttrs) -> Result<()>;

    async fn transition_slice(&self, id: Uuid, from: SliceStatus, to: SliceStatus) -> Result<bool>;

    // --- Nodes ---
    async fn find_network(&self, slice_id: Uuid, gid: &Gid) -> Result<Option<NetworkNode>>;

    /// New nodes start in `deploying`.
    async fn insert_network(&self, new: NewNetworkNode) -> Result<NetworkNode>;

    /// `deploying -> active` with the provider attributes. Returns whether a row changed.
    async fn mark_network_active(&self, id: Uuid, cloud_attrs: &serde_json::Value) -> Result<bool>;

    async fn find_instance(&self, slice_id: Uuid, gid: &Gid) -> Result<Option<InstanceNode>>;

    async fn insert_instance(&self, new: NewInstanceNode) -> Result<InstanceNode>;

    /// Instances of a slice in insertion order.
    async fn list_instances(&self, slice_id: Uuid) -> Result<Vec<InstanceNode>>;

    async fn mark_instance_active(
        &self,
        id: Uuid,
        public_ip: Option<&str>,
        cloud_attrs: &serde_json::Value,
    ) -> Result<bool>;

    async fn find_router(&self, slice_id: Uuid, gid: &Gid) -> Result<Option<RouterNode>>;

    async fn insert_router(&self, new: NewRouterNode) -> Result<RouterNode>;

    /// Routers of a slice in insertion order.
    async fn list_routers(&self, slice_id: Uuid) -> Result<Vec<RouterNode>>;

    async fn mark_router_active(
        &self,
        id: Uuid,
        public_ip: Option<&str>,
        cloud_attrs: &serde_json::Value,
    ) -> Result<bool>;

    // --- Audit ---
    async fn insert_action_log(
        &self,
        action_type: &str,
        status: &str,
        lab_id: Uuid,
        error_message: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Uuid>;

    async fn complete_action_log(
        &self,
        log_id: Uuid,
        status: &str,
        duration_ms: i32,
        error_message: Option<&str>,
    ) -> Result<()>;

    async fn insert_state_transition(&self, transition: StateTransition) -> Result<()>;
}
