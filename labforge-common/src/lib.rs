use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub mod bus;
pub mod topology;

pub use sqlx::types::Json;

pub use topology::{
    Configuration, Gid, GidRef, InstanceSpec, Link, NetworkSpec, NodeKind, RouterSpec, Topology,
    TopologyNode,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown {kind} status '{value}'")]
    UnknownStatus { kind: &'static str, value: String },
}

// --- Enums ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "lab_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LabStatus {
    Created,      // Recorded, never deployed
    Deploying,    // A deployment run owns the lab
    Active,       // Every slice deployed
    DeployFailed, // Last run aborted
}

impl LabStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabStatus::Created => "created",
            LabStatus::Deploying => "deploying",
            LabStatus::Active => "active",
            LabStatus::DeployFailed => "deployfailed",
        }
    }

    pub const ALL: [LabStatus; 4] = [
        LabStatus::Created,
        LabStatus::Deploying,
        LabStatus::Active,
        LabStatus::DeployFailed,
    ];

    /// A run may claim a lab (`deploying`) or fail it (`deployfailed`) whatever its
    /// previous status; the boundary step runs before the claim. Only a claimed lab
    /// becomes `active`, and nothing returns to `created`.
    pub fn can_transition_to(&self, next: LabStatus) -> bool {
        match next {
            LabStatus::Deploying | LabStatus::DeployFailed => true,
            LabStatus::Active => *self == LabStatus::Deploying,
            LabStatus::Created => false,
        }
    }

    /// Statuses from which `next` may be entered.
    pub fn sources_of(next: LabStatus) -> Vec<LabStatus> {
        LabStatus::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

impl fmt::Display for LabStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(LabStatus::Created),
            "deploying" => Ok(LabStatus::Deploying),
            "active" => Ok(LabStatus::Active),
            "deployfailed" => Ok(LabStatus::DeployFailed),
            other => Err(DomainError::UnknownStatus {
                kind: "lab",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "slice_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SliceStatus {
    Deploying,
    Active,
}

impl SliceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SliceStatus::Deploying => "deploying",
            SliceStatus::Active => "active",
        }
    }
}

impl fmt::Display for SliceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "node_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Deploying,
    Active,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Deploying => "deploying",
            NodeStatus::Active => "active",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which cloud a configuration targets.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Aws,
    OpenStack,
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Aws => "aws",
            ProviderKind::OpenStack => "openstack",
            ProviderKind::Mock => "mock",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Provider details ---

/// Identifiers of a per-lab network boundary (an AWS VPC with its routing table and gateway).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NetworkBoundary {
    pub vpc_id: String,
    pub rt_id: String,
    pub ig_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AwsDetail {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc: Option<NetworkBoundary>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OpenStackDetail {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub project_name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub external_network: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct MockDetail {
    /// Lets the mock provider pretend it needs a VPC, like AWS.
    #[serde(default)]
    pub network_boundary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundary: Option<NetworkBoundary>,
}

/// Provider-specific connection detail, one variant per provider.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderDetail {
    Aws(AwsDetail),
    #[serde(rename = "openstack")]
    OpenStack(OpenStackDetail),
    Mock(MockDetail),
}

impl ProviderDetail {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderDetail::Aws(_) => ProviderKind::Aws,
            ProviderDetail::OpenStack(_) => ProviderKind::OpenStack,
            ProviderDetail::Mock(_) => ProviderKind::Mock,
        }
    }

    pub fn network_boundary(&self) -> Option<&NetworkBoundary> {
        match self {
            ProviderDetail::Aws(d) => d.vpc.as_ref(),
            ProviderDetail::Mock(d) => d.boundary.as_ref(),
            ProviderDetail::OpenStack(_) => None,
        }
    }

    /// Store boundary ids on the variants that carry them. Returns false when the
    /// provider has no notion of a boundary.
    pub fn record_network_boundary(&mut self, boundary: NetworkBoundary) -> bool {
        match self {
            ProviderDetail::Aws(d) => {
                d.vpc = Some(boundary);
                true
            }
            ProviderDetail::Mock(d) => {
                d.boundary = Some(boundary);
                true
            }
            ProviderDetail::OpenStack(_) => false,
        }
    }
}

// --- Entities (SQLx Mapped) ---

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Lab {
    pub id: Uuid,
    pub name: String,
    pub scenario_id: Uuid,
    pub status: LabStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Scenario {
    pub id: Uuid,
    pub name: String,
    pub topo: Json<Topology>,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct CloudConfig {
    pub id: Uuid,
    pub name: String,
    pub detail: Json<ProviderDetail>,
}

/// Provider attributes attached to a slice once its security group exists.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct SliceCloudAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sec_group_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Slice {
    pub id: Uuid,
    pub lab_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub status: SliceStatus,
    pub cloud_attrs: Json<SliceCloudAttrs>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct NetworkNode {
    pub id: Uuid,
    pub slice_id: Uuid,
    pub gid: Gid,
    pub name: String,
    pub cidr: String,
    pub x: f64,
    pub y: f64,
    pub status: NodeStatus,
    pub cloud_attrs: Json<serde_json::Value>,
}

impl NetworkNode {
    /// Provider-side network id, present once the network is realized.
    pub fn provider_network_id(&self) -> Option<&str> {
        self.cloud_attrs.get("network_id").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct InstanceNode {
    pub id: Uuid,
    pub slice_id: Uuid,
    pub gid: Gid,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub image: String,
    pub flavor: String,
    pub links: Json<Vec<Link>>,
    pub configurations: Json<Vec<Configuration>>,
    pub password: Option<String>,
    pub public_ip: Option<String>,
    pub status: NodeStatus,
    pub cloud_attrs: Json<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct RouterNode {
    pub id: Uuid,
    pub slice_id: Uuid,
    pub gid: Gid,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub flavor: String,
    pub links: Json<Vec<Link>>,
    pub configurations: Json<Vec<Configuration>>,
    pub password: Option<String>,
    pub public_ip: Option<String>,
    pub status: NodeStatus,
    pub cloud_attrs: Json<serde_json::Value>,
}

// --- Inserts ---

#[derive(Debug, Clone)]
pub struct NewSlice {
    pub lab_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewNetworkNode {
    pub slice_id: Uuid,
    pub gid: Gid,
    pub name: String,
    pub cidr: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone)]
pub struct NewInstanceNode {
    pub slice_id: Uuid,
    pub gid: Gid,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub image: String,
    pub flavor: String,
    pub links: Vec<Link>,
    pub configurations: Vec<Configuration>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRouterNode {
    pub slice_id: Uuid,
    pub gid: Gid,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub flavor: String,
    pub links: Vec<Link>,
    pub configurations: Vec<Configuration>,
    pub password: Option<String>,
}

/// A user a slice is created for.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DeployUser {
    pub id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lab_status_parse_roundtrip() {
        for s in LabStatus::ALL {
            assert_eq!(s.as_str().parse::<LabStatus>(), Ok(s));
            assert_eq!(
                serde_json::to_value(s).unwrap(),
                serde_json::json!(s.as_str())
            );
        }
        assert!("deleted".parse::<LabStatus>().is_err());
    }

    #[test]
    fn lab_status_only_moves_forward() {
        assert!(LabStatus::Created.can_transition_to(LabStatus::Deploying));
        assert!(LabStatus::Deploying.can_transition_to(LabStatus::Active));
        assert!(LabStatus::Deploying.can_transition_to(LabStatus::DeployFailed));
        // Redeploy is explicit.
        assert!(LabStatus::DeployFailed.can_transition_to(LabStatus::Deploying));

        // A boundary failure happens before the lab is claimed.
        assert!(LabStatus::Created.can_transition_to(LabStatus::DeployFailed));

        assert!(!LabStatus::Created.can_transition_to(LabStatus::Active));
        assert!(!LabStatus::DeployFailed.can_transition_to(LabStatus::Active));
        assert!(!LabStatus::Active.can_transition_to(LabStatus::Created));

        assert_eq!(
            LabStatus::sources_of(LabStatus::Active),
            vec![LabStatus::Deploying]
        );
        assert!(LabStatus::sources_of(LabStatus::Created).is_empty());
    }

    #[test]
    fn provider_detail_is_tagged_by_provider() {
        let raw = serde_json::json!({
            "provider": "aws",
            "region": "eu-west-1",
            "access_key_id": "AKIA",
            "secret_access_key": "secret",
        });
        let mut detail: ProviderDetail = serde_json::from_value(raw).unwrap();
        assert_eq!(detail.kind(), ProviderKind::Aws);
        assert!(detail.network_boundary().is_none());

        let boundary = NetworkBoundary {
            vpc_id: "vpc-1".into(),
            rt_id: "rtb-1".into(),
            ig_id: "igw-1".into(),
        };
        assert!(detail.record_network_boundary(boundary.clone()));
        assert_eq!(detail.network_boundary(), Some(&boundary));

        let out = serde_json::to_value(&detail).unwrap();
        assert_eq!(out["provider"], "aws");
        assert_eq!(out["vpc"]["vpc_id"], "vpc-1");
    }

    #[test]
    fn openstack_has_no_boundary() {
        let mut detail: ProviderDetail = serde_json::from_value(serde_json::json!({
            "provider": "openstack",
            "auth_url": "https://keystone:5000/v3",
            "username": "admin",
            "password": "pw",
            "project_name": "labs",
        }))
        .unwrap();
        assert_eq!(detail.kind(), ProviderKind::OpenStack);
        assert!(!detail.record_network_boundary(NetworkBoundary {
            vpc_id: "v".into(),
            rt_id: "r".into(),
            ig_id: "i".into(),
        }));
    }
}
