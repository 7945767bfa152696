use anyhow::Result;
use async_trait::async_trait;
use labforge_common::{Configuration, NetworkNode};

#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Provider code as stored on cloud configurations (e.g. "aws", "mock").
    fn name(&self) -> &'static str;

    /// Whether every lab needs its own network boundary (VPC + routing table + gateway)
    /// before anything else is created. Default: false.
    fn requires_network_boundary(&self) -> bool {
        false
    }

    /// Create the per-lab network boundary. Only called when `requires_network_boundary`
    /// is true; the default implementation reports the capability as unsupported.
    async fn create_network_boundary(&self, name: &str) -> Result<inventory::NetworkBoundary> {
        Err(anyhow::anyhow!(
            "{}: network boundaries are not supported (requested '{}')",
            self.name(),
            name
        ))
    }

    /// Returns the provider's security group id.
    async fn create_security_group(&self, name: &str) -> Result<String>;

    /// Returns the provider attributes of the new network. Implementations must include
    /// a `network_id` key; instances and routers are attached through it.
    async fn create_network(&self, name: &str, cidr: &str) -> Result<serde_json::Value>;

    /// `networks` and `ips` are parallel: the n-th address is assigned on the n-th network.
    #[allow(clippy::too_many_arguments)]
    async fn create_instance(
        &self,
        name: &str,
        networks: &[NetworkNode],
        ips: &[String],
        configurations: &[Configuration],
        sec_group_id: &str,
        image: &str,
        flavor: &str,
    ) -> Result<inventory::ProvisionedNode>;

    async fn create_router(
        &self,
        name: &str,
        networks: &[NetworkNode],
        ips: &[String],
        configurations: &[Configuration],
        sec_group_id: &str,
        flavor: &str,
    ) -> Result<inventory::ProvisionedNode>;
}

pub mod inventory {
    pub use labforge_common::NetworkBoundary;

    /// What the provider hands back for a realized instance or router.
    #[derive(Clone, Debug, PartialEq)]
    pub struct ProvisionedNode {
        pub public_ip: Option<String>,
        pub attrs: serde_json::Value,
    }
}

#[cfg(feature = "mock")]
pub mod mock;
