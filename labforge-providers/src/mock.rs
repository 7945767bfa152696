use crate::{inventory, CloudProvider};
use anyhow::Result;
use async_trait::async_trait;
use labforge_common::{Configuration, NetworkNode, NodeStatus};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A provider call as seen by the mock, in the order it was made.
#[derive(Clone, Debug, PartialEq)]
pub enum MockCall {
    NetworkBoundary {
        name: String,
    },
    SecurityGroup {
        name: String,
    },
    Network {
        name: String,
        cidr: String,
    },
    Instance {
        name: String,
        network_ids: Vec<String>,
        ips: Vec<String>,
        configurations: Vec<Configuration>,
        sec_group_id: String,
        image: String,
        flavor: String,
    },
    Router {
        name: String,
        network_ids: Vec<String>,
        ips: Vec<String>,
        configurations: Vec<Configuration>,
        sec_group_id: String,
        flavor: String,
    },
}

impl MockCall {
    pub fn name(&self) -> &str {
        match self {
            MockCall::NetworkBoundary { name }
            | MockCall::SecurityGroup { name }
            | MockCall::Network { name, .. }
            | MockCall::Instance { name, .. }
            | MockCall::Router { name, .. } => name,
        }
    }
}

/// In-memory provider for local runs and tests.
///
/// Every call is recorded. Resources listed with [`MockProvider::fail_on`] are rejected, and
/// instances/routers are rejected when one of their networks has not been realized yet.
pub struct MockProvider {
    provider_code: &'static str,
    network_boundary: bool,
    latency: Option<Duration>,
    fail_on: Mutex<HashSet<String>>,
    calls: Mutex<Vec<MockCall>>,
    seq: AtomicU32,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            provider_code: "mock",
            network_boundary: false,
            latency: None,
            fail_on: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            seq: AtomicU32::new(0),
        }
    }

    pub fn with_network_boundary(mut self, enabled: bool) -> Self {
        self.network_boundary = enabled;
        self
    }

    /// Delay every call, to keep a deployment in flight for a while.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the creation of the resource named `name` fail.
    pub fn fail_on(&self, name: &str) {
        lock(&self.fail_on).insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        lock(&self.fail_on).clear();
    }

    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{}", prefix, n)
    }

    async fn enter(&self, call: MockCall) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let name = call.name().to_string();
        lock(&self.calls).push(call);
        if lock(&self.fail_on).contains(&name) {
            return Err(anyhow::anyhow!(
                "MockProvider: injected failure for '{}'",
                name
            ));
        }
        Ok(())
    }

    fn realized_network_ids(&self, node: &str, networks: &[NetworkNode]) -> Result<Vec<String>> {
        networks
            .iter()
            .map(|net| match (net.status, net.provider_network_id()) {
                (NodeStatus::Active, Some(id)) => Ok(id.to_string()),
                _ => Err(anyhow::anyhow!(
                    "MockProvider: '{}' references network '{}' (gid={}) which is not realized",
                    node,
                    net.name,
                    net.gid
                )),
            })
            .collect()
    }

    fn public_ip(&self) -> String {
        let n = self.seq.load(Ordering::SeqCst) % 250 + 1;
        format!("203.0.113.{}", n)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl CloudProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.provider_code
    }

    fn requires_network_boundary(&self) -> bool {
        self.network_boundary
    }

    async fn create_network_boundary(&self, name: &str) -> Result<inventory::NetworkBoundary> {
        self.enter(MockCall::NetworkBoundary {
            name: name.to_string(),
        })
        .await?;
        Ok(inventory::NetworkBoundary {
            vpc_id: self.next_id("vpc"),
            rt_id: self.next_id("rtb"),
            ig_id: self.next_id("igw"),
        })
    }

    async fn create_security_group(&self, name: &str) -> Result<String> {
        self.enter(MockCall::SecurityGroup {
            name: name.to_string(),
        })
        .await?;
        Ok(self.next_id("sg"))
    }

    async fn create_network(&self, name: &str, cidr: &str) -> Result<serde_json::Value> {
        self.enter(MockCall::Network {
            name: name.to_string(),
            cidr: cidr.to_string(),
        })
        .await?;
        Ok(json!({
            "network_id": self.next_id("net"),
            "subnet_id": self.next_id("subnet"),
            "cidr": cidr,
        }))
    }

    async fn create_instance(
        &self,
        name: &str,
        networks: &[NetworkNode],
        ips: &[String],
        configurations: &[Configuration],
        sec_group_id: &str,
        image: &str,
        flavor: &str,
    ) -> Result<inventory::ProvisionedNode> {
        let network_ids = self.realized_network_ids(name, networks)?;
        self.enter(MockCall::Instance {
            name: name.to_string(),
            network_ids: network_ids.clone(),
            ips: ips.to_vec(),
            configurations: configurations.to_vec(),
            sec_group_id: sec_group_id.to_string(),
            image: image.to_string(),
            flavor: flavor.to_string(),
        })
        .await?;
        Ok(inventory::ProvisionedNode {
            public_ip: Some(self.public_ip()),
            attrs: json!({
                "instance_id": self.next_id("i"),
                "network_ids": network_ids,
            }),
        })
    }

    async fn create_router(
        &self,
        name: &str,
        networks: &[NetworkNode],
        ips: &[String],
        configurations: &[Configuration],
        sec_group_id: &str,
        flavor: &str,
    ) -> Result<inventory::ProvisionedNode> {
        let network_ids = self.realized_network_ids(name, networks)?;
        self.enter(MockCall::Router {
            name: name.to_string(),
            network_ids: network_ids.clone(),
            ips: ips.to_vec(),
            configurations: configurations.to_vec(),
            sec_group_id: sec_group_id.to_string(),
            flavor: flavor.to_string(),
        })
        .await?;
        Ok(inventory::ProvisionedNode {
            public_ip: Some(self.public_ip()),
            attrs: json!({
                "router_id": self.next_id("r"),
                "network_ids": network_ids,
            }),
        })
    }
}
