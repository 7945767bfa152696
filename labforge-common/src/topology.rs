//! Topology document stored on a scenario.
//!
//! The document comes from the topology editor, so it is parsed leniently: gids may be JSON
//! strings or integers, and the node kind is accepted under either `kind` or the legacy `type` key.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Graph-local identifier of a node, unique within one topology.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Gid(String);

impl Gid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Gid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Gid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for Gid {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for Gid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawGid {
            Text(String),
            Int(i64),
            Float(f64),
        }

        Ok(match RawGid::deserialize(deserializer)? {
            RawGid::Text(s) => Gid(s),
            RawGid::Int(i) => Gid(i.to_string()),
            RawGid::Float(f) => Gid(f.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    #[default]
    Instance,
    Router,
}

impl NodeKind {
    fn router() -> Self {
        NodeKind::Router
    }
}

impl From<String> for NodeKind {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("router") {
            NodeKind::Router
        } else {
            NodeKind::Instance
        }
    }
}

impl From<NodeKind> for String {
    fn from(value: NodeKind) -> Self {
        match value {
            NodeKind::Instance => "Instance".to_string(),
            NodeKind::Router => "Router".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GidRef {
    pub gid: Gid,
}

/// Directed association from a node (`target`) to a network, with the address assigned on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub target: GidRef,
    pub network: GidRef,
    pub ip: String,
}

impl Link {
    pub fn new(target: impl Into<Gid>, network: impl Into<Gid>, ip: impl Into<String>) -> Self {
        Self {
            target: GidRef { gid: target.into() },
            network: GidRef {
                gid: network.into(),
            },
            ip: ip.into(),
        }
    }
}

/// A named post-provisioning action with its rendering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: serde_json::Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    pub cidr: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    pub gid: Gid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    pub gid: Gid,
    #[serde(default, alias = "type")]
    pub kind: NodeKind,
    pub image: String,
    pub flavor: String,
    #[serde(default)]
    pub configurations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterSpec {
    pub name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    pub gid: Gid,
    #[serde(default = "NodeKind::router", alias = "type")]
    pub kind: NodeKind,
    pub flavor: String,
    #[serde(default)]
    pub configurations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub networks: Vec<NetworkSpec>,
    #[serde(default)]
    pub instances: Vec<InstanceSpec>,
    #[serde(default)]
    pub routers: Vec<RouterSpec>,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// What configuration extraction needs to know about a compute node.
pub trait TopologyNode {
    fn gid(&self) -> &Gid;
    fn kind(&self) -> NodeKind;
    fn declared_configurations(&self) -> &[String];
}

impl TopologyNode for InstanceSpec {
    fn gid(&self) -> &Gid {
        &self.gid
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn declared_configurations(&self) -> &[String] {
        &self.configurations
    }
}

impl TopologyNode for RouterSpec {
    fn gid(&self) -> &Gid {
        &self.gid
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn declared_configurations(&self) -> &[String] {
        &self.configurations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_editor_document() {
        let topo: Topology = serde_json::from_value(json!({
            "networks": [{"name": "lan", "cidr": "10.0.0.0/24", "x": 10, "y": 20, "gid": 1}],
            "instances": [{
                "name": "web", "x": 0, "y": 0, "gid": "2", "type": "Instance",
                "image": "ubuntu-22.04", "flavor": "small",
                "configurations": ["noVNC"]
            }],
            "routers": [{"name": "gw", "x": 0, "y": 0, "gid": 3, "flavor": "small"}],
            "links": [{"target": {"gid": 2}, "network": {"gid": "1"}, "ip": "10.0.0.10"}]
        }))
        .unwrap();

        assert_eq!(topo.networks[0].gid, Gid::from("1"));
        assert_eq!(topo.instances[0].kind, NodeKind::Instance);
        assert_eq!(topo.instances[0].configurations, vec!["noVNC".to_string()]);
        assert_eq!(topo.routers[0].kind, NodeKind::Router);
        assert!(topo.routers[0].configurations.is_empty());
        assert_eq!(topo.links[0], Link::new("2", "1", "10.0.0.10"));
    }

    #[test]
    fn kind_key_wins_over_default() {
        let spec: RouterSpec = serde_json::from_value(json!({
            "name": "r", "gid": "r1", "kind": "router", "flavor": "f"
        }))
        .unwrap();
        assert_eq!(spec.kind, NodeKind::Router);
        assert_eq!(serde_json::to_value(spec.kind).unwrap(), json!("Router"));
    }

    #[test]
    fn configuration_params_default_to_empty_object() {
        let conf: Configuration = serde_json::from_value(json!({"name": "X"})).unwrap();
        assert!(conf.params.is_empty());
        assert_eq!(
            serde_json::to_value(&conf).unwrap(),
            json!({"name": "X", "params": {}})
        );
    }
}
