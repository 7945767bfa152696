//! Per-node extraction from a scenario topology: attached links and the ordered list of
//! configurations to apply.

use std::collections::HashMap;

use labforge_common::{Configuration, Gid, Link, NodeKind, Topology, TopologyNode};

use crate::secret_broker::SecretBroker;

/// Configurations that need the node's password in their parameters.
pub const SECRET_CONFIGURATIONS: [&str; 2] = ["Enable password authentication", "noVNC"];

/// Firewall configuration every router starts with.
pub const SHOREWALL: &str = "shorewall";

/// Links whose target is `node`, in topology order.
pub fn extract_links<N: TopologyNode + ?Sized>(node: &N, topo: &Topology) -> Vec<Link> {
    topo.links
        .iter()
        .filter(|l| &l.target.gid == node.gid())
        .cloned()
        .collect()
}

/// Links grouped by target gid, built once per topology.
pub struct LinkIndex<'t> {
    by_target: HashMap<&'t Gid, Vec<&'t Link>>,
}

impl<'t> LinkIndex<'t> {
    pub fn new(topo: &'t Topology) -> Self {
        let mut by_target: HashMap<&'t Gid, Vec<&'t Link>> = HashMap::new();
        for link in &topo.links {
            by_target.entry(&link.target.gid).or_default().push(link);
        }
        Self { by_target }
    }

    pub fn links_for(&self, gid: &Gid) -> Vec<Link> {
        self.by_target
            .get(gid)
            .map(|links| links.iter().map(|l| (*l).clone()).collect())
            .unwrap_or_default()
    }

    pub fn count_for(&self, gid: &Gid) -> usize {
        self.by_target.get(gid).map_or(0, Vec::len)
    }
}

/// Configuration list for `node` plus the secret issued for it, if any.
pub fn extract_configurations<N: TopologyNode + ?Sized>(
    node: &N,
    topo: &Topology,
) -> (Vec<Configuration>, Option<String>) {
    extract_configurations_with(node, &LinkIndex::new(topo), SecretBroker::new())
}

pub fn extract_configurations_with<N: TopologyNode + ?Sized>(
    node: &N,
    index: &LinkIndex<'_>,
    mut broker: SecretBroker,
) -> (Vec<Configuration>, Option<String>) {
    let mut configurations = Vec::with_capacity(node.declared_configurations().len() + 1);

    if node.kind() == NodeKind::Router {
        configurations.push(
            Configuration::new(SHOREWALL)
                .with_param("interfaces_count", index.count_for(node.gid())),
        );
    }

    for name in node.declared_configurations() {
        let conf = if SECRET_CONFIGURATIONS.contains(&name.as_str()) {
            Configuration::new(name.as_str()).with_param("password", broker.secret())
        } else {
            Configuration::new(name.as_str())
        };
        configurations.push(conf);
    }

    (configurations, broker.into_secret())
}

/// Everything persisted on an instance/router record ahead of realization.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeExtraction {
    pub links: Vec<Link>,
    pub configurations: Vec<Configuration>,
    pub password: Option<String>,
}

pub fn extract_node<N: TopologyNode + ?Sized>(node: &N, index: &LinkIndex<'_>) -> NodeExtraction {
    let (configurations, password) =
        extract_configurations_with(node, index, SecretBroker::new());
    NodeExtraction {
        links: index.links_for(node.gid()),
        configurations,
        password,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labforge_common::{InstanceSpec, RouterSpec};
    use serde_json::json;

    fn instance(gid: &str, configurations: &[&str]) -> InstanceSpec {
        InstanceSpec {
            name: format!("vm-{}", gid),
            x: 0.0,
            y: 0.0,
            gid: Gid::from(gid),
            kind: NodeKind::Instance,
            image: "ubuntu-22.04".into(),
            flavor: "small".into(),
            configurations: configurations.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn router(gid: &str, configurations: &[&str]) -> RouterSpec {
        RouterSpec {
            name: format!("r-{}", gid),
            x: 0.0,
            y: 0.0,
            gid: Gid::from(gid),
            kind: NodeKind::Router,
            flavor: "small".into(),
            configurations: configurations.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn topo_with_links(links: Vec<Link>) -> Topology {
        Topology {
            links,
            ..Topology::default()
        }
    }

    #[test]
    fn links_are_filtered_by_target_in_order() {
        let topo = topo_with_links(vec![
            Link::new("a", "n1", "10.0.0.1"),
            Link::new("b", "n1", "10.0.0.2"),
            Link::new("a", "n2", "10.0.1.1"),
            Link::new("c", "n2", "10.0.1.3"),
        ]);
        let node = instance("a", &[]);

        let links = extract_links(&node, &topo);
        assert_eq!(
            links,
            vec![
                Link::new("a", "n1", "10.0.0.1"),
                Link::new("a", "n2", "10.0.1.1")
            ]
        );
        assert_eq!(LinkIndex::new(&topo).links_for(node.gid()), links);
    }

    #[test]
    fn no_links_gives_empty_result() {
        let topo = Topology::default();
        assert!(extract_links(&instance("a", &[]), &topo).is_empty());
        assert_eq!(LinkIndex::new(&topo).count_for(&Gid::from("a")), 0);
    }

    #[test]
    fn secret_configurations_share_one_password() {
        let node = instance("a", &["noVNC", "Enable password authentication", "X"]);
        let (confs, secret) = extract_configurations(&node, &Topology::default());

        assert_eq!(confs.len(), 3);
        let secret = secret.expect("a secret is issued");
        assert_eq!(secret.len(), 8);

        assert_eq!(confs[0].name, "noVNC");
        assert_eq!(confs[0].params["password"], json!(secret));
        assert_eq!(confs[1].name, "Enable password authentication");
        assert_eq!(confs[1].params["password"], json!(secret));
        assert_eq!(confs[2].name, "X");
        assert!(confs[2].params.is_empty());
    }

    #[test]
    fn repeated_secret_configuration_reuses_password() {
        fn fixed(_: usize) -> String {
            "s3cr3tpw".to_string()
        }
        let node = instance("a", &["noVNC", "noVNC"]);
        let topo = Topology::default();
        let (confs, secret) =
            extract_configurations_with(&node, &LinkIndex::new(&topo), SecretBroker::with_generator(fixed));
        assert_eq!(secret.as_deref(), Some("s3cr3tpw"));
        assert!(confs.iter().all(|c| c.params["password"] == json!("s3cr3tpw")));
    }

    #[test]
    fn plain_node_without_configurations() {
        let (confs, secret) = extract_configurations(&instance("a", &[]), &Topology::default());
        assert!(confs.is_empty());
        assert_eq!(secret, None);
    }

    #[test]
    fn router_gets_shorewall_first() {
        let topo = topo_with_links(vec![
            Link::new("r1", "n1", "10.0.0.1"),
            Link::new("vm", "n1", "10.0.0.10"),
            Link::new("r1", "n2", "10.0.1.1"),
            Link::new("r1", "n3", "10.0.2.1"),
        ]);
        let (confs, secret) = extract_configurations(&router("r1", &[]), &topo);

        assert_eq!(
            confs,
            vec![Configuration::new(SHOREWALL).with_param("interfaces_count", 3)]
        );
        assert_eq!(secret, None);
    }

    #[test]
    fn router_declared_configurations_follow_shorewall() {
        let topo = topo_with_links(vec![Link::new("r1", "n1", "10.0.0.1")]);
        let (confs, secret) = extract_configurations(&router("r1", &["noVNC", "ospf"]), &topo);
        let names: Vec<&str> = confs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec![SHOREWALL, "noVNC", "ospf"]);
        assert_eq!(confs[0].params["interfaces_count"], json!(1));
        assert_eq!(confs[1].params["password"], json!(secret.unwrap()));
    }

    #[test]
    fn extract_node_bundles_links_and_configurations() {
        let topo = topo_with_links(vec![Link::new("a", "n1", "10.0.0.5")]);
        let index = LinkIndex::new(&topo);
        let out = extract_node(&instance("a", &["X"]), &index);
        assert_eq!(out.links, vec![Link::new("a", "n1", "10.0.0.5")]);
        assert_eq!(out.configurations, vec![Configuration::new("X")]);
        assert_eq!(out.password, None);
    }
}
