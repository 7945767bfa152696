//! Node provisioning inside one slice: persist the record, then ask the provider for it.

pub mod instance;
pub mod network;
pub mod router;

use anyhow::Result;
use labforge_common::{Link, NetworkNode, Slice};
use labforge_providers::CloudProvider;

use crate::error::DeployError;
use crate::store::LabStore;

/// What every provisioner needs about the slice it works in.
pub struct SliceContext<'a> {
    pub store: &'a dyn LabStore,
    pub provider: &'a dyn CloudProvider,
    pub slice: &'a Slice,
    pub sec_group_id: &'a str,
}

/// Resolve the networks of a node's links into the parallel `(networks, ips)` lists the
/// provider expects. Every link must point at a network of the same slice.
pub async fn resolve_links(
    store: &dyn LabStore,
    slice: &Slice,
    links: &[Link],
) -> Result<(Vec<NetworkNode>, Vec<String>)> {
    let mut networks = Vec::with_capacity(links.len());
    let mut ips = Vec::with_capacity(links.len());
    for link in links {
        let network = store
            .find_network(slice.id, &link.network.gid)
            .await?
            .ok_or_else(|| DeployError::NetworkNotFound {
                slice_id: slice.id,
                gid: link.network.gid.clone(),
            })?;
        networks.push(network);
        ips.push(link.ip.clone());
    }
    Ok((networks, ips))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use labforge_common::{Gid, NewNetworkNode, NewSlice};
    use uuid::Uuid;

    #[tokio::test]
    async fn links_resolve_in_order() {
        let store = MemoryStore::new();
        let slice = store
            .insert_slice(NewSlice {
                lab_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                name: "lab / slice_0".into(),
            })
            .await
            .unwrap();
        for (gid, cidr) in [("n1", "10.0.0.0/24"), ("n2", "10.0.1.0/24")] {
            store
                .insert_network(NewNetworkNode {
                    slice_id: slice.id,
                    gid: Gid::from(gid),
                    name: gid.into(),
                    cidr: cidr.into(),
                    x: 0.0,
                    y: 0.0,
                })
                .await
                .unwrap();
        }

        let links = vec![
            Link::new("vm", "n2", "10.0.1.5"),
            Link::new("vm", "n1", "10.0.0.5"),
        ];
        let (networks, ips) = resolve_links(&store, &slice, &links).await.unwrap();
        let gids: Vec<&str> = networks.iter().map(|n| n.gid.as_str()).collect();
        assert_eq!(gids, vec!["n2", "n1"]);
        assert_eq!(ips, vec!["10.0.1.5", "10.0.0.5"]);
    }

    #[tokio::test]
    async fn missing_network_is_a_lookup_error() {
        let store = MemoryStore::new();
        let slice = store
            .insert_slice(NewSlice {
                lab_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                name: "s".into(),
            })
            .await
            .unwrap();

        let err = resolve_links(&store, &slice, &[Link::new("vm", "ghost", "10.9.9.9")])
            .await
            .unwrap_err();
        match err.downcast_ref::<DeployError>() {
            Some(DeployError::NetworkNotFound { gid, .. }) => assert_eq!(gid.as_str(), "ghost"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
