use anyhow::{Context, Result};
use labforge_common::{Slice, SliceCloudAttrs, SliceStatus, Topology};
use labforge_providers::CloudProvider;

use crate::provisioner::{self, SliceContext};
use crate::state_machine;
use crate::store::LabStore;
use crate::topology::LinkIndex;

/// Name of the n-th slice of a lab.
pub fn slice_name(lab_name: &str, index: usize) -> String {
    format!("{} / slice_{}", lab_name, index)
}

/// Security group of the slice, created on first deployment and reused afterwards.
async fn ensure_security_group(
    store: &dyn LabStore,
    provider: &dyn CloudProvider,
    slice: &Slice,
) -> Result<String> {
    if let Some(id) = slice.cloud_attrs.sec_group_id.as_deref() {
        return Ok(id.to_string());
    }
    let sec_group_id = provider
        .create_security_group(&slice.name)
        .await
        .with_context(|| format!("create_security_group '{}' failed", slice.name))?;
    let attrs = SliceCloudAttrs {
        sec_group_id: Some(sec_group_id.clone()),
    };
    store.update_slice_cloud_attrs(slice.id, &attrs).await?;
    Ok(sec_group_id)
}

/// Deploy one slice: security group, networks, instances, routers, then `active`.
/// Slices already `active` are left untouched.
pub async fn deploy_slice(
    store: &dyn LabStore,
    provider: &dyn CloudProvider,
    slice: &Slice,
    topo: &Topology,
) -> Result<()> {
    if slice.status == SliceStatus::Active {
        return Ok(());
    }
    tracing::info!("🚀 [slice] deploying '{}' ({})", slice.name, slice.id);

    let sec_group_id = ensure_security_group(store, provider, slice).await?;
    let ctx = SliceContext {
        store,
        provider,
        slice,
        sec_group_id: &sec_group_id,
    };
    let index = LinkIndex::new(topo);

    provisioner::network::provision(&ctx, &topo.networks).await?;
    provisioner::instance::provision(&ctx, &topo.instances, &index).await?;
    provisioner::router::provision(&ctx, &topo.routers, &index).await?;

    state_machine::slice_to_active(store, slice.id, "slice deployed").await?;
    tracing::info!("✅ [slice] '{}' active", slice.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use labforge_common::{InstanceSpec, Link, NetworkSpec, NewSlice, NodeKind, NodeStatus};
    use labforge_providers::mock::{MockCall, MockProvider};
    use uuid::Uuid;

    fn small_topology() -> Topology {
        Topology {
            networks: vec![NetworkSpec {
                name: "lan".into(),
                cidr: "10.0.0.0/24".into(),
                x: 0.0,
                y: 0.0,
                gid: "n1".into(),
            }],
            instances: vec![InstanceSpec {
                name: "vm".into(),
                x: 1.0,
                y: 1.0,
                gid: "i1".into(),
                kind: NodeKind::Instance,
                image: "debian-12".into(),
                flavor: "small".into(),
                configurations: vec!["noVNC".into()],
            }],
            routers: vec![],
            links: vec![Link::new("i1", "n1", "10.0.0.10")],
        }
    }

    async fn new_slice(store: &MemoryStore) -> Slice {
        store
            .insert_slice(NewSlice {
                lab_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                name: slice_name("lab", 0),
            })
            .await
            .unwrap()
    }

    #[test]
    fn slices_are_named_after_the_lab() {
        assert_eq!(slice_name("Intro to OSPF", 2), "Intro to OSPF / slice_2");
    }

    #[tokio::test]
    async fn slice_is_deployed_in_order() {
        let store = MemoryStore::new();
        let provider = MockProvider::new();
        let slice = new_slice(&store).await;

        deploy_slice(&store, &provider, &slice, &small_topology())
            .await
            .unwrap();

        let calls = provider.calls();
        assert!(matches!(&calls[0], MockCall::SecurityGroup { name } if name == "lab / slice_0"));
        assert!(matches!(&calls[1], MockCall::Network { name, .. } if name == "lan"));
        match &calls[2] {
            MockCall::Instance {
                ips,
                sec_group_id,
                configurations,
                ..
            } => {
                assert_eq!(ips, &vec!["10.0.0.10".to_string()]);
                assert_eq!(sec_group_id, "sg-1");
                assert_eq!(configurations[0].name, "noVNC");
            }
            other => panic!("unexpected call {:?}", other),
        }

        let slices = store.list_slices(slice.lab_id).await.unwrap();
        assert_eq!(slices[0].status, SliceStatus::Active);
        assert_eq!(slices[0].cloud_attrs.sec_group_id.as_deref(), Some("sg-1"));

        let instances = store.list_instances(slice.id).await.unwrap();
        assert_eq!(instances[0].status, NodeStatus::Active);
        assert!(instances[0].public_ip.is_some());
        assert_eq!(instances[0].password.as_deref().map(str::len), Some(8));
    }

    #[tokio::test]
    async fn link_to_unknown_network_fails_the_slice() {
        let store = MemoryStore::new();
        let provider = MockProvider::new();
        let slice = new_slice(&store).await;
        let mut topo = small_topology();
        topo.links = vec![Link::new("i1", "n9", "10.9.0.1")];

        let err = deploy_slice(&store, &provider, &slice, &topo)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("gid=n9"));

        let slices = store.list_slices(slice.lab_id).await.unwrap();
        assert_eq!(slices[0].status, SliceStatus::Deploying);
        assert!(!provider
            .calls()
            .iter()
            .any(|c| matches!(c, MockCall::Instance { .. })));
    }
}
