use anyhow::{Context, Result};
use labforge_common::{NetworkNode, NetworkSpec, NewNetworkNode, NodeStatus};

use super::SliceContext;
use crate::state_machine;

/// Insert the network record, or return the one a previous run left for the same gid.
pub async fn persist(ctx: &SliceContext<'_>, spec: &NetworkSpec) -> Result<NetworkNode> {
    if let Some(existing) = ctx.store.find_network(ctx.slice.id, &spec.gid).await? {
        return Ok(existing);
    }
    ctx.store
        .insert_network(NewNetworkNode {
            slice_id: ctx.slice.id,
            gid: spec.gid.clone(),
            name: spec.name.clone(),
            cidr: spec.cidr.clone(),
            x: spec.x,
            y: spec.y,
        })
        .await
}

/// Create the network on the provider and mark the record active. Active records are left alone.
pub async fn realize(ctx: &SliceContext<'_>, node: &NetworkNode) -> Result<()> {
    if node.status == NodeStatus::Active {
        return Ok(());
    }
    let attrs = ctx
        .provider
        .create_network(&node.name, &node.cidr)
        .await
        .with_context(|| format!("create_network '{}' (gid={}) failed", node.name, node.gid))?;
    state_machine::network_to_active(ctx.store, node.id, &attrs, "network created").await?;
    tracing::info!(
        "🌐 [provisioner] network '{}' ({}) active in slice {}",
        node.name,
        node.cidr,
        ctx.slice.id
    );
    Ok(())
}

/// Networks are realized one by one; all of them are active once this returns.
pub async fn provision(ctx: &SliceContext<'_>, specs: &[NetworkSpec]) -> Result<()> {
    for spec in specs {
        let node = persist(ctx, spec).await?;
        realize(ctx, &node).await?;
    }
    Ok(())
}
