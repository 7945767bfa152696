use anyhow::{Context, Result};
use labforge_common::{InstanceNode, InstanceSpec, NewInstanceNode, NodeStatus};

use super::{resolve_links, SliceContext};
use crate::state_machine;
use crate::topology::{extract_node, LinkIndex};

/// Phase 1: extract links and configurations and store the record. A record left by a
/// previous run for the same gid is kept as is, password included.
pub async fn persist(
    ctx: &SliceContext<'_>,
    spec: &InstanceSpec,
    index: &LinkIndex<'_>,
) -> Result<InstanceNode> {
    if let Some(existing) = ctx.store.find_instance(ctx.slice.id, &spec.gid).await? {
        return Ok(existing);
    }
    let extracted = extract_node(spec, index);
    ctx.store
        .insert_instance(NewInstanceNode {
            slice_id: ctx.slice.id,
            gid: spec.gid.clone(),
            name: spec.name.clone(),
            x: spec.x,
            y: spec.y,
            image: spec.image.clone(),
            flavor: spec.flavor.clone(),
            links: extracted.links,
            configurations: extracted.configurations,
            password: extracted.password,
        })
        .await
}

/// Phase 2: attach the instance to its networks on the provider.
pub async fn realize(ctx: &SliceContext<'_>, node: &InstanceNode) -> Result<()> {
    if node.status == NodeStatus::Active {
        return Ok(());
    }
    let (networks, ips) = resolve_links(ctx.store, ctx.slice, &node.links).await?;
    let created = ctx
        .provider
        .create_instance(
            &node.name,
            &networks,
            &ips,
            &node.configurations,
            ctx.sec_group_id,
            &node.image,
            &node.flavor,
        )
        .await
        .with_context(|| format!("create_instance '{}' (gid={}) failed", node.name, node.gid))?;
    state_machine::instance_to_active(
        ctx.store,
        node.id,
        created.public_ip.as_deref(),
        &created.attrs,
        "instance created",
    )
    .await?;
    tracing::info!(
        "🖥️ [provisioner] instance '{}' active (public_ip={:?})",
        node.name,
        created.public_ip
    );
    Ok(())
}

pub async fn provision(
    ctx: &SliceContext<'_>,
    specs: &[InstanceSpec],
    index: &LinkIndex<'_>,
) -> Result<()> {
    for spec in specs {
        persist(ctx, spec, index).await?;
    }
    for node in ctx.store.list_instances(ctx.slice.id).await? {
        realize(ctx, &node).await?;
    }
    Ok(())
}
