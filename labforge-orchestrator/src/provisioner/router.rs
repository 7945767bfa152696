use anyhow::{Context, Result};
use labforge_common::{NewRouterNode, NodeStatus, RouterNode, RouterSpec};

use super::{resolve_links, SliceContext};
use crate::state_machine;
use crate::topology::{extract_node, LinkIndex};

pub async fn persist(
    ctx: &SliceContext<'_>,
    spec: &RouterSpec,
    index: &LinkIndex<'_>,
) -> Result<RouterNode> {
    if let Some(existing) = ctx.store.find_router(ctx.slice.id, &spec.gid).await? {
        return Ok(existing);
    }
    let extracted = extract_node(spec, index);
    ctx.store
        .insert_router(NewRouterNode {
            slice_id: ctx.slice.id,
            gid: spec.gid.clone(),
            name: spec.name.clone(),
            x: spec.x,
            y: spec.y,
            flavor: spec.flavor.clone(),
            links: extracted.links,
            configurations: extracted.configurations,
            password: extracted.password,
        })
        .await
}

pub async fn realize(ctx: &SliceContext<'_>, node: &RouterNode) -> Result<()> {
    if node.status == NodeStatus::Active {
        return Ok(());
    }
    let (networks, ips) = resolve_links(ctx.store, ctx.slice, &node.links).await?;
    let created = ctx
        .provider
        .create_router(
            &node.name,
            &networks,
            &ips,
            &node.configurations,
            ctx.sec_group_id,
            &node.flavor,
        )
        .await
        .with_context(|| format!("create_router '{}' (gid={}) failed", node.name, node.gid))?;
    state_machine::router_to_active(
        ctx.store,
        node.id,
        created.public_ip.as_deref(),
        &created.attrs,
        "router created",
    )
    .await?;
    tracing::info!(
        "🔀 [provisioner] router '{}' active ({} interfaces)",
        node.name,
        networks.len()
    );
    Ok(())
}

pub async fn provision(
    ctx: &SliceContext<'_>,
    specs: &[RouterSpec],
    index: &LinkIndex<'_>,
) -> Result<()> {
    for spec in specs {
        persist(ctx, spec, index).await?;
    }
    for node in ctx.store.list_routers(ctx.slice.id).await? {
        realize(ctx, &node).await?;
    }
    Ok(())
}
