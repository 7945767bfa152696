use anyhow::{Context, Result};
use async_trait::async_trait;
use labforge_common::{
    CloudConfig, Gid, InstanceNode, Lab, LabStatus, NetworkNode, NewInstanceNode, NewNetworkNode,
    NewRouterNode, NewSlice, ProviderDetail, RouterNode, Scenario, Slice, SliceCloudAttrs,
    SliceStatus,
};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::{LabStore, StateTransition};

const LAB_COLUMNS: &str = "id, name, scenario_id, status, created_at";
const SLICE_COLUMNS: &str = "id, lab_id, user_id, name, status, cloud_attrs, created_at";
const NETWORK_COLUMNS: &str = "id, slice_id, gid, name, cidr, x, y, status, cloud_attrs";
const INSTANCE_COLUMNS: &str = "id, slice_id, gid, name, x, y, image, flavor, links, configurations, password, public_ip, status, cloud_attrs";
const ROUTER_COLUMNS: &str = "id, slice_id, gid, name, x, y, flavor, links, configurations, password, public_ip, status, cloud_attrs";

/// Postgres-backed store. Queries are built at runtime (`query`/`query_as`) so the crate
/// builds without a live DATABASE_URL.
#[derive(Clone)]
pub struct PgStore {
    db: Pool<Postgres>,
}

impl PgStore {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }
}

fn status_texts(statuses: &[LabStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[async_trait]
impl LabStore for PgStore {
    async fn get_lab(&self, id: Uuid) -> Result<Option<Lab>> {
        let lab = sqlx::query_as::<_, Lab>(&format!("SELECT {} FROM labs WHERE id = $1", LAB_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(lab)
    }

    async fn transition_lab(&self, id: Uuid, from: &[LabStatus], to: LabStatus) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE labs SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status::text = ANY($2)",
        )
        .bind(id)
        .bind(status_texts(from))
        .bind(to)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn count_labs_by_status(&self) -> Result<Vec<(LabStatus, i64)>> {
        let rows = sqlx::query_as::<_, (LabStatus, i64)>(
            "SELECT status, COUNT(*) FROM labs GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get_cloud_config(&self, id: Uuid) -> Result<Option<CloudConfig>> {
        let config = sqlx::query_as::<_, CloudConfig>(
            "SELECT id, name, detail FROM cloud_configs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(config)
    }

    async fn update_cloud_config_detail(&self, id: Uuid, detail: &ProviderDetail) -> Result<()> {
        let res = sqlx::query("UPDATE cloud_configs SET detail = $2 WHERE id = $1")
            .bind(id)
            .bind(serde_json::to_value(detail)?)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            anyhow::bail!("cloud configuration {} not found", id);
        }
        Ok(())
    }

    async fn get_scenario(&self, id: Uuid) -> Result<Option<Scenario>> {
        let scenario =
            sqlx::query_as::<_, Scenario>("SELECT id, name, topo FROM scenarios WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.db)
                .await
                .with_context(|| format!("Failed to load scenario {}", id))?;
        Ok(scenario)
    }

    async fn list_slices(&self, lab_id: Uuid) -> Result<Vec<Slice>> {
        let slices = sqlx::query_as::<_, Slice>(&format!(
            "SELECT {} FROM slices WHERE lab_id = $1 ORDER BY seq",
            SLICE_COLUMNS
        ))
        .bind(lab_id)
        .fetch_all(&self.db)
        .await?;
        Ok(slices)
    }

    async fn insert_slice(&self, new: NewSlice) -> Result<Slice> {
        let slice = sqlx::query_as::<_, Slice>(&format!(
            "INSERT INTO slices (id, lab_id, user_id, name, status, cloud_attrs, created_at)
             VALUES ($1, $2, $3, $4, 'deploying', '{{}}'::jsonb, NOW())
             RETURNING {}",
            SLICE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new.lab_id)
        .bind(new.user_id)
        .bind(&new.name)
        .fetch_one(&self.db)
        .await?;
        Ok(slice)
    }

    async fn update_slice_cloud_attrs(&self, id: Uuid, attrs: &SliceCloudAttrs) -> Result<()> {
        sqlx::query("UPDATE slices SET cloud_attrs = $2 WHERE id = $1")
            .bind(id)
            .bind(serde_json::to_value(attrs)?)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn transition_slice(&self, id: Uuid, from: SliceStatus, to: SliceStatus) -> Result<bool> {
        let res = sqlx::query("UPDATE slices SET status = $3 WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(from)
            .bind(to)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_network(&self, slice_id: Uuid, gid: &Gid) -> Result<Option<NetworkNode>> {
        let node = sqlx::query_as::<_, NetworkNode>(&format!(
            "SELECT {} FROM network_nodes WHERE slice_id = $1 AND gid = $2",
            NETWORK_COLUMNS
        ))
        .bind(slice_id)
        .bind(gid)
        .fetch_optional(&self.db)
        .await?;
        Ok(node)
    }

    async fn insert_network(&self, new: NewNetworkNode) -> Result<NetworkNode> {
        let node = sqlx::query_as::<_, NetworkNode>(&format!(
            "INSERT INTO network_nodes (id, slice_id, gid, name, cidr, x, y, status, cloud_attrs)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'deploying', '{{}}'::jsonb)
             RETURNING {}",
            NETWORK_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new.slice_id)
        .bind(&new.gid)
        .bind(&new.name)
        .bind(&new.cidr)
        .bind(new.x)
        .bind(new.y)
        .fetch_one(&self.db)
        .await?;
        Ok(node)
    }

    async fn mark_network_active(&self, id: Uuid, cloud_attrs: &serde_json::Value) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE network_nodes SET status = 'active', cloud_attrs = $2
             WHERE id = $1 AND status = 'deploying'",
        )
        .bind(id)
        .bind(cloud_attrs)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_instance(&self, slice_id: Uuid, gid: &Gid) -> Result<Option<InstanceNode>> {
        let node = sqlx::query_as::<_, InstanceNode>(&format!(
            "SELECT {} FROM instances WHERE slice_id = $1 AND gid = $2",
            INSTANCE_COLUMNS
        ))
        .bind(slice_id)
        .bind(gid)
        .fetch_optional(&self.db)
        .await?;
        Ok(node)
    }

    async fn insert_instance(&self, new: NewInstanceNode) -> Result<InstanceNode> {
        let node = sqlx::query_as::<_, InstanceNode>(&format!(
            "INSERT INTO instances
             (id, slice_id, gid, name, x, y, image, flavor, links, configurations, password, status, cloud_attrs)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'deploying', '{{}}'::jsonb)
             RETURNING {}",
            INSTANCE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new.slice_id)
        .bind(&new.gid)
        .bind(&new.name)
        .bind(new.x)
        .bind(new.y)
        .bind(&new.image)
        .bind(&new.flavor)
        .bind(serde_json::to_value(&new.links)?)
        .bind(serde_json::to_value(&new.configurations)?)
        .bind(&new.password)
        .fetch_one(&self.db)
        .await?;
        Ok(node)
    }

    async fn list_instances(&self, slice_id: Uuid) -> Result<Vec<InstanceNode>> {
        let nodes = sqlx::query_as::<_, InstanceNode>(&format!(
            "SELECT {} FROM instances WHERE slice_id = $1 ORDER BY seq",
            INSTANCE_COLUMNS
        ))
        .bind(slice_id)
        .fetch_all(&self.db)
        .await?;
        Ok(nodes)
    }

    async fn mark_instance_active(
        &self,
        id: Uuid,
        public_ip: Option<&str>,
        cloud_attrs: &serde_json::Value,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE instances SET status = 'active', public_ip = $2, cloud_attrs = $3
             WHERE id = $1 AND status = 'deploying'",
        )
        .bind(id)
        .bind(public_ip)
        .bind(cloud_attrs)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_router(&self, slice_id: Uuid, gid: &Gid) -> Result<Option<RouterNode>> {
        let node = sqlx::query_as::<_, RouterNode>(&format!(
            "SELECT {} FROM routers WHERE slice_id = $1 AND gid = $2",
            ROUTER_COLUMNS
        ))
        .bind(slice_id)
        .bind(gid)
        .fetch_optional(&self.db)
        .await?;
        Ok(node)
    }

    async fn insert_router(&self, new: NewRouterNode) -> Result<RouterNode> {
        let node = sqlx::query_as::<_, RouterNode>(&format!(
            "INSERT INTO routers
             (id, slice_id, gid, name, x, y, flavor, links, configurations, password, status, cloud_attrs)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'deploying', '{{}}'::jsonb)
             RETURNING {}",
            ROUTER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new.slice_id)
        .bind(&new.gid)
        .bind(&new.name)
        .bind(new.x)
        .bind(new.y)
        .bind(&new.flavor)
        .bind(serde_json::to_value(&new.links)?)
        .bind(serde_json::to_value(&new.configurations)?)
        .bind(&new.password)
        .fetch_one(&self.db)
        .await?;
        Ok(node)
    }

    async fn list_routers(&self, slice_id: Uuid) -> Result<Vec<RouterNode>> {
        let nodes = sqlx::query_as::<_, RouterNode>(&format!(
            "SELECT {} FROM routers WHERE slice_id = $1 ORDER BY seq",
            ROUTER_COLUMNS
        ))
        .bind(slice_id)
        .fetch_all(&self.db)
        .await?;
        Ok(nodes)
    }

    async fn mark_router_active(
        &self,
        id: Uuid,
        public_ip: Option<&str>,
        cloud_attrs: &serde_json::Value,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE routers SET status = 'active', public_ip = $2, cloud_attrs = $3
             WHERE id = $1 AND status = 'deploying'",
        )
        .bind(id)
        .bind(public_ip)
        .bind(cloud_attrs)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn insert_action_log(
        &self,
        action_type: &str,
        status: &str,
        lab_id: Uuid,
        error_message: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Uuid> {
        let log_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO action_logs
             (id, action_type, component, status, error_message, lab_id, metadata, created_at)
             VALUES ($1, $2, 'orchestrator', $3, $4, $5, $6, NOW())",
        )
        .bind(log_id)
        .bind(action_type)
        .bind(status)
        .bind(error_message)
        .bind(lab_id)
        .bind(metadata)
        .execute(&self.db)
        .await?;
        Ok(log_id)
    }

    async fn complete_action_log(
        &self,
        log_id: Uuid,
        status: &str,
        duration_ms: i32,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE action_logs
             SET status = $2, duration_ms = $3, error_message = $4, completed_at = NOW()
             WHERE id = $1",
        )
        .bind(log_id)
        .bind(status)
        .bind(duration_ms)
        .bind(error_message)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn insert_state_transition(&self, t: StateTransition) -> Result<()> {
        sqlx::query(
            "INSERT INTO state_transitions (entity, entity_id, from_status, to_status, reason)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(t.entity)
        .bind(t.entity_id)
        .bind(&t.from_status)
        .bind(&t.to_status)
        .bind(&t.reason)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}
