use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use labforge_common::{
    CloudConfig, Gid, InstanceNode, Json, Lab, LabStatus, NetworkNode, NewInstanceNode,
    NewNetworkNode, NewRouterNode, NewSlice, NodeStatus, ProviderDetail, RouterNode, Scenario,
    Slice, SliceCloudAttrs, SliceStatus, Topology,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ActionLog, LabStore, StateTransition};

#[derive(Default)]
struct Tables {
    labs: Vec<Lab>,
    scenarios: Vec<Scenario>,
    cloud_configs: Vec<CloudConfig>,
    slices: Vec<Slice>,
    networks: Vec<NetworkNode>,
    instances: Vec<InstanceNode>,
    routers: Vec<RouterNode>,
    action_logs: Vec<ActionLog>,
    transitions: Vec<StateTransition>,
}

/// Process-local store. Rows keep insertion order, which stands in for the
/// sequence columns of the Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_scenario(&self, name: &str, topo: Topology) -> Scenario {
        let scenario = Scenario {
            id: Uuid::new_v4(),
            name: name.to_string(),
            topo: Json(topo),
        };
        self.tables.lock().await.scenarios.push(scenario.clone());
        scenario
    }

    pub async fn add_lab(&self, name: &str, scenario_id: Uuid) -> Lab {
        let lab = Lab {
            id: Uuid::new_v4(),
            name: name.to_string(),
            scenario_id,
            status: LabStatus::Created,
            created_at: Utc::now(),
        };
        self.tables.lock().await.labs.push(lab.clone());
        lab
    }

    pub async fn add_cloud_config(&self, name: &str, detail: ProviderDetail) -> CloudConfig {
        let config = CloudConfig {
            id: Uuid::new_v4(),
            name: name.to_string(),
            detail: Json(detail),
        };
        self.tables.lock().await.cloud_configs.push(config.clone());
        config
    }

    pub async fn networks(&self, slice_id: Uuid) -> Vec<NetworkNode> {
        self.tables
            .lock()
            .await
            .networks
            .iter()
            .filter(|n| n.slice_id == slice_id)
            .cloned()
            .collect()
    }

    pub async fn action_logs(&self) -> Vec<ActionLog> {
        self.tables.lock().await.action_logs.clone()
    }

    pub async fn state_transitions(&self) -> Vec<StateTransition> {
        self.tables.lock().await.transitions.clone()
    }
}

#[async_trait]
impl LabStore for MemoryStore {
    async fn get_lab(&self, id: Uuid) -> Result<Option<Lab>> {
        let t = self.tables.lock().await;
        Ok(t.labs.iter().find(|l| l.id == id).cloned())
    }

    async fn transition_lab(&self, id: Uuid, from: &[LabStatus], to: LabStatus) -> Result<bool> {
        let mut t = self.tables.lock().await;
        match t.labs.iter_mut().find(|l| l.id == id) {
            Some(lab) if from.contains(&lab.status) => {
                lab.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_labs_by_status(&self) -> Result<Vec<(LabStatus, i64)>> {
        let t = self.tables.lock().await;
        Ok(LabStatus::ALL
            .into_iter()
            .map(|s| (s, t.labs.iter().filter(|l| l.status == s).count() as i64))
            .filter(|(_, n)| *n > 0)
            .collect())
    }

    async fn get_cloud_config(&self, id: Uuid) -> Result<Option<CloudConfig>> {
        let t = self.tables.lock().await;
        Ok(t.cloud_configs.iter().find(|c| c.id == id).cloned())
    }

    async fn update_cloud_config_detail(&self, id: Uuid, detail: &ProviderDetail) -> Result<()> {
        let mut t = self.tables.lock().await;
        let config = t
            .cloud_configs
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| anyhow::anyhow!("cloud configuration {} not found", id))?;
        config.detail = Json(detail.clone());
        Ok(())
    }

    async fn get_scenario(&self, id: Uuid) -> Result<Option<Scenario>> {
        let t = self.tables.lock().await;
        Ok(t.scenarios.iter().find(|s| s.id == id).cloned())
    }

    async fn list_slices(&self, lab_id: Uuid) -> Result<Vec<Slice>> {
        let t = self.tables.lock().await;
        Ok(t.slices.iter().filter(|s| s.lab_id == lab_id).cloned().collect())
    }

    async fn insert_slice(&self, new: NewSlice) -> Result<Slice> {
        let slice = Slice {
            id: Uuid::new_v4(),
            lab_id: new.lab_id,
            user_id: new.user_id,
            name: new.name,
            status: SliceStatus::Deploying,
            cloud_attrs: Json(SliceCloudAttrs::default()),
            created_at: Utc::now(),
        };
        self.tables.lock().await.slices.push(slice.clone());
        Ok(slice)
    }

    async fn update_slice_cloud_attrs(&self, id: Uuid, attrs: &SliceCloudAttrs) -> Result<()> {
        let mut t = self.tables.lock().await;
        let slice = t
            .slices
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| anyhow::anyhow!("slice {} not found", id))?;
        slice.cloud_attrs = Json(attrs.clone());
        Ok(())
    }

    async fn transition_slice(&self, id: Uuid, from: SliceStatus, to: SliceStatus) -> Result<bool> {
        let mut t = self.tables.lock().await;
        match t.slices.iter_mut().find(|s| s.id == id) {
            Some(slice) if slice.status == from => {
                slice.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_network(&self, slice_id: Uuid, gid: &Gid) -> Result<Option<NetworkNode>> {
        let t = self.tables.lock().await;
        Ok(t
            .networks
            .iter()
            .find(|n| n.slice_id == slice_id && &n.gid == gid)
            .cloned())
    }

    async fn insert_network(&self, new: NewNetworkNode) -> Result<NetworkNode> {
        let node = NetworkNode {
            id: Uuid::new_v4(),
            slice_id: new.slice_id,
            gid: new.gid,
            name: new.name,
            cidr: new.cidr,
            x: new.x,
            y: new.y,
            status: NodeStatus::Deploying,
            cloud_attrs: Json(serde_json::json!({})),
        };
        self.tables.lock().await.networks.push(node.clone());
        Ok(node)
    }

    async fn mark_network_active(&self, id: Uuid, cloud_attrs: &serde_json::Value) -> Result<bool> {
        let mut t = self.tables.lock().await;
        match t.networks.iter_mut().find(|n| n.id == id) {
            Some(node) if node.status == NodeStatus::Deploying => {
                node.status = NodeStatus::Active;
                node.cloud_attrs = Json(cloud_attrs.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_instance(&self, slice_id: Uuid, gid: &Gid) -> Result<Option<InstanceNode>> {
        let t = self.tables.lock().await;
        Ok(t
            .instances
            .iter()
            .find(|n| n.slice_id == slice_id && &n.gid == gid)
            .cloned())
    }

    async fn insert_instance(&self, new: NewInstanceNode) -> Result<InstanceNode> {
        let node = InstanceNode {
            id: Uuid::new_v4(),
            slice_id: new.slice_id,
            gid: new.gid,
            name: new.name,
            x: new.x,
            y: new.y,
            image: new.image,
            flavor: new.flavor,
            links: Json(new.links),
            configurations: Json(new.configurations),
            password: new.password,
            public_ip: None,
            status: NodeStatus::Deploying,
            cloud_attrs: Json(serde_json::json!({})),
        };
        self.tables.lock().await.instances.push(node.clone());
        Ok(node)
    }

    async fn list_instances(&self, slice_id: Uuid) -> Result<Vec<InstanceNode>> {
        let t = self.tables.lock().await;
        Ok(t
            .instances
            .iter()
            .filter(|n| n.slice_id == slice_id)
            .cloned()
            .collect())
    }

    async fn mark_instance_active(
        &self,
        id: Uuid,
        public_ip: Option<&str>,
        cloud_attrs: &serde_json::Value,
    ) -> Result<bool> {
        let mut t = self.tables.lock().await;
        match t.instances.iter_mut().find(|n| n.id == id) {
            Some(node) if node.status == NodeStatus::Deploying => {
                node.status = NodeStatus::Active;
                node.public_ip = public_ip.map(str::to_string);
                node.cloud_attrs = Json(cloud_attrs.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_router(&self, slice_id: Uuid, gid: &Gid) -> Result<Option<RouterNode>> {
        let t = self.tables.lock().await;
        Ok(t
            .routers
            .iter()
            .find(|n| n.slice_id == slice_id && &n.gid == gid)
            .cloned())
    }

    async fn insert_router(&self, new: NewRouterNode) -> Result<RouterNode> {
        let node = RouterNode {
            id: Uuid::new_v4(),
            slice_id: new.slice_id,
            gid: new.gid,
            name: new.name,
            x: new.x,
            y: new.y,
            flavor: new.flavor,
            links: Json(new.links),
            configurations: Json(new.configurations),
            password: new.password,
            public_ip: None,
            status: NodeStatus::Deploying,
            cloud_attrs: Json(serde_json::json!({})),
        };
        self.tables.lock().await.routers.push(node.clone());
        Ok(node)
    }

    async fn list_routers(&self, slice_id: Uuid) -> Result<Vec<RouterNode>> {
        let t = self.tables.lock().await;
        Ok(t
            .routers
            .iter()
            .filter(|n| n.slice_id == slice_id)
            .cloned()
            .collect())
    }

    async fn mark_router_active(
        &self,
        id: Uuid,
        public_ip: Option<&str>,
        cloud_attrs: &serde_json::Value,
    ) -> Result<bool> {
        let mut t = self.tables.lock().await;
        match t.routers.iter_mut().find(|n| n.id == id) {
            Some(node) if node.status == NodeStatus::Deploying => {
                node.status = NodeStatus::Active;
                node.public_ip = public_ip.map(str::to_string);
                node.cloud_attrs = Json(cloud_attrs.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_action_log(
        &self,
        action_type: &str,
        status: &str,
        lab_id: Uuid,
        error_message: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Uuid> {
        let log = ActionLog {
            id: Uuid::new_v4(),
            action_type: action_type.to_string(),
            status: status.to_string(),
            lab_id,
            error_message: error_message.map(str::to_string),
            metadata,
            duration_ms: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        let id = log.id;
        self.tables.lock().await.action_logs.push(log);
        Ok(id)
    }

    async fn complete_action_log(
        &self,
        log_id: Uuid,
        status: &str,
        duration_ms: i32,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut t = self.tables.lock().await;
        if let Some(log) = t.action_logs.iter_mut().find(|l| l.id == log_id) {
            log.status = status.to_string();
            log.duration_ms = Some(duration_ms);
            log.error_message = error_message.map(str::to_string);
            log.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn insert_state_transition(&self, transition: StateTransition) -> Result<()> {
        self.tables.lock().await.transitions.push(transition);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labforge_common::MockDetail;

    #[tokio::test]
    async fn lab_transition_is_conditional() {
        let store = MemoryStore::new();
        let scenario = store.add_scenario("s", Topology::default()).await;
        let lab = store.add_lab("lab", scenario.id).await;

        assert!(!store
            .transition_lab(lab.id, &[LabStatus::Deploying], LabStatus::Active)
            .await
            .unwrap());
        assert!(store
            .transition_lab(lab.id, &[LabStatus::Created], LabStatus::Deploying)
            .await
            .unwrap());
        let lab = store.get_lab(lab.id).await.unwrap().unwrap();
        assert_eq!(lab.status, LabStatus::Deploying);
        assert_eq!(
            store.count_labs_by_status().await.unwrap(),
            vec![(LabStatus::Deploying, 1)]
        );
    }

    #[tokio::test]
    async fn node_activation_happens_once() {
        let store = MemoryStore::new();
        let node = store
            .insert_network(NewNetworkNode {
                slice_id: Uuid::new_v4(),
                gid: Gid::from("n1"),
                name: "lan".into(),
                cidr: "10.0.0.0/24".into(),
                x: 0.0,
                y: 0.0,
            })
            .await
            .unwrap();
        assert_eq!(node.status, NodeStatus::Deploying);

        let attrs = serde_json::json!({"network_id": "net-1"});
        assert!(store.mark_network_active(node.id, &attrs).await.unwrap());
        assert!(!store.mark_network_active(node.id, &attrs).await.unwrap());

        let found = store
            .find_network(node.slice_id, &Gid::from("n1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.provider_network_id(), Some("net-1"));
    }

    #[tokio::test]
    async fn cloud_config_detail_is_replaced() {
        let store = MemoryStore::new();
        let config = store
            .add_cloud_config("local", ProviderDetail::Mock(MockDetail::default()))
            .await;
        let mut detail = config.detail.0.clone();
        detail.record_network_boundary(labforge_common::NetworkBoundary {
            vpc_id: "vpc-1".into(),
            rt_id: "rtb-1".into(),
            ig_id: "igw-1".into(),
        });
        store
            .update_cloud_config_detail(config.id, &detail)
            .await
            .unwrap();
        let reloaded = store.get_cloud_config(config.id).await.unwrap().unwrap();
        assert_eq!(
            reloaded.detail.network_boundary().map(|b| b.vpc_id.as_str()),
            Some("vpc-1")
        );
    }
}
