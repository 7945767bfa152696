//! Internal admin HTTP surface (health/debug only).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use crate::job::DeploymentJobs;
use crate::store::LabStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LabStore>,
    pub jobs: Arc<DeploymentJobs>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/admin/status", get(get_status))
        .route("/admin/jobs/:lab_id", get(get_job))
        .with_state(state)
}

async fn root() -> &'static str {
    "Labforge Orchestrator Online"
}

async fn get_status(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    let counts = state.store.count_labs_by_status().await.map_err(|e| {
        tracing::error!("❌ [admin] lab status count failed: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let labs: serde_json::Map<String, serde_json::Value> = counts
        .into_iter()
        .map(|(status, n)| (status.as_str().to_string(), json!(n)))
        .collect();
    Ok(Json(json!({ "labs": labs })))
}

async fn get_job(
    State(state): State<AppState>,
    Path(lab_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let job = state.jobs.state(lab_id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({ "lab_id": lab_id, "job": job })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::Deployer;
    use crate::fault::TracingFaultReporter;
    use crate::provider_manager::ProviderManager;
    use crate::store::MemoryStore;
    use labforge_common::Topology;

    fn state(store: Arc<MemoryStore>) -> AppState {
        let deployer = Deployer::new(
            store.clone(),
            Arc::new(ProviderManager),
            Arc::new(TracingFaultReporter),
        );
        AppState {
            store,
            jobs: Arc::new(DeploymentJobs::new(deployer)),
        }
    }

    #[tokio::test]
    async fn status_counts_labs() {
        let store = Arc::new(MemoryStore::new());
        let scenario = store.add_scenario("s", Topology::default()).await;
        store.add_lab("a", scenario.id).await;
        store.add_lab("b", scenario.id).await;

        let Json(body) = get_status(State(state(store))).await.unwrap();
        assert_eq!(body, json!({"labs": {"created": 2}}));
    }

    #[tokio::test]
    async fn unknown_job_is_404() {
        let store = Arc::new(MemoryStore::new());
        let res = get_job(State(state(store)), Path(Uuid::new_v4())).await;
        assert_eq!(res.err(), Some(StatusCode::NOT_FOUND));
    }
}
