use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use labforge_common::bus::{CommandDeployLab, CommandType, CHANNEL_ORCHESTRATOR_COMMANDS};
use labforge_orchestrator::admin::{self, AppState};
use labforge_orchestrator::config::{OrchestratorConfig, StoreBackend};
use labforge_orchestrator::fault::{FaultReporter, RedisFaultReporter, TracingFaultReporter};
use labforge_orchestrator::migrations;
use labforge_orchestrator::provider_manager::ProviderManager;
use labforge_orchestrator::store::{LabStore, MemoryStore, PgStore};
use labforge_orchestrator::{DeployRequest, Deployer, DeploymentJobs};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = OrchestratorConfig::from_env()?;

    let store: Arc<dyn LabStore> = match config.store {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(database_url)
                .await
                .context("Failed to connect to Postgres")?;
            sqlx::query("SELECT 1").execute(&pool).await?;
            tracing::info!("✅ Connected to Database");
            migrations::run_inline_migrations(&pool).await;
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("⚠️ Using in-memory store: state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let redis_client = match config.redis_url.as_deref() {
        Some(url) => Some(redis::Client::open(url).context("Invalid REDIS_URL")?),
        None => None,
    };

    let faults: Arc<dyn FaultReporter> = match &redis_client {
        Some(client) => Arc::new(RedisFaultReporter::new(client.clone(), "orchestrator")),
        None => Arc::new(TracingFaultReporter),
    };

    let deployer = Deployer::new(store.clone(), Arc::new(ProviderManager), faults);
    let jobs = Arc::new(DeploymentJobs::new(deployer));

    // Event listener (Redis subscriber) on a dedicated PubSub connection
    if let Some(client) = redis_client {
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .context("Failed to open Redis PubSub connection")?;
        pubsub.subscribe(CHANNEL_ORCHESTRATOR_COMMANDS).await?;
        tracing::info!(
            "🎧 Orchestrator listening on Redis channel '{}'...",
            CHANNEL_ORCHESTRATOR_COMMANDS
        );

        let jobs_bus = jobs.clone();
        tokio::spawn(async move {
            use futures_util::StreamExt;
            let mut stream = pubsub.on_message();

            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!("⚠️ Unreadable bus payload: {}", e);
                        continue;
                    }
                };
                handle_command(&jobs_bus, &payload);
            }
            tracing::warn!("⚠️ Redis subscription closed");
        });
    } else {
        tracing::warn!("⚠️ REDIS_URL not set: command bus disabled");
    }

    let app = admin::router(AppState {
        store,
        jobs: jobs.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    tracing::info!("Orchestrator listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn handle_command(jobs: &DeploymentJobs, payload: &str) {
    tracing::info!("📩 Received Event: {}", payload);

    let event_json = match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("⚠️ Invalid event payload: {}", e);
            return;
        }
    };

    match serde_json::from_value::<CommandType>(event_json["type"].clone()) {
        Ok(CommandType::DeployLab) => {
            match serde_json::from_value::<CommandDeployLab>(event_json) {
                Ok(cmd) => {
                    tracing::info!("📥 Received Deploy Lab Command (lab {})", cmd.lab_id);
                    jobs.spawn(DeployRequest::from(cmd));
                }
                Err(e) => tracing::warn!("⚠️ Malformed CMD:DEPLOY_LAB: {}", e),
            }
        }
        Err(_) => tracing::warn!("⚠️ Unknown event type: {}", event_json["type"]),
    }
}
