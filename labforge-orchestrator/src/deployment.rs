//! Top-level deployment driver and the single recovery boundary of a run.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use labforge_common::bus::CommandDeployLab;
use labforge_common::{CloudConfig, DeployUser, Lab, LabStatus, NewSlice, Slice, SliceStatus};
use labforge_providers::CloudProvider;
use uuid::Uuid;

use crate::error::DeployError;
use crate::fault::FaultReporter;
use crate::logger;
use crate::provider_manager::ProviderFactory;
use crate::slice::{deploy_slice, slice_name};
use crate::state_machine;
use crate::store::LabStore;

pub const ACTION_DEPLOY_LAB: &str = "DEPLOY_LAB";

#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub lab_id: Uuid,
    pub cloudconfig_id: Uuid,
    pub users: Vec<DeployUser>,
    pub correlation_id: Option<String>,
}

impl From<CommandDeployLab> for DeployRequest {
    fn from(cmd: CommandDeployLab) -> Self {
        Self {
            lab_id: cmd.lab_id,
            cloudconfig_id: cmd.cloudconfig_id,
            users: cmd.users,
            correlation_id: cmd.correlation_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Active,
    Failed(String),
}

#[derive(Clone)]
pub struct Deployer {
    store: Arc<dyn LabStore>,
    providers: Arc<dyn ProviderFactory>,
    faults: Arc<dyn FaultReporter>,
}

impl Deployer {
    pub fn new(
        store: Arc<dyn LabStore>,
        providers: Arc<dyn ProviderFactory>,
        faults: Arc<dyn FaultReporter>,
    ) -> Self {
        Self {
            store,
            providers,
            faults,
        }
    }

    /// Drive a lab to `active`. Any failure past loading marks the lab `deployfailed`
    /// and is forwarded to the fault reporter; nothing already created is undone.
    pub async fn deploy(&self, req: &DeployRequest) -> DeployOutcome {
        let start = Instant::now();
        let store = self.store.as_ref();

        let log_id = logger::log_event_with_metadata(
            store,
            ACTION_DEPLOY_LAB,
            "in_progress",
            req.lab_id,
            None,
            Some(serde_json::json!({
                "cloudconfig_id": req.cloudconfig_id,
                "users": req.users.len(),
                "correlation_id": req.correlation_id,
            })),
        )
        .await
        .map_err(|e| tracing::warn!("⚠️ [deployment] action log unavailable: {:#}", e))
        .ok();

        let (lab, config, provider) = match self.load(req).await {
            Ok(loaded) => loaded,
            // Nothing to mark: the lab or its configuration could not be read.
            Err(e) => return self.fail(req.lab_id, log_id, start, e, false).await,
        };

        tracing::info!(
            "🚀 [deployment] lab '{}' ({}) on {} with {} user(s)",
            lab.name,
            lab.id,
            provider.name(),
            req.users.len()
        );

        match self.run(&lab, &config, provider.as_ref(), &req.users).await {
            Ok(()) => {
                if let Some(lid) = log_id {
                    logger::log_event_complete(store, lid, "success", logger::elapsed_ms(start), None)
                        .await
                        .ok();
                }
                tracing::info!("✅ [deployment] lab '{}' active", lab.name);
                DeployOutcome::Active
            }
            Err(e) => self.fail(lab.id, log_id, start, e, true).await,
        }
    }

    async fn load(&self, req: &DeployRequest) -> Result<(Lab, CloudConfig, Arc<dyn CloudProvider>)> {
        let lab = self
            .store
            .get_lab(req.lab_id)
            .await?
            .ok_or(DeployError::LabNotFound(req.lab_id))?;
        let config = self
            .store
            .get_cloud_config(req.cloudconfig_id)
            .await?
            .ok_or(DeployError::CloudConfigNotFound(req.cloudconfig_id))?;
        let provider = self.providers.build(&config)?;
        Ok((lab, config, provider))
    }

    async fn run(
        &self,
        lab: &Lab,
        config: &CloudConfig,
        provider: &dyn CloudProvider,
        users: &[DeployUser],
    ) -> Result<()> {
        let store = self.store.as_ref();

        self.ensure_network_boundary(lab, config, provider).await?;
        if !state_machine::lab_to_deploying(store, lab.id, "deployment started").await? {
            return Err(DeployError::LabStatusConflict {
                lab_id: lab.id,
                to: LabStatus::Deploying,
            }
            .into());
        }

        let slices = self.ensure_slices(lab, users).await?;
        let pending: Vec<&Slice> = slices
            .iter()
            .filter(|s| s.status == SliceStatus::Deploying)
            .collect();

        if !pending.is_empty() {
            let scenario = store
                .get_scenario(lab.scenario_id)
                .await?
                .ok_or(DeployError::ScenarioNotFound(lab.scenario_id))?;
            for slice in pending {
                deploy_slice(store, provider, slice, &scenario.topo)
                    .await
                    .with_context(|| format!("slice '{}' failed", slice.name))?;
            }
        } else {
            tracing::info!("♻️ [deployment] lab '{}': every slice already active", lab.name);
        }

        if !state_machine::lab_to_active(store, lab.id, "all slices active").await? {
            return Err(DeployError::LabStatusConflict {
                lab_id: lab.id,
                to: LabStatus::Active,
            }
            .into());
        }
        Ok(())
    }

    async fn ensure_network_boundary(
        &self,
        lab: &Lab,
        config: &CloudConfig,
        provider: &dyn CloudProvider,
    ) -> Result<()> {
        if !provider.requires_network_boundary() {
            return Ok(());
        }
        if let Some(existing) = config.detail.network_boundary() {
            tracing::info!(
                "♻️ [deployment] reusing boundary for '{}': vpc={}",
                lab.name,
                existing.vpc_id
            );
            return Ok(());
        }
        let boundary = provider
            .create_network_boundary(&lab.name)
            .await
            .with_context(|| format!("network boundary for lab '{}' failed", lab.name))?;
        tracing::info!(
            "🧱 [deployment] boundary for '{}': vpc={} rt={} ig={}",
            lab.name,
            boundary.vpc_id,
            boundary.rt_id,
            boundary.ig_id
        );

        let mut detail = config.detail.0.clone();
        if detail.record_network_boundary(boundary) {
            self.store
                .update_cloud_config_detail(config.id, &detail)
                .await
                .context("Failed to persist network boundary")?;
        }
        Ok(())
    }

    /// Existing slices on resume, else one fresh slice per user.
    async fn ensure_slices(&self, lab: &Lab, users: &[DeployUser]) -> Result<Vec<Slice>> {
        let existing = self.store.list_slices(lab.id).await?;
        if !existing.is_empty() {
            return Ok(existing);
        }
        let mut slices = Vec::with_capacity(users.len());
        for (index, user) in users.iter().enumerate() {
            let slice = self
                .store
                .insert_slice(NewSlice {
                    lab_id: lab.id,
                    user_id: user.id,
                    name: slice_name(&lab.name, index),
                })
                .await?;
            slices.push(slice);
        }
        Ok(slices)
    }

    async fn fail(
        &self,
        lab_id: Uuid,
        log_id: Option<Uuid>,
        start: Instant,
        err: anyhow::Error,
        mark_lab: bool,
    ) -> DeployOutcome {
        let store = self.store.as_ref();
        let message = format!("{:#}", err);
        tracing::error!("❌ [deployment] lab {} failed: {}", lab_id, message);

        if mark_lab {
            if let Err(e) = state_machine::lab_to_deployfailed(store, lab_id, &message).await {
                tracing::error!("❌ [deployment] could not mark lab {} deployfailed: {:#}", lab_id, e);
            }
        }
        if let Some(lid) = log_id {
            logger::log_event_complete(store, lid, "failed", logger::elapsed_ms(start), Some(&message))
                .await
                .ok();
        }
        self.faults.report(&err).await;
        DeployOutcome::Failed(message)
    }
}
