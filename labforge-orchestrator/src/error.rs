use labforge_common::{Gid, LabStatus, ProviderKind};
use thiserror::Error;
use uuid::Uuid;

/// Lookup and wiring failures raised while driving a deployment.
///
/// Provider and store failures travel as `anyhow::Error`; these are the cases the
/// orchestrator itself detects.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("lab {0} not found")]
    LabNotFound(Uuid),

    #[error("cloud configuration {0} not found")]
    CloudConfigNotFound(Uuid),

    #[error("scenario {0} not found")]
    ScenarioNotFound(Uuid),

    #[error("network gid={gid} not found in slice {slice_id}")]
    NetworkNotFound { slice_id: Uuid, gid: Gid },

    #[error("lab {lab_id} could not be moved to {to}: status changed concurrently")]
    LabStatusConflict { lab_id: Uuid, to: LabStatus },

    #[error("no provider driver available for '{0}'")]
    UnsupportedProvider(ProviderKind),
}
