use std::sync::Arc;

use anyhow::Result;
use labforge_common::{CloudConfig, ProviderDetail};
use labforge_providers::CloudProvider;

use crate::error::DeployError;

/// Builds the cloud collaborator for a cloud configuration.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, config: &CloudConfig) -> Result<Arc<dyn CloudProvider>>;
}

/// Default factory: one driver per compiled-in provider feature.
pub struct ProviderManager;

impl ProviderManager {
    pub fn get_provider(detail: &ProviderDetail) -> Result<Arc<dyn CloudProvider>> {
        match detail {
            #[cfg(feature = "provider-mock")]
            ProviderDetail::Mock(d) => Ok(Arc::new(
                labforge_providers::mock::MockProvider::new()
                    .with_network_boundary(d.network_boundary),
            )),
            // Add real drivers here:
            // ProviderDetail::Aws(d) => ...
            other => Err(DeployError::UnsupportedProvider(other.kind()).into()),
        }
    }
}

impl ProviderFactory for ProviderManager {
    fn build(&self, config: &CloudConfig) -> Result<Arc<dyn CloudProvider>> {
        Self::get_provider(&config.detail)
    }
}
