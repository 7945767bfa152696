//! Out-of-band reporting of deployment failures.

use anyhow::Context;
use async_trait::async_trait;
use labforge_common::bus::{FaultEventEnvelope, CHANNEL_FAULT_EVENTS};
use redis::AsyncCommands;
use tokio::sync::Mutex;

/// Receives errors caught at the deployment recovery boundary. Reporting never fails back
/// into the caller.
#[async_trait]
pub trait FaultReporter: Send + Sync {
    async fn report(&self, err: &anyhow::Error);
}

/// Error chain, outermost first.
pub fn error_chain(err: &anyhow::Error) -> Vec<String> {
    err.chain().map(|c| c.to_string()).collect()
}

pub struct TracingFaultReporter;

#[async_trait]
impl FaultReporter for TracingFaultReporter {
    async fn report(&self, err: &anyhow::Error) {
        tracing::error!("❌ [fault] {:#}", err);
    }
}

/// Publishes a [`FaultEventEnvelope`] on the fault channel.
pub struct RedisFaultReporter {
    redis_client: redis::Client,
    source: String,
}

impl RedisFaultReporter {
    pub fn new(redis_client: redis::Client, source: impl Into<String>) -> Self {
        Self {
            redis_client,
            source: source.into(),
        }
    }

    async fn publish(&self, evt: &FaultEventEnvelope) -> anyhow::Result<()> {
        let mut conn = self
            .redis_client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis (fault publisher)")?;
        let payload = serde_json::to_string(evt)?;
        let _: () = conn.publish(CHANNEL_FAULT_EVENTS, payload).await?;
        Ok(())
    }
}

#[async_trait]
impl FaultReporter for RedisFaultReporter {
    async fn report(&self, err: &anyhow::Error) {
        tracing::error!("❌ [fault] {:#}", err);
        let evt = FaultEventEnvelope::new(err.to_string(), error_chain(err), &self.source);
        if let Err(e) = self.publish(&evt).await {
            tracing::warn!("⚠️ [fault] could not publish fault event {}: {:#}", evt.event_id, e);
        }
    }
}

/// Keeps reported errors in memory; used by tests and local runs.
#[derive(Default)]
pub struct RecordingFaultReporter {
    reports: Mutex<Vec<Vec<String>>>,
}

impl RecordingFaultReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per report, each the error chain outermost first.
    pub async fn reports(&self) -> Vec<Vec<String>> {
        self.reports.lock().await.clone()
    }
}

#[async_trait]
impl FaultReporter for RecordingFaultReporter {
    async fn report(&self, err: &anyhow::Error) {
        self.reports.lock().await.push(error_chain(err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_reporter_keeps_the_chain() {
        let reporter = RecordingFaultReporter::new();
        let err = anyhow::anyhow!("create_router failed").context("slice 'lab / slice_0'");
        reporter.report(&err).await;

        let reports = reporter.reports().await;
        assert_eq!(
            reports,
            vec![vec![
                "slice 'lab / slice_0'".to_string(),
                "create_router failed".to_string()
            ]]
        );
    }

    #[tokio::test]
    async fn unreachable_redis_does_not_fail_reporting() {
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let reporter = RedisFaultReporter::new(client, "test");
        reporter.report(&anyhow::anyhow!("boom")).await;
    }
}
