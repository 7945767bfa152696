//! Background deployment runs with an observable state.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::deployment::{DeployOutcome, DeployRequest, Deployer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed(String),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed(_))
    }
}

impl From<DeployOutcome> for JobState {
    fn from(outcome: DeployOutcome) -> Self {
        match outcome {
            DeployOutcome::Active => JobState::Succeeded,
            DeployOutcome::Failed(msg) => JobState::Failed(msg),
        }
    }
}

#[derive(Clone, Debug)]
pub struct JobHandle {
    lab_id: Uuid,
    rx: watch::Receiver<JobState>,
}

impl JobHandle {
    pub fn lab_id(&self) -> Uuid {
        self.lab_id
    }

    pub fn state(&self) -> JobState {
        let state = self.rx.borrow().clone();
        if !state.is_terminal() && self.rx.has_changed().is_err() {
            return JobState::Failed("deployment task ended unexpectedly".to_string());
        }
        state
    }

    fn in_flight(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Resolves once the run reaches a terminal state.
    pub async fn wait(mut self) -> JobState {
        loop {
            let state = self.rx.borrow_and_update().clone();
            if state.is_terminal() {
                return state;
            }
            if self.rx.changed().await.is_err() {
                return self.state();
            }
        }
    }
}

/// Latest deployment job per lab. At most one run per lab is in flight.
pub struct DeploymentJobs {
    deployer: Deployer,
    jobs: Mutex<HashMap<Uuid, JobHandle>>,
}

impl DeploymentJobs {
    pub fn new(deployer: Deployer) -> Self {
        Self {
            deployer,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Start a deployment on the runtime. While a run for the same lab is queued or
    /// running, its handle is returned instead of starting another one.
    pub fn spawn(&self, req: DeployRequest) -> JobHandle {
        let mut jobs = lock(&self.jobs);
        if let Some(current) = jobs.get(&req.lab_id) {
            if current.in_flight() {
                tracing::info!(
                    "⏳ [jobs] lab {} already has a deployment in flight, not starting another",
                    req.lab_id
                );
                return current.clone();
            }
        }

        let (tx, rx) = watch::channel(JobState::Queued);
        let handle = JobHandle {
            lab_id: req.lab_id,
            rx,
        };
        jobs.insert(req.lab_id, handle.clone());
        drop(jobs);

        let deployer = self.deployer.clone();
        tokio::spawn(async move {
            tx.send_replace(JobState::Running);
            let outcome = deployer.deploy(&req).await;
            tx.send_replace(JobState::from(outcome));
        });
        handle
    }

    pub fn state(&self, lab_id: Uuid) -> Option<JobState> {
        lock(&self.jobs).get(&lab_id).map(JobHandle::state)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_state_serializes_with_tag() {
        assert_eq!(
            serde_json::to_value(JobState::Running).unwrap(),
            serde_json::json!({"state": "running"})
        );
        assert_eq!(
            serde_json::to_value(JobState::Failed("boom".into())).unwrap(),
            serde_json::json!({"state": "failed", "error": "boom"})
        );
    }

    #[tokio::test]
    async fn dropped_sender_is_not_in_flight() {
        let (tx, rx) = watch::channel(JobState::Running);
        let handle = JobHandle {
            lab_id: Uuid::new_v4(),
            rx,
        };
        assert!(handle.in_flight());
        drop(tx);
        assert!(!handle.in_flight());
        assert!(matches!(handle.wait().await, JobState::Failed(_)));
    }

    #[tokio::test]
    async fn wait_returns_terminal_state() {
        let (tx, rx) = watch::channel(JobState::Queued);
        let handle = JobHandle {
            lab_id: Uuid::new_v4(),
            rx,
        };
        tokio::spawn(async move {
            tx.send_replace(JobState::Running);
            tx.send_replace(JobState::Succeeded);
        });
        assert_eq!(handle.wait().await, JobState::Succeeded);
    }
}
