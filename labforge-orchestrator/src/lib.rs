pub mod admin;
pub mod config;
pub mod deployment;
pub mod error;
pub mod fault;
pub mod job;
pub mod logger;
pub mod migrations;
pub mod provider_manager;
pub mod provisioner;
pub mod secret_broker;
pub mod slice;
pub mod state_machine;
pub mod store;
pub mod topology;

pub use deployment::{DeployOutcome, DeployRequest, Deployer};
pub use job::{DeploymentJobs, JobHandle, JobState};
