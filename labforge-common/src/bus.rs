use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DeployUser;

// -----------------------------------------------------------------------------
// Channels / Streams
// -----------------------------------------------------------------------------

pub const CHANNEL_ORCHESTRATOR_COMMANDS: &str = "orchestrator_events";
pub const CHANNEL_FAULT_EVENTS: &str = "fault_events";

// -----------------------------------------------------------------------------
// Commands (CMD:*)
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum CommandType {
    #[serde(rename = "CMD:DEPLOY_LAB")]
    DeployLab,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::DeployLab => "CMD:DEPLOY_LAB",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommandDeployLab {
    pub lab_id: Uuid,
    pub cloudconfig_id: Uuid,
    #[serde(default)]
    pub users: Vec<DeployUser>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

// -----------------------------------------------------------------------------
// Fault events (out-of-band alerting)
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FaultEventEnvelope {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub source: String,
    pub message: String,
    /// Error chain, outermost first.
    pub causes: Vec<String>,
}

impl FaultEventEnvelope {
    pub fn new(message: String, causes: Vec<String>, source: &str) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            source: source.to_string(),
            message,
            causes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_command_parses_from_bus_payload() {
        let lab = Uuid::new_v4();
        let cfg = Uuid::new_v4();
        let user = Uuid::new_v4();
        let payload = serde_json::json!({
            "type": "CMD:DEPLOY_LAB",
            "lab_id": lab,
            "cloudconfig_id": cfg,
            "users": [{"id": user}],
        });

        let ty: CommandType = serde_json::from_value(payload["type"].clone()).unwrap();
        assert_eq!(ty, CommandType::DeployLab);
        assert_eq!(ty.as_str(), "CMD:DEPLOY_LAB");

        let cmd: CommandDeployLab = serde_json::from_value(payload).unwrap();
        assert_eq!(cmd.lab_id, lab);
        assert_eq!(cmd.cloudconfig_id, cfg);
        assert_eq!(cmd.users, vec![DeployUser { id: user }]);
        assert!(cmd.correlation_id.is_none());
    }
}
