use channel_types::NetworkContext;
use serde::{Deserialize, Serialize};

use crate::error::MachineError;

/// Configuration for an [`InstructionExecutor`](crate::InstructionExecutor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Deployed contract addresses commitments point at.
    pub network: NetworkContext,
    /// Buffered notifications per observer subscription (default: 1024)
    pub observer_capacity: usize,
    /// Mirror committed channels to the persistence collaborator (default: true)
    pub persist_on_commit: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            network: NetworkContext::default(),
            observer_capacity: 1024,
            persist_on_commit: true,
        }
    }
}

impl ExecutorConfig {
    pub fn from_json(json: &str) -> Result<Self, MachineError> {
        serde_json::from_str(json).map_err(|e| MachineError::Config(e.to_string()))
    }
}
