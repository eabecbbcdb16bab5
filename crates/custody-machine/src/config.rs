use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the custody state machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// How long to wait for a commit confirmation before reporting the
    /// outcome as unknown.
    pub commit_deadline_ms: u64,
    /// Deadline for reads (record, history, receipt lookup).
    pub read_deadline_ms: u64,
    /// Re-evaluations allowed after a concurrent modification.
    pub max_conflict_retries: u32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            commit_deadline_ms: 10_000,
            read_deadline_ms: 5_000,
            max_conflict_retries: 3,
        }
    }
}

impl MachineConfig {
    pub fn commit_deadline(&self) -> Duration {
        Duration::from_millis(self.commit_deadline_ms)
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_millis(self.read_deadline_ms)
    }
}
