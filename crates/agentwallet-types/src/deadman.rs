//! Dead-man switch configuration and events

use crate::{AgentId, DeadManEventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Escalating responses to a trigger
///
/// Strictness is total: alert < throttle < freeze < terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadManAction {
    Alert,
    Throttle,
    Freeze,
    Terminate,
}

impl DeadManAction {
    /// Whether this action must block the transaction that caused it
    pub fn blocks(&self) -> bool {
        matches!(self, Self::Freeze | Self::Terminate)
    }
}

/// What fired the switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadManTrigger {
    MissedHeartbeat,
    Velocity,
    VendorDiversity,
    SpendAnomaly,
    Manual,
}

/// Per-agent monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadManConfig {
    pub agent_id: AgentId,
    pub heartbeat_interval_seconds: u64,
    pub missed_heartbeat_threshold: u32,
    pub anomaly_window_minutes: u32,
    /// Current-window spend may exceed the baseline mean by at most this factor
    pub anomaly_spend_multiplier: f64,
    pub anomaly_tx_count_multiplier: f64,
    pub max_tx_per_minute: u32,
    pub max_unique_vendors_per_hour: u32,
    pub on_anomaly: DeadManAction,
    pub on_missed_heartbeat: DeadManAction,
    pub on_manual_trigger: DeadManAction,
    pub cascade_to_children: bool,
    pub recovery_requires_human: bool,
}

impl DeadManConfig {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            heartbeat_interval_seconds: 60,
            missed_heartbeat_threshold: 3,
            anomaly_window_minutes: 60,
            anomaly_spend_multiplier: 3.0,
            anomaly_tx_count_multiplier: 5.0,
            max_tx_per_minute: 10,
            max_unique_vendors_per_hour: 10,
            on_anomaly: DeadManAction::Freeze,
            on_missed_heartbeat: DeadManAction::Freeze,
            on_manual_trigger: DeadManAction::Freeze,
            cascade_to_children: true,
            recovery_requires_human: true,
        }
    }

    /// Heartbeats older than this are a miss
    pub fn heartbeat_deadline_seconds(&self) -> u64 {
        self.heartbeat_interval_seconds * u64::from(self.missed_heartbeat_threshold)
    }
}

/// Append-only record of a trigger or its resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadManEvent {
    pub id: DeadManEventId,
    pub agent_id: AgentId,
    pub trigger: DeadManTrigger,
    pub action_taken: DeadManAction,
    pub details: String,
    /// Descendants frozen or terminated as a consequence
    pub cascaded_to: Vec<AgentId>,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_ladder_ordering() {
        assert!(DeadManAction::Alert < DeadManAction::Throttle);
        assert!(DeadManAction::Throttle < DeadManAction::Freeze);
        assert!(DeadManAction::Freeze < DeadManAction::Terminate);
    }

    #[test]
    fn test_blocking_actions() {
        assert!(!DeadManAction::Alert.blocks());
        assert!(!DeadManAction::Throttle.blocks());
        assert!(DeadManAction::Freeze.blocks());
        assert!(DeadManAction::Terminate.blocks());
    }

    #[test]
    fn test_heartbeat_deadline() {
        let mut config = DeadManConfig::new(AgentId::new());
        config.heartbeat_interval_seconds = 30;
        config.missed_heartbeat_threshold = 4;
        assert_eq!(config.heartbeat_deadline_seconds(), 120);
    }
}
