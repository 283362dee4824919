//! Audit log entries
//!
//! Append-only and hash-chained: each entry commits to its predecessor so
//! the trail is tamper-evident. Entries are never updated.

use crate::{AgentId, AuditEntryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome class recorded with every entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDecision {
    Allowed,
    Blocked,
    Escalated,
    /// Operator or background action, not a spend decision
    System,
}

/// Canonical action names
pub mod actions {
    pub const TX_SUBMITTED: &str = "transaction.submitted";
    pub const TX_COMPLETED: &str = "transaction.completed";
    pub const TX_AWAITING: &str = "transaction.awaiting_approval";
    pub const TX_APPROVED: &str = "transaction.approved";
    pub const TX_REJECTED: &str = "transaction.rejected";
    pub const TX_KILLSWITCHED: &str = "transaction.killswitched";
    pub const DEPOSIT: &str = "wallet.deposit";
    pub const WALLET_FROZEN: &str = "wallet.frozen";
    pub const WALLET_UNFROZEN: &str = "wallet.unfrozen";
    pub const KILLSWITCH_TRIGGERED: &str = "killswitch.triggered";
    pub const KILLSWITCH_RESET: &str = "killswitch.reset";
    pub const EMERGENCY_STOP: &str = "emergency.stop";
    pub const DEADMAN_TRIGGERED: &str = "deadman.triggered";
    pub const DEADMAN_RESOLVED: &str = "deadman.resolved";
    pub const AGENT_SPAWNED: &str = "agent.spawned";
    pub const AGENT_FROZEN: &str = "agent.frozen";
    pub const AGENT_TERMINATED: &str = "agent.terminated";
    pub const CROSS_AUTHORIZED: &str = "crossagent.authorized";
    pub const CROSS_ESCALATED: &str = "crossagent.escalated";
    pub const CROSS_REJECTED: &str = "crossagent.rejected";
    pub const CROSS_APPROVED: &str = "crossagent.approved";
    pub const OWNER_KEY_ROTATED: &str = "owner.key_rotated";
}

/// An entry not yet sealed against the chain
///
/// The store assigns the predecessor hash at append time so concurrent
/// writers cannot fork the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditDraft {
    pub agent_id: Option<AgentId>,
    pub action: String,
    pub resource: String,
    pub resource_id: String,
    pub decision: AuditDecision,
    pub reasoning: serde_json::Value,
}

impl AuditDraft {
    pub fn new(
        agent_id: Option<AgentId>,
        action: impl Into<String>,
        resource: impl Into<String>,
        resource_id: impl Into<String>,
        decision: AuditDecision,
        reasoning: serde_json::Value,
    ) -> Self {
        Self {
            agent_id,
            action: action.into(),
            resource: resource.into(),
            resource_id: resource_id.into(),
            decision,
            reasoning,
        }
    }
}

/// One audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub agent_id: Option<AgentId>,
    pub action: String,
    /// Entity kind, e.g. "transaction", "wallet", "agent"
    pub resource: String,
    pub resource_id: String,
    pub decision: AuditDecision,
    /// Structured reasoning; carries the full rule results for admissions
    pub reasoning: serde_json::Value,
    /// Hash of the preceding entry; empty string for the first
    pub previous_hash: String,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Seal a draft against the chain head
    pub fn seal(draft: AuditDraft, previous_hash: String) -> Self {
        let mut entry = Self {
            id: AuditEntryId::new(),
            agent_id: draft.agent_id,
            action: draft.action,
            resource: draft.resource,
            resource_id: draft.resource_id,
            decision: draft.decision,
            reasoning: draft.reasoning,
            previous_hash,
            hash: String::new(),
            timestamp: Utc::now(),
        };
        entry.hash = entry.compute_hash();
        entry
    }

    /// Hash over the chained fields
    pub fn compute_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let content = format!(
            "{}:{}:{}:{}:{}:{:?}:{}",
            self.previous_hash,
            self.id,
            self.timestamp.timestamp_micros(),
            self.action,
            self.resource_id,
            self.decision,
            self.reasoning,
        );
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn verify(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

/// Verify a slice of entries forms an unbroken chain, oldest first
pub fn verify_chain(entries: &[AuditEntry]) -> bool {
    let mut previous: Option<&str> = None;
    for entry in entries {
        if !entry.verify() {
            return false;
        }
        if let Some(prev) = previous {
            if entry.previous_hash != prev {
                return false;
            }
        }
        previous = Some(&entry.hash);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(previous_hash: String) -> AuditEntry {
        let draft = AuditDraft::new(
            None,
            actions::TX_SUBMITTED,
            "transaction",
            "tx_1",
            AuditDecision::Allowed,
            json!({"ok": true}),
        );
        AuditEntry::seal(draft, previous_hash)
    }

    #[test]
    fn test_hash_round_trip() {
        let e = entry(String::new());
        assert!(e.verify());
    }

    #[test]
    fn test_chain_verification() {
        let a = entry(String::new());
        let b = entry(a.hash.clone());
        let c = entry(b.hash.clone());
        assert!(verify_chain(&[a.clone(), b.clone(), c.clone()]));

        // Broken link
        let orphan = entry("bogus".to_string());
        assert!(!verify_chain(&[a, orphan]));

        // Tampered entry
        let mut tampered = b;
        tampered.resource_id = "tx_2".to_string();
        assert!(!tampered.verify());
    }
}
