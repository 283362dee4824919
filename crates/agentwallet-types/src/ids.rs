//! Identity types
//!
//! Strongly typed wrappers around UUIDs so that an agent id can never be
//! handed to an API expecting a wallet id.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Mint a fresh random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from string form, with or without the display prefix
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(s)?))
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

entity_id!(OwnerId, "owner", "Unique identifier for a human or org owner");
entity_id!(AgentId, "agent", "Unique identifier for a governed agent");
entity_id!(WalletId, "wallet", "Unique identifier for a wallet");
entity_id!(TransactionId, "tx", "Unique identifier for a transaction");
entity_id!(RuleId, "rule", "Unique identifier for a spend rule");
entity_id!(KillSwitchId, "ks", "Unique identifier for a kill switch");
entity_id!(PolicyId, "policy", "Unique identifier for a cross-agent policy");
entity_id!(CrossTransactionId, "xtx", "Unique identifier for a cross-agent transaction");
entity_id!(GroupId, "group", "Unique identifier for an agent group");
entity_id!(SpawnEventId, "spawn", "Unique identifier for a spawn event");
entity_id!(DeadManEventId, "dms", "Unique identifier for a dead-man switch event");
entity_id!(AuditEntryId, "audit", "Unique identifier for an audit log entry");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefix() {
        let id = WalletId::new();
        assert!(id.to_string().starts_with("wallet_"));
    }

    #[test]
    fn test_parse_round_trip() {
        let id = AgentId::new();
        let parsed = AgentId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);

        let bare = AgentId::parse(&id.as_uuid().to_string()).unwrap();
        assert_eq!(id, bare);
    }
}
