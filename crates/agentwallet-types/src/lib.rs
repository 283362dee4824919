//! AgentWallet Types - Shared types for the governance gateway
//!
//! Every crate in the workspace speaks these types:
//! - Strongly typed ids (no bare UUIDs cross module boundaries)
//! - `Money`: non-negative fixed-scale-2 decimal amounts
//! - Entity types for agents, wallets, transactions, rules, kill switches,
//!   lineage, cross-agent policies and the dead-man switch
//! - The error taxonomy shared by the store, the engine and the API

pub mod audit;
pub mod crossagent;
pub mod deadman;
pub mod error;
pub mod ids;
pub mod killswitch;
pub mod lineage;
pub mod money;
pub mod rule;
pub mod transaction;

mod agent;
mod wallet;

pub use agent::*;
pub use audit::*;
pub use crossagent::*;
pub use deadman::*;
pub use error::*;
pub use ids::*;
pub use killswitch::*;
pub use lineage::*;
pub use money::*;
pub use rule::*;
pub use transaction::*;
pub use wallet::*;
