//! AgentWallet Engine - Policy evaluation and transaction lifecycle
//!
//! The five interlocking subsystems behind the single admission path:
//!
//! - [`RulesEngine`]: evaluates a wallet's active spend rules in priority
//!   order and produces a structured verdict
//! - [`KillSwitchEngine`]: per-wallet latching circuit breakers
//! - [`DeadManSwitch`]: per-agent liveness, velocity and spend-anomaly
//!   monitor with an escalating action ladder
//! - [`SpawnGovernor`]: admits child-agent creation under monotonically
//!   tightening policy inheritance
//! - [`CrossAgentGovernor`]: resolves and applies the most specific policy
//!   between two agents
//!
//! [`AdmissionController`] composes them in a fixed order — dead-man, kill
//! switch, rules, ledger, audit — holding a per-wallet admission lock for
//! the whole path.

pub mod admission;
pub mod crossagent;
pub mod deadman;
pub mod killswitch;
pub mod locks;
pub mod notify;
pub mod rules;
pub mod spawn;
pub mod windows;

pub use admission::{AdmissionController, AdmissionOutcome};
pub use crossagent::CrossAgentGovernor;
pub use deadman::{DeadManSwitch, DeadManVerdict, HeartbeatResponse};
pub use killswitch::KillSwitchEngine;
pub use locks::WalletLocks;
pub use notify::{Notification, Notifier, TracingNotifier};
pub use rules::RulesEngine;
pub use spawn::SpawnGovernor;
pub use windows::SpendWindows;

use agentwallet_store::Store;
use std::sync::Arc;

/// Everything wired together over one store
///
/// Convenience for binaries and tests; each subsystem can also be built
/// standalone.
#[derive(Clone)]
pub struct Engine {
    pub store: Arc<dyn Store>,
    pub admission: Arc<AdmissionController>,
    pub deadman: Arc<DeadManSwitch>,
    pub kill_switch: Arc<KillSwitchEngine>,
    pub spawn: Arc<SpawnGovernor>,
    pub cross_agent: Arc<CrossAgentGovernor>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        let deadman = Arc::new(DeadManSwitch::new(store.clone(), notifier.clone()));
        let kill_switch = Arc::new(KillSwitchEngine::new(store.clone()));
        let admission = Arc::new(AdmissionController::new(
            store.clone(),
            deadman.clone(),
            kill_switch.clone(),
        ));
        let spawn = Arc::new(SpawnGovernor::new(store.clone()));
        let cross_agent = Arc::new(CrossAgentGovernor::new(store.clone(), notifier));
        Self {
            store,
            admission,
            deadman,
            kill_switch,
            spawn,
            cross_agent,
        }
    }
}
