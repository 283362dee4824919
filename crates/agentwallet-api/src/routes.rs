//! Route table

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::state::AppState;

/// Build the full router over shared state
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        // Owner credential
        .route("/owner/rotate-key", post(handlers::agents::rotate_owner_key))
        // Agents
        .route("/agents", post(handlers::agents::create_agent))
        .route("/agents", get(handlers::agents::list_agents))
        .route("/agents/:agent_id", get(handlers::agents::get_agent))
        .route("/agents/:agent_id/pause", post(handlers::agents::pause_agent))
        .route(
            "/agents/:agent_id/activate",
            post(handlers::agents::activate_agent),
        )
        // Wallets
        .route("/wallets", post(handlers::wallets::create_wallet))
        .route("/wallets/:wallet_id", get(handlers::wallets::get_wallet))
        .route(
            "/wallets/:wallet_id/balance",
            get(handlers::wallets::get_balance),
        )
        .route("/wallets/:wallet_id/deposit", post(handlers::wallets::deposit))
        .route(
            "/wallets/:wallet_id/freeze",
            post(handlers::wallets::freeze_wallet),
        )
        .route(
            "/wallets/:wallet_id/unfreeze",
            post(handlers::wallets::unfreeze_wallet),
        )
        .route(
            "/wallets/:wallet_id/transactions",
            get(handlers::wallets::list_transactions),
        )
        // Spend rules
        .route("/wallets/:wallet_id/rules", post(handlers::rules::create_rule))
        .route("/wallets/:wallet_id/rules", get(handlers::rules::list_rules))
        .route("/rules/:rule_id", put(handlers::rules::update_rule))
        .route("/rules/:rule_id", delete(handlers::rules::delete_rule))
        // Transactions
        .route(
            "/wallets/:wallet_id/transactions",
            post(handlers::transactions::submit),
        )
        .route(
            "/transactions/pending",
            get(handlers::transactions::list_pending),
        )
        .route(
            "/transactions/:transaction_id",
            get(handlers::transactions::get_transaction),
        )
        .route(
            "/transactions/:transaction_id/approve",
            post(handlers::transactions::approve),
        )
        .route(
            "/transactions/:transaction_id/reject",
            post(handlers::transactions::reject),
        )
        // Kill switches
        .route(
            "/wallets/:wallet_id/kill-switches",
            post(handlers::killswitch::create_kill_switch),
        )
        .route(
            "/wallets/:wallet_id/kill-switches",
            get(handlers::killswitch::list_kill_switches),
        )
        .route(
            "/kill-switches/:switch_id/reset",
            post(handlers::killswitch::reset_kill_switch),
        )
        .route(
            "/kill-switches/:switch_id",
            delete(handlers::killswitch::delete_kill_switch),
        )
        .route(
            "/wallets/:wallet_id/emergency-stop",
            post(handlers::killswitch::emergency_stop),
        )
        // Dead-man switch
        .route("/agents/:agent_id/deadman", post(handlers::deadman::register))
        .route(
            "/agents/:agent_id/heartbeat",
            post(handlers::deadman::heartbeat),
        )
        .route(
            "/agents/:agent_id/deadman/freeze",
            post(handlers::deadman::freeze),
        )
        .route(
            "/agents/:agent_id/deadman/unfreeze",
            post(handlers::deadman::unfreeze),
        )
        .route(
            "/agents/:agent_id/deadman/terminate",
            post(handlers::deadman::terminate),
        )
        .route(
            "/agents/:agent_id/deadman/events",
            get(handlers::deadman::events),
        )
        // Lineage
        .route("/agents/:agent_id/spawn", post(handlers::lineage::spawn))
        .route("/agents/:agent_id/lineage", get(handlers::lineage::get_lineage))
        .route(
            "/agents/:agent_id/lineage/terminate",
            post(handlers::lineage::terminate_lineage),
        )
        // Cross-agent
        .route(
            "/cross-agent/policies",
            post(handlers::crossagent::create_policy),
        )
        .route(
            "/cross-agent/policies",
            get(handlers::crossagent::list_policies),
        )
        .route(
            "/cross-agent/policies/:policy_id",
            put(handlers::crossagent::update_policy),
        )
        .route(
            "/cross-agent/policies/:policy_id",
            delete(handlers::crossagent::delete_policy),
        )
        .route(
            "/cross-agent/authorize",
            post(handlers::crossagent::authorize),
        )
        .route(
            "/cross-agent/transactions/:transaction_id/approve",
            post(handlers::crossagent::approve),
        )
        .route(
            "/cross-agent/transactions/:transaction_id/reject",
            post(handlers::crossagent::reject),
        )
        .route("/groups", post(handlers::crossagent::create_group))
        .route("/groups", get(handlers::crossagent::list_groups))
        // Audit
        .route("/audit", get(handlers::audit::list))
        .route("/audit/export", get(handlers::audit::export))
        .route("/audit/summary", get(handlers::audit::summary))
        .with_state(state)
}
