//! AgentWallet API - HTTP surface
//!
//! A thin axum layer over the engine: bearer-token auth with owner and
//! agent principal classes, request/response DTOs, and the verbs-and-effects
//! surface for agents, wallets, rules, transactions, kill switches, the
//! dead-man switch, lineage, cross-agent policies and the audit log.

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
