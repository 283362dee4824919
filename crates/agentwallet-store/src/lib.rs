//! AgentWallet Store - The data gateway
//!
//! Every other component talks to persistence only through the [`Store`]
//! trait. Two backends:
//!
//! - [`PgStore`]: PostgreSQL via SQLx, the production backend
//! - [`MemStore`]: an in-process map-backed store for tests and the
//!   playground server mode
//!
//! The store owns the two composite writes that must be atomic: a ledger
//! debit together with the transaction completing, and a kill-switch latch
//! together with the wallet status change and its audit entry. No business
//! logic lives here.

pub mod config;
pub mod mem;
pub mod models;
pub mod pg;
mod store;

pub use config::StoreConfig;
pub use mem::MemStore;
pub use pg::PgStore;
pub use store::Store;
