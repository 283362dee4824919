//! Request handlers

pub mod agents;
pub mod audit;
pub mod crossagent;
pub mod deadman;
pub mod health;
pub mod killswitch;
pub mod lineage;
pub mod rules;
pub mod transactions;
pub mod wallets;

use agentwallet_types::WalletError;

use crate::error::ApiError;

/// Parse a prefixed entity id out of a path segment
pub(crate) fn parse_id<T>(
    raw: &str,
    field: &str,
    parse: impl Fn(&str) -> Result<T, uuid::Error>,
) -> Result<T, ApiError> {
    parse(raw).map_err(|_| {
        ApiError::from(WalletError::invalid_input(field, "not a valid id"))
    })
}
