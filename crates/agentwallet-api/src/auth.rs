//! Authentication extractors
//!
//! Opaque bearer credentials resolve to one of two principal classes:
//! owners (full scope over their resources) and agents (scoped to their own
//! resources). Missing or unknown credentials are 401; a principal of the
//! wrong class, or an inactive agent, is 403.

use agentwallet_types::{Agent, AgentId, Owner, WalletError, WalletId};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

/// Either principal class
#[derive(Debug, Clone)]
pub enum Principal {
    Owner(Owner),
    Agent(Agent),
}

/// Extractor requiring an owner credential
#[derive(Debug, Clone)]
pub struct OwnerAuth(pub Owner);

/// Extractor requiring an active agent credential
#[derive(Debug, Clone)]
pub struct AgentAuth(pub Agent);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn resolve(state: &AppState, token: &str) -> Result<Principal, ApiError> {
    if let Some(owner) = state.store.owner_by_api_key(token).await? {
        return Ok(Principal::Owner(owner));
    }
    if let Some(agent) = state.store.agent_by_api_key(token).await? {
        return Ok(Principal::Agent(agent));
    }
    Err(ApiError::Unauthorized)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        resolve(state, token).await
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for OwnerAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match Principal::from_request_parts(parts, state).await? {
            Principal::Owner(owner) => Ok(OwnerAuth(owner)),
            Principal::Agent(_) => Err(ApiError::from(WalletError::access_denied(
                "owner credential required",
            ))),
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AgentAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match Principal::from_request_parts(parts, state).await? {
            Principal::Agent(agent) if agent.status.can_transact() => Ok(AgentAuth(agent)),
            Principal::Agent(agent) => Err(ApiError::from(WalletError::access_denied(format!(
                "agent is {:?}",
                agent.status
            )))),
            Principal::Owner(_) => Err(ApiError::from(WalletError::access_denied(
                "agent credential required",
            ))),
        }
    }
}

impl Principal {
    /// Can this principal act on the given agent's resources?
    pub async fn authorize_agent(&self, state: &AppState, agent: AgentId) -> Result<(), ApiError> {
        match self {
            Principal::Owner(owner) => {
                let target =
                    state
                        .store
                        .agent(agent)
                        .await?
                        .ok_or(WalletError::AgentNotFound {
                            agent_id: agent.to_string(),
                        })?;
                if target.owner_id != owner.id {
                    return Err(WalletError::access_denied("agent belongs to another owner").into());
                }
                Ok(())
            }
            Principal::Agent(this) => {
                if this.id != agent {
                    return Err(
                        WalletError::access_denied("agents may only act on themselves").into(),
                    );
                }
                if !this.status.can_transact() {
                    return Err(
                        WalletError::access_denied(format!("agent is {:?}", this.status)).into(),
                    );
                }
                Ok(())
            }
        }
    }

    /// Can this principal act on the given wallet?
    pub async fn authorize_wallet(
        &self,
        state: &AppState,
        wallet: WalletId,
    ) -> Result<(), ApiError> {
        let wallet = state
            .store
            .wallet(wallet)
            .await?
            .ok_or(WalletError::WalletNotFound {
                wallet_id: wallet.to_string(),
            })?;
        self.authorize_agent(state, wallet.agent_id).await
    }
}

/// Mint an opaque bearer credential with a class prefix
pub fn generate_api_key(prefix: &str) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect();
    format!("{prefix}_{token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_shape() {
        let key = generate_api_key("awo");
        assert!(key.starts_with("awo_"));
        assert_eq!(key.len(), 44);
        assert_ne!(key, generate_api_key("awo"));
    }
}
