//! Cross-agent policy and authorization handlers

use agentwallet_types::{
    AgentGroup, CrossAgentPolicy, CrossTransactionId, GroupId, Money, PolicyId, WalletError,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{OwnerAuth, Principal};
use crate::dto::{AuthorizeRequest, CreatePolicyRequest, CrossTransactionResponse};
use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_id;
use crate::state::AppState;

pub async fn create_policy(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Json(request): Json<CreatePolicyRequest>,
) -> ApiResult<(StatusCode, Json<CrossAgentPolicy>)> {
    Principal::Owner(owner.clone())
        .authorize_agent(&state, request.source_agent_id)
        .await?;
    if request.min_counterparty_trust_score < rust_decimal::Decimal::ZERO
        || request.min_counterparty_trust_score > rust_decimal::Decimal::ONE
    {
        return Err(WalletError::invalid_input(
            "min_counterparty_trust_score",
            "must be in [0, 1]",
        )
        .into());
    }

    let policy = CrossAgentPolicy {
        id: PolicyId::new(),
        owner_id: owner.id,
        source_agent_id: request.source_agent_id,
        target: request.target,
        limits: request.limits,
        require_mutual_policy: request.require_mutual_policy,
        settlement_mode: request.settlement_mode,
        min_counterparty_trust_score: request.min_counterparty_trust_score,
        enabled: request.enabled,
        created_at: Utc::now(),
    };
    state.store.create_policy(&policy).await?;
    Ok((StatusCode::CREATED, Json(policy)))
}

#[derive(Debug, Deserialize)]
pub struct PolicyListQuery {
    pub source_agent_id: String,
}

pub async fn list_policies(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Query(query): Query<PolicyListQuery>,
) -> ApiResult<Json<Vec<CrossAgentPolicy>>> {
    let source = parse_id(&query.source_agent_id, "source_agent_id", |s| {
        agentwallet_types::AgentId::parse(s)
    })?;
    Principal::Owner(owner)
        .authorize_agent(&state, source)
        .await?;
    Ok(Json(state.store.policies_for_source(source).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePolicyRequest {
    pub limits: Option<agentwallet_types::CrossAgentLimits>,
    pub require_mutual_policy: Option<bool>,
    pub settlement_mode: Option<agentwallet_types::SettlementMode>,
    pub min_counterparty_trust_score: Option<rust_decimal::Decimal>,
    pub enabled: Option<bool>,
}

pub async fn update_policy(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(policy_id): Path<String>,
    Json(request): Json<UpdatePolicyRequest>,
) -> ApiResult<Json<CrossAgentPolicy>> {
    let policy_id = parse_id(&policy_id, "policy_id", PolicyId::parse)?;
    let mut policy = state
        .store
        .policy(policy_id)
        .await?
        .ok_or(WalletError::PolicyNotFound {
            policy_id: policy_id.to_string(),
        })?;
    if policy.owner_id != owner.id {
        return Err(ApiError::from(WalletError::access_denied(
            "policy belongs to another owner",
        )));
    }

    if let Some(limits) = request.limits {
        policy.limits = limits;
    }
    if let Some(mutual) = request.require_mutual_policy {
        policy.require_mutual_policy = mutual;
    }
    if let Some(mode) = request.settlement_mode {
        policy.settlement_mode = mode;
    }
    if let Some(score) = request.min_counterparty_trust_score {
        if score < rust_decimal::Decimal::ZERO || score > rust_decimal::Decimal::ONE {
            return Err(WalletError::invalid_input(
                "min_counterparty_trust_score",
                "must be in [0, 1]",
            )
            .into());
        }
        policy.min_counterparty_trust_score = score;
    }
    if let Some(enabled) = request.enabled {
        policy.enabled = enabled;
    }
    state.store.update_policy(&policy).await?;
    Ok(Json(policy))
}

pub async fn delete_policy(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(policy_id): Path<String>,
) -> ApiResult<StatusCode> {
    let policy_id = parse_id(&policy_id, "policy_id", PolicyId::parse)?;
    let policy = state
        .store
        .policy(policy_id)
        .await?
        .ok_or(WalletError::PolicyNotFound {
            policy_id: policy_id.to_string(),
        })?;
    if policy.owner_id != owner.id {
        return Err(ApiError::from(WalletError::access_denied(
            "policy belongs to another owner",
        )));
    }
    state.store.delete_policy(policy_id).await?;
    Ok(StatusCode::OK)
}

/// Authorize an agent-to-agent payment. 200 when authorized, 202 when held
/// for a human, 400 when rejected by the policy checks.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(request): Json<AuthorizeRequest>,
) -> ApiResult<(StatusCode, Json<CrossTransactionResponse>)> {
    principal
        .authorize_agent(&state, request.source_agent_id)
        .await?;

    let tx = state
        .engine
        .cross_agent
        .authorize(
            request.source_agent_id,
            request.target_agent_id,
            Money::new(request.amount)?,
            &request.payment_type,
        )
        .await?;
    let status = if tx.authorized {
        StatusCode::OK
    } else if tx.requires_human {
        StatusCode::ACCEPTED
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(tx.into())))
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(tx_id): Path<String>,
) -> ApiResult<Json<CrossTransactionResponse>> {
    let tx_id = parse_id(&tx_id, "transaction_id", CrossTransactionId::parse)?;
    authorize_cross_tx(&state, &owner, tx_id).await?;
    let tx = state.engine.cross_agent.approve(tx_id).await?;
    Ok(Json(tx.into()))
}

#[derive(Debug, Deserialize)]
pub struct CrossRejectRequest {
    pub reason: String,
}

pub async fn reject(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(tx_id): Path<String>,
    Json(request): Json<CrossRejectRequest>,
) -> ApiResult<Json<CrossTransactionResponse>> {
    let tx_id = parse_id(&tx_id, "transaction_id", CrossTransactionId::parse)?;
    authorize_cross_tx(&state, &owner, tx_id).await?;
    let tx = state
        .engine
        .cross_agent
        .reject(tx_id, &request.reason)
        .await?;
    Ok(Json(tx.into()))
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub agent_ids: Vec<agentwallet_types::AgentId>,
}

pub async fn create_group(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Json(request): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<AgentGroup>)> {
    let group = AgentGroup {
        id: GroupId::new(),
        owner_id: owner.id,
        name: request.name,
        agent_ids: request.agent_ids,
    };
    state.store.create_group(&group).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn list_groups(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
) -> ApiResult<Json<Vec<AgentGroup>>> {
    Ok(Json(state.store.groups_for_owner(owner.id).await?))
}

async fn authorize_cross_tx(
    state: &AppState,
    owner: &agentwallet_types::Owner,
    tx_id: CrossTransactionId,
) -> ApiResult<()> {
    let tx = state
        .store
        .cross_transaction(tx_id)
        .await?
        .ok_or(WalletError::CrossTransactionNotFound {
            transaction_id: tx_id.to_string(),
        })?;
    Principal::Owner(owner.clone())
        .authorize_agent(state, tx.source_agent_id)
        .await
}
