//! Spend rule handlers

use agentwallet_types::{RuleId, SpendRule, WalletError, WalletId};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::auth::{OwnerAuth, Principal};
use crate::dto::{CreateRuleRequest, RuleResponse, UpdateRuleRequest};
use crate::error::ApiResult;
use crate::handlers::parse_id;
use crate::state::AppState;

pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(wallet_id): Path<String>,
    Json(request): Json<CreateRuleRequest>,
) -> ApiResult<(StatusCode, Json<RuleResponse>)> {
    let wallet_id = parse_id(&wallet_id, "wallet_id", WalletId::parse)?;
    Principal::Owner(owner)
        .authorize_wallet(&state, wallet_id)
        .await?;

    // Param validation happens at construction
    let rule = SpendRule::new(wallet_id, request.kind, request.priority)?;
    state.store.create_rule(&rule).await?;
    Ok((StatusCode::CREATED, Json(rule.into())))
}

pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(wallet_id): Path<String>,
) -> ApiResult<Json<Vec<RuleResponse>>> {
    let wallet_id = parse_id(&wallet_id, "wallet_id", WalletId::parse)?;
    principal.authorize_wallet(&state, wallet_id).await?;
    let rules = state.store.rules_for_wallet(wallet_id).await?;
    Ok(Json(rules.into_iter().map(RuleResponse::from).collect()))
}

pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(rule_id): Path<String>,
    Json(request): Json<UpdateRuleRequest>,
) -> ApiResult<Json<RuleResponse>> {
    let rule_id = parse_id(&rule_id, "rule_id", RuleId::parse)?;
    let mut rule = state
        .store
        .rule(rule_id)
        .await?
        .ok_or(WalletError::RuleNotFound {
            rule_id: rule_id.to_string(),
        })?;
    Principal::Owner(owner)
        .authorize_wallet(&state, rule.wallet_id)
        .await?;

    if let Some(kind) = request.kind {
        kind.validate()?;
        rule.kind = kind;
        rule.throttled = false;
    }
    if let Some(priority) = request.priority {
        rule.priority = priority;
    }
    if let Some(active) = request.active {
        rule.active = active;
    }
    state.store.update_rule(&rule).await?;
    Ok(Json(rule.into()))
}

pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(rule_id): Path<String>,
) -> ApiResult<StatusCode> {
    let rule_id = parse_id(&rule_id, "rule_id", RuleId::parse)?;
    let rule = state
        .store
        .rule(rule_id)
        .await?
        .ok_or(WalletError::RuleNotFound {
            rule_id: rule_id.to_string(),
        })?;
    Principal::Owner(owner)
        .authorize_wallet(&state, rule.wallet_id)
        .await?;
    state.store.delete_rule(rule_id).await?;
    Ok(StatusCode::OK)
}
