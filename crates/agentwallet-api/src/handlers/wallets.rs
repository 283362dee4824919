//! Wallet handlers

use agentwallet_types::{Money, Wallet, WalletError, WalletId};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::auth::{OwnerAuth, Principal};
use crate::dto::{CreateWalletRequest, DepositRequest, TransactionResponse, WalletResponse};
use crate::error::ApiResult;
use crate::handlers::parse_id;
use crate::state::AppState;

pub async fn create_wallet(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(request): Json<CreateWalletRequest>,
) -> ApiResult<(StatusCode, Json<WalletResponse>)> {
    let agent_id = match (&principal, request.agent_id) {
        (_, Some(agent_id)) => agent_id,
        (Principal::Agent(agent), None) => agent.id,
        (Principal::Owner(_), None) => {
            return Err(WalletError::invalid_input("agent_id", "required for owners").into())
        }
    };
    principal.authorize_agent(&state, agent_id).await?;

    let wallet = Wallet::new(agent_id, request.currency);
    state.store.create_wallet(&wallet).await?;
    Ok((StatusCode::CREATED, Json(wallet.into())))
}

pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(wallet_id): Path<String>,
) -> ApiResult<Json<WalletResponse>> {
    let wallet_id = parse_id(&wallet_id, "wallet_id", WalletId::parse)?;
    principal.authorize_wallet(&state, wallet_id).await?;
    let wallet = state
        .store
        .wallet(wallet_id)
        .await?
        .ok_or(WalletError::WalletNotFound {
            wallet_id: wallet_id.to_string(),
        })?;
    Ok(Json(wallet.into()))
}

pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(wallet_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let wallet_id = parse_id(&wallet_id, "wallet_id", WalletId::parse)?;
    principal.authorize_wallet(&state, wallet_id).await?;
    let wallet = state
        .store
        .wallet(wallet_id)
        .await?
        .ok_or(WalletError::WalletNotFound {
            wallet_id: wallet_id.to_string(),
        })?;
    Ok(Json(serde_json::json!({
        "wallet_id": wallet.id.to_string(),
        "balance": wallet.balance,
        "currency": wallet.currency,
    })))
}

pub async fn deposit(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(wallet_id): Path<String>,
    Json(request): Json<DepositRequest>,
) -> ApiResult<Json<TransactionResponse>> {
    let wallet_id = parse_id(&wallet_id, "wallet_id", WalletId::parse)?;
    principal.authorize_wallet(&state, wallet_id).await?;
    let amount = Money::new(request.amount)?;
    let outcome = state
        .engine
        .admission
        .deposit(wallet_id, amount, request.description)
        .await?;
    Ok(Json(outcome.transaction.into()))
}

pub async fn freeze_wallet(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(wallet_id): Path<String>,
) -> ApiResult<StatusCode> {
    let wallet_id = parse_id(&wallet_id, "wallet_id", WalletId::parse)?;
    Principal::Owner(owner)
        .authorize_wallet(&state, wallet_id)
        .await?;
    state.engine.admission.freeze_wallet(wallet_id).await?;
    Ok(StatusCode::OK)
}

pub async fn unfreeze_wallet(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(wallet_id): Path<String>,
) -> ApiResult<StatusCode> {
    let wallet_id = parse_id(&wallet_id, "wallet_id", WalletId::parse)?;
    Principal::Owner(owner)
        .authorize_wallet(&state, wallet_id)
        .await?;
    state.engine.admission.unfreeze_wallet(wallet_id).await?;
    Ok(StatusCode::OK)
}

pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(wallet_id): Path<String>,
) -> ApiResult<Json<Vec<TransactionResponse>>> {
    let wallet_id = parse_id(&wallet_id, "wallet_id", WalletId::parse)?;
    principal.authorize_wallet(&state, wallet_id).await?;
    let txs = state.store.transactions_for_wallet(wallet_id, 100).await?;
    Ok(Json(txs.into_iter().map(TransactionResponse::from).collect()))
}
