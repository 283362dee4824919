//! Transaction submission and approval handlers

use agentwallet_types::{
    Money, TransactionCandidate, TransactionId, TransactionStatus, WalletError, WalletId,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::auth::{OwnerAuth, Principal};
use crate::dto::{ApproveRequest, RejectRequest, SubmitTransactionRequest, TransactionResponse};
use crate::error::ApiResult;
use crate::handlers::parse_id;
use crate::state::AppState;

/// Submit a spend through admission. The HTTP class tracks the outcome:
/// 200 completed, 202 awaiting approval, 400 rejected or kill-switched
/// (the persisted transaction rides in the body either way).
pub async fn submit(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(wallet_id): Path<String>,
    Json(request): Json<SubmitTransactionRequest>,
) -> ApiResult<(StatusCode, Json<TransactionResponse>)> {
    let wallet_id = parse_id(&wallet_id, "wallet_id", WalletId::parse)?;
    principal.authorize_wallet(&state, wallet_id).await?;

    let mut candidate = TransactionCandidate::new(Money::new(request.amount)?);
    candidate.category = request.category;
    candidate.recipient_id = request.recipient_id;
    candidate.recipient_type = request.recipient_type;
    candidate.description = request.description;
    candidate.metadata = request.metadata;

    let outcome = state.engine.admission.submit(wallet_id, candidate).await?;
    let status = match outcome.status() {
        TransactionStatus::Completed => StatusCode::OK,
        TransactionStatus::AwaitingApproval => StatusCode::ACCEPTED,
        _ => StatusCode::BAD_REQUEST,
    };
    Ok((status, Json(outcome.transaction.into())))
}

pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(tx_id): Path<String>,
) -> ApiResult<Json<TransactionResponse>> {
    let tx_id = parse_id(&tx_id, "transaction_id", TransactionId::parse)?;
    let tx = state
        .store
        .transaction(tx_id)
        .await?
        .ok_or(WalletError::TransactionNotFound {
            transaction_id: tx_id.to_string(),
        })?;
    principal.authorize_wallet(&state, tx.wallet_id).await?;
    Ok(Json(tx.into()))
}

pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
) -> ApiResult<Json<Vec<TransactionResponse>>> {
    let txs = state.store.awaiting_approval_for_owner(owner.id).await?;
    Ok(Json(txs.into_iter().map(TransactionResponse::from).collect()))
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(tx_id): Path<String>,
    Json(request): Json<ApproveRequest>,
) -> ApiResult<Json<TransactionResponse>> {
    let tx_id = parse_id(&tx_id, "transaction_id", TransactionId::parse)?;
    authorize_tx_owner(&state, &owner, tx_id).await?;
    let tx = state
        .engine
        .admission
        .approve(tx_id, &request.operator)
        .await?;
    Ok(Json(tx.into()))
}

pub async fn reject(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(tx_id): Path<String>,
    Json(request): Json<RejectRequest>,
) -> ApiResult<Json<TransactionResponse>> {
    let tx_id = parse_id(&tx_id, "transaction_id", TransactionId::parse)?;
    authorize_tx_owner(&state, &owner, tx_id).await?;
    let tx = state
        .engine
        .admission
        .reject_pending(tx_id, &request.operator, &request.reason)
        .await?;
    Ok(Json(tx.into()))
}

async fn authorize_tx_owner(
    state: &AppState,
    owner: &agentwallet_types::Owner,
    tx_id: TransactionId,
) -> ApiResult<()> {
    let tx = state
        .store
        .transaction(tx_id)
        .await?
        .ok_or(WalletError::TransactionNotFound {
            transaction_id: tx_id.to_string(),
        })?;
    Principal::Owner(owner.clone())
        .authorize_wallet(state, tx.wallet_id)
        .await
}
