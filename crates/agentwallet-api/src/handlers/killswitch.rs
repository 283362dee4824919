//! Kill switch handlers

use agentwallet_types::{KillSwitch, KillSwitchId, WalletError, WalletId};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::auth::{OwnerAuth, Principal};
use crate::dto::{CreateKillSwitchRequest, KillSwitchResponse};
use crate::error::ApiResult;
use crate::handlers::parse_id;
use crate::state::AppState;

pub async fn create_kill_switch(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(wallet_id): Path<String>,
    Json(request): Json<CreateKillSwitchRequest>,
) -> ApiResult<(StatusCode, Json<KillSwitchResponse>)> {
    let wallet_id = parse_id(&wallet_id, "wallet_id", WalletId::parse)?;
    Principal::Owner(owner)
        .authorize_wallet(&state, wallet_id)
        .await?;

    let switch = KillSwitch::new(wallet_id, request.kind, request.window_hours);
    state.store.create_kill_switch(&switch).await?;
    Ok((StatusCode::CREATED, Json(switch.into())))
}

pub async fn list_kill_switches(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(wallet_id): Path<String>,
) -> ApiResult<Json<Vec<KillSwitchResponse>>> {
    let wallet_id = parse_id(&wallet_id, "wallet_id", WalletId::parse)?;
    principal.authorize_wallet(&state, wallet_id).await?;
    let switches = state.store.kill_switches_for_wallet(wallet_id).await?;
    Ok(Json(
        switches.into_iter().map(KillSwitchResponse::from).collect(),
    ))
}

pub async fn reset_kill_switch(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(switch_id): Path<String>,
) -> ApiResult<Json<KillSwitchResponse>> {
    let switch_id = parse_id(&switch_id, "switch_id", KillSwitchId::parse)?;
    authorize_switch(&state, &owner, switch_id).await?;
    let switch = state.engine.kill_switch.reset(switch_id, Utc::now()).await?;
    Ok(Json(switch.into()))
}

pub async fn delete_kill_switch(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(switch_id): Path<String>,
) -> ApiResult<StatusCode> {
    let switch_id = parse_id(&switch_id, "switch_id", KillSwitchId::parse)?;
    authorize_switch(&state, &owner, switch_id).await?;
    state.store.delete_kill_switch(switch_id).await?;
    Ok(StatusCode::OK)
}

pub async fn emergency_stop(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(wallet_id): Path<String>,
) -> ApiResult<StatusCode> {
    let wallet_id = parse_id(&wallet_id, "wallet_id", WalletId::parse)?;
    Principal::Owner(owner)
        .authorize_wallet(&state, wallet_id)
        .await?;
    state.engine.kill_switch.emergency_stop(wallet_id).await?;
    Ok(StatusCode::OK)
}

async fn authorize_switch(
    state: &AppState,
    owner: &agentwallet_types::Owner,
    switch_id: KillSwitchId,
) -> ApiResult<()> {
    let switch = state
        .store
        .kill_switch(switch_id)
        .await?
        .ok_or(WalletError::KillSwitchNotFound {
            switch_id: switch_id.to_string(),
        })?;
    Principal::Owner(owner.clone())
        .authorize_wallet(state, switch.wallet_id)
        .await
}
