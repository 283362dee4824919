//! Dead-man switch handlers

use agentwallet_engine::HeartbeatResponse;
use agentwallet_types::{AgentId, DeadManConfig, WalletError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::auth::{OwnerAuth, Principal};
use crate::dto::{ManualTriggerRequest, RegisterDeadManRequest};
use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_id;
use crate::state::AppState;

pub async fn register(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(agent_id): Path<String>,
    Json(request): Json<RegisterDeadManRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let agent_id = parse_id(&agent_id, "agent_id", AgentId::parse)?;
    Principal::Owner(owner)
        .authorize_agent(&state, agent_id)
        .await?;

    let mut config = DeadManConfig::new(agent_id);
    if let Some(v) = request.heartbeat_interval_seconds {
        config.heartbeat_interval_seconds = v;
    }
    if let Some(v) = request.missed_heartbeat_threshold {
        config.missed_heartbeat_threshold = v;
    }
    if let Some(v) = request.anomaly_window_minutes {
        config.anomaly_window_minutes = v;
    }
    if let Some(v) = request.anomaly_spend_multiplier {
        config.anomaly_spend_multiplier = v;
    }
    if let Some(v) = request.anomaly_tx_count_multiplier {
        config.anomaly_tx_count_multiplier = v;
    }
    if let Some(v) = request.max_tx_per_minute {
        config.max_tx_per_minute = v;
    }
    if let Some(v) = request.max_unique_vendors_per_hour {
        config.max_unique_vendors_per_hour = v;
    }
    if let Some(v) = request.on_anomaly {
        config.on_anomaly = v;
    }
    if let Some(v) = request.on_missed_heartbeat {
        config.on_missed_heartbeat = v;
    }
    if let Some(v) = request.on_manual_trigger {
        config.on_manual_trigger = v;
    }
    if let Some(v) = request.cascade_to_children {
        config.cascade_to_children = v;
    }
    if let Some(v) = request.recovery_requires_human {
        config.recovery_requires_human = v;
    }

    state.engine.deadman.register(config).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "agent_id": agent_id.to_string(), "registered": true })),
    ))
}

/// Agent liveness ping. Frozen agents may still call this — the response
/// directs them to cease — so the principal check accepts any live agent
/// credential rather than requiring active status.
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<HeartbeatResponse>> {
    let agent_id = parse_id(&agent_id, "agent_id", AgentId::parse)?;
    match &principal {
        Principal::Agent(agent) if agent.id == agent_id && !agent.status.is_terminal() => {}
        Principal::Agent(_) => {
            return Err(ApiError::from(WalletError::access_denied(
                "agents may only heartbeat themselves",
            )))
        }
        Principal::Owner(_) => {
            principal.authorize_agent(&state, agent_id).await?;
        }
    }
    let response = state.engine.deadman.heartbeat(agent_id, Utc::now()).await?;
    Ok(Json(response))
}

pub async fn freeze(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(agent_id): Path<String>,
    Json(request): Json<ManualTriggerRequest>,
) -> ApiResult<StatusCode> {
    let agent_id = parse_id(&agent_id, "agent_id", AgentId::parse)?;
    authorize_owned_agent(&state, &owner, agent_id).await?;
    state
        .engine
        .deadman
        .force_freeze(agent_id, &request.reason)
        .await?;
    Ok(StatusCode::OK)
}

pub async fn unfreeze(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(agent_id): Path<String>,
) -> ApiResult<StatusCode> {
    let agent_id = parse_id(&agent_id, "agent_id", AgentId::parse)?;
    authorize_owned_agent(&state, &owner, agent_id).await?;
    state.engine.deadman.unfreeze(agent_id).await?;
    Ok(StatusCode::OK)
}

pub async fn terminate(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(agent_id): Path<String>,
    Json(request): Json<ManualTriggerRequest>,
) -> ApiResult<StatusCode> {
    let agent_id = parse_id(&agent_id, "agent_id", AgentId::parse)?;
    authorize_owned_agent(&state, &owner, agent_id).await?;
    state
        .engine
        .deadman
        .force_terminate(agent_id, &request.reason)
        .await?;
    Ok(StatusCode::OK)
}

pub async fn events(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<Vec<agentwallet_types::DeadManEvent>>> {
    let agent_id = parse_id(&agent_id, "agent_id", AgentId::parse)?;
    authorize_owned_agent(&state, &owner, agent_id).await?;
    let events = state
        .store
        .deadman_events_for_agent(agent_id, 100)
        .await?;
    Ok(Json(events))
}

/// Ownership check that tolerates non-active agent status (frozen and
/// terminated agents still belong to their owner)
async fn authorize_owned_agent(
    state: &AppState,
    owner: &agentwallet_types::Owner,
    agent_id: AgentId,
) -> ApiResult<()> {
    let agent = state
        .store
        .agent(agent_id)
        .await?
        .ok_or(WalletError::AgentNotFound {
            agent_id: agent_id.to_string(),
        })?;
    if agent.owner_id != owner.id {
        return Err(WalletError::access_denied("agent belongs to another owner").into());
    }
    Ok(())
}
