//! Spawn and lineage handlers

use agentwallet_types::{AgentId, WalletError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::auth::{OwnerAuth, Principal};
use crate::dto::{LineageResponse, SpawnRequest};
use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_id;
use crate::state::AppState;

pub async fn spawn(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(parent_id): Path<String>,
    Json(request): Json<SpawnRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let parent_id = parse_id(&parent_id, "agent_id", AgentId::parse)?;
    Principal::Owner(owner.clone())
        .authorize_agent(&state, parent_id)
        .await?;
    Principal::Owner(owner)
        .authorize_agent(&state, request.child_agent_id)
        .await?;

    let event = state
        .engine
        .spawn
        .spawn(parent_id, request.child_agent_id, request.overrides)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(&event).map_err(WalletError::from)?),
    ))
}

/// Lineage is readable by the owner and by members of the tree
pub async fn get_lineage(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<LineageResponse>> {
    let agent_id = parse_id(&agent_id, "agent_id", AgentId::parse)?;
    let lineage = state
        .store
        .lineage(agent_id)
        .await?
        .ok_or(WalletError::LineageNotFound {
            agent_id: agent_id.to_string(),
        })?;

    match &principal {
        Principal::Owner(owner) => {
            let agent = state
                .store
                .agent(agent_id)
                .await?
                .ok_or(WalletError::AgentNotFound {
                    agent_id: agent_id.to_string(),
                })?;
            if agent.owner_id != owner.id {
                return Err(ApiError::from(WalletError::access_denied(
                    "agent belongs to another owner",
                )));
            }
        }
        Principal::Agent(agent) => {
            let member = agent.id == agent_id
                || state
                    .store
                    .lineage(agent.id)
                    .await?
                    .map(|l| l.root_id == lineage.root_id)
                    .unwrap_or(false);
            if !member {
                return Err(ApiError::from(WalletError::access_denied(
                    "agent is not part of this lineage",
                )));
            }
        }
    }
    Ok(Json(lineage.into()))
}

pub async fn terminate_lineage(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let agent_id = parse_id(&agent_id, "agent_id", AgentId::parse)?;
    let agent = state
        .store
        .agent(agent_id)
        .await?
        .ok_or(WalletError::AgentNotFound {
            agent_id: agent_id.to_string(),
        })?;
    if agent.owner_id != owner.id {
        return Err(ApiError::from(WalletError::access_denied(
            "agent belongs to another owner",
        )));
    }

    let terminated = state.engine.spawn.terminate_lineage(agent_id, true).await?;
    Ok(Json(serde_json::json!({
        "terminated": terminated.iter().map(|a| a.to_string()).collect::<Vec<_>>(),
    })))
}
