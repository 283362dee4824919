//! Agent lifecycle handlers

use agentwallet_types::{
    actions, Agent, AgentId, AgentStatus, AuditDecision, AuditDraft, WalletError,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::auth::{generate_api_key, OwnerAuth, Principal};
use crate::dto::{AgentResponse, CreateAgentRequest, CreatedAgentResponse};
use crate::error::ApiResult;
use crate::handlers::parse_id;
use crate::state::AppState;

pub async fn create_agent(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Json(request): Json<CreateAgentRequest>,
) -> ApiResult<(StatusCode, Json<CreatedAgentResponse>)> {
    if request.name.trim().is_empty() {
        return Err(WalletError::invalid_input("name", "must not be empty").into());
    }

    let api_key = generate_api_key("awa");
    let mut agent = Agent::new(owner.id, request.name, api_key.clone());
    agent.metadata = request.metadata;
    state.store.create_agent(&agent).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedAgentResponse {
            id: agent.id,
            name: agent.name,
            status: "active".to_string(),
            api_key,
            created_at: agent.created_at,
        }),
    ))
}

pub async fn list_agents(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
) -> ApiResult<Json<Vec<AgentResponse>>> {
    let agents = state.store.agents_for_owner(owner.id).await?;
    Ok(Json(agents.into_iter().map(AgentResponse::from).collect()))
}

pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<AgentResponse>> {
    let agent_id = parse_id(&agent_id, "agent_id", AgentId::parse)?;
    principal.authorize_agent(&state, agent_id).await?;
    let agent = state
        .store
        .agent(agent_id)
        .await?
        .ok_or(WalletError::AgentNotFound {
            agent_id: agent_id.to_string(),
        })?;
    Ok(Json(agent.into()))
}

pub async fn pause_agent(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<AgentResponse>> {
    transition(&state, owner.id, &agent_id, AgentStatus::Paused, &[AgentStatus::Active]).await
}

pub async fn activate_agent(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<AgentResponse>> {
    transition(
        &state,
        owner.id,
        &agent_id,
        AgentStatus::Active,
        &[AgentStatus::Paused, AgentStatus::Suspended],
    )
    .await
}

async fn transition(
    state: &AppState,
    owner: agentwallet_types::OwnerId,
    raw_id: &str,
    to: AgentStatus,
    from: &[AgentStatus],
) -> ApiResult<Json<AgentResponse>> {
    let agent_id = parse_id(raw_id, "agent_id", AgentId::parse)?;
    let mut agent = state
        .store
        .agent(agent_id)
        .await?
        .ok_or(WalletError::AgentNotFound {
            agent_id: agent_id.to_string(),
        })?;
    if agent.owner_id != owner {
        return Err(WalletError::access_denied("agent belongs to another owner").into());
    }
    if !from.contains(&agent.status) {
        return Err(WalletError::state_conflict(
            "agent",
            format!("cannot move from {:?} to {:?}", agent.status, to),
        )
        .into());
    }
    state.store.set_agent_status(agent_id, to).await?;
    agent.status = to;
    Ok(Json(agent.into()))
}

/// Rotate the owner's credential; the new key is returned once
pub async fn rotate_owner_key(
    State(state): State<Arc<AppState>>,
    OwnerAuth(owner): OwnerAuth,
) -> ApiResult<Json<serde_json::Value>> {
    let api_key = generate_api_key("awo");
    state.store.rotate_owner_key(owner.id, &api_key).await?;
    state
        .store
        .append_audit(AuditDraft::new(
            None,
            actions::OWNER_KEY_ROTATED,
            "owner",
            owner.id.to_string(),
            AuditDecision::System,
            json!({}),
        ))
        .await?;
    Ok(Json(json!({ "api_key": api_key })))
}
