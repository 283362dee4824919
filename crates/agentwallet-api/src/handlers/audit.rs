//! Audit log read endpoints

use agentwallet_types::AuditDecision;
use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::auth::OwnerAuth;
use crate::dto::{AuditEntryResponse, AuditQuery, AuditSummaryResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list(
    State(state): State<Arc<AppState>>,
    OwnerAuth(_owner): OwnerAuth,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditEntryResponse>>> {
    let entries = state
        .store
        .audit_entries(query.agent_id, query.limit.clamp(1, 1000), query.offset.max(0))
        .await?;
    Ok(Json(entries.into_iter().map(AuditEntryResponse::from).collect()))
}

/// Full export for compliance; newest first
pub async fn export(
    State(state): State<Arc<AppState>>,
    OwnerAuth(_owner): OwnerAuth,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditEntryResponse>>> {
    let entries = state
        .store
        .audit_entries(query.agent_id, i64::MAX, 0)
        .await?;
    Ok(Json(entries.into_iter().map(AuditEntryResponse::from).collect()))
}

pub async fn summary(
    State(state): State<Arc<AppState>>,
    OwnerAuth(_owner): OwnerAuth,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<AuditSummaryResponse>> {
    let entries = state
        .store
        .audit_entries(query.agent_id, i64::MAX, 0)
        .await?;
    let count = |d: AuditDecision| entries.iter().filter(|e| e.decision == d).count();
    Ok(Json(AuditSummaryResponse {
        total: entries.len(),
        allowed: count(AuditDecision::Allowed),
        blocked: count(AuditDecision::Blocked),
        escalated: count(AuditDecision::Escalated),
        system: count(AuditDecision::System),
    }))
}
