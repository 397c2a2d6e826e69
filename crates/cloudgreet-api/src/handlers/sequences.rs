//! Sequence handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use cloudgreet_core::outreach::{EnrollContact, SequenceDraft, SequencePatch};
use cloudgreet_storage::models::{Enrollment, Sequence};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{require_scope, AppState, AuthContext};
use crate::error::ApiResult;
use crate::handlers::{OUTREACH_READ, OUTREACH_WRITE};

/// Sequence list response
#[derive(Debug, Serialize)]
pub struct SequenceListResponse {
    pub sequences: Vec<Sequence>,
}

/// Enrollment list response
#[derive(Debug, Serialize)]
pub struct EnrollmentListResponse {
    pub enrollments: Vec<Enrollment>,
}

/// List sequences with steps and metrics
pub async fn list_sequences(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<SequenceListResponse>> {
    require_scope(&auth, OUTREACH_READ)?;
    let sequences = state.sequences.list(auth.tenant_id).await?;
    Ok(Json(SequenceListResponse { sequences }))
}

/// Create a sequence in draft status
pub async fn create_sequence(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(draft): Json<SequenceDraft>,
) -> ApiResult<(StatusCode, Json<Sequence>)> {
    require_scope(&auth, OUTREACH_WRITE)?;
    let sequence = state.sequences.create(auth.tenant_id, draft).await?;
    Ok((StatusCode::CREATED, Json(sequence)))
}

/// Get a sequence
pub async fn get_sequence(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Sequence>> {
    require_scope(&auth, OUTREACH_READ)?;
    Ok(Json(state.sequences.get(auth.tenant_id, id).await?))
}

/// Partially update a sequence or change its status
pub async fn update_sequence(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(patch): Json<SequencePatch>,
) -> ApiResult<Json<Sequence>> {
    require_scope(&auth, OUTREACH_WRITE)?;
    let sequence = state.sequences.update(auth.tenant_id, id, patch).await?;
    Ok(Json(sequence))
}

/// Delete a sequence, cancelling its pending sends
pub async fn delete_sequence(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_scope(&auth, OUTREACH_WRITE)?;
    state.sequences.delete(auth.tenant_id, id).await?;
    info!(api_key_id = %auth.api_key_id, sequence_id = %id, "Sequence deleted via API");
    Ok(StatusCode::NO_CONTENT)
}

/// List a sequence's enrollments
pub async fn list_enrollments(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EnrollmentListResponse>> {
    require_scope(&auth, OUTREACH_READ)?;
    let enrollments = state.sequences.list_enrollments(auth.tenant_id, id).await?;
    Ok(Json(EnrollmentListResponse { enrollments }))
}

/// Enroll a contact; the first step falls due after its wait
pub async fn enroll_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(contact): Json<EnrollContact>,
) -> ApiResult<(StatusCode, Json<Enrollment>)> {
    require_scope(&auth, OUTREACH_WRITE)?;
    let enrollment = state
        .sequences
        .enroll(auth.tenant_id, id, contact, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}
