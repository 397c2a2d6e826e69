//! Template handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use cloudgreet_common::types::Channel;
use cloudgreet_core::outreach::{TemplateDraft, TemplatePatch};
use cloudgreet_storage::models::Template;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{require_scope, AppState, AuthContext};
use crate::error::ApiResult;
use crate::handlers::{OUTREACH_READ, OUTREACH_WRITE};

/// Query parameters for listing templates
#[derive(Debug, Default, Deserialize)]
pub struct ListTemplatesQuery {
    pub channel: Option<Channel>,
    pub active: Option<bool>,
}

/// Template list response
#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub templates: Vec<Template>,
}

pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListTemplatesQuery>,
) -> ApiResult<Json<TemplateListResponse>> {
    require_scope(&auth, OUTREACH_READ)?;
    let templates = state
        .templates
        .list(auth.tenant_id, query.channel, query.active)
        .await?;
    Ok(Json(TemplateListResponse { templates }))
}

pub async fn create_template(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(draft): Json<TemplateDraft>,
) -> ApiResult<(StatusCode, Json<Template>)> {
    require_scope(&auth, OUTREACH_WRITE)?;
    let template = state.templates.create(auth.tenant_id, draft).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Template>> {
    require_scope(&auth, OUTREACH_READ)?;
    Ok(Json(state.templates.get(auth.tenant_id, id).await?))
}

pub async fn update_template(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(patch): Json<TemplatePatch>,
) -> ApiResult<Json<Template>> {
    require_scope(&auth, OUTREACH_WRITE)?;
    Ok(Json(state.templates.update(auth.tenant_id, id, patch).await?))
}
