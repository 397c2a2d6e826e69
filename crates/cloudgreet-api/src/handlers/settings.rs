//! AI, prospecting and integration settings handlers

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::Utc;
use cloudgreet_core::settings::{
    AiSettingsInput, IntegrationUpsert, IntegrationView, ProspectFiltersInput,
};
use cloudgreet_storage::models::{AiSettings, ProspectFilters, ProspectSyncRun};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::auth::{require_scope, AppState, AuthContext};
use crate::error::ApiResult;
use crate::handlers::{SETTINGS_READ, SETTINGS_WRITE};

/// Saved filters; `null` until the tenant saves some
#[derive(Debug, Serialize)]
pub struct ProspectFiltersResponse {
    pub filters: Option<ProspectFilters>,
}

/// Sync run history
#[derive(Debug, Serialize)]
pub struct SyncRunListResponse {
    pub runs: Vec<ProspectSyncRun>,
}

/// Integrations with masked credentials
#[derive(Debug, Serialize)]
pub struct IntegrationListResponse {
    pub integrations: Vec<IntegrationView>,
}

pub async fn get_ai_settings(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<AiSettings>> {
    require_scope(&auth, SETTINGS_READ)?;
    Ok(Json(state.ai_settings.get(auth.tenant_id).await?))
}

pub async fn put_ai_settings(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<AiSettingsInput>,
) -> ApiResult<Json<AiSettings>> {
    require_scope(&auth, SETTINGS_WRITE)?;
    Ok(Json(state.ai_settings.put(auth.tenant_id, input).await?))
}

pub async fn get_prospect_filters(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ProspectFiltersResponse>> {
    require_scope(&auth, SETTINGS_READ)?;
    let filters = state.prospecting.get_filters(auth.tenant_id).await?;
    Ok(Json(ProspectFiltersResponse { filters }))
}

pub async fn save_prospect_filters(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<ProspectFiltersInput>,
) -> ApiResult<Json<ProspectFiltersResponse>> {
    require_scope(&auth, SETTINGS_WRITE)?;
    let filters = state.prospecting.save_filters(auth.tenant_id, input).await?;
    Ok(Json(ProspectFiltersResponse {
        filters: Some(filters),
    }))
}

pub async fn list_sync_runs(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<SyncRunListResponse>> {
    require_scope(&auth, SETTINGS_READ)?;
    let runs = state.prospecting.list_runs(auth.tenant_id).await?;
    Ok(Json(SyncRunListResponse { runs }))
}

/// Queue a prospect sync with the saved filters
pub async fn start_sync(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<(StatusCode, Json<ProspectSyncRun>)> {
    require_scope(&auth, SETTINGS_WRITE)?;
    let run = state.prospecting.start_sync(auth.tenant_id, Utc::now()).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

pub async fn list_integrations(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<IntegrationListResponse>> {
    require_scope(&auth, SETTINGS_READ)?;
    let integrations = state.integrations.list(auth.tenant_id).await?;
    Ok(Json(IntegrationListResponse { integrations }))
}

/// Store credentials; the response carries masked values only
pub async fn upsert_integration(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<IntegrationUpsert>,
) -> ApiResult<Json<IntegrationView>> {
    require_scope(&auth, SETTINGS_WRITE)?;
    let view = state
        .integrations
        .upsert(auth.tenant_id, input, Utc::now())
        .await?;
    info!(
        api_key_id = %auth.api_key_id,
        provider = %view.provider,
        "Integration updated via API"
    );
    Ok(Json(view))
}
