//! Engagement and reporting handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use cloudgreet_common::types::StatsRange;
use cloudgreet_core::outreach::{
    DeliveryReceiptInput, OptOutInput, OutreachStats, ReplyInput, ReplyOutcome,
};
use cloudgreet_storage::models::{OptOut, ScheduledSend};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{require_scope, AppState, AuthContext};
use crate::error::ApiResult;
use crate::handlers::{OUTREACH_READ, OUTREACH_WRITE};

/// Query parameters for listing opt-outs
#[derive(Debug, Default, Deserialize)]
pub struct ListOptOutsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Opt-out list response
#[derive(Debug, Serialize)]
pub struct OptOutListResponse {
    #[serde(rename = "optOuts")]
    pub opt_outs: Vec<OptOut>,
}

/// Query parameters for stats
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub range: Option<String>,
}

/// Record an inbound reply
pub async fn record_reply(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<ReplyInput>,
) -> ApiResult<Json<ReplyOutcome>> {
    require_scope(&auth, OUTREACH_WRITE)?;
    let outcome = state
        .engagement
        .record_reply(auth.tenant_id, input, Utc::now())
        .await?;
    Ok(Json(outcome))
}

pub async fn list_opt_outs(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListOptOutsQuery>,
) -> ApiResult<Json<OptOutListResponse>> {
    require_scope(&auth, OUTREACH_READ)?;
    let opt_outs = state
        .engagement
        .list_opt_outs(auth.tenant_id, query.limit, query.offset)
        .await?;
    Ok(Json(OptOutListResponse { opt_outs }))
}

pub async fn add_opt_out(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<OptOutInput>,
) -> ApiResult<(StatusCode, Json<OptOut>)> {
    require_scope(&auth, OUTREACH_WRITE)?;
    let opt_out = state.engagement.add_opt_out(auth.tenant_id, input).await?;
    Ok((StatusCode::CREATED, Json(opt_out)))
}

/// Apply a provider delivery receipt to a send
pub async fn record_delivery(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(send_id): Path<Uuid>,
    Json(input): Json<DeliveryReceiptInput>,
) -> ApiResult<Json<ScheduledSend>> {
    require_scope(&auth, OUTREACH_WRITE)?;
    let send = state
        .engagement
        .record_delivery(auth.tenant_id, send_id, input, Utc::now())
        .await?;
    Ok(Json(send))
}

/// Aggregated outreach performance; range defaults to 7d
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<OutreachStats>> {
    require_scope(&auth, OUTREACH_READ)?;
    let range = match query.range.as_deref() {
        Some(raw) => raw.parse::<StatsRange>()?,
        None => StatsRange::default(),
    };
    let stats = state.stats.stats(auth.tenant_id, range, Utc::now()).await?;
    Ok(Json(stats))
}
