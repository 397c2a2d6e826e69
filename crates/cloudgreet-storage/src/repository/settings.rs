//! Tenant settings repository: AI settings, prospecting and integrations

use crate::db::{db_err, parse_column, DatabasePool};
use crate::models::{
    AiSettings, IntegrationProvider, IntegrationRecord, ProspectFilters, ProspectSyncRun,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudgreet_common::types::TenantId;
use cloudgreet_common::{Error, Result};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Settings repository trait
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Stored AI settings, if the tenant saved any
    async fn get_ai_settings(&self, tenant_id: TenantId) -> Result<Option<AiSettings>>;

    /// Replace AI settings
    async fn put_ai_settings(&self, settings: AiSettings) -> Result<AiSettings>;

    /// Stored prospect filters, if the tenant saved any
    async fn get_prospect_filters(&self, tenant_id: TenantId) -> Result<Option<ProspectFilters>>;

    /// Replace prospect filters
    async fn put_prospect_filters(&self, filters: ProspectFilters) -> Result<ProspectFilters>;

    /// Record a sync run
    async fn create_sync_run(&self, run: ProspectSyncRun) -> Result<ProspectSyncRun>;

    /// Latest sync runs, newest first
    async fn list_sync_runs(&self, tenant_id: TenantId, limit: i64)
        -> Result<Vec<ProspectSyncRun>>;

    /// All integrations of the tenant, ordered by provider
    async fn list_integrations(&self, tenant_id: TenantId) -> Result<Vec<IntegrationRecord>>;

    /// One integration
    async fn get_integration(
        &self,
        tenant_id: TenantId,
        provider: IntegrationProvider,
    ) -> Result<Option<IntegrationRecord>>;

    /// Replace the stored fields of an integration
    async fn put_integration(&self, record: IntegrationRecord) -> Result<IntegrationRecord>;
}

#[derive(Debug, FromRow)]
struct AiSettingsRow {
    tenant_id: Uuid,
    tone: String,
    greeting_message: String,
    escalation_threshold: f64,
    after_hours_message: Option<String>,
    max_call_minutes: i32,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AiSettingsRow> for AiSettings {
    type Error = Error;

    fn try_from(row: AiSettingsRow) -> Result<Self> {
        Ok(AiSettings {
            tenant_id: row.tenant_id,
            tone: parse_column(&row.tone)?,
            greeting_message: row.greeting_message,
            escalation_threshold: row.escalation_threshold,
            after_hours_message: row.after_hours_message,
            max_call_minutes: row.max_call_minutes,
            updated_at: Some(row.updated_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct ProspectFiltersRow {
    tenant_id: Uuid,
    source: String,
    industries: Json<Vec<String>>,
    locations: Json<Vec<String>>,
    titles: Json<Vec<String>>,
    company_size_min: Option<i32>,
    company_size_max: Option<i32>,
    auto_enroll_sequence_id: Option<Uuid>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProspectFiltersRow> for ProspectFilters {
    type Error = Error;

    fn try_from(row: ProspectFiltersRow) -> Result<Self> {
        Ok(ProspectFilters {
            tenant_id: row.tenant_id,
            source: parse_column(&row.source)?,
            industries: row.industries.0,
            locations: row.locations.0,
            titles: row.titles.0,
            company_size_min: row.company_size_min,
            company_size_max: row.company_size_max,
            auto_enroll_sequence_id: row.auto_enroll_sequence_id,
            updated_at: Some(row.updated_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct SyncRunRow {
    id: Uuid,
    tenant_id: Uuid,
    source: String,
    status: String,
    filters: serde_json::Value,
    requested_at: DateTime<Utc>,
}

impl TryFrom<SyncRunRow> for ProspectSyncRun {
    type Error = Error;

    fn try_from(row: SyncRunRow) -> Result<Self> {
        Ok(ProspectSyncRun {
            id: row.id,
            tenant_id: row.tenant_id,
            source: parse_column(&row.source)?,
            status: parse_column(&row.status)?,
            filters: row.filters,
            requested_at: row.requested_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct IntegrationRow {
    tenant_id: Uuid,
    provider: String,
    fields: Json<BTreeMap<String, String>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<IntegrationRow> for IntegrationRecord {
    type Error = Error;

    fn try_from(row: IntegrationRow) -> Result<Self> {
        Ok(IntegrationRecord {
            tenant_id: row.tenant_id,
            provider: parse_column(&row.provider)?,
            fields: row.fields.0,
            updated_at: row.updated_at,
        })
    }
}

/// Database settings repository
pub struct DbSettingsRepository {
    pool: DatabasePool,
}

impl DbSettingsRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for DbSettingsRepository {
    async fn get_ai_settings(&self, tenant_id: TenantId) -> Result<Option<AiSettings>> {
        sqlx::query_as::<_, AiSettingsRow>(
            r#"
            SELECT tenant_id, tone, greeting_message, escalation_threshold,
                   after_hours_message, max_call_minutes, updated_at
            FROM ai_settings WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(AiSettings::try_from)
        .transpose()
    }

    async fn put_ai_settings(&self, settings: AiSettings) -> Result<AiSettings> {
        sqlx::query_as::<_, AiSettingsRow>(
            r#"
            INSERT INTO ai_settings (
                tenant_id, tone, greeting_message, escalation_threshold,
                after_hours_message, max_call_minutes, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (tenant_id) DO UPDATE SET
                tone = EXCLUDED.tone,
                greeting_message = EXCLUDED.greeting_message,
                escalation_threshold = EXCLUDED.escalation_threshold,
                after_hours_message = EXCLUDED.after_hours_message,
                max_call_minutes = EXCLUDED.max_call_minutes,
                updated_at = NOW()
            RETURNING tenant_id, tone, greeting_message, escalation_threshold,
                      after_hours_message, max_call_minutes, updated_at
            "#,
        )
        .bind(settings.tenant_id)
        .bind(settings.tone.to_string())
        .bind(&settings.greeting_message)
        .bind(settings.escalation_threshold)
        .bind(&settings.after_hours_message)
        .bind(settings.max_call_minutes)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?
        .try_into()
    }

    async fn get_prospect_filters(&self, tenant_id: TenantId) -> Result<Option<ProspectFilters>> {
        sqlx::query_as::<_, ProspectFiltersRow>(
            r#"
            SELECT tenant_id, source, industries, locations, titles, company_size_min,
                   company_size_max, auto_enroll_sequence_id, updated_at
            FROM prospect_filters WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(ProspectFilters::try_from)
        .transpose()
    }

    async fn put_prospect_filters(&self, filters: ProspectFilters) -> Result<ProspectFilters> {
        sqlx::query_as::<_, ProspectFiltersRow>(
            r#"
            INSERT INTO prospect_filters (
                tenant_id, source, industries, locations, titles, company_size_min,
                company_size_max, auto_enroll_sequence_id, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (tenant_id) DO UPDATE SET
                source = EXCLUDED.source,
                industries = EXCLUDED.industries,
                locations = EXCLUDED.locations,
                titles = EXCLUDED.titles,
                company_size_min = EXCLUDED.company_size_min,
                company_size_max = EXCLUDED.company_size_max,
                auto_enroll_sequence_id = EXCLUDED.auto_enroll_sequence_id,
                updated_at = NOW()
            RETURNING tenant_id, source, industries, locations, titles, company_size_min,
                      company_size_max, auto_enroll_sequence_id, updated_at
            "#,
        )
        .bind(filters.tenant_id)
        .bind(filters.source.to_string())
        .bind(Json(&filters.industries))
        .bind(Json(&filters.locations))
        .bind(Json(&filters.titles))
        .bind(filters.company_size_min)
        .bind(filters.company_size_max)
        .bind(filters.auto_enroll_sequence_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?
        .try_into()
    }

    async fn create_sync_run(&self, run: ProspectSyncRun) -> Result<ProspectSyncRun> {
        sqlx::query_as::<_, SyncRunRow>(
            r#"
            INSERT INTO prospect_sync_runs (id, tenant_id, source, status, filters, requested_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, tenant_id, source, status, filters, requested_at
            "#,
        )
        .bind(run.id)
        .bind(run.tenant_id)
        .bind(run.source.to_string())
        .bind(run.status.to_string())
        .bind(&run.filters)
        .bind(run.requested_at)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?
        .try_into()
    }

    async fn list_sync_runs(
        &self,
        tenant_id: TenantId,
        limit: i64,
    ) -> Result<Vec<ProspectSyncRun>> {
        sqlx::query_as::<_, SyncRunRow>(
            r#"
            SELECT id, tenant_id, source, status, filters, requested_at
            FROM prospect_sync_runs
            WHERE tenant_id = $1
            ORDER BY requested_at DESC
            LIMIT $2
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?
        .into_iter()
        .map(ProspectSyncRun::try_from)
        .collect()
    }

    async fn list_integrations(&self, tenant_id: TenantId) -> Result<Vec<IntegrationRecord>> {
        sqlx::query_as::<_, IntegrationRow>(
            r#"
            SELECT tenant_id, provider, fields, updated_at
            FROM integrations WHERE tenant_id = $1
            ORDER BY provider ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?
        .into_iter()
        .map(IntegrationRecord::try_from)
        .collect()
    }

    async fn get_integration(
        &self,
        tenant_id: TenantId,
        provider: IntegrationProvider,
    ) -> Result<Option<IntegrationRecord>> {
        sqlx::query_as::<_, IntegrationRow>(
            r#"
            SELECT tenant_id, provider, fields, updated_at
            FROM integrations WHERE tenant_id = $1 AND provider = $2
            "#,
        )
        .bind(tenant_id)
        .bind(provider.to_string())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(IntegrationRecord::try_from)
        .transpose()
    }

    async fn put_integration(&self, record: IntegrationRecord) -> Result<IntegrationRecord> {
        sqlx::query_as::<_, IntegrationRow>(
            r#"
            INSERT INTO integrations (tenant_id, provider, fields, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, provider) DO UPDATE SET
                fields = EXCLUDED.fields,
                updated_at = EXCLUDED.updated_at
            RETURNING tenant_id, provider, fields, updated_at
            "#,
        )
        .bind(record.tenant_id)
        .bind(record.provider.to_string())
        .bind(Json(&record.fields))
        .bind(record.updated_at)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?
        .try_into()
    }
}
