//! Outreach template repository

use crate::db::{db_err, parse_column, DatabasePool};
use crate::models::{CreateTemplate, Template};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudgreet_common::types::{Channel, TemplateId, TenantId};
use cloudgreet_common::{Error, Result};
use sqlx::FromRow;
use uuid::Uuid;

/// Template repository trait
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Persist a new template; a default template clears the tenant's other
    /// defaults of the same channel in the same transaction
    async fn create(&self, input: CreateTemplate) -> Result<Template>;

    /// Get a template of the tenant
    async fn get(&self, tenant_id: TenantId, id: TemplateId) -> Result<Option<Template>>;

    /// List templates ordered by creation time
    async fn list(
        &self,
        tenant_id: TenantId,
        channel: Option<Channel>,
        active: Option<bool>,
    ) -> Result<Vec<Template>>;

    /// Overwrite the writable fields of an existing template
    async fn update(&self, template: &Template) -> Result<Template>;
}

#[derive(Debug, FromRow)]
struct TemplateRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    channel: String,
    subject: Option<String>,
    body: String,
    compliance_footer: String,
    is_active: bool,
    is_default: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for Template {
    type Error = Error;

    fn try_from(row: TemplateRow) -> Result<Self> {
        Ok(Template {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            channel: parse_column(&row.channel)?,
            subject: row.subject,
            body: row.body,
            compliance_footer: row.compliance_footer,
            is_active: row.is_active,
            is_default: row.is_default,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const TEMPLATE_COLUMNS: &str = "id, tenant_id, name, channel, subject, body, compliance_footer, \
     is_active, is_default, created_at, updated_at";

/// Database template repository
pub struct DbTemplateRepository {
    pool: DatabasePool,
}

impl DbTemplateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateRepository for DbTemplateRepository {
    async fn create(&self, input: CreateTemplate) -> Result<Template> {
        let mut tx = self.pool.pool().begin().await.map_err(db_err)?;

        if input.is_default {
            sqlx::query(
                "UPDATE outreach_templates SET is_default = FALSE, updated_at = NOW() \
                 WHERE tenant_id = $1 AND channel = $2 AND is_default",
            )
            .bind(input.tenant_id)
            .bind(input.channel.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            r#"
            INSERT INTO outreach_templates (
                id, tenant_id, name, channel, subject, body, compliance_footer,
                is_active, is_default
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            TEMPLATE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(&input.name)
        .bind(input.channel.to_string())
        .bind(&input.subject)
        .bind(&input.body)
        .bind(&input.compliance_footer)
        .bind(input.is_active)
        .bind(input.is_default)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        row.try_into()
    }

    async fn get(&self, tenant_id: TenantId, id: TemplateId) -> Result<Option<Template>> {
        sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {} FROM outreach_templates WHERE id = $1 AND tenant_id = $2",
            TEMPLATE_COLUMNS
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(Template::try_from)
        .transpose()
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        channel: Option<Channel>,
        active: Option<bool>,
    ) -> Result<Vec<Template>> {
        sqlx::query_as::<_, TemplateRow>(&format!(
            r#"
            SELECT {} FROM outreach_templates
            WHERE tenant_id = $1
              AND ($2::TEXT IS NULL OR channel = $2)
              AND ($3::BOOLEAN IS NULL OR is_active = $3)
            ORDER BY created_at ASC
            "#,
            TEMPLATE_COLUMNS
        ))
        .bind(tenant_id)
        .bind(channel.map(|c| c.to_string()))
        .bind(active)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?
        .into_iter()
        .map(Template::try_from)
        .collect()
    }

    async fn update(&self, template: &Template) -> Result<Template> {
        let mut tx = self.pool.pool().begin().await.map_err(db_err)?;

        if template.is_default {
            sqlx::query(
                "UPDATE outreach_templates SET is_default = FALSE, updated_at = NOW() \
                 WHERE tenant_id = $1 AND channel = $2 AND is_default AND id <> $3",
            )
            .bind(template.tenant_id)
            .bind(template.channel.to_string())
            .bind(template.id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            r#"
            UPDATE outreach_templates SET
                name = $3, subject = $4, body = $5, compliance_footer = $6,
                is_active = $7, is_default = $8, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            RETURNING {}
            "#,
            TEMPLATE_COLUMNS
        ))
        .bind(template.id)
        .bind(template.tenant_id)
        .bind(&template.name)
        .bind(&template.subject)
        .bind(&template.body)
        .bind(&template.compliance_footer)
        .bind(template.is_active)
        .bind(template.is_default)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or_else(|| Error::not_found("Template"))?;

        tx.commit().await.map_err(db_err)?;
        row.try_into()
    }
}
