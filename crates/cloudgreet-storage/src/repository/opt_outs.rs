//! Opt-out (suppression list) repository

use crate::db::{db_err, parse_column, DatabasePool};
use crate::models::{NewOptOut, OptOut};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudgreet_common::types::{Channel, TenantId};
use cloudgreet_common::{Error, Result};
use sqlx::FromRow;
use uuid::Uuid;

/// Opt-out repository trait
#[async_trait]
pub trait OptOutRepository: Send + Sync {
    /// Add an opt-out; re-adding an existing address refreshes source and reason
    async fn create(&self, input: NewOptOut) -> Result<OptOut>;

    /// Whether the address is suppressed on the channel
    async fn is_opted_out(&self, tenant_id: TenantId, channel: Channel, address: &str)
        -> Result<bool>;

    /// List the tenant's opt-outs, newest first
    async fn list(&self, tenant_id: TenantId, limit: i64, offset: i64) -> Result<Vec<OptOut>>;
}

#[derive(Debug, FromRow)]
struct OptOutRow {
    id: Uuid,
    tenant_id: Uuid,
    channel: String,
    address: String,
    source: String,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OptOutRow> for OptOut {
    type Error = Error;

    fn try_from(row: OptOutRow) -> Result<Self> {
        Ok(OptOut {
            id: row.id,
            tenant_id: row.tenant_id,
            channel: parse_column(&row.channel)?,
            address: row.address,
            source: parse_column(&row.source)?,
            reason: row.reason,
            created_at: row.created_at,
        })
    }
}

/// Database opt-out repository
pub struct DbOptOutRepository {
    pool: DatabasePool,
}

impl DbOptOutRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OptOutRepository for DbOptOutRepository {
    async fn create(&self, input: NewOptOut) -> Result<OptOut> {
        sqlx::query_as::<_, OptOutRow>(
            r#"
            INSERT INTO outreach_opt_outs (id, tenant_id, channel, address, source, reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, channel, address) DO UPDATE SET
                source = EXCLUDED.source,
                reason = COALESCE(EXCLUDED.reason, outreach_opt_outs.reason)
            RETURNING id, tenant_id, channel, address, source, reason, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.channel.to_string())
        .bind(&input.address)
        .bind(input.source.to_string())
        .bind(&input.reason)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?
        .try_into()
    }

    async fn is_opted_out(
        &self,
        tenant_id: TenantId,
        channel: Channel,
        address: &str,
    ) -> Result<bool> {
        let result: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM outreach_opt_outs
                WHERE tenant_id = $1 AND channel = $2 AND address = $3
            )
            "#,
        )
        .bind(tenant_id)
        .bind(channel.to_string())
        .bind(address)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.0)
    }

    async fn list(&self, tenant_id: TenantId, limit: i64, offset: i64) -> Result<Vec<OptOut>> {
        sqlx::query_as::<_, OptOutRow>(
            r#"
            SELECT id, tenant_id, channel, address, source, reason, created_at
            FROM outreach_opt_outs
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?
        .into_iter()
        .map(OptOut::try_from)
        .collect()
    }
}
