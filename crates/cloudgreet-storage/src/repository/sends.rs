//! Scheduled send repository

use crate::db::{db_err, parse_column, DatabasePool};
use crate::models::{ChannelCounts, NewSend, ScheduledSend};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudgreet_common::types::{Channel, ContactId, SendId, SequenceId, TenantId};
use cloudgreet_common::{Error, Result};
use sqlx::FromRow;
use uuid::Uuid;

/// Idempotency key of one step for one contact
pub fn idempotency_key(sequence_id: SequenceId, contact_id: &str, step_order: i32) -> String {
    format!("{}:{}:{}", sequence_id, contact_id, step_order)
}

/// Send repository trait
#[async_trait]
pub trait SendRepository: Send + Sync {
    /// Insert a `processing` send. Returns `None` when the step was already
    /// claimed for this contact.
    async fn claim(&self, input: NewSend) -> Result<Option<ScheduledSend>>;

    /// Claim the step directly as `failed` without a dispatch attempt.
    /// Returns `None` when the step was already claimed for this contact.
    async fn claim_unsent(&self, input: NewSend, error: &str) -> Result<Option<ScheduledSend>>;

    /// Get a send of the tenant
    async fn get(&self, tenant_id: TenantId, id: SendId) -> Result<Option<ScheduledSend>>;

    /// Record a successful dispatch
    async fn mark_sent(
        &self,
        id: SendId,
        provider_id: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Record a failed dispatch
    async fn mark_failed(&self, id: SendId, error: &str) -> Result<()>;

    /// Apply a delivery receipt to a dispatched send
    async fn mark_delivery(
        &self,
        tenant_id: TenantId,
        id: SendId,
        delivered: bool,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<ScheduledSend>>;

    /// Stamp a reply on the contact's most recent dispatched send of the
    /// sequence
    async fn mark_replied(
        &self,
        tenant_id: TenantId,
        sequence_id: SequenceId,
        contact_id: &ContactId,
        at: DateTime<Utc>,
    ) -> Result<Option<ScheduledSend>>;

    /// Dispatch attempts of a sequence initiated at or after `since`.
    /// Cancelled sends and steps that failed before dispatch are excluded.
    async fn count_initiated_since(
        &self,
        sequence_id: SequenceId,
        since: DateTime<Utc>,
    ) -> Result<i64>;

    /// Earliest `initiated_at` among the sends `count_initiated_since` counts
    async fn oldest_initiated_since(
        &self,
        sequence_id: SequenceId,
        since: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Per-channel counters of sends dispatched at or after `since`.
    /// Channels without sends are omitted.
    async fn channel_counts(
        &self,
        tenant_id: TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChannelCounts>>;
}

#[derive(Debug, FromRow)]
struct SendRow {
    id: Uuid,
    tenant_id: Uuid,
    sequence_id: Option<Uuid>,
    enrollment_id: Option<Uuid>,
    contact_id: String,
    step_order: i32,
    channel: String,
    recipient: String,
    subject: Option<String>,
    body: String,
    status: String,
    error: Option<String>,
    provider_id: Option<String>,
    initiated_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    replied_at: Option<DateTime<Utc>>,
    dispatch_attempted: bool,
}

impl TryFrom<SendRow> for ScheduledSend {
    type Error = Error;

    fn try_from(row: SendRow) -> Result<Self> {
        Ok(ScheduledSend {
            id: row.id,
            tenant_id: row.tenant_id,
            sequence_id: row.sequence_id,
            enrollment_id: row.enrollment_id,
            contact_id: row.contact_id,
            step_order: row.step_order,
            channel: parse_column(&row.channel)?,
            recipient: row.recipient,
            subject: row.subject,
            body: row.body,
            status: parse_column(&row.status)?,
            error: row.error,
            provider_id: row.provider_id,
            initiated_at: row.initiated_at,
            sent_at: row.sent_at,
            delivered_at: row.delivered_at,
            replied_at: row.replied_at,
            dispatch_attempted: row.dispatch_attempted,
        })
    }
}

#[derive(Debug, FromRow)]
struct ChannelCountsRow {
    channel: String,
    total_sent: i64,
    delivered: i64,
    replies: i64,
    failed: i64,
}

const SEND_COLUMNS: &str = "id, tenant_id, sequence_id, enrollment_id, contact_id, step_order, \
     channel, recipient, subject, body, status, error, provider_id, initiated_at, sent_at, \
     delivered_at, replied_at, dispatch_attempted";

/// Database send repository
pub struct DbSendRepository {
    pool: DatabasePool,
}

impl DbSendRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SendRepository for DbSendRepository {
    async fn claim(&self, input: NewSend) -> Result<Option<ScheduledSend>> {
        let key = idempotency_key(input.sequence_id, &input.contact_id, input.step_order);

        sqlx::query_as::<_, SendRow>(&format!(
            r#"
            INSERT INTO outreach_sends (
                id, tenant_id, sequence_id, enrollment_id, contact_id, step_order,
                channel, recipient, subject, body, status, initiated_at, idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'processing', $11, $12)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING {}
            "#,
            SEND_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.sequence_id)
        .bind(input.enrollment_id)
        .bind(&input.contact_id)
        .bind(input.step_order)
        .bind(input.channel.to_string())
        .bind(&input.recipient)
        .bind(&input.subject)
        .bind(&input.body)
        .bind(input.initiated_at)
        .bind(&key)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(ScheduledSend::try_from)
        .transpose()
    }

    async fn claim_unsent(&self, input: NewSend, error: &str) -> Result<Option<ScheduledSend>> {
        let key = idempotency_key(input.sequence_id, &input.contact_id, input.step_order);

        sqlx::query_as::<_, SendRow>(&format!(
            r#"
            INSERT INTO outreach_sends (
                id, tenant_id, sequence_id, enrollment_id, contact_id, step_order,
                channel, recipient, subject, body, status, error, initiated_at,
                dispatch_attempted, idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'failed', $11, $12, FALSE, $13)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING {}
            "#,
            SEND_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.sequence_id)
        .bind(input.enrollment_id)
        .bind(&input.contact_id)
        .bind(input.step_order)
        .bind(input.channel.to_string())
        .bind(&input.recipient)
        .bind(&input.subject)
        .bind(&input.body)
        .bind(error)
        .bind(input.initiated_at)
        .bind(&key)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(ScheduledSend::try_from)
        .transpose()
    }

    async fn get(&self, tenant_id: TenantId, id: SendId) -> Result<Option<ScheduledSend>> {
        sqlx::query_as::<_, SendRow>(&format!(
            "SELECT {} FROM outreach_sends WHERE id = $1 AND tenant_id = $2",
            SEND_COLUMNS
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(ScheduledSend::try_from)
        .transpose()
    }

    async fn mark_sent(
        &self,
        id: SendId,
        provider_id: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outreach_sends SET status = 'sent', provider_id = $2, sent_at = $3
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(provider_id)
        .bind(at)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn mark_failed(&self, id: SendId, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE outreach_sends SET status = 'failed', error = $2 \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(error)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn mark_delivery(
        &self,
        tenant_id: TenantId,
        id: SendId,
        delivered: bool,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<ScheduledSend>> {
        let row = if delivered {
            sqlx::query_as::<_, SendRow>(&format!(
                r#"
                UPDATE outreach_sends SET status = 'delivered', delivered_at = $3
                WHERE id = $1 AND tenant_id = $2 AND status IN ('sent', 'delivered')
                RETURNING {}
                "#,
                SEND_COLUMNS
            ))
            .bind(id)
            .bind(tenant_id)
            .bind(at)
            .fetch_optional(self.pool.pool())
            .await
        } else {
            sqlx::query_as::<_, SendRow>(&format!(
                r#"
                UPDATE outreach_sends SET status = 'failed', error = COALESCE($3, error)
                WHERE id = $1 AND tenant_id = $2 AND status IN ('sent', 'failed')
                RETURNING {}
                "#,
                SEND_COLUMNS
            ))
            .bind(id)
            .bind(tenant_id)
            .bind(error)
            .fetch_optional(self.pool.pool())
            .await
        };

        row.map_err(db_err)?.map(ScheduledSend::try_from).transpose()
    }

    async fn mark_replied(
        &self,
        tenant_id: TenantId,
        sequence_id: SequenceId,
        contact_id: &ContactId,
        at: DateTime<Utc>,
    ) -> Result<Option<ScheduledSend>> {
        sqlx::query_as::<_, SendRow>(&format!(
            r#"
            UPDATE outreach_sends SET replied_at = $4
            WHERE id = (
                SELECT id FROM outreach_sends
                WHERE tenant_id = $1 AND sequence_id = $2 AND contact_id = $3
                  AND status IN ('sent', 'delivered')
                ORDER BY initiated_at DESC
                LIMIT 1
            )
            AND replied_at IS NULL
            RETURNING {}
            "#,
            SEND_COLUMNS
        ))
        .bind(tenant_id)
        .bind(sequence_id)
        .bind(contact_id)
        .bind(at)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(ScheduledSend::try_from)
        .transpose()
    }

    async fn count_initiated_since(
        &self,
        sequence_id: SequenceId,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM outreach_sends
            WHERE sequence_id = $1 AND initiated_at >= $2
              AND dispatch_attempted AND status <> 'cancelled'
            "#,
        )
        .bind(sequence_id)
        .bind(since)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(count.0)
    }

    async fn oldest_initiated_since(
        &self,
        sequence_id: SequenceId,
        since: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let oldest: (Option<DateTime<Utc>>,) = sqlx::query_as(
            r#"
            SELECT MIN(initiated_at) FROM outreach_sends
            WHERE sequence_id = $1 AND initiated_at >= $2
              AND dispatch_attempted AND status <> 'cancelled'
            "#,
        )
        .bind(sequence_id)
        .bind(since)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(oldest.0)
    }

    async fn channel_counts(
        &self,
        tenant_id: TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChannelCounts>> {
        let rows = sqlx::query_as::<_, ChannelCountsRow>(
            r#"
            SELECT channel,
                   COUNT(*) AS total_sent,
                   COUNT(*) FILTER (WHERE status = 'delivered') AS delivered,
                   COUNT(*) FILTER (WHERE replied_at IS NOT NULL) AS replies,
                   COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM outreach_sends
            WHERE tenant_id = $1
              AND initiated_at >= $2
              AND status IN ('sent', 'delivered', 'failed')
            GROUP BY channel
            "#,
        )
        .bind(tenant_id)
        .bind(since)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(ChannelCounts {
                    channel: parse_column::<Channel>(&row.channel)?,
                    total_sent: row.total_sent,
                    delivered: row.delivered,
                    replies: row.replies,
                    failed: row.failed,
                })
            })
            .collect()
    }
}
