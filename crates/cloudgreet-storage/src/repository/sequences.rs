//! Outreach sequence repository

use crate::db::{db_err, parse_column, DatabasePool};
use crate::models::{
    DeleteOutcome, NewSequence, Sequence, SequenceChanges, SequenceMetrics, SequenceStep,
    StepInput,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudgreet_common::types::{SequenceId, SequenceStatus, TenantId};
use cloudgreet_common::{Error, Result};
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

/// Sequence repository trait
#[async_trait]
pub trait SequenceRepository: Send + Sync {
    /// Persist a new draft sequence and its steps in one transaction
    async fn create(&self, input: NewSequence) -> Result<Sequence>;

    /// Get a sequence of the tenant, with steps and metrics
    async fn get(&self, tenant_id: TenantId, id: SequenceId) -> Result<Option<Sequence>>;

    /// Get a sequence regardless of tenant (worker use)
    async fn get_any(&self, id: SequenceId) -> Result<Option<Sequence>>;

    /// List the tenant's sequences, newest first
    async fn list(&self, tenant_id: TenantId) -> Result<Vec<Sequence>>;

    /// Overwrite writable fields and replace the step list, applying
    /// `changes.status` in the same write. Returns `None` when the sequence
    /// is missing or its status no longer equals the expected one.
    async fn update(
        &self,
        tenant_id: TenantId,
        id: SequenceId,
        changes: SequenceChanges,
    ) -> Result<Option<Sequence>>;

    /// Move `from -> to` only if the stored status still equals `from`.
    /// Returns `None` when the sequence is missing or its status changed.
    async fn transition(
        &self,
        tenant_id: TenantId,
        id: SequenceId,
        from: SequenceStatus,
        to: SequenceStatus,
    ) -> Result<Option<Sequence>>;

    /// Cancel pending sends and open enrollments, then remove the sequence.
    /// Returns `None` when the sequence does not exist.
    async fn delete(&self, tenant_id: TenantId, id: SequenceId) -> Result<Option<DeleteOutcome>>;
}

#[derive(Debug, FromRow)]
struct SequenceRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    description: Option<String>,
    throttle_per_day: i32,
    send_window_start: String,
    send_window_end: String,
    timezone: String,
    status: String,
    auto_pause_on_reply: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct StepRow {
    id: Uuid,
    sequence_id: Uuid,
    step_order: i32,
    channel: String,
    wait_minutes: i32,
    template_id: Option<Uuid>,
}

#[derive(Debug, FromRow)]
struct MetricsRow {
    sequence_id: Uuid,
    sent: i64,
    delivered: i64,
    replied: i64,
    failed: i64,
}

const SEQUENCE_COLUMNS: &str = "id, tenant_id, name, description, throttle_per_day, \
     send_window_start, send_window_end, timezone, status, auto_pause_on_reply, \
     created_at, updated_at";

impl SequenceRow {
    fn into_sequence(
        self,
        steps: Vec<SequenceStep>,
        metrics: SequenceMetrics,
    ) -> Result<Sequence> {
        Ok(Sequence {
            id: self.id,
            tenant_id: self.tenant_id,
            name: self.name,
            description: self.description,
            throttle_per_day: self.throttle_per_day,
            send_window_start: self.send_window_start,
            send_window_end: self.send_window_end,
            timezone: self.timezone,
            status: parse_column(&self.status)?,
            auto_pause_on_reply: self.auto_pause_on_reply,
            steps,
            metrics,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Database sequence repository
pub struct DbSequenceRepository {
    pool: DatabasePool,
}

impl DbSequenceRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn insert_steps(
        tx: &mut Transaction<'_, Postgres>,
        sequence_id: SequenceId,
        steps: &[StepInput],
    ) -> Result<()> {
        for step in steps {
            sqlx::query(
                r#"
                INSERT INTO outreach_sequence_steps (
                    id, sequence_id, step_order, channel, wait_minutes, template_id
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(sequence_id)
            .bind(step.step_order)
            .bind(step.channel.to_string())
            .bind(step.wait_minutes)
            .bind(step.template_id)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        }
        Ok(())
    }

    /// Attach steps and metrics to a batch of sequence rows
    async fn hydrate(&self, rows: Vec<SequenceRow>) -> Result<Vec<Sequence>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let step_rows = sqlx::query_as::<_, StepRow>(
            r#"
            SELECT id, sequence_id, step_order, channel, wait_minutes, template_id
            FROM outreach_sequence_steps
            WHERE sequence_id = ANY($1)
            ORDER BY sequence_id, step_order ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?;

        let metric_rows = sqlx::query_as::<_, MetricsRow>(
            r#"
            SELECT sequence_id,
                   COUNT(*) FILTER (WHERE status IN ('sent', 'delivered')) AS sent,
                   COUNT(*) FILTER (WHERE status = 'delivered') AS delivered,
                   COUNT(*) FILTER (WHERE replied_at IS NOT NULL) AS replied,
                   COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM outreach_sends
            WHERE sequence_id = ANY($1)
            GROUP BY sequence_id
            "#,
        )
        .bind(&ids)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?;

        let mut steps: HashMap<Uuid, Vec<SequenceStep>> = HashMap::new();
        for row in step_rows {
            steps.entry(row.sequence_id).or_default().push(SequenceStep {
                id: row.id,
                step_order: row.step_order,
                channel: parse_column(&row.channel)?,
                wait_minutes: row.wait_minutes,
                template_id: row.template_id,
            });
        }

        let metrics: HashMap<Uuid, SequenceMetrics> = metric_rows
            .into_iter()
            .map(|m| {
                (
                    m.sequence_id,
                    SequenceMetrics {
                        sent: m.sent,
                        delivered: m.delivered,
                        replied: m.replied,
                        failed: m.failed,
                    },
                )
            })
            .collect();

        rows.into_iter()
            .map(|row| {
                let id = row.id;
                row.into_sequence(
                    steps.remove(&id).unwrap_or_default(),
                    metrics.get(&id).copied().unwrap_or_default(),
                )
            })
            .collect()
    }

    async fn hydrate_one(&self, row: Option<SequenceRow>) -> Result<Option<Sequence>> {
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.into_iter().next()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SequenceRepository for DbSequenceRepository {
    async fn create(&self, input: NewSequence) -> Result<Sequence> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.pool().begin().await.map_err(db_err)?;

        let row = sqlx::query_as::<_, SequenceRow>(&format!(
            r#"
            INSERT INTO outreach_sequences (
                id, tenant_id, name, description, throttle_per_day,
                send_window_start, send_window_end, timezone, status, auto_pause_on_reply
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'draft', $9)
            RETURNING {}
            "#,
            SEQUENCE_COLUMNS
        ))
        .bind(id)
        .bind(input.tenant_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.throttle_per_day)
        .bind(&input.send_window_start)
        .bind(&input.send_window_end)
        .bind(&input.timezone)
        .bind(input.auto_pause_on_reply)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        Self::insert_steps(&mut tx, id, &input.steps).await?;
        tx.commit().await.map_err(db_err)?;

        self.hydrate_one(Some(row))
            .await?
            .ok_or_else(|| Error::Internal("Created sequence vanished".to_string()))
    }

    async fn get(&self, tenant_id: TenantId, id: SequenceId) -> Result<Option<Sequence>> {
        let row = sqlx::query_as::<_, SequenceRow>(&format!(
            "SELECT {} FROM outreach_sequences WHERE id = $1 AND tenant_id = $2",
            SEQUENCE_COLUMNS
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?;

        self.hydrate_one(row).await
    }

    async fn get_any(&self, id: SequenceId) -> Result<Option<Sequence>> {
        let row = sqlx::query_as::<_, SequenceRow>(&format!(
            "SELECT {} FROM outreach_sequences WHERE id = $1",
            SEQUENCE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?;

        self.hydrate_one(row).await
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<Sequence>> {
        let rows = sqlx::query_as::<_, SequenceRow>(&format!(
            "SELECT {} FROM outreach_sequences WHERE tenant_id = $1 ORDER BY created_at DESC",
            SEQUENCE_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?;

        self.hydrate(rows).await
    }

    async fn update(
        &self,
        tenant_id: TenantId,
        id: SequenceId,
        changes: SequenceChanges,
    ) -> Result<Option<Sequence>> {
        let mut tx = self.pool.pool().begin().await.map_err(db_err)?;

        let row = sqlx::query_as::<_, SequenceRow>(&format!(
            r#"
            UPDATE outreach_sequences SET
                name = $3, description = $4, throttle_per_day = $5,
                send_window_start = $6, send_window_end = $7, timezone = $8,
                auto_pause_on_reply = $9, status = COALESCE($11, status), updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND ($10::TEXT IS NULL OR status = $10)
            RETURNING {}
            "#,
            SEQUENCE_COLUMNS
        ))
        .bind(id)
        .bind(tenant_id)
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(changes.throttle_per_day)
        .bind(&changes.send_window_start)
        .bind(&changes.send_window_end)
        .bind(&changes.timezone)
        .bind(changes.auto_pause_on_reply)
        .bind(changes.status.map(|s| s.from.to_string()))
        .bind(changes.status.map(|s| s.to.to_string()))
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM outreach_sequence_steps WHERE sequence_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        Self::insert_steps(&mut tx, id, &changes.steps).await?;

        tx.commit().await.map_err(db_err)?;

        self.hydrate_one(Some(row)).await
    }

    async fn transition(
        &self,
        tenant_id: TenantId,
        id: SequenceId,
        from: SequenceStatus,
        to: SequenceStatus,
    ) -> Result<Option<Sequence>> {
        let row = sqlx::query_as::<_, SequenceRow>(&format!(
            r#"
            UPDATE outreach_sequences SET status = $4, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND status = $3
            RETURNING {}
            "#,
            SEQUENCE_COLUMNS
        ))
        .bind(id)
        .bind(tenant_id)
        .bind(from.to_string())
        .bind(to.to_string())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?;

        self.hydrate_one(row).await
    }

    async fn delete(&self, tenant_id: TenantId, id: SequenceId) -> Result<Option<DeleteOutcome>> {
        let mut tx = self.pool.pool().begin().await.map_err(db_err)?;

        let exists: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM outreach_sequences WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        if exists.is_none() {
            return Ok(None);
        }

        let sends = sqlx::query(
            "UPDATE outreach_sends SET status = 'cancelled' \
             WHERE sequence_id = $1 AND status = 'processing'",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let enrollments = sqlx::query(
            "UPDATE outreach_enrollments SET status = 'cancelled', updated_at = NOW() \
             WHERE sequence_id = $1 AND status IN ('active', 'paused')",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("DELETE FROM outreach_sequences WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(Some(DeleteOutcome {
            cancelled_sends: sends.rows_affected(),
            cancelled_enrollments: enrollments.rows_affected(),
        }))
    }
}
