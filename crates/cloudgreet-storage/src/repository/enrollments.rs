//! Enrollment repository

use crate::db::{db_err, is_unique_violation, parse_column, DatabasePool};
use crate::models::{Enrollment, EnrollmentStatus, NewEnrollment};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudgreet_common::types::{EnrollmentId, SequenceId, TenantId};
use cloudgreet_common::{Error, Result};
use sqlx::FromRow;
use uuid::Uuid;

/// Enrollment repository trait
#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Enroll a contact; a second enrollment of the same contact in the same
    /// sequence is a `Conflict`
    async fn create(&self, input: NewEnrollment) -> Result<Enrollment>;

    /// Get an enrollment by ID
    async fn get(&self, id: EnrollmentId) -> Result<Option<Enrollment>>;

    /// List a sequence's enrollments in enrollment order
    async fn list_by_sequence(
        &self,
        tenant_id: TenantId,
        sequence_id: SequenceId,
    ) -> Result<Vec<Enrollment>>;

    /// Active enrollments due at `now` whose sequence is active
    async fn list_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Enrollment>>;

    /// Move the due time without touching the step cursor
    async fn reschedule(&self, id: EnrollmentId, next_due_at: DateTime<Utc>) -> Result<()>;

    /// Move the cursor to the next step
    async fn advance(
        &self,
        id: EnrollmentId,
        next_step_order: i32,
        next_due_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Set the status
    async fn set_status(&self, id: EnrollmentId, status: EnrollmentStatus) -> Result<()>;

    /// Active enrollments of a contact, optionally within one sequence
    async fn find_active_for_contact(
        &self,
        tenant_id: TenantId,
        contact_id: &str,
        sequence_id: Option<SequenceId>,
    ) -> Result<Vec<Enrollment>>;
}

#[derive(Debug, FromRow)]
struct EnrollmentRow {
    id: Uuid,
    tenant_id: Uuid,
    sequence_id: Uuid,
    contact_id: String,
    email: Option<String>,
    phone: Option<String>,
    first_name: Option<String>,
    company: Option<String>,
    status: String,
    next_step_order: i32,
    next_due_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EnrollmentRow> for Enrollment {
    type Error = Error;

    fn try_from(row: EnrollmentRow) -> Result<Self> {
        Ok(Enrollment {
            id: row.id,
            tenant_id: row.tenant_id,
            sequence_id: row.sequence_id,
            contact_id: row.contact_id,
            email: row.email,
            phone: row.phone,
            first_name: row.first_name,
            company: row.company,
            status: parse_column(&row.status)?,
            next_step_order: row.next_step_order,
            next_due_at: row.next_due_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const ENROLLMENT_COLUMNS: &str = "e.id, e.tenant_id, e.sequence_id, e.contact_id, e.email, \
     e.phone, e.first_name, e.company, e.status, e.next_step_order, e.next_due_at, \
     e.created_at, e.updated_at";

fn collect(rows: Vec<EnrollmentRow>) -> Result<Vec<Enrollment>> {
    rows.into_iter().map(Enrollment::try_from).collect()
}

/// Database enrollment repository
pub struct DbEnrollmentRepository {
    pool: DatabasePool,
}

impl DbEnrollmentRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnrollmentRepository for DbEnrollmentRepository {
    async fn create(&self, input: NewEnrollment) -> Result<Enrollment> {
        let result = sqlx::query_as::<_, EnrollmentRow>(&format!(
            r#"
            INSERT INTO outreach_enrollments AS e (
                id, tenant_id, sequence_id, contact_id, email, phone,
                first_name, company, status, next_step_order, next_due_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active', 1, $9)
            RETURNING {}
            "#,
            ENROLLMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.sequence_id)
        .bind(&input.contact_id)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.first_name)
        .bind(&input.company)
        .bind(input.next_due_at)
        .fetch_one(self.pool.pool())
        .await;

        match result {
            Ok(row) => row.try_into(),
            Err(e) if is_unique_violation(&e) => Err(Error::Conflict(format!(
                "Contact {} is already enrolled in this sequence",
                input.contact_id
            ))),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn get(&self, id: EnrollmentId) -> Result<Option<Enrollment>> {
        sqlx::query_as::<_, EnrollmentRow>(&format!(
            "SELECT {} FROM outreach_enrollments e WHERE e.id = $1",
            ENROLLMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(Enrollment::try_from)
        .transpose()
    }

    async fn list_by_sequence(
        &self,
        tenant_id: TenantId,
        sequence_id: SequenceId,
    ) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query_as::<_, EnrollmentRow>(&format!(
            r#"
            SELECT {} FROM outreach_enrollments e
            WHERE e.tenant_id = $1 AND e.sequence_id = $2
            ORDER BY e.created_at ASC
            "#,
            ENROLLMENT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(sequence_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?;

        collect(rows)
    }

    async fn list_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query_as::<_, EnrollmentRow>(&format!(
            r#"
            SELECT {} FROM outreach_enrollments e
            JOIN outreach_sequences s ON s.id = e.sequence_id
            WHERE e.status = 'active'
              AND s.status = 'active'
              AND e.next_due_at <= $1
            ORDER BY e.next_due_at ASC
            LIMIT $2
            "#,
            ENROLLMENT_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?;

        collect(rows)
    }

    async fn reschedule(&self, id: EnrollmentId, next_due_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE outreach_enrollments SET next_due_at = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(next_due_at)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn advance(
        &self,
        id: EnrollmentId,
        next_step_order: i32,
        next_due_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outreach_enrollments
            SET next_step_order = $2, next_due_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next_step_order)
        .bind(next_due_at)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn set_status(&self, id: EnrollmentId, status: EnrollmentStatus) -> Result<()> {
        sqlx::query("UPDATE outreach_enrollments SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(self.pool.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn find_active_for_contact(
        &self,
        tenant_id: TenantId,
        contact_id: &str,
        sequence_id: Option<SequenceId>,
    ) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query_as::<_, EnrollmentRow>(&format!(
            r#"
            SELECT {} FROM outreach_enrollments e
            WHERE e.tenant_id = $1
              AND e.contact_id = $2
              AND e.status = 'active'
              AND ($3::UUID IS NULL OR e.sequence_id = $3)
            ORDER BY e.created_at ASC
            "#,
            ENROLLMENT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(contact_id)
        .bind(sequence_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?;

        collect(rows)
    }
}
