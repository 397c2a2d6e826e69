//! Sequence Manager - Handles sequence lifecycle and enrollment

use super::drafts::{SequenceDraft, SequencePatch};
use super::validation::{normalize_steps, validate_sequence};
use chrono::{DateTime, Duration, Utc};
use cloudgreet_common::types::{SequenceId, SequenceStatus, TemplateId, TenantId};
use cloudgreet_common::{Error, Result};
use cloudgreet_storage::models::{
    Enrollment, NewEnrollment, NewSequence, Sequence, SequenceChanges, StatusChange, StepInput,
    Template,
};
use cloudgreet_storage::Store;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Contact to enroll in a sequence
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollContact {
    #[serde(default)]
    pub contact_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub company: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Sequence Manager - Manages sequence lifecycle
#[derive(Clone)]
pub struct SequenceManager {
    store: Store,
}

impl SequenceManager {
    /// Create a new sequence manager
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Load the tenant templates referenced by the steps
    async fn referenced_templates(
        &self,
        tenant_id: TenantId,
        steps: &[StepInput],
    ) -> Result<HashMap<TemplateId, Template>> {
        let mut templates = HashMap::new();
        for template_id in steps.iter().filter_map(|s| s.template_id) {
            if templates.contains_key(&template_id) {
                continue;
            }
            if let Some(template) = self.store.templates.get(tenant_id, template_id).await? {
                templates.insert(template_id, template);
            }
        }
        Ok(templates)
    }

    /// Normalize and validate a draft
    async fn prepare(&self, tenant_id: TenantId, mut draft: SequenceDraft) -> Result<SequenceDraft> {
        draft.name = draft.name.trim().to_string();
        draft.description = non_blank(draft.description);
        draft.steps = normalize_steps(draft.steps);

        let templates = self.referenced_templates(tenant_id, &draft.steps).await?;
        validate_sequence(&draft, &templates)?;
        Ok(draft)
    }

    /// Create a sequence in `draft`
    pub async fn create(&self, tenant_id: TenantId, draft: SequenceDraft) -> Result<Sequence> {
        let draft = self.prepare(tenant_id, draft).await?;

        let sequence = self
            .store
            .sequences
            .create(NewSequence {
                tenant_id,
                name: draft.name,
                description: draft.description,
                throttle_per_day: draft.throttle_per_day,
                send_window_start: draft.send_window_start,
                send_window_end: draft.send_window_end,
                timezone: draft.timezone,
                auto_pause_on_reply: draft.auto_pause_on_reply,
                steps: draft.steps,
            })
            .await?;

        info!(
            tenant_id = %tenant_id,
            sequence_id = %sequence.id,
            steps = sequence.steps.len(),
            "Sequence created"
        );

        Ok(sequence)
    }

    /// Fetch a sequence of the tenant
    pub async fn get(&self, tenant_id: TenantId, id: SequenceId) -> Result<Sequence> {
        self.store
            .sequences
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| Error::not_found("Sequence"))
    }

    /// List the tenant's sequences
    pub async fn list(&self, tenant_id: TenantId) -> Result<Vec<Sequence>> {
        self.store.sequences.list(tenant_id).await
    }

    /// Apply a partial update, then the status change it carries
    pub async fn update(
        &self,
        tenant_id: TenantId,
        id: SequenceId,
        patch: SequencePatch,
    ) -> Result<Sequence> {
        let sequence = self.get(tenant_id, id).await?;

        if let Some(status) = patch.status {
            if !sequence.status.can_transition_to(status) {
                return Err(Error::InvalidTransition {
                    from: sequence.status.to_string(),
                    to: status.to_string(),
                });
            }
        }

        if !patch.has_field_changes() {
            return match patch.status {
                Some(status) => self.set_status(tenant_id, id, status).await,
                None => Ok(sequence),
            };
        }

        let draft = patch.apply(SequenceDraft::from_sequence(&sequence));
        let draft = self.prepare(tenant_id, draft).await?;
        let status_change = patch.status.map(|to| StatusChange {
            from: sequence.status,
            to,
        });

        let updated = self
            .store
            .sequences
            .update(
                tenant_id,
                id,
                SequenceChanges {
                    name: draft.name,
                    description: draft.description,
                    throttle_per_day: draft.throttle_per_day,
                    send_window_start: draft.send_window_start,
                    send_window_end: draft.send_window_end,
                    timezone: draft.timezone,
                    auto_pause_on_reply: draft.auto_pause_on_reply,
                    steps: draft.steps,
                    status: status_change,
                },
            )
            .await?;

        match (updated, status_change) {
            (Some(updated), change) => {
                debug!(sequence_id = %id, "Sequence fields updated");
                if let Some(change) = change {
                    info!(
                        sequence_id = %id,
                        from = %change.from,
                        to = %change.to,
                        "Sequence status changed"
                    );
                }
                Ok(updated)
            }
            // Status moved underneath us; nothing was written
            (None, Some(change)) => {
                let latest = self.get(tenant_id, id).await?;
                Err(Error::InvalidTransition {
                    from: latest.status.to_string(),
                    to: change.to.to_string(),
                })
            }
            (None, None) => Err(Error::not_found("Sequence")),
        }
    }

    /// Move a sequence to `status` if the lifecycle allows it
    pub async fn set_status(
        &self,
        tenant_id: TenantId,
        id: SequenceId,
        status: SequenceStatus,
    ) -> Result<Sequence> {
        let current = self.get(tenant_id, id).await?;
        if !current.status.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }

        match self
            .store
            .sequences
            .transition(tenant_id, id, current.status, status)
            .await?
        {
            Some(sequence) => {
                info!(
                    sequence_id = %id,
                    from = %current.status,
                    to = %status,
                    "Sequence status changed"
                );
                Ok(sequence)
            }
            None => {
                // Lost a race with another writer; report what is stored now
                let latest = self.get(tenant_id, id).await?;
                Err(Error::InvalidTransition {
                    from: latest.status.to_string(),
                    to: status.to_string(),
                })
            }
        }
    }

    /// Delete a sequence, cancelling its pending sends and open enrollments
    pub async fn delete(&self, tenant_id: TenantId, id: SequenceId) -> Result<()> {
        let outcome = self
            .store
            .sequences
            .delete(tenant_id, id)
            .await?
            .ok_or_else(|| Error::not_found("Sequence"))?;

        info!(
            sequence_id = %id,
            cancelled_sends = outcome.cancelled_sends,
            cancelled_enrollments = outcome.cancelled_enrollments,
            "Sequence deleted"
        );
        Ok(())
    }

    /// Enroll a contact; the first step is due after its wait
    pub async fn enroll(
        &self,
        tenant_id: TenantId,
        sequence_id: SequenceId,
        contact: EnrollContact,
        now: DateTime<Utc>,
    ) -> Result<Enrollment> {
        let sequence = self.get(tenant_id, sequence_id).await?;

        let contact_id = contact.contact_id.trim().to_string();
        if contact_id.is_empty() {
            return Err(Error::validation("Contact id is required"));
        }
        let email = non_blank(contact.email);
        let phone = non_blank(contact.phone);
        if email.is_none() && phone.is_none() {
            return Err(Error::validation(
                "Contact requires an email address or phone number",
            ));
        }

        let first_wait = sequence
            .step(1)
            .map(|s| i64::from(s.wait_minutes))
            .unwrap_or(0);

        let enrollment = self
            .store
            .enrollments
            .create(NewEnrollment {
                tenant_id,
                sequence_id,
                contact_id,
                email,
                phone,
                first_name: non_blank(contact.first_name),
                company: non_blank(contact.company),
                next_due_at: now + Duration::minutes(first_wait),
            })
            .await?;

        info!(
            sequence_id = %sequence_id,
            enrollment_id = %enrollment.id,
            "Contact enrolled"
        );

        Ok(enrollment)
    }

    /// Enrollments of a sequence
    pub async fn list_enrollments(
        &self,
        tenant_id: TenantId,
        sequence_id: SequenceId,
    ) -> Result<Vec<Enrollment>> {
        self.get(tenant_id, sequence_id).await?;
        self.store
            .enrollments
            .list_by_sequence(tenant_id, sequence_id)
            .await
    }
}
