//! Engagement - inbound replies, opt-outs and delivery receipts

use chrono::{DateTime, Utc};
use cloudgreet_common::types::{Channel, ContactId, EnrollmentId, SendId, SequenceId, TenantId};
use cloudgreet_common::{Error, Result};
use cloudgreet_storage::models::{
    EnrollmentStatus, NewOptOut, OptOut, OptOutSource, ScheduledSend,
};
use cloudgreet_storage::Store;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Default page size for opt-out listings
pub const DEFAULT_OPT_OUT_LIMIT: i64 = 100;
const MAX_OPT_OUT_LIMIT: i64 = 500;

/// Canonical form of an address on a channel, or `None` if unusable
///
/// Emails are trimmed and lowercased. Phone numbers lose spaces, dashes,
/// dots and parentheses; calls and sms share the phone form.
pub fn normalize_address(channel: Channel, raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    match channel {
        Channel::Email => {
            let email = trimmed.to_lowercase();
            let (local, domain) = email.split_once('@')?;
            if local.is_empty() || domain.is_empty() {
                return None;
            }
            Some(email)
        }
        Channel::Sms | Channel::Call => {
            let phone: String = trimmed
                .chars()
                .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
                .collect();
            if !phone.chars().any(|c| c.is_ascii_digit()) {
                return None;
            }
            Some(phone)
        }
    }
}

/// Inbound reply from a contact
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyInput {
    #[serde(default)]
    pub contact_id: ContactId,
    /// Restrict to one sequence; all of the contact's sequences otherwise
    pub sequence_id: Option<SequenceId>,
    /// Channel the reply arrived on; required with `optOut`
    pub channel: Option<Channel>,
    /// Address to suppress; taken from the enrollment when absent
    pub address: Option<String>,
    #[serde(default)]
    pub opt_out: bool,
    pub received_at: Option<DateTime<Utc>>,
}

/// Effect of a recorded reply
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyOutcome {
    pub paused_enrollments: Vec<EnrollmentId>,
    /// Enrollments ended because their sequence uses the opted-out channel
    pub stopped_enrollments: Vec<EnrollmentId>,
    pub replied_sends: Vec<SendId>,
    pub opted_out: bool,
}

/// Manual opt-out
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptOutInput {
    pub channel: Channel,
    #[serde(default)]
    pub address: String,
    pub reason: Option<String>,
}

/// Provider delivery outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

/// Delivery receipt payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceiptInput {
    pub status: DeliveryStatus,
    pub error: Option<String>,
}

/// Reply, opt-out and receipt handling
#[derive(Clone)]
pub struct EngagementService {
    store: Store,
}

impl EngagementService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Record a reply: stamp the contact's latest send, auto-pause the
    /// enrollment where configured and optionally suppress the address
    pub async fn record_reply(
        &self,
        tenant_id: TenantId,
        input: ReplyInput,
        now: DateTime<Utc>,
    ) -> Result<ReplyOutcome> {
        let contact_id = input.contact_id.trim().to_string();
        if contact_id.is_empty() {
            return Err(Error::validation("Contact id is required"));
        }
        if input.opt_out && input.channel.is_none() {
            return Err(Error::validation("Channel is required to opt out"));
        }
        if let Some(sequence_id) = input.sequence_id {
            if self.store.sequences.get(tenant_id, sequence_id).await?.is_none() {
                return Err(Error::not_found("Sequence"));
            }
        }

        let received_at = input.received_at.unwrap_or(now);
        let enrollments = self
            .store
            .enrollments
            .find_active_for_contact(tenant_id, &contact_id, input.sequence_id)
            .await?;

        let mut outcome = ReplyOutcome::default();

        let mut sequence_ids: Vec<SequenceId> = enrollments.iter().map(|e| e.sequence_id).collect();
        if let Some(sequence_id) = input.sequence_id {
            sequence_ids.push(sequence_id);
        }
        sequence_ids.sort();
        sequence_ids.dedup();

        for sequence_id in sequence_ids {
            if let Some(send) = self
                .store
                .sends
                .mark_replied(tenant_id, sequence_id, &contact_id, received_at)
                .await?
            {
                outcome.replied_sends.push(send.id);
            }
        }

        let mut opted_out_channel = None;
        if input.opt_out {
            let channel = input.channel.ok_or_else(|| {
                Error::validation("Channel is required to opt out")
            })?;
            let address = input
                .address
                .clone()
                .or_else(|| {
                    enrollments
                        .iter()
                        .find_map(|e| e.address_for(channel).map(str::to_string))
                })
                .ok_or_else(|| Error::validation("An address is required to opt out"))?;

            self.add_opt_out_with_source(
                tenant_id,
                OptOutInput {
                    channel,
                    address,
                    reason: Some("Replied with opt-out".to_string()),
                },
                OptOutSource::Reply,
            )
            .await?;

            outcome.opted_out = true;
            opted_out_channel = Some(channel);
        }

        for enrollment in &enrollments {
            let Some(sequence) = self
                .store
                .sequences
                .get(tenant_id, enrollment.sequence_id)
                .await?
            else {
                continue;
            };
            let reaches_opted_out = opted_out_channel
                .is_some_and(|channel| sequence.steps.iter().any(|s| s.channel == channel));
            if reaches_opted_out {
                self.store
                    .enrollments
                    .set_status(enrollment.id, EnrollmentStatus::OptedOut)
                    .await?;
                outcome.stopped_enrollments.push(enrollment.id);
            } else if sequence.auto_pause_on_reply {
                self.store
                    .enrollments
                    .set_status(enrollment.id, EnrollmentStatus::Paused)
                    .await?;
                outcome.paused_enrollments.push(enrollment.id);
            }
        }

        info!(
            tenant_id = %tenant_id,
            contact_id = %contact_id,
            paused = outcome.paused_enrollments.len(),
            opted_out = outcome.opted_out,
            "Reply recorded"
        );

        Ok(outcome)
    }

    /// Add a manual opt-out
    pub async fn add_opt_out(&self, tenant_id: TenantId, input: OptOutInput) -> Result<OptOut> {
        self.add_opt_out_with_source(tenant_id, input, OptOutSource::Manual)
            .await
    }

    async fn add_opt_out_with_source(
        &self,
        tenant_id: TenantId,
        input: OptOutInput,
        source: OptOutSource,
    ) -> Result<OptOut> {
        let address = normalize_address(input.channel, &input.address).ok_or_else(|| {
            Error::validation(format!(
                "Invalid {} address: {}",
                input.channel,
                input.address.trim()
            ))
        })?;

        self.store
            .opt_outs
            .create(NewOptOut {
                tenant_id,
                channel: input.channel,
                address,
                source,
                reason: input.reason.filter(|r| !r.trim().is_empty()),
            })
            .await
    }

    /// List the tenant's opt-outs, newest first
    pub async fn list_opt_outs(
        &self,
        tenant_id: TenantId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<OptOut>> {
        let limit = limit
            .unwrap_or(DEFAULT_OPT_OUT_LIMIT)
            .clamp(1, MAX_OPT_OUT_LIMIT);
        let offset = offset.unwrap_or(0).max(0);
        self.store.opt_outs.list(tenant_id, limit, offset).await
    }

    /// Apply a provider delivery receipt
    pub async fn record_delivery(
        &self,
        tenant_id: TenantId,
        send_id: SendId,
        input: DeliveryReceiptInput,
        now: DateTime<Utc>,
    ) -> Result<ScheduledSend> {
        if self.store.sends.get(tenant_id, send_id).await?.is_none() {
            return Err(Error::not_found("Send"));
        }

        let delivered = input.status == DeliveryStatus::Delivered;
        let error = if delivered {
            None
        } else {
            input.error.filter(|e| !e.trim().is_empty())
        };

        self.store
            .sends
            .mark_delivery(tenant_id, send_id, delivered, error, now)
            .await?
            .ok_or_else(|| Error::Conflict("Send is not awaiting delivery".to_string()))
    }
}
