//! In-memory backend for tests and local development
//!
//! Implements every repository trait over a single mutex-guarded state, so
//! multi-entity operations (template default flip, sequence delete) are
//! atomic exactly like their PostgreSQL transactions.

use crate::models::*;
use crate::repository::api_keys::{ApiKeyId, ApiKeyRepository};
use crate::repository::enrollments::EnrollmentRepository;
use crate::repository::opt_outs::OptOutRepository;
use crate::repository::sends::{idempotency_key, SendRepository};
use crate::repository::sequences::SequenceRepository;
use crate::repository::settings::SettingsRepository;
use crate::repository::templates::TemplateRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudgreet_common::types::{
    Channel, ContactId, EnrollmentId, SendId, SequenceId, SequenceStatus, TemplateId, TenantId,
};
use cloudgreet_common::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    templates: Vec<Template>,
    sequences: Vec<Sequence>,
    enrollments: Vec<Enrollment>,
    sends: Vec<ScheduledSend>,
    send_keys: HashSet<String>,
    opt_outs: Vec<OptOut>,
    ai_settings: HashMap<TenantId, AiSettings>,
    prospect_filters: HashMap<TenantId, ProspectFilters>,
    sync_runs: Vec<ProspectSyncRun>,
    integrations: BTreeMap<(TenantId, IntegrationProvider), IntegrationRecord>,
    api_keys: Vec<ApiKey>,
}

impl State {
    fn metrics_for(&self, sequence_id: SequenceId) -> SequenceMetrics {
        let mut metrics = SequenceMetrics::default();
        for send in self
            .sends
            .iter()
            .filter(|s| s.sequence_id == Some(sequence_id))
        {
            match send.status {
                SendStatus::Sent => metrics.sent += 1,
                SendStatus::Delivered => {
                    metrics.sent += 1;
                    metrics.delivered += 1;
                }
                SendStatus::Failed => metrics.failed += 1,
                SendStatus::Processing | SendStatus::Cancelled => {}
            }
            if send.replied_at.is_some() {
                metrics.replied += 1;
            }
        }
        metrics
    }

    fn with_metrics(&self, sequence: &Sequence) -> Sequence {
        let mut sequence = sequence.clone();
        sequence.metrics = self.metrics_for(sequence.id);
        sequence
    }

    fn sequence_mut(&mut self, tenant_id: TenantId, id: SequenceId) -> Option<&mut Sequence> {
        self.sequences
            .iter_mut()
            .find(|s| s.id == id && s.tenant_id == tenant_id)
    }

    fn enrollment_mut(&mut self, id: EnrollmentId) -> Result<&mut Enrollment> {
        self.enrollments
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::not_found("Enrollment"))
    }

    fn clear_default(&mut self, tenant_id: TenantId, channel: Channel, except: Option<TemplateId>) {
        let now = Utc::now();
        for t in self.templates.iter_mut().filter(|t| {
            t.tenant_id == tenant_id && t.channel == channel && t.is_default && Some(t.id) != except
        }) {
            t.is_default = false;
            t.updated_at = now;
        }
    }
}

fn build_steps(inputs: &[StepInput]) -> Vec<SequenceStep> {
    inputs
        .iter()
        .map(|s| SequenceStep {
            id: Uuid::new_v4(),
            step_order: s.step_order,
            channel: s.channel,
            wait_minutes: s.wait_minutes,
            template_id: s.template_id,
        })
        .collect()
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateRepository for MemoryStore {
    async fn create(&self, input: CreateTemplate) -> Result<Template> {
        let mut state = self.state.lock().await;
        if input.is_default {
            state.clear_default(input.tenant_id, input.channel, None);
        }

        let now = Utc::now();
        let template = Template {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            name: input.name,
            channel: input.channel,
            subject: input.subject,
            body: input.body,
            compliance_footer: input.compliance_footer,
            is_active: input.is_active,
            is_default: input.is_default,
            created_at: now,
            updated_at: now,
        };
        state.templates.push(template.clone());
        Ok(template)
    }

    async fn get(&self, tenant_id: TenantId, id: TemplateId) -> Result<Option<Template>> {
        let state = self.state.lock().await;
        Ok(state
            .templates
            .iter()
            .find(|t| t.id == id && t.tenant_id == tenant_id)
            .cloned())
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        channel: Option<Channel>,
        active: Option<bool>,
    ) -> Result<Vec<Template>> {
        let state = self.state.lock().await;
        Ok(state
            .templates
            .iter()
            .filter(|t| t.tenant_id == tenant_id)
            .filter(|t| channel.map_or(true, |c| t.channel == c))
            .filter(|t| active.map_or(true, |a| t.is_active == a))
            .cloned()
            .collect())
    }

    async fn update(&self, template: &Template) -> Result<Template> {
        let mut state = self.state.lock().await;
        if template.is_default {
            state.clear_default(template.tenant_id, template.channel, Some(template.id));
        }

        let stored = state
            .templates
            .iter_mut()
            .find(|t| t.id == template.id && t.tenant_id == template.tenant_id)
            .ok_or_else(|| Error::not_found("Template"))?;

        stored.name = template.name.clone();
        stored.subject = template.subject.clone();
        stored.body = template.body.clone();
        stored.compliance_footer = template.compliance_footer.clone();
        stored.is_active = template.is_active;
        stored.is_default = template.is_default;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }
}

#[async_trait]
impl SequenceRepository for MemoryStore {
    async fn create(&self, input: NewSequence) -> Result<Sequence> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let sequence = Sequence {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            name: input.name,
            description: input.description,
            throttle_per_day: input.throttle_per_day,
            send_window_start: input.send_window_start,
            send_window_end: input.send_window_end,
            timezone: input.timezone,
            status: SequenceStatus::Draft,
            auto_pause_on_reply: input.auto_pause_on_reply,
            steps: build_steps(&input.steps),
            metrics: SequenceMetrics::default(),
            created_at: now,
            updated_at: now,
        };
        state.sequences.push(sequence.clone());
        Ok(sequence)
    }

    async fn get(&self, tenant_id: TenantId, id: SequenceId) -> Result<Option<Sequence>> {
        let state = self.state.lock().await;
        Ok(state
            .sequences
            .iter()
            .find(|s| s.id == id && s.tenant_id == tenant_id)
            .map(|s| state.with_metrics(s)))
    }

    async fn get_any(&self, id: SequenceId) -> Result<Option<Sequence>> {
        let state = self.state.lock().await;
        Ok(state
            .sequences
            .iter()
            .find(|s| s.id == id)
            .map(|s| state.with_metrics(s)))
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<Sequence>> {
        let state = self.state.lock().await;
        Ok(state
            .sequences
            .iter()
            .rev()
            .filter(|s| s.tenant_id == tenant_id)
            .map(|s| state.with_metrics(s))
            .collect())
    }

    async fn update(
        &self,
        tenant_id: TenantId,
        id: SequenceId,
        changes: SequenceChanges,
    ) -> Result<Option<Sequence>> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.sequence_mut(tenant_id, id) else {
            return Ok(None);
        };
        if let Some(change) = changes.status {
            if stored.status != change.from {
                return Ok(None);
            }
            stored.status = change.to;
        }

        stored.name = changes.name;
        stored.description = changes.description;
        stored.throttle_per_day = changes.throttle_per_day;
        stored.send_window_start = changes.send_window_start;
        stored.send_window_end = changes.send_window_end;
        stored.timezone = changes.timezone;
        stored.auto_pause_on_reply = changes.auto_pause_on_reply;
        stored.steps = build_steps(&changes.steps);
        stored.updated_at = Utc::now();

        let updated = stored.clone();
        Ok(Some(state.with_metrics(&updated)))
    }

    async fn transition(
        &self,
        tenant_id: TenantId,
        id: SequenceId,
        from: SequenceStatus,
        to: SequenceStatus,
    ) -> Result<Option<Sequence>> {
        let mut state = self.state.lock().await;
        let updated = match state.sequence_mut(tenant_id, id) {
            Some(stored) if stored.status == from => {
                stored.status = to;
                stored.updated_at = Utc::now();
                stored.clone()
            }
            _ => return Ok(None),
        };
        Ok(Some(state.with_metrics(&updated)))
    }

    async fn delete(&self, tenant_id: TenantId, id: SequenceId) -> Result<Option<DeleteOutcome>> {
        let mut state = self.state.lock().await;
        let Some(position) = state
            .sequences
            .iter()
            .position(|s| s.id == id && s.tenant_id == tenant_id)
        else {
            return Ok(None);
        };

        let mut outcome = DeleteOutcome::default();
        for send in state
            .sends
            .iter_mut()
            .filter(|s| s.sequence_id == Some(id))
        {
            if send.status == SendStatus::Processing {
                send.status = SendStatus::Cancelled;
                outcome.cancelled_sends += 1;
            }
            send.sequence_id = None;
        }

        let now = Utc::now();
        for enrollment in state
            .enrollments
            .iter_mut()
            .filter(|e| e.sequence_id == id && !e.status.is_terminal())
        {
            enrollment.status = EnrollmentStatus::Cancelled;
            enrollment.updated_at = now;
            outcome.cancelled_enrollments += 1;
        }

        for filters in state.prospect_filters.values_mut() {
            if filters.auto_enroll_sequence_id == Some(id) {
                filters.auto_enroll_sequence_id = None;
            }
        }

        state.sequences.remove(position);
        Ok(Some(outcome))
    }
}

#[async_trait]
impl EnrollmentRepository for MemoryStore {
    async fn create(&self, input: NewEnrollment) -> Result<Enrollment> {
        let mut state = self.state.lock().await;
        if state
            .enrollments
            .iter()
            .any(|e| e.sequence_id == input.sequence_id && e.contact_id == input.contact_id)
        {
            return Err(Error::Conflict(format!(
                "Contact {} is already enrolled in this sequence",
                input.contact_id
            )));
        }

        let now = Utc::now();
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            sequence_id: input.sequence_id,
            contact_id: input.contact_id,
            email: input.email,
            phone: input.phone,
            first_name: input.first_name,
            company: input.company,
            status: EnrollmentStatus::Active,
            next_step_order: 1,
            next_due_at: input.next_due_at,
            created_at: now,
            updated_at: now,
        };
        state.enrollments.push(enrollment.clone());
        Ok(enrollment)
    }

    async fn get(&self, id: EnrollmentId) -> Result<Option<Enrollment>> {
        let state = self.state.lock().await;
        Ok(state.enrollments.iter().find(|e| e.id == id).cloned())
    }

    async fn list_by_sequence(
        &self,
        tenant_id: TenantId,
        sequence_id: SequenceId,
    ) -> Result<Vec<Enrollment>> {
        let state = self.state.lock().await;
        Ok(state
            .enrollments
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.sequence_id == sequence_id)
            .cloned()
            .collect())
    }

    async fn list_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Enrollment>> {
        let state = self.state.lock().await;
        let active: HashSet<SequenceId> = state
            .sequences
            .iter()
            .filter(|s| s.status == SequenceStatus::Active)
            .map(|s| s.id)
            .collect();

        let mut due: Vec<Enrollment> = state
            .enrollments
            .iter()
            .filter(|e| {
                e.status == EnrollmentStatus::Active
                    && e.next_due_at <= now
                    && active.contains(&e.sequence_id)
            })
            .cloned()
            .collect();
        due.sort_by_key(|e| e.next_due_at);
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn reschedule(&self, id: EnrollmentId, next_due_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        let enrollment = state.enrollment_mut(id)?;
        enrollment.next_due_at = next_due_at;
        enrollment.updated_at = Utc::now();
        Ok(())
    }

    async fn advance(
        &self,
        id: EnrollmentId,
        next_step_order: i32,
        next_due_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let enrollment = state.enrollment_mut(id)?;
        enrollment.next_step_order = next_step_order;
        enrollment.next_due_at = next_due_at;
        enrollment.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(&self, id: EnrollmentId, status: EnrollmentStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        let enrollment = state.enrollment_mut(id)?;
        enrollment.status = status;
        enrollment.updated_at = Utc::now();
        Ok(())
    }

    async fn find_active_for_contact(
        &self,
        tenant_id: TenantId,
        contact_id: &str,
        sequence_id: Option<SequenceId>,
    ) -> Result<Vec<Enrollment>> {
        let state = self.state.lock().await;
        Ok(state
            .enrollments
            .iter()
            .filter(|e| {
                e.tenant_id == tenant_id
                    && e.contact_id == contact_id
                    && e.status == EnrollmentStatus::Active
                    && sequence_id.map_or(true, |id| e.sequence_id == id)
            })
            .cloned()
            .collect())
    }
}

fn counts_toward_throttle(send: &ScheduledSend, sequence_id: SequenceId, since: DateTime<Utc>) -> bool {
    send.sequence_id == Some(sequence_id)
        && send.initiated_at >= since
        && send.dispatch_attempted
        && send.status != SendStatus::Cancelled
}

#[async_trait]
impl SendRepository for MemoryStore {
    async fn claim(&self, input: NewSend) -> Result<Option<ScheduledSend>> {
        let mut state = self.state.lock().await;
        let key = idempotency_key(input.sequence_id, &input.contact_id, input.step_order);
        if !state.send_keys.insert(key) {
            return Ok(None);
        }

        let send = ScheduledSend {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            sequence_id: Some(input.sequence_id),
            enrollment_id: Some(input.enrollment_id),
            contact_id: input.contact_id,
            step_order: input.step_order,
            channel: input.channel,
            recipient: input.recipient,
            subject: input.subject,
            body: input.body,
            status: SendStatus::Processing,
            error: None,
            provider_id: None,
            initiated_at: input.initiated_at,
            sent_at: None,
            delivered_at: None,
            replied_at: None,
            dispatch_attempted: true,
        };
        state.sends.push(send.clone());
        Ok(Some(send))
    }

    async fn claim_unsent(&self, input: NewSend, error: &str) -> Result<Option<ScheduledSend>> {
        let Some(mut send) = SendRepository::claim(self, input).await? else {
            return Ok(None);
        };
        let mut state = self.state.lock().await;
        if let Some(stored) = state.sends.iter_mut().find(|s| s.id == send.id) {
            stored.status = SendStatus::Failed;
            stored.error = Some(error.to_string());
            stored.dispatch_attempted = false;
            send = stored.clone();
        }
        Ok(Some(send))
    }

    async fn get(&self, tenant_id: TenantId, id: SendId) -> Result<Option<ScheduledSend>> {
        let state = self.state.lock().await;
        Ok(state
            .sends
            .iter()
            .find(|s| s.id == id && s.tenant_id == tenant_id)
            .cloned())
    }

    async fn mark_sent(
        &self,
        id: SendId,
        provider_id: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(send) = state
            .sends
            .iter_mut()
            .find(|s| s.id == id && s.status == SendStatus::Processing)
        {
            send.status = SendStatus::Sent;
            send.provider_id = provider_id;
            send.sent_at = Some(at);
        }
        Ok(())
    }

    async fn mark_failed(&self, id: SendId, error: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(send) = state
            .sends
            .iter_mut()
            .find(|s| s.id == id && s.status == SendStatus::Processing)
        {
            send.status = SendStatus::Failed;
            send.error = Some(error.to_string());
        }
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
        let mut state = self.state.lock().await;
        let Some(send) = state
            .sends
            .iter_mut()
            .find(|s| s.id == id && s.tenant_id == tenant_id)
        else {
            return Ok(None);
        };

        match (delivered, send.status) {
            (true, SendStatus::Sent | SendStatus::Delivered) => {
                send.status = SendStatus::Delivered;
                send.delivered_at = Some(at);
            }
            (false, SendStatus::Sent | SendStatus::Failed) => {
                send.status = SendStatus::Failed;
                if error.is_some() {
                    send.error = error;
                }
            }
            _ => return Ok(None),
        }
        Ok(Some(send.clone()))
    }

    async fn mark_replied(
        &self,
        tenant_id: TenantId,
        sequence_id: SequenceId,
        contact_id: &ContactId,
        at: DateTime<Utc>,
    ) -> Result<Option<ScheduledSend>> {
        let mut state = self.state.lock().await;
        let latest = state
            .sends
            .iter_mut()
            .filter(|s| {
                s.tenant_id == tenant_id
                    && s.sequence_id == Some(sequence_id)
                    && &s.contact_id == contact_id
                    && matches!(s.status, SendStatus::Sent | SendStatus::Delivered)
            })
            .max_by_key(|s| s.initiated_at);

        match latest {
            Some(send) if send.replied_at.is_none() => {
                send.replied_at = Some(at);
                Ok(Some(send.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn count_initiated_since(
        &self,
        sequence_id: SequenceId,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let state = self.state.lock().await;
        let count = state
            .sends
            .iter()
            .filter(|s| counts_toward_throttle(s, sequence_id, since))
            .count();
        Ok(count as i64)
    }

    async fn oldest_initiated_since(
        &self,
        sequence_id: SequenceId,
        since: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let state = self.state.lock().await;
        Ok(state
            .sends
            .iter()
            .filter(|s| counts_toward_throttle(s, sequence_id, since))
            .map(|s| s.initiated_at)
            .min())
    }

    async fn channel_counts(
        &self,
        tenant_id: TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChannelCounts>> {
        let state = self.state.lock().await;
        let mut counts: BTreeMap<u8, ChannelCounts> = BTreeMap::new();

        for send in state.sends.iter().filter(|s| {
            s.tenant_id == tenant_id
                && s.initiated_at >= since
                && matches!(
                    s.status,
                    SendStatus::Sent | SendStatus::Delivered | SendStatus::Failed
                )
        }) {
            let entry = counts
                .entry(send.channel as u8)
                .or_insert_with(|| ChannelCounts::empty(send.channel));
            entry.total_sent += 1;
            match send.status {
                SendStatus::Delivered => entry.delivered += 1,
                SendStatus::Failed => entry.failed += 1,
                _ => {}
            }
            if send.replied_at.is_some() {
                entry.replies += 1;
            }
        }

        Ok(counts.into_values().collect())
    }
}

#[async_trait]
impl OptOutRepository for MemoryStore {
    async fn create(&self, input: NewOptOut) -> Result<OptOut> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.opt_outs.iter_mut().find(|o| {
            o.tenant_id == input.tenant_id
                && o.channel == input.channel
                && o.address == input.address
        }) {
            existing.source = input.source;
            if input.reason.is_some() {
                existing.reason = input.reason;
            }
            return Ok(existing.clone());
        }

        let opt_out = OptOut {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            channel: input.channel,
            address: input.address,
            source: input.source,
            reason: input.reason,
            created_at: Utc::now(),
        };
        state.opt_outs.push(opt_out.clone());
        Ok(opt_out)
    }

    async fn is_opted_out(
        &self,
        tenant_id: TenantId,
        channel: Channel,
        address: &str,
    ) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .opt_outs
            .iter()
            .any(|o| o.tenant_id == tenant_id && o.channel == channel && o.address == address))
    }

    async fn list(&self, tenant_id: TenantId, limit: i64, offset: i64) -> Result<Vec<OptOut>> {
        let state = self.state.lock().await;
        Ok(state
            .opt_outs
            .iter()
            .rev()
            .filter(|o| o.tenant_id == tenant_id)
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SettingsRepository for MemoryStore {
    async fn get_ai_settings(&self, tenant_id: TenantId) -> Result<Option<AiSettings>> {
        let state = self.state.lock().await;
        Ok(state.ai_settings.get(&tenant_id).cloned())
    }

    async fn put_ai_settings(&self, mut settings: AiSettings) -> Result<AiSettings> {
        let mut state = self.state.lock().await;
        settings.updated_at = Some(Utc::now());
        state
            .ai_settings
            .insert(settings.tenant_id, settings.clone());
        Ok(settings)
    }

    async fn get_prospect_filters(&self, tenant_id: TenantId) -> Result<Option<ProspectFilters>> {
        let state = self.state.lock().await;
        Ok(state.prospect_filters.get(&tenant_id).cloned())
    }

    async fn put_prospect_filters(&self, mut filters: ProspectFilters) -> Result<ProspectFilters> {
        let mut state = self.state.lock().await;
        filters.updated_at = Some(Utc::now());
        state
            .prospect_filters
            .insert(filters.tenant_id, filters.clone());
        Ok(filters)
    }

    async fn create_sync_run(&self, run: ProspectSyncRun) -> Result<ProspectSyncRun> {
        let mut state = self.state.lock().await;
        state.sync_runs.push(run.clone());
        Ok(run)
    }

    async fn list_sync_runs(
        &self,
        tenant_id: TenantId,
        limit: i64,
    ) -> Result<Vec<ProspectSyncRun>> {
        let state = self.state.lock().await;
        Ok(state
            .sync_runs
            .iter()
            .rev()
            .filter(|r| r.tenant_id == tenant_id)
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn list_integrations(&self, tenant_id: TenantId) -> Result<Vec<IntegrationRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<IntegrationRecord> = state
            .integrations
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.provider.to_string());
        Ok(records)
    }

    async fn get_integration(
        &self,
        tenant_id: TenantId,
        provider: IntegrationProvider,
    ) -> Result<Option<IntegrationRecord>> {
        let state = self.state.lock().await;
        Ok(state.integrations.get(&(tenant_id, provider)).cloned())
    }

    async fn put_integration(&self, record: IntegrationRecord) -> Result<IntegrationRecord> {
        let mut state = self.state.lock().await;
        state
            .integrations
            .insert((record.tenant_id, record.provider), record.clone());
        Ok(record)
    }
}

#[async_trait]
impl ApiKeyRepository for MemoryStore {
    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>> {
        let state = self.state.lock().await;
        Ok(state
            .api_keys
            .iter()
            .filter(|k| k.key_prefix == prefix && !k.is_expired())
            .cloned()
            .collect())
    }

    async fn get(&self, id: ApiKeyId) -> Result<Option<ApiKey>> {
        let state = self.state.lock().await;
        Ok(state.api_keys.iter().find(|k| k.id == id).cloned())
    }

    async fn update_last_used(&self, id: ApiKeyId) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(key) = state.api_keys.iter_mut().find(|k| k.id == id) {
            key.last_used_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn insert(&self, key: ApiKey) -> Result<()> {
        let mut state = self.state.lock().await;
        state.api_keys.push(key);
        Ok(())
    }
}
