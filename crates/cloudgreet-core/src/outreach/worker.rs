//! Sequence Worker - advances due enrollments through their steps

use super::dispatch::{Dispatchers, OutboundMessage};
use super::engagement::normalize_address;
use super::template::{RenderedMessage, TemplateRenderer};
use super::throttle::ThrottleGate;
use super::window::SendWindow;
use chrono::{DateTime, Duration, Utc};
use cloudgreet_common::config::SchedulerConfig;
use cloudgreet_common::types::{Channel, SequenceId, TenantId};
use cloudgreet_common::Result;
use cloudgreet_storage::models::{
    AiSettings, Enrollment, EnrollmentStatus, NewSend, Sequence, SequenceStep,
};
use cloudgreet_storage::Store;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters for one pass over due enrollments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub due: usize,
    pub dispatched: usize,
    pub failed: usize,
    pub rescheduled: usize,
    pub throttled: usize,
    pub skipped: usize,
    pub completed: usize,
    pub opted_out: usize,
    /// Enrollments left untouched because a store call failed
    pub errors: usize,
}

/// What to do with one due enrollment
enum StepPlan {
    Send(RenderedMessage),
    Fail(String),
}

/// How one due enrollment was handled
enum StepOutcome {
    Dispatching {
        handle: JoinHandle<bool>,
        completed: bool,
    },
    Failed,
    Rescheduled,
    Throttled,
    Skipped,
    Completed,
    OptedOut,
}

/// Lookups shared by every enrollment of one tick
struct TickContext {
    semaphore: Arc<Semaphore>,
    sequences: HashMap<SequenceId, Option<Sequence>>,
    ai_settings: HashMap<TenantId, AiSettings>,
    throttled_until: HashMap<SequenceId, DateTime<Utc>>,
}

impl TickContext {
    fn new(concurrency_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit)),
            sequences: HashMap::new(),
            ai_settings: HashMap::new(),
            throttled_until: HashMap::new(),
        }
    }
}

/// Sequence worker
pub struct SequenceWorker {
    store: Store,
    dispatchers: Dispatchers,
    renderer: TemplateRenderer,
    throttle: ThrottleGate,
    /// Maximum concurrent dispatches
    concurrency_limit: usize,
    /// Batch size for fetching due enrollments
    batch_size: i64,
    /// Interval between processing cycles (seconds)
    poll_interval_secs: u64,
}

impl SequenceWorker {
    /// Create a new sequence worker
    pub fn new(store: Store, dispatchers: Dispatchers) -> Result<Self> {
        let throttle = ThrottleGate::new(store.sends.clone());
        Ok(Self {
            store,
            dispatchers,
            renderer: TemplateRenderer::new()?,
            throttle,
            concurrency_limit: 10,
            batch_size: 100,
            poll_interval_secs: 30,
        })
    }

    /// Apply scheduler settings
    pub fn with_config(self, config: &SchedulerConfig) -> Self {
        self.with_concurrency_limit(config.concurrency)
            .with_batch_size(config.batch_size)
            .with_poll_interval(config.poll_interval_secs)
    }

    /// Set concurrency limit
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    /// Set batch size
    pub fn with_batch_size(mut self, size: i64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs.max(1);
        self
    }

    /// Run until `cancel` is triggered
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(std::time::Duration::from_secs(self.poll_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            concurrency = self.concurrency_limit,
            batch = self.batch_size,
            interval_secs = self.poll_interval_secs,
            "Sequence worker started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Sequence worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(summary) if summary.due > 0 => {
                            info!(
                                due = summary.due,
                                dispatched = summary.dispatched,
                                failed = summary.failed,
                                rescheduled = summary.rescheduled,
                                throttled = summary.throttled,
                                errors = summary.errors,
                                "Sequence worker tick"
                            );
                        }
                        Ok(_) => debug!("Sequence worker: nothing due"),
                        Err(e) => error!(error = %e, "Sequence worker tick failed"),
                    }
                }
            }
        }
    }

    /// Process every enrollment due at `now`
    ///
    /// A store failure on one enrollment is logged and counted; the rest of
    /// the batch is still processed. Dispatches started by this call are
    /// awaited before it returns.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary> {
        let due = self
            .store
            .enrollments
            .list_due(now, self.batch_size)
            .await?;

        let mut summary = TickSummary {
            due: due.len(),
            ..TickSummary::default()
        };
        if due.is_empty() {
            return Ok(summary);
        }

        debug!("Processing {} due enrollments", due.len());

        let mut ctx = TickContext::new(self.concurrency_limit);
        let mut handles = Vec::new();

        for enrollment in due {
            let enrollment_id = enrollment.id;
            match self.process(&mut ctx, enrollment, now).await {
                Ok(StepOutcome::Dispatching { handle, completed }) => {
                    handles.push(handle);
                    if completed {
                        summary.completed += 1;
                    }
                }
                Ok(StepOutcome::Failed) => summary.failed += 1,
                Ok(StepOutcome::Rescheduled) => summary.rescheduled += 1,
                Ok(StepOutcome::Throttled) => summary.throttled += 1,
                Ok(StepOutcome::Skipped) => summary.skipped += 1,
                Ok(StepOutcome::Completed) => summary.completed += 1,
                Ok(StepOutcome::OptedOut) => summary.opted_out += 1,
                Err(e) => {
                    warn!(enrollment_id = %enrollment_id, error = %e, "Failed to process enrollment");
                    summary.errors += 1;
                }
            }
        }

        for handle in handles {
            match handle.await {
                Ok(true) => summary.dispatched += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => error!("Dispatch task error: {}", e),
            }
        }

        Ok(summary)
    }

    /// Handle one due enrollment
    async fn process(
        &self,
        ctx: &mut TickContext,
        enrollment: Enrollment,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome> {
        if !ctx.sequences.contains_key(&enrollment.sequence_id) {
            let loaded = self.store.sequences.get_any(enrollment.sequence_id).await?;
            ctx.sequences.insert(enrollment.sequence_id, loaded);
        }
        let Some(sequence) = ctx
            .sequences
            .get(&enrollment.sequence_id)
            .and_then(|s| s.as_ref())
        else {
            return Ok(StepOutcome::Skipped);
        };

        let Some(step) = sequence.step(enrollment.next_step_order).cloned() else {
            self.store
                .enrollments
                .set_status(enrollment.id, EnrollmentStatus::Completed)
                .await?;
            return Ok(StepOutcome::Completed);
        };

        let Some(address) = enrollment.address_for(step.channel).map(str::to_string) else {
            let reason = format!("No {} address for contact", step.channel);
            self.record_failure(sequence, &enrollment, &step, String::new(), &reason, now)
                .await?;
            return Ok(StepOutcome::Failed);
        };

        if let Some(normalized) = normalize_address(step.channel, &address) {
            if self
                .store
                .opt_outs
                .is_opted_out(enrollment.tenant_id, step.channel, &normalized)
                .await?
            {
                self.store
                    .enrollments
                    .set_status(enrollment.id, EnrollmentStatus::OptedOut)
                    .await?;
                debug!(enrollment_id = %enrollment.id, "Contact opted out, stopping enrollment");
                return Ok(StepOutcome::OptedOut);
            }
        }

        let window = match SendWindow::for_sequence(sequence) {
            Ok(window) => window,
            Err(e) => {
                warn!(sequence_id = %sequence.id, error = %e, "Sequence has an unusable send window");
                return Ok(StepOutcome::Skipped);
            }
        };
        if !window.is_open(now) {
            let next_open = window.next_open(now);
            self.store
                .enrollments
                .reschedule(enrollment.id, next_open)
                .await?;
            debug!(enrollment_id = %enrollment.id, %next_open, "Outside send window, rescheduled");
            return Ok(StepOutcome::Rescheduled);
        }

        let mut reopens_at = ctx.throttled_until.get(&sequence.id).copied();
        if reopens_at.is_none() && !self.throttle.check_allowed(sequence, now).await? {
            let at = self.throttle.reopens_at(sequence, now).await?;
            ctx.throttled_until.insert(sequence.id, at);
            reopens_at = Some(at);
        }
        if let Some(at) = reopens_at {
            // Parked until a slot frees up, so it stops occupying the due batch
            self.store.enrollments.reschedule(enrollment.id, at).await?;
            debug!(enrollment_id = %enrollment.id, reopens_at = %at, "Throttled, rescheduled");
            return Ok(StepOutcome::Throttled);
        }

        let call_settings = if step.channel == Channel::Call {
            if !ctx.ai_settings.contains_key(&enrollment.tenant_id) {
                let settings = self
                    .store
                    .settings
                    .get_ai_settings(enrollment.tenant_id)
                    .await?
                    .unwrap_or_else(|| AiSettings::defaults(enrollment.tenant_id));
                ctx.ai_settings.insert(enrollment.tenant_id, settings);
            }
            ctx.ai_settings.get(&enrollment.tenant_id)
        } else {
            None
        };

        let plan = match call_settings {
            Some(settings) => StepPlan::Send(RenderedMessage {
                subject: None,
                body: self
                    .renderer
                    .substitute(&settings.greeting_message, &enrollment),
            }),
            None => self.plan_template_step(&enrollment, &step).await?,
        };
        let max_call_minutes = call_settings.map(|s| s.max_call_minutes);

        let rendered = match plan {
            StepPlan::Send(rendered) => rendered,
            StepPlan::Fail(reason) => {
                self.record_failure(sequence, &enrollment, &step, address, &reason, now)
                    .await?;
                return Ok(StepOutcome::Failed);
            }
        };

        let claimed = self
            .store
            .sends
            .claim(self.new_send(sequence, &enrollment, &step, address.clone(), now, &rendered))
            .await?;
        let Some(send) = claimed else {
            debug!(
                enrollment_id = %enrollment.id,
                step = step.step_order,
                "Step already claimed, moving cursor past it"
            );
            self.advance(sequence, &enrollment, now).await?;
            return Ok(StepOutcome::Skipped);
        };

        let message = OutboundMessage {
            send_id: send.id,
            channel: step.channel,
            recipient: address,
            subject: rendered.subject,
            body: rendered.body,
            max_call_minutes,
        };

        // A cursor left behind is moved on by the claim conflict next tick
        let completed = match self.advance(sequence, &enrollment, now).await {
            Ok(completed) => completed,
            Err(e) => {
                warn!(enrollment_id = %enrollment.id, error = %e, "Failed to advance enrollment");
                false
            }
        };

        let permit = ctx.semaphore.clone().acquire_owned().await.map_err(|e| {
            cloudgreet_common::Error::Internal(format!("Dispatch semaphore closed: {}", e))
        })?;
        let dispatcher = self.dispatchers.for_channel(step.channel);
        let sends = self.store.sends.clone();

        let handle = tokio::spawn(async move {
            let _permit = permit;
            match dispatcher.dispatch(&message).await {
                Ok(receipt) => {
                    info!(
                        send_id = %message.send_id,
                        channel = %message.channel,
                        dispatcher = dispatcher.name(),
                        "Step sent"
                    );
                    if let Err(e) = sends
                        .mark_sent(message.send_id, receipt.provider_id, Utc::now())
                        .await
                    {
                        error!("Failed to mark send {} as sent: {}", message.send_id, e);
                    }
                    true
                }
                Err(e) => {
                    warn!(send_id = %message.send_id, error = %e, "Step dispatch failed");
                    if let Err(e) = sends.mark_failed(message.send_id, &e.to_string()).await {
                        error!("Failed to mark send {} as failed: {}", message.send_id, e);
                    }
                    false
                }
            }
        });

        Ok(StepOutcome::Dispatching { handle, completed })
    }

    fn new_send(
        &self,
        sequence: &Sequence,
        enrollment: &Enrollment,
        step: &SequenceStep,
        recipient: String,
        now: DateTime<Utc>,
        rendered: &RenderedMessage,
    ) -> NewSend {
        NewSend {
            tenant_id: enrollment.tenant_id,
            sequence_id: sequence.id,
            enrollment_id: enrollment.id,
            contact_id: enrollment.contact_id.clone(),
            step_order: step.step_order,
            channel: step.channel,
            recipient,
            subject: rendered.subject.clone(),
            body: rendered.body.clone(),
            initiated_at: now,
        }
    }

    async fn plan_template_step(
        &self,
        enrollment: &Enrollment,
        step: &SequenceStep,
    ) -> Result<StepPlan> {
        let Some(template_id) = step.template_id else {
            return Ok(StepPlan::Fail(format!(
                "Step {} has no template",
                step.step_order
            )));
        };
        let template = self
            .store
            .templates
            .get(enrollment.tenant_id, template_id)
            .await?;
        Ok(match template {
            Some(template) if template.is_active => {
                StepPlan::Send(self.renderer.render(&template, enrollment))
            }
            Some(_) => StepPlan::Fail(format!("Template {} is disabled", template_id)),
            None => StepPlan::Fail(format!("Template {} not found", template_id)),
        })
    }

    /// Claim the step as failed without dispatching, then move on.
    /// Such claims do not count toward the sequence throttle.
    async fn record_failure(
        &self,
        sequence: &Sequence,
        enrollment: &Enrollment,
        step: &SequenceStep,
        recipient: String,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let empty = RenderedMessage {
            subject: None,
            body: String::new(),
        };
        let claimed = self
            .store
            .sends
            .claim_unsent(
                self.new_send(sequence, enrollment, step, recipient, now, &empty),
                reason,
            )
            .await?;

        if claimed.is_some() {
            warn!(
                enrollment_id = %enrollment.id,
                step = step.step_order,
                reason,
                "Step failed before dispatch"
            );
        }
        self.advance(sequence, enrollment, now).await?;
        Ok(())
    }

    /// Point the enrollment at the following step. Returns `true` when the
    /// sequence is finished for this contact.
    async fn advance(
        &self,
        sequence: &Sequence,
        enrollment: &Enrollment,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let next_order = enrollment.next_step_order + 1;
        match sequence.step(next_order) {
            Some(next) => {
                self.store
                    .enrollments
                    .advance(
                        enrollment.id,
                        next_order,
                        now + Duration::minutes(i64::from(next.wait_minutes)),
                    )
                    .await?;
                Ok(false)
            }
            None => {
                self.store
                    .enrollments
                    .set_status(enrollment.id, EnrollmentStatus::Completed)
                    .await?;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outreach::dispatch::{ChannelDispatcher, DispatchReceipt};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use cloudgreet_common::types::{ContactId, SequenceStatus};
    use cloudgreet_storage::models::{
        ChannelCounts, CreateTemplate, NewEnrollment, NewOptOut, NewSequence, OptOutSource,
        ScheduledSend, SendStatus, StepInput,
    };
    use cloudgreet_storage::repository::SendRepository;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<OutboundMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl ChannelDispatcher for RecordingDispatcher {
        async fn dispatch(&self, message: &OutboundMessage) -> Result<DispatchReceipt> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                return Err(cloudgreet_common::Error::Dispatch("gateway down".to_string()));
            }
            Ok(DispatchReceipt {
                provider_id: Some(format!("p-{}", message.send_id)),
            })
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    struct Fixture {
        store: Store,
        dispatcher: Arc<RecordingDispatcher>,
        worker: SequenceWorker,
        tenant_id: TenantId,
    }

    fn dispatchers(dispatcher: &Arc<RecordingDispatcher>) -> Dispatchers {
        Dispatchers {
            email: dispatcher.clone(),
            sms: dispatcher.clone(),
            call: dispatcher.clone(),
        }
    }

    fn fixture_with(fail: bool) -> Fixture {
        let store = Store::memory();
        let dispatcher = Arc::new(RecordingDispatcher {
            fail,
            ..RecordingDispatcher::default()
        });
        let worker = SequenceWorker::new(store.clone(), dispatchers(&dispatcher)).unwrap();
        Fixture {
            store,
            dispatcher,
            worker,
            tenant_id: Uuid::new_v4(),
        }
    }

    fn fixture() -> Fixture {
        fixture_with(false)
    }

    // Wednesday 2025-01-15 15:00 UTC
    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 15, 0, 0).unwrap()
    }

    async fn sms_template(f: &Fixture) -> Uuid {
        f.store
            .templates
            .create(CreateTemplate {
                tenant_id: f.tenant_id,
                name: "Intro".to_string(),
                channel: Channel::Sms,
                subject: None,
                body: "Hi {{first_name}}".to_string(),
                compliance_footer: "STOP to end".to_string(),
                is_active: true,
                is_default: false,
            })
            .await
            .unwrap()
            .id
    }

    async fn active_sequence(f: &Fixture, throttle: i32, steps: Vec<StepInput>) -> Sequence {
        let sequence = f
            .store
            .sequences
            .create(NewSequence {
                tenant_id: f.tenant_id,
                name: "Follow up".to_string(),
                description: None,
                throttle_per_day: throttle,
                send_window_start: "09:00".to_string(),
                send_window_end: "17:00".to_string(),
                timezone: "America/New_York".to_string(),
                auto_pause_on_reply: true,
                steps,
            })
            .await
            .unwrap();
        f.store
            .sequences
            .transition(
                f.tenant_id,
                sequence.id,
                SequenceStatus::Draft,
                SequenceStatus::Active,
            )
            .await
            .unwrap()
            .unwrap()
    }

    async fn enroll(f: &Fixture, sequence: &Sequence, contact: &str, phone: Option<&str>) -> Enrollment {
        enroll_due(f, sequence, contact, phone, noon() - Duration::minutes(1)).await
    }

    async fn enroll_due(
        f: &Fixture,
        sequence: &Sequence,
        contact: &str,
        phone: Option<&str>,
        due: DateTime<Utc>,
    ) -> Enrollment {
        f.store
            .enrollments
            .create(NewEnrollment {
                tenant_id: f.tenant_id,
                sequence_id: sequence.id,
                contact_id: contact.to_string(),
                email: None,
                phone: phone.map(str::to_string),
                first_name: Some("Dana".to_string()),
                company: None,
                next_due_at: due,
            })
            .await
            .unwrap()
    }

    fn step(order: i32, channel: Channel, wait: i32, template_id: Option<Uuid>) -> StepInput {
        StepInput {
            step_order: order,
            channel,
            wait_minutes: wait,
            template_id,
        }
    }

    #[tokio::test]
    async fn test_tick_sends_and_advances() {
        let f = fixture();
        let template_id = sms_template(&f).await;
        let sequence = active_sequence(
            &f,
            50,
            vec![
                step(1, Channel::Sms, 0, Some(template_id)),
                step(2, Channel::Call, 60, None),
            ],
        )
        .await;
        let enrollment = enroll(&f, &sequence, "c-1", Some("+15550100")).await;

        let summary = f.worker.tick(noon()).await.unwrap();
        assert_eq!(summary.due, 1);
        assert_eq!(summary.dispatched, 1);

        let sent = f.dispatcher.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "Hi Dana\nSTOP to end");
        assert_eq!(sent[0].recipient, "+15550100");

        let stored = f.store.sends.get(f.tenant_id, sent[0].send_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SendStatus::Sent);
        assert!(stored.provider_id.is_some());

        let enrollment = f.store.enrollments.get(enrollment.id).await.unwrap().unwrap();
        assert_eq!(enrollment.next_step_order, 2);
        assert_eq!(enrollment.next_due_at, noon() + Duration::minutes(60));

        // Not due yet
        let summary = f.worker.tick(noon()).await.unwrap();
        assert_eq!(summary.due, 0);
    }

    #[tokio::test]
    async fn test_call_step_uses_greeting_and_completes() {
        let f = fixture();
        let sequence = active_sequence(&f, 50, vec![step(1, Channel::Call, 0, None)]).await;
        let enrollment = enroll(&f, &sequence, "c-1", Some("+15550100")).await;

        f.worker.tick(noon()).await.unwrap();

        let sent = f.dispatcher.sent.lock().unwrap().clone();
        assert_eq!(sent[0].body, "Thanks for calling! How can I help you today?");
        assert_eq!(sent[0].max_call_minutes, Some(10));

        let enrollment = f.store.enrollments.get(enrollment.id).await.unwrap().unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Completed);
    }

    #[tokio::test]
    async fn test_outside_window_reschedules() {
        let f = fixture();
        let sequence = active_sequence(&f, 50, vec![step(1, Channel::Call, 0, None)]).await;
        let enrollment = enroll(&f, &sequence, "c-1", Some("+15550100")).await;

        // 23:00 UTC is 18:00 in New York
        let evening = Utc.with_ymd_and_hms(2025, 1, 15, 23, 0, 0).unwrap();
        let summary = f.worker.tick(evening).await.unwrap();
        assert_eq!(summary.rescheduled, 1);
        assert!(f.dispatcher.sent.lock().unwrap().is_empty());

        let enrollment = f.store.enrollments.get(enrollment.id).await.unwrap().unwrap();
        assert_eq!(
            enrollment.next_due_at,
            Utc.with_ymd_and_hms(2025, 1, 16, 14, 0, 0).unwrap()
        );
        assert_eq!(enrollment.next_step_order, 1);
    }

    #[tokio::test]
    async fn test_throttle_caps_sends_per_sequence() {
        let f = fixture();
        let sequence = active_sequence(&f, 2, vec![step(1, Channel::Call, 0, None)]).await;
        for i in 0..5 {
            enroll(&f, &sequence, &format!("c-{}", i), Some("+15550100")).await;
        }

        let summary = f.worker.tick(noon()).await.unwrap();
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.throttled, 3);

        // Parked until the first sends leave the window
        let summary = f.worker.tick(noon() + Duration::hours(1)).await.unwrap();
        assert_eq!(summary.due, 0);

        let reopened = noon() + Duration::hours(24) + Duration::seconds(1);
        let summary = f.worker.tick(reopened).await.unwrap();
        assert_eq!(summary.due, 3);
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.throttled, 1);
    }

    #[tokio::test]
    async fn test_throttled_backlog_does_not_starve_other_sequences() {
        let f = fixture();
        let throttled = active_sequence(&f, 1, vec![step(1, Channel::Call, 0, None)]).await;
        let other = active_sequence(&f, 50, vec![step(1, Channel::Call, 0, None)]).await;
        for i in 0..3 {
            enroll_due(
                &f,
                &throttled,
                &format!("c-{}", i),
                Some("+15550100"),
                noon() - Duration::minutes(30),
            )
            .await;
        }
        let waiting = enroll(&f, &other, "c-other", Some("+15550199")).await;

        let store = f.store.clone();
        let worker = f.worker.with_batch_size(2);
        for i in 0..4 {
            worker.tick(noon() + Duration::minutes(10 * i)).await.unwrap();
        }

        let waiting = store.enrollments.get(waiting.id).await.unwrap().unwrap();
        assert_eq!(waiting.status, EnrollmentStatus::Completed);
        assert_eq!(
            store
                .sends
                .count_initiated_since(throttled.id, noon() - Duration::hours(1))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_unsent_failures_do_not_use_throttle() {
        let f = fixture();
        let sequence = active_sequence(&f, 1, vec![step(1, Channel::Call, 0, None)]).await;
        enroll_due(&f, &sequence, "c-no-phone", None, noon() - Duration::minutes(5)).await;
        let reachable = enroll(&f, &sequence, "c-phone", Some("+15550100")).await;

        let summary = f.worker.tick(noon()).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.throttled, 0);

        let reachable = f.store.enrollments.get(reachable.id).await.unwrap().unwrap();
        assert_eq!(reachable.status, EnrollmentStatus::Completed);
    }

    /// Send repository that errors on throttle counts for one sequence
    struct FlakySends {
        inner: Arc<dyn SendRepository>,
        broken: SequenceId,
    }

    #[async_trait]
    impl SendRepository for FlakySends {
        async fn claim(&self, input: NewSend) -> Result<Option<ScheduledSend>> {
            self.inner.claim(input).await
        }

        async fn claim_unsent(&self, input: NewSend, error: &str) -> Result<Option<ScheduledSend>> {
            self.inner.claim_unsent(input, error).await
        }

        async fn get(&self, tenant_id: TenantId, id: Uuid) -> Result<Option<ScheduledSend>> {
            self.inner.get(tenant_id, id).await
        }

        async fn mark_sent(
            &self,
            id: Uuid,
            provider_id: Option<String>,
            at: DateTime<Utc>,
        ) -> Result<()> {
            self.inner.mark_sent(id, provider_id, at).await
        }

        async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
            self.inner.mark_failed(id, error).await
        }

        async fn mark_delivery(
            &self,
            tenant_id: TenantId,
            id: Uuid,
            delivered: bool,
            error: Option<String>,
            at: DateTime<Utc>,
        ) -> Result<Option<ScheduledSend>> {
            self.inner.mark_delivery(tenant_id, id, delivered, error, at).await
        }

        async fn mark_replied(
            &self,
            tenant_id: TenantId,
            sequence_id: SequenceId,
            contact_id: &ContactId,
            at: DateTime<Utc>,
        ) -> Result<Option<ScheduledSend>> {
            self.inner.mark_replied(tenant_id, sequence_id, contact_id, at).await
        }

        async fn count_initiated_since(
            &self,
            sequence_id: SequenceId,
            since: DateTime<Utc>,
        ) -> Result<i64> {
            if sequence_id == self.broken {
                return Err(cloudgreet_common::Error::Database("transient".to_string()));
            }
            self.inner.count_initiated_since(sequence_id, since).await
        }

        async fn oldest_initiated_since(
            &self,
            sequence_id: SequenceId,
            since: DateTime<Utc>,
        ) -> Result<Option<DateTime<Utc>>> {
            self.inner.oldest_initiated_since(sequence_id, since).await
        }

        async fn channel_counts(
            &self,
            tenant_id: TenantId,
            since: DateTime<Utc>,
        ) -> Result<Vec<ChannelCounts>> {
            self.inner.channel_counts(tenant_id, since).await
        }
    }

    #[tokio::test]
    async fn test_store_error_on_one_enrollment_does_not_abort_tick() {
        let f = fixture();
        let broken = active_sequence(&f, 50, vec![step(1, Channel::Call, 0, None)]).await;
        let healthy = active_sequence(&f, 50, vec![step(1, Channel::Call, 0, None)]).await;
        let stuck = enroll_due(
            &f,
            &broken,
            "c-1",
            Some("+15550100"),
            noon() - Duration::minutes(30),
        )
        .await;
        let fine = enroll(&f, &healthy, "c-2", Some("+15550101")).await;

        let mut store = f.store.clone();
        store.sends = Arc::new(FlakySends {
            inner: f.store.sends.clone(),
            broken: broken.id,
        });
        let worker = SequenceWorker::new(store, dispatchers(&f.dispatcher)).unwrap();

        let summary = worker.tick(noon()).await.unwrap();
        assert_eq!(summary.due, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.dispatched, 1);

        let fine = f.store.enrollments.get(fine.id).await.unwrap().unwrap();
        assert_eq!(fine.status, EnrollmentStatus::Completed);
        let stuck = f.store.enrollments.get(stuck.id).await.unwrap().unwrap();
        assert_eq!(stuck.status, EnrollmentStatus::Active);
        assert_eq!(stuck.next_step_order, 1);
    }

    #[tokio::test]
    async fn test_missing_address_records_failure_and_advances() {
        let f = fixture();
        let sequence = active_sequence(
            &f,
            50,
            vec![step(1, Channel::Call, 0, None), step(2, Channel::Call, 5, None)],
        )
        .await;
        let enrollment = enroll(&f, &sequence, "c-1", None).await;

        let summary = f.worker.tick(noon()).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert!(f.dispatcher.sent.lock().unwrap().is_empty());

        let enrollment = f.store.enrollments.get(enrollment.id).await.unwrap().unwrap();
        assert_eq!(enrollment.next_step_order, 2);
    }

    #[tokio::test]
    async fn test_opted_out_contact_is_stopped() {
        let f = fixture();
        let sequence = active_sequence(&f, 50, vec![step(1, Channel::Call, 0, None)]).await;
        let enrollment = enroll(&f, &sequence, "c-1", Some("+1 (555) 0100")).await;
        f.store
            .opt_outs
            .create(NewOptOut {
                tenant_id: f.tenant_id,
                channel: Channel::Call,
                address: "+15550100".to_string(),
                source: OptOutSource::Manual,
                reason: None,
            })
            .await
            .unwrap();

        let summary = f.worker.tick(noon()).await.unwrap();
        assert_eq!(summary.opted_out, 1);
        assert!(f.dispatcher.sent.lock().unwrap().is_empty());

        let enrollment = f.store.enrollments.get(enrollment.id).await.unwrap().unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::OptedOut);
    }

    #[tokio::test]
    async fn test_dispatch_failure_marks_send_failed() {
        let f = fixture_with(true);
        let sequence = active_sequence(&f, 50, vec![step(1, Channel::Call, 0, None)]).await;
        enroll(&f, &sequence, "c-1", Some("+15550100")).await;

        let summary = f.worker.tick(noon()).await.unwrap();
        assert_eq!(summary.failed, 1);

        let sent = f.dispatcher.sent.lock().unwrap().clone();
        let stored = f.store.sends.get(f.tenant_id, sent[0].send_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SendStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("Dispatch error: gateway down"));
    }

    #[tokio::test]
    async fn test_paused_sequence_is_not_processed() {
        let f = fixture();
        let sequence = active_sequence(&f, 50, vec![step(1, Channel::Call, 0, None)]).await;
        enroll(&f, &sequence, "c-1", Some("+15550100")).await;
        f.store
            .sequences
            .transition(
                f.tenant_id,
                sequence.id,
                SequenceStatus::Active,
                SequenceStatus::Paused,
            )
            .await
            .unwrap();

        let summary = f.worker.tick(noon()).await.unwrap();
        assert_eq!(summary.due, 0);
        assert!(f.dispatcher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let f = fixture();
        let worker = Arc::new(f.worker.with_poll_interval(1));
        let cancel = CancellationToken::new();

        let task = {
            let worker = worker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { worker.run(cancel).await })
        };

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
