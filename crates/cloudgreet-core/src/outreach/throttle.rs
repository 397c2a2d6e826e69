//! Throttle Gate - bounds new step-sends per sequence per rolling 24 hours

use chrono::{DateTime, Duration, Utc};
use cloudgreet_common::Result;
use cloudgreet_storage::models::Sequence;
use cloudgreet_storage::repository::SendRepository;
use std::sync::Arc;
use tracing::debug;

/// Length of the throttle window
pub fn throttle_window() -> Duration {
    Duration::hours(24)
}

/// Throttle gate backed by send records
///
/// Counts are read from the send table, so every worker sees every other
/// worker's claims.
#[derive(Clone)]
pub struct ThrottleGate {
    sends: Arc<dyn SendRepository>,
}

impl ThrottleGate {
    pub fn new(sends: Arc<dyn SendRepository>) -> Self {
        Self { sends }
    }

    /// Sends still allowed for the sequence in the window ending at `now`
    pub async fn remaining(&self, sequence: &Sequence, now: DateTime<Utc>) -> Result<i64> {
        let used = self
            .sends
            .count_initiated_since(sequence.id, now - throttle_window())
            .await?;
        Ok((i64::from(sequence.throttle_per_day) - used).max(0))
    }

    /// Check if one more send is allowed for the sequence
    pub async fn check_allowed(&self, sequence: &Sequence, now: DateTime<Utc>) -> Result<bool> {
        let remaining = self.remaining(sequence, now).await?;
        if remaining == 0 {
            debug!(
                sequence_id = %sequence.id,
                limit = sequence.throttle_per_day,
                "Throttle exhausted for sequence"
            );
        }
        Ok(remaining > 0)
    }

    /// First instant after the oldest counted send has left the window
    pub async fn reopens_at(&self, sequence: &Sequence, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let oldest = self
            .sends
            .oldest_initiated_since(sequence.id, now - throttle_window())
            .await?;
        Ok(oldest
            .map_or(now, |at| at + throttle_window() + Duration::seconds(1))
            .max(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudgreet_common::types::{Channel, SequenceStatus};
    use cloudgreet_storage::models::{NewEnrollment, NewSend, NewSequence, StepInput};
    use cloudgreet_storage::repository::{EnrollmentRepository, SequenceRepository};
    use cloudgreet_storage::MemoryStore;

    #[tokio::test]
    async fn test_rolling_window() {
        let store = Arc::new(MemoryStore::new());
        let tenant_id = uuid::Uuid::new_v4();
        let sequence = SequenceRepository::create(
            store.as_ref(),
            NewSequence {
                tenant_id,
                name: "Throttled".to_string(),
                description: None,
                throttle_per_day: 1,
                send_window_start: "00:00".to_string(),
                send_window_end: "23:59".to_string(),
                timezone: "UTC".to_string(),
                auto_pause_on_reply: true,
                steps: vec![StepInput {
                    step_order: 1,
                    channel: Channel::Call,
                    wait_minutes: 0,
                    template_id: None,
                }],
            },
        )
        .await
        .unwrap();
        assert_eq!(sequence.status, SequenceStatus::Draft);

        let gate = ThrottleGate::new(store.clone());
        let first_send = Utc::now() - Duration::hours(2);
        assert!(gate.check_allowed(&sequence, first_send).await.unwrap());

        let enrollment = EnrollmentRepository::create(
            store.as_ref(),
            NewEnrollment {
                tenant_id,
                sequence_id: sequence.id,
                contact_id: "c-1".to_string(),
                email: None,
                phone: Some("+15550100".to_string()),
                first_name: None,
                company: None,
                next_due_at: first_send,
            },
        )
        .await
        .unwrap();

        store
            .claim(NewSend {
                tenant_id,
                sequence_id: sequence.id,
                enrollment_id: enrollment.id,
                contact_id: "c-1".to_string(),
                step_order: 1,
                channel: Channel::Call,
                recipient: "+15550100".to_string(),
                subject: None,
                body: String::new(),
                initiated_at: first_send,
            })
            .await
            .unwrap();

        let now = Utc::now();
        assert!(!gate.check_allowed(&sequence, now).await.unwrap());
        assert_eq!(gate.remaining(&sequence, now).await.unwrap(), 0);

        let next_day = gate.reopens_at(&sequence, now).await.unwrap();
        assert_eq!(next_day, first_send + Duration::hours(24) + Duration::seconds(1));
        assert!(!gate.check_allowed(&sequence, next_day - Duration::seconds(1)).await.unwrap());
        assert!(gate.check_allowed(&sequence, next_day).await.unwrap());
    }
}
