//! AI receptionist settings

use cloudgreet_common::types::TenantId;
use cloudgreet_common::{Error, Result};
use cloudgreet_storage::models::{AiSettings, Tone};
use cloudgreet_storage::repository::SettingsRepository;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub const MAX_MESSAGE_LENGTH: usize = 500;
pub const MIN_CALL_MINUTES: i32 = 1;
pub const MAX_CALL_MINUTES: i32 = 60;

/// AI settings update; absent fields keep their current value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettingsInput {
    pub tone: Option<Tone>,
    pub greeting_message: Option<String>,
    pub escalation_threshold: Option<f64>,
    pub after_hours_message: Option<String>,
    pub max_call_minutes: Option<i32>,
}

/// Validate AI settings
pub fn validate_ai_settings(settings: &AiSettings) -> Result<()> {
    let greeting = settings.greeting_message.trim();
    if greeting.is_empty() {
        return Err(Error::validation("Greeting message is required"));
    }
    if greeting.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(Error::validation(format!(
            "Greeting message must be at most {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }
    if !(0.0..=1.0).contains(&settings.escalation_threshold) {
        return Err(Error::validation(
            "Escalation threshold must be between 0 and 1",
        ));
    }
    if let Some(message) = &settings.after_hours_message {
        if message.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(Error::validation(format!(
                "After-hours message must be at most {} characters",
                MAX_MESSAGE_LENGTH
            )));
        }
    }
    if !(MIN_CALL_MINUTES..=MAX_CALL_MINUTES).contains(&settings.max_call_minutes) {
        return Err(Error::validation(format!(
            "Max call minutes must be between {} and {}",
            MIN_CALL_MINUTES, MAX_CALL_MINUTES
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct AiSettingsService {
    settings: Arc<dyn SettingsRepository>,
}

impl AiSettingsService {
    pub fn new(settings: Arc<dyn SettingsRepository>) -> Self {
        Self { settings }
    }

    /// Stored settings, or the defaults when none were saved
    pub async fn get(&self, tenant_id: TenantId) -> Result<AiSettings> {
        Ok(self
            .settings
            .get_ai_settings(tenant_id)
            .await?
            .unwrap_or_else(|| AiSettings::defaults(tenant_id)))
    }

    pub async fn put(&self, tenant_id: TenantId, input: AiSettingsInput) -> Result<AiSettings> {
        let mut settings = self.get(tenant_id).await?;
        if let Some(tone) = input.tone {
            settings.tone = tone;
        }
        if let Some(greeting) = input.greeting_message {
            settings.greeting_message = greeting.trim().to_string();
        }
        if let Some(threshold) = input.escalation_threshold {
            settings.escalation_threshold = threshold;
        }
        if let Some(message) = input.after_hours_message {
            let message = message.trim().to_string();
            settings.after_hours_message = Some(message).filter(|m| !m.is_empty());
        }
        if let Some(minutes) = input.max_call_minutes {
            settings.max_call_minutes = minutes;
        }

        validate_ai_settings(&settings)?;

        let saved = self.settings.put_ai_settings(settings).await?;
        info!(tenant_id = %tenant_id, tone = %saved.tone, "AI settings saved");
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudgreet_storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn service() -> AiSettingsService {
        AiSettingsService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_defaults_when_unset() {
        let settings = service().get(Uuid::new_v4()).await.unwrap();
        assert_eq!(settings.tone, Tone::Professional);
        assert_eq!(settings.max_call_minutes, 10);
        assert!(settings.updated_at.is_none());
    }

    #[tokio::test]
    async fn test_put_merges_and_persists() {
        let service = service();
        let tenant_id = Uuid::new_v4();

        let saved = service
            .put(
                tenant_id,
                AiSettingsInput {
                    tone: Some(Tone::Friendly),
                    greeting_message: Some(" Hey there! ".to_string()),
                    ..AiSettingsInput::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(saved.greeting_message, "Hey there!");
        assert_eq!(saved.escalation_threshold, 0.7);

        let fetched = service.get(tenant_id).await.unwrap();
        assert_eq!(fetched.tone, Tone::Friendly);
        assert!(fetched.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_put_rejects_out_of_range() {
        let service = service();
        let tenant_id = Uuid::new_v4();

        for input in [
            AiSettingsInput {
                escalation_threshold: Some(1.5),
                ..AiSettingsInput::default()
            },
            AiSettingsInput {
                max_call_minutes: Some(0),
                ..AiSettingsInput::default()
            },
            AiSettingsInput {
                greeting_message: Some("   ".to_string()),
                ..AiSettingsInput::default()
            },
            AiSettingsInput {
                after_hours_message: Some("x".repeat(501)),
                ..AiSettingsInput::default()
            },
        ] {
            let err = service.put(tenant_id, input).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }

        assert!(service.get(tenant_id).await.unwrap().updated_at.is_none());
    }
}
