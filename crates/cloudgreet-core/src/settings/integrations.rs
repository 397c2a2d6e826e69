//! Integration credentials, encrypted at rest

use super::cipher::{mask_secret, CredentialCipher};
use chrono::{DateTime, Utc};
use cloudgreet_common::types::TenantId;
use cloudgreet_common::{Error, Result};
use cloudgreet_storage::models::{IntegrationProvider, IntegrationRecord};
use cloudgreet_storage::repository::SettingsRepository;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Providers listed to the dashboard, in display order
pub const PROVIDERS: [IntegrationProvider; 6] = [
    IntegrationProvider::Telnyx,
    IntegrationProvider::Openai,
    IntegrationProvider::Apollo,
    IntegrationProvider::Clearbit,
    IntegrationProvider::GoogleCalendar,
    IntegrationProvider::Smtp,
];

const MAX_FIELD_NAME_LENGTH: usize = 64;
const MAX_FIELD_VALUE_LENGTH: usize = 4096;

/// Masked view of one provider's credentials
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationView {
    pub provider: IntegrationProvider,
    pub configured: bool,
    pub fields: BTreeMap<String, String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Credential upsert; an empty value removes the field
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationUpsert {
    pub provider: IntegrationProvider,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct IntegrationService {
    settings: Arc<dyn SettingsRepository>,
    cipher: CredentialCipher,
}

impl IntegrationService {
    pub fn new(settings: Arc<dyn SettingsRepository>, cipher: CredentialCipher) -> Self {
        Self { settings, cipher }
    }

    fn view(&self, provider: IntegrationProvider, record: Option<&IntegrationRecord>) -> IntegrationView {
        let Some(record) = record else {
            return IntegrationView {
                provider,
                configured: false,
                fields: BTreeMap::new(),
                updated_at: None,
            };
        };

        let fields = record
            .fields
            .iter()
            .map(|(name, ciphertext)| {
                let masked = match self.cipher.decrypt(ciphertext) {
                    Ok(plaintext) => mask_secret(&plaintext),
                    Err(e) => {
                        warn!(provider = %provider, field = %name, error = %e, "Stored credential unreadable");
                        mask_secret("")
                    }
                };
                (name.clone(), masked)
            })
            .collect::<BTreeMap<_, _>>();

        IntegrationView {
            provider,
            configured: !fields.is_empty(),
            fields,
            updated_at: Some(record.updated_at),
        }
    }

    /// Every provider with masked credentials
    pub async fn list(&self, tenant_id: TenantId) -> Result<Vec<IntegrationView>> {
        let records = self.settings.list_integrations(tenant_id).await?;
        Ok(PROVIDERS
            .iter()
            .map(|provider| {
                let record = records.iter().find(|r| r.provider == *provider);
                self.view(*provider, record)
            })
            .collect())
    }

    /// Merge fields into the provider's credentials
    pub async fn upsert(
        &self,
        tenant_id: TenantId,
        input: IntegrationUpsert,
        now: DateTime<Utc>,
    ) -> Result<IntegrationView> {
        if input.fields.is_empty() {
            return Err(Error::validation("At least one credential field is required"));
        }

        let mut fields = self
            .settings
            .get_integration(tenant_id, input.provider)
            .await?
            .map(|r| r.fields)
            .unwrap_or_default();

        for (name, value) in input.fields {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(Error::validation("Credential field name is required"));
            }
            if name.chars().count() > MAX_FIELD_NAME_LENGTH {
                return Err(Error::validation(format!(
                    "Credential field name must be at most {} characters",
                    MAX_FIELD_NAME_LENGTH
                )));
            }

            let value = value.trim();
            if value.is_empty() {
                fields.remove(&name);
                continue;
            }
            if value.len() > MAX_FIELD_VALUE_LENGTH {
                return Err(Error::validation(format!(
                    "Credential {} is too long",
                    name
                )));
            }
            fields.insert(name, self.cipher.encrypt(value)?);
        }

        let record = self
            .settings
            .put_integration(IntegrationRecord {
                tenant_id,
                provider: input.provider,
                fields,
                updated_at: now,
            })
            .await?;

        info!(
            tenant_id = %tenant_id,
            provider = %record.provider,
            fields = record.fields.len(),
            "Integration credentials saved"
        );

        Ok(self.view(record.provider, Some(&record)))
    }

    /// Decrypted credentials for server-side use
    pub async fn reveal(
        &self,
        tenant_id: TenantId,
        provider: IntegrationProvider,
    ) -> Result<BTreeMap<String, String>> {
        let Some(record) = self.settings.get_integration(tenant_id, provider).await? else {
            return Ok(BTreeMap::new());
        };
        record
            .fields
            .iter()
            .map(|(name, ciphertext)| Ok((name.clone(), self.cipher.decrypt(ciphertext)?)))
            .collect()
    }
}
