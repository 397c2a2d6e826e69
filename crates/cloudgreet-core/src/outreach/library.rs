//! Template Library - validated template authoring

use super::drafts::{TemplateDraft, TemplatePatch};
use super::validation::validate_template;
use cloudgreet_common::types::{Channel, TemplateId, TenantId};
use cloudgreet_common::{Error, Result};
use cloudgreet_storage::models::{CreateTemplate, Template};
use cloudgreet_storage::repository::TemplateRepository;
use std::sync::Arc;
use tracing::info;

/// Template library
#[derive(Clone)]
pub struct TemplateLibrary {
    templates: Arc<dyn TemplateRepository>,
}

impl TemplateLibrary {
    pub fn new(templates: Arc<dyn TemplateRepository>) -> Self {
        Self { templates }
    }

    /// Validate and persist a new template
    pub async fn create(&self, tenant_id: TenantId, draft: TemplateDraft) -> Result<Template> {
        validate_template(
            &draft.name,
            draft.channel,
            draft.subject.as_deref(),
            &draft.body,
        )?;

        let subject = match draft.channel {
            Channel::Email => draft.subject.map(|s| s.trim().to_string()),
            _ => None,
        };

        let template = self
            .templates
            .create(CreateTemplate {
                tenant_id,
                name: draft.name.trim().to_string(),
                channel: draft.channel,
                subject,
                body: draft.body,
                compliance_footer: draft.compliance_footer,
                is_active: draft.is_active,
                is_default: draft.is_default && draft.is_active,
            })
            .await?;

        info!(
            tenant_id = %tenant_id,
            template_id = %template.id,
            channel = %template.channel,
            "Template created"
        );

        Ok(template)
    }

    /// Merge a patch onto a template and re-validate
    pub async fn update(
        &self,
        tenant_id: TenantId,
        id: TemplateId,
        patch: TemplatePatch,
    ) -> Result<Template> {
        let current = self.get(tenant_id, id).await?;

        if let Some(channel) = patch.channel {
            if channel != current.channel {
                return Err(Error::validation("Template channel cannot be changed"));
            }
        }

        let mut merged = patch.apply(&current);
        merged.name = merged.name.trim().to_string();
        if merged.channel != Channel::Email {
            merged.subject = None;
        }

        validate_template(
            &merged.name,
            merged.channel,
            merged.subject.as_deref(),
            &merged.body,
        )?;

        self.templates.update(&merged).await
    }

    /// Fetch a template of the tenant
    pub async fn get(&self, tenant_id: TenantId, id: TemplateId) -> Result<Template> {
        self.templates
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| Error::not_found("Template"))
    }

    /// List templates, oldest first
    pub async fn list(
        &self,
        tenant_id: TenantId,
        channel: Option<Channel>,
        active: Option<bool>,
    ) -> Result<Vec<Template>> {
        self.templates.list(tenant_id, channel, active).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudgreet_storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn draft(channel: Channel, name: &str, is_default: bool) -> TemplateDraft {
        TemplateDraft {
            name: name.to_string(),
            channel,
            subject: Some("Quick question".to_string()),
            body: "Hi {{first_name}}".to_string(),
            compliance_footer: String::new(),
            is_active: true,
            is_default,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_drops_sms_subject() {
        let library = TemplateLibrary::new(Arc::new(MemoryStore::new()));
        let tenant_id = Uuid::new_v4();

        let template = library
            .create(tenant_id, draft(Channel::Sms, "  Text intro ", false))
            .await
            .unwrap();
        assert_eq!(template.name, "Text intro");
        assert_eq!(template.subject, None);

        let fetched = library.get(tenant_id, template.id).await.unwrap();
        assert_eq!(fetched.id, template.id);
    }

    #[tokio::test]
    async fn test_create_rejects_email_without_subject() {
        let library = TemplateLibrary::new(Arc::new(MemoryStore::new()));
        let mut input = draft(Channel::Email, "Intro", false);
        input.subject = Some("   ".to_string());

        let err = library.create(Uuid::new_v4(), input).await.unwrap_err();
        assert_eq!(err.to_string(), "Email templates require a subject");
        assert!(library
            .list(Uuid::new_v4(), None, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_single_default_per_channel() {
        let library = TemplateLibrary::new(Arc::new(MemoryStore::new()));
        let tenant_id = Uuid::new_v4();

        let first = library
            .create(tenant_id, draft(Channel::Email, "First", true))
            .await
            .unwrap();
        let second = library
            .create(tenant_id, draft(Channel::Email, "Second", true))
            .await
            .unwrap();
        let sms = library
            .create(tenant_id, draft(Channel::Sms, "Text", true))
            .await
            .unwrap();

        let first = library.get(tenant_id, first.id).await.unwrap();
        assert!(!first.is_default);
        assert!(library.get(tenant_id, second.id).await.unwrap().is_default);
        assert!(library.get(tenant_id, sms.id).await.unwrap().is_default);
    }

    #[tokio::test]
    async fn test_update_rejects_channel_change() {
        let library = TemplateLibrary::new(Arc::new(MemoryStore::new()));
        let tenant_id = Uuid::new_v4();
        let template = library
            .create(tenant_id, draft(Channel::Email, "Intro", false))
            .await
            .unwrap();

        let err = library
            .update(
                tenant_id,
                template.id,
                TemplatePatch {
                    channel: Some(Channel::Sms),
                    ..TemplatePatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let updated = library
            .update(
                tenant_id,
                template.id,
                TemplatePatch {
                    body: Some("New body".to_string()),
                    is_active: Some(false),
                    ..TemplatePatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.body, "New body");
        assert!(!updated.is_active);
    }

    #[tokio::test]
    async fn test_missing_template_is_not_found() {
        let library = TemplateLibrary::new(Arc::new(MemoryStore::new()));
        let err = library
            .get(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
