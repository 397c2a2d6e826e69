//! Template Renderer - Handles personalization of outreach content

use cloudgreet_common::types::Channel;
use cloudgreet_common::{Error, Result};
use cloudgreet_storage::models::{Enrollment, Template};
use regex::{Captures, Regex};

/// Rendered step content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: Option<String>,
    pub body: String,
}

/// Template renderer for personalizing step content
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    placeholder: Regex,
}

impl TemplateRenderer {
    /// Create a new template renderer
    pub fn new() -> Result<Self> {
        let placeholder = Regex::new(r"\{\{\s*([a-zA-Z0-9_.]+)\s*\}\}")
            .map_err(|e| Error::Internal(format!("Invalid placeholder pattern: {}", e)))?;
        Ok(Self { placeholder })
    }

    /// Render a template for an enrolled contact
    pub fn render(&self, template: &Template, enrollment: &Enrollment) -> RenderedMessage {
        let subject = template
            .subject
            .as_deref()
            .map(|subject| self.substitute(subject, enrollment))
            .filter(|subject| !subject.trim().is_empty());

        let mut body = self.substitute(&template.body, enrollment);
        let footer = template.compliance_footer.trim();
        if !footer.is_empty() {
            let separator = match template.channel {
                Channel::Email => "\n\n",
                _ => "\n",
            };
            body.push_str(separator);
            body.push_str(footer);
        }

        RenderedMessage { subject, body }
    }

    /// Replace known placeholders and drop unknown ones
    pub fn substitute(&self, content: &str, enrollment: &Enrollment) -> String {
        self.placeholder
            .replace_all(content, |caps: &Captures| {
                let value = match &caps[1] {
                    "first_name" => enrollment.first_name.as_deref(),
                    "company" => enrollment.company.as_deref(),
                    "email" => enrollment.email.as_deref(),
                    "phone" => enrollment.phone.as_deref(),
                    _ => None,
                };
                value.unwrap_or("").to_string()
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cloudgreet_storage::models::EnrollmentStatus;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn enrollment() -> Enrollment {
        Enrollment {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            sequence_id: Uuid::new_v4(),
            contact_id: "contact-1".to_string(),
            email: Some("dana@example.com".to_string()),
            phone: None,
            first_name: Some("Dana".to_string()),
            company: Some("Acme Plumbing".to_string()),
            status: EnrollmentStatus::Active,
            next_step_order: 1,
            next_due_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn template(channel: Channel, body: &str, footer: &str) -> Template {
        Template {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Intro".to_string(),
            channel,
            subject: Some("Hi {{first_name}}".to_string()),
            body: body.to_string(),
            compliance_footer: footer.to_string(),
            is_active: true,
            is_default: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_email_with_footer() {
        let renderer = TemplateRenderer::new().unwrap();
        let rendered = renderer.render(
            &template(
                Channel::Email,
                "Hello {{ first_name }} from {{company}}",
                "Reply STOP to opt out",
            ),
            &enrollment(),
        );

        assert_eq!(rendered.subject.as_deref(), Some("Hi Dana"));
        assert_eq!(
            rendered.body,
            "Hello Dana from Acme Plumbing\n\nReply STOP to opt out"
        );
    }

    #[test]
    fn test_render_sms_footer_single_newline() {
        let renderer = TemplateRenderer::new().unwrap();
        let rendered = renderer.render(
            &template(Channel::Sms, "Hi {{first_name}}", "STOP to end"),
            &enrollment(),
        );
        assert_eq!(rendered.body, "Hi Dana\nSTOP to end");
    }

    #[test]
    fn test_unknown_and_missing_placeholders_removed() {
        let renderer = TemplateRenderer::new().unwrap();
        let rendered = renderer.render(
            &template(Channel::Sms, "Call {{phone}} re {{attributes.deal}}", "  "),
            &enrollment(),
        );
        assert_eq!(rendered.body, "Call  re ");
    }
}
