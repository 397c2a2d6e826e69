//! Validation for templates and sequences
//!
//! Each entity has one entry point that reports only the first failing
//! constraint, before anything is written.

use super::drafts::SequenceDraft;
use super::steps::StepList;
use chrono::NaiveTime;
use chrono_tz::Tz;
use cloudgreet_common::types::{Channel, TemplateId};
use cloudgreet_common::{Error, Result};
use cloudgreet_storage::models::{StepInput, Template};
use std::collections::HashMap;

pub const MIN_THROTTLE_PER_DAY: i32 = 1;
pub const MAX_THROTTLE_PER_DAY: i32 = 1000;
pub const MAX_NAME_LENGTH: usize = 200;

/// Validate template content for a channel
pub fn validate_template(
    name: &str,
    channel: Channel,
    subject: Option<&str>,
    body: &str,
) -> Result<()> {
    if !channel.supports_templates() {
        return Err(Error::validation(
            "Templates are only supported for email and sms",
        ));
    }
    if name.trim().is_empty() {
        return Err(Error::validation("Template name is required"));
    }
    if name.trim().chars().count() > MAX_NAME_LENGTH {
        return Err(Error::validation(format!(
            "Template name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }
    if channel == Channel::Email && subject.map_or(true, |s| s.trim().is_empty()) {
        return Err(Error::validation("Email templates require a subject"));
    }
    if body.trim().is_empty() {
        return Err(Error::validation("Template body is required"));
    }
    Ok(())
}

/// Parse an `HH:MM` wall-clock time
pub fn parse_window_time(value: &str) -> Option<NaiveTime> {
    let bytes = value.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return None;
    }
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

/// Parse an IANA timezone name
pub fn parse_timezone(value: &str) -> Option<Tz> {
    value.parse::<Tz>().ok()
}

/// Order by client `step_order`, renumber `1..N` and drop template ids
/// from call steps
pub fn normalize_steps(steps: Vec<StepInput>) -> Vec<StepInput> {
    StepList::from_unordered(steps)
        .into_vec()
        .into_iter()
        .map(|mut step| {
            if !step.channel.requires_template() {
                step.template_id = None;
            }
            step
        })
        .collect()
}

/// Validate a normalized sequence draft
///
/// `templates` holds the tenant's templates referenced by the steps; any
/// referenced id missing from it is treated as not found.
pub fn validate_sequence(
    draft: &SequenceDraft,
    templates: &HashMap<TemplateId, Template>,
) -> Result<()> {
    if draft.name.trim().is_empty() {
        return Err(Error::validation("Sequence name is required"));
    }
    if draft.name.trim().chars().count() > MAX_NAME_LENGTH {
        return Err(Error::validation(format!(
            "Sequence name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }
    if !(MIN_THROTTLE_PER_DAY..=MAX_THROTTLE_PER_DAY).contains(&draft.throttle_per_day) {
        return Err(Error::validation(format!(
            "Throttle must be between {} and {} sends per day",
            MIN_THROTTLE_PER_DAY, MAX_THROTTLE_PER_DAY
        )));
    }

    let start = parse_window_time(&draft.send_window_start).ok_or_else(|| {
        Error::validation(format!(
            "Invalid send window start: {} (expected HH:MM)",
            draft.send_window_start
        ))
    })?;
    let end = parse_window_time(&draft.send_window_end).ok_or_else(|| {
        Error::validation(format!(
            "Invalid send window end: {} (expected HH:MM)",
            draft.send_window_end
        ))
    })?;
    if start >= end {
        return Err(Error::validation(
            "Send window start must be before send window end",
        ));
    }

    if parse_timezone(&draft.timezone).is_none() {
        return Err(Error::validation(format!(
            "Unknown timezone: {}",
            draft.timezone
        )));
    }

    if draft.steps.is_empty() {
        return Err(Error::validation("Sequence requires at least one step"));
    }

    for step in &draft.steps {
        validate_step(step, templates)?;
    }

    Ok(())
}

fn validate_step(step: &StepInput, templates: &HashMap<TemplateId, Template>) -> Result<()> {
    let n = step.step_order;

    if step.wait_minutes < 0 {
        return Err(Error::validation(format!(
            "Step {}: wait minutes cannot be negative",
            n
        )));
    }

    if !step.channel.requires_template() {
        return Ok(());
    }

    let template_id = step.template_id.ok_or_else(|| {
        Error::validation(format!(
            "Step {}: {} steps require a template",
            n, step.channel
        ))
    })?;

    let template = templates.get(&template_id).ok_or_else(|| {
        Error::validation(format!("Step {}: template {} not found", n, template_id))
    })?;

    if !template.is_active {
        return Err(Error::validation(format!(
            "Step {}: template {} is disabled",
            n, template.name
        )));
    }
    if template.channel != step.channel {
        return Err(Error::validation(format!(
            "Step {}: template {} is a {} template, not {}",
            n, template.name, template.channel, step.channel
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn template(channel: Channel, active: bool) -> Template {
        Template {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Intro".to_string(),
            channel,
            subject: Some("Hello".to_string()),
            body: "Hi {{first_name}}".to_string(),
            compliance_footer: String::new(),
            is_active: active,
            is_default: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn step(channel: Channel, template_id: Option<TemplateId>) -> StepInput {
        StepInput {
            step_order: 1,
            channel,
            wait_minutes: 0,
            template_id,
        }
    }

    fn library(items: &[&Template]) -> HashMap<TemplateId, Template> {
        items.iter().map(|t| (t.id, (*t).clone())).collect()
    }

    fn message(result: Result<()>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn test_template_rules() {
        assert!(validate_template("Intro", Channel::Email, Some("Hi"), "Body").is_ok());
        assert!(validate_template("Intro", Channel::Sms, None, "Body").is_ok());

        assert_eq!(
            message(validate_template("  ", Channel::Sms, None, "Body")),
            "Template name is required"
        );
        assert_eq!(
            message(validate_template("Intro", Channel::Email, Some(""), "Body")),
            "Email templates require a subject"
        );
        assert_eq!(
            message(validate_template("Intro", Channel::Sms, None, "")),
            "Template body is required"
        );
        assert!(validate_template("Intro", Channel::Call, None, "Body").is_err());
    }

    #[test]
    fn test_window_time_format() {
        assert!(parse_window_time("09:00").is_some());
        assert!(parse_window_time("23:59").is_some());
        assert!(parse_window_time("9:00").is_none());
        assert!(parse_window_time("24:00").is_none());
        assert!(parse_window_time("09:00:00").is_none());
    }

    #[test]
    fn test_steps_require_templates_except_calls() {
        let email = template(Channel::Email, true);
        let templates = library(&[&email]);

        let draft = SequenceDraft::new("Welcome", vec![step(Channel::Email, None)]);
        assert_eq!(
            message(validate_sequence(&draft, &templates)),
            "Step 1: email steps require a template"
        );

        let draft = SequenceDraft::new("Welcome", vec![step(Channel::Sms, None)]);
        assert!(validate_sequence(&draft, &templates).is_err());

        let draft = SequenceDraft::new("Welcome", vec![step(Channel::Call, None)]);
        assert!(validate_sequence(&draft, &templates).is_ok());

        let draft = SequenceDraft::new("Welcome", vec![step(Channel::Email, Some(email.id))]);
        assert!(validate_sequence(&draft, &templates).is_ok());
    }

    #[test]
    fn test_step_template_must_match_and_be_active() {
        let sms = template(Channel::Sms, true);
        let disabled = template(Channel::Email, false);
        let templates = library(&[&sms, &disabled]);

        let draft = SequenceDraft::new("Welcome", vec![step(Channel::Email, Some(sms.id))]);
        assert!(message(validate_sequence(&draft, &templates)).contains("is a sms template"));

        let draft = SequenceDraft::new("Welcome", vec![step(Channel::Email, Some(disabled.id))]);
        assert!(message(validate_sequence(&draft, &templates)).contains("disabled"));

        let draft = SequenceDraft::new("Welcome", vec![step(Channel::Sms, Some(Uuid::new_v4()))]);
        assert!(message(validate_sequence(&draft, &templates)).contains("not found"));
    }

    #[test]
    fn test_sequence_field_rules() {
        let templates = HashMap::new();
        let base = SequenceDraft::new("Welcome", vec![step(Channel::Call, None)]);

        let mut draft = base.clone();
        draft.name = String::new();
        assert_eq!(
            message(validate_sequence(&draft, &templates)),
            "Sequence name is required"
        );

        let mut draft = base.clone();
        draft.throttle_per_day = 0;
        assert!(validate_sequence(&draft, &templates).is_err());
        draft.throttle_per_day = 1001;
        assert!(validate_sequence(&draft, &templates).is_err());
        draft.throttle_per_day = 1000;
        assert!(validate_sequence(&draft, &templates).is_ok());

        let mut draft = base.clone();
        draft.send_window_start = "17:00".to_string();
        draft.send_window_end = "09:00".to_string();
        assert_eq!(
            message(validate_sequence(&draft, &templates)),
            "Send window start must be before send window end"
        );

        let mut draft = base.clone();
        draft.timezone = "Mars/Olympus".to_string();
        assert!(message(validate_sequence(&draft, &templates)).contains("Unknown timezone"));

        let mut draft = base.clone();
        draft.steps.clear();
        assert_eq!(
            message(validate_sequence(&draft, &templates)),
            "Sequence requires at least one step"
        );

        let mut draft = base;
        draft.steps[0].wait_minutes = -5;
        assert!(message(validate_sequence(&draft, &templates)).contains("negative"));
    }

    #[test]
    fn test_normalize_steps_drops_call_templates() {
        let id = Uuid::new_v4();
        let steps = normalize_steps(vec![
            StepInput {
                step_order: 5,
                channel: Channel::Call,
                wait_minutes: 10,
                template_id: Some(id),
            },
            StepInput {
                step_order: 2,
                channel: Channel::Sms,
                wait_minutes: 0,
                template_id: Some(id),
            },
        ]);

        assert_eq!(steps[0].channel, Channel::Sms);
        assert_eq!(steps[0].step_order, 1);
        assert_eq!(steps[0].template_id, Some(id));
        assert_eq!(steps[1].channel, Channel::Call);
        assert_eq!(steps[1].step_order, 2);
        assert_eq!(steps[1].template_id, None);
    }
}
