//! Client payloads for templates and sequences

use cloudgreet_common::types::{Channel, SequenceStatus};
use cloudgreet_storage::models::{Sequence, StepInput, Template};
use serde::Deserialize;

pub const DEFAULT_THROTTLE_PER_DAY: i32 = 50;
pub const DEFAULT_WINDOW_START: &str = "09:00";
pub const DEFAULT_WINDOW_END: &str = "17:00";
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

fn default_throttle() -> i32 {
    DEFAULT_THROTTLE_PER_DAY
}

fn default_window_start() -> String {
    DEFAULT_WINDOW_START.to_string()
}

fn default_window_end() -> String {
    DEFAULT_WINDOW_END.to_string()
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_true() -> bool {
    true
}

/// Template creation payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDraft {
    #[serde(default)]
    pub name: String,
    pub channel: Channel,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub compliance_footer: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
}

/// Partial template update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePatch {
    pub name: Option<String>,
    pub channel: Option<Channel>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub compliance_footer: Option<String>,
    pub is_active: Option<bool>,
    pub is_default: Option<bool>,
}

impl TemplatePatch {
    /// Merge onto a stored template. Channel changes are rejected by
    /// validation, not here.
    pub fn apply(self, template: &Template) -> Template {
        let mut merged = template.clone();
        if let Some(name) = self.name {
            merged.name = name;
        }
        if let Some(subject) = self.subject {
            merged.subject = Some(subject);
        }
        if let Some(body) = self.body {
            merged.body = body;
        }
        if let Some(footer) = self.compliance_footer {
            merged.compliance_footer = footer;
        }
        if let Some(active) = self.is_active {
            merged.is_active = active;
        }
        if let Some(default) = self.is_default {
            merged.is_default = default;
        }
        if !merged.is_active {
            merged.is_default = false;
        }
        merged
    }
}

/// Full sequence payload (create)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_throttle")]
    pub throttle_per_day: i32,
    #[serde(default = "default_window_start")]
    pub send_window_start: String,
    #[serde(default = "default_window_end")]
    pub send_window_end: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_true")]
    pub auto_pause_on_reply: bool,
    #[serde(default)]
    pub steps: Vec<StepInput>,
}

impl SequenceDraft {
    /// A draft with defaults and the given steps
    pub fn new(name: impl Into<String>, steps: Vec<StepInput>) -> Self {
        Self {
            name: name.into(),
            description: None,
            throttle_per_day: DEFAULT_THROTTLE_PER_DAY,
            send_window_start: default_window_start(),
            send_window_end: default_window_end(),
            timezone: default_timezone(),
            auto_pause_on_reply: true,
            steps,
        }
    }

    /// Current state of a stored sequence
    pub fn from_sequence(sequence: &Sequence) -> Self {
        Self {
            name: sequence.name.clone(),
            description: sequence.description.clone(),
            throttle_per_day: sequence.throttle_per_day,
            send_window_start: sequence.send_window_start.clone(),
            send_window_end: sequence.send_window_end.clone(),
            timezone: sequence.timezone.clone(),
            auto_pause_on_reply: sequence.auto_pause_on_reply,
            steps: sequence.step_inputs(),
        }
    }
}

/// Partial sequence update (PATCH)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub throttle_per_day: Option<i32>,
    pub send_window_start: Option<String>,
    pub send_window_end: Option<String>,
    pub timezone: Option<String>,
    pub auto_pause_on_reply: Option<bool>,
    pub steps: Option<Vec<StepInput>>,
    pub status: Option<SequenceStatus>,
}

impl SequencePatch {
    /// Patch carrying only a status change
    pub fn status(status: SequenceStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Whether any field other than `status` is present
    pub fn has_field_changes(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.throttle_per_day.is_some()
            || self.send_window_start.is_some()
            || self.send_window_end.is_some()
            || self.timezone.is_some()
            || self.auto_pause_on_reply.is_some()
            || self.steps.is_some()
    }

    /// Merge the field changes onto a draft
    pub fn apply(&self, mut draft: SequenceDraft) -> SequenceDraft {
        if let Some(name) = &self.name {
            draft.name = name.clone();
        }
        if let Some(description) = &self.description {
            draft.description = Some(description.clone()).filter(|d| !d.trim().is_empty());
        }
        if let Some(throttle) = self.throttle_per_day {
            draft.throttle_per_day = throttle;
        }
        if let Some(start) = &self.send_window_start {
            draft.send_window_start = start.clone();
        }
        if let Some(end) = &self.send_window_end {
            draft.send_window_end = end.clone();
        }
        if let Some(timezone) = &self.timezone {
            draft.timezone = timezone.clone();
        }
        if let Some(auto_pause) = self.auto_pause_on_reply {
            draft.auto_pause_on_reply = auto_pause;
        }
        if let Some(steps) = &self.steps {
            draft.steps = steps.clone();
        }
        draft
    }
}
