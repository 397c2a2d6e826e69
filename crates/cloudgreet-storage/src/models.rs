//! Database models

use chrono::{DateTime, Utc};
use cloudgreet_common::types::{
    Channel, ContactId, EnrollmentId, SendId, SequenceId, SequenceStatus, StepId, TemplateId,
    TenantId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Templates
// ============================================================================

/// Reusable email/SMS message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: TemplateId,
    #[serde(skip_serializing)]
    pub tenant_id: TenantId,
    pub name: String,
    pub channel: Channel,
    pub subject: Option<String>,
    pub body: String,
    pub compliance_footer: String,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create template input
#[derive(Debug, Clone)]
pub struct CreateTemplate {
    pub tenant_id: TenantId,
    pub name: String,
    pub channel: Channel,
    pub subject: Option<String>,
    pub body: String,
    pub compliance_footer: String,
    pub is_active: bool,
    pub is_default: bool,
}

// ============================================================================
// Sequences
// ============================================================================

/// One ordered action within a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceStep {
    pub id: StepId,
    pub step_order: i32,
    pub channel: Channel,
    pub wait_minutes: i32,
    pub template_id: Option<TemplateId>,
}

/// Step as written by a client, before ids are assigned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInput {
    #[serde(default)]
    pub step_order: i32,
    pub channel: Channel,
    #[serde(default)]
    pub wait_minutes: i32,
    #[serde(default)]
    pub template_id: Option<TemplateId>,
}

impl From<&SequenceStep> for StepInput {
    fn from(step: &SequenceStep) -> Self {
        Self {
            step_order: step.step_order,
            channel: step.channel,
            wait_minutes: step.wait_minutes,
            template_id: step.template_id,
        }
    }
}

/// Delivery counters derived from send records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceMetrics {
    pub sent: i64,
    pub delivered: i64,
    pub replied: i64,
    pub failed: i64,
}

/// Outreach sequence with its steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sequence {
    pub id: SequenceId,
    #[serde(skip_serializing)]
    pub tenant_id: TenantId,
    pub name: String,
    pub description: Option<String>,
    pub throttle_per_day: i32,
    pub send_window_start: String,
    pub send_window_end: String,
    pub timezone: String,
    pub status: SequenceStatus,
    pub auto_pause_on_reply: bool,
    pub steps: Vec<SequenceStep>,
    pub metrics: SequenceMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sequence {
    /// Step with the given 1-based order
    pub fn step(&self, step_order: i32) -> Option<&SequenceStep> {
        self.steps.iter().find(|s| s.step_order == step_order)
    }

    /// Steps in client input form
    pub fn step_inputs(&self) -> Vec<StepInput> {
        self.steps.iter().map(StepInput::from).collect()
    }
}

/// Create sequence input (already validated and renumbered)
#[derive(Debug, Clone)]
pub struct NewSequence {
    pub tenant_id: TenantId,
    pub name: String,
    pub description: Option<String>,
    pub throttle_per_day: i32,
    pub send_window_start: String,
    pub send_window_end: String,
    pub timezone: String,
    pub auto_pause_on_reply: bool,
    pub steps: Vec<StepInput>,
}

/// Writable sequence fields (already validated and renumbered)
#[derive(Debug, Clone)]
pub struct SequenceChanges {
    pub name: String,
    pub description: Option<String>,
    pub throttle_per_day: i32,
    pub send_window_start: String,
    pub send_window_end: String,
    pub timezone: String,
    pub auto_pause_on_reply: bool,
    pub steps: Vec<StepInput>,
    /// Lifecycle move written together with the fields
    pub status: Option<StatusChange>,
}

/// Compare-and-set of a sequence status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: SequenceStatus,
    pub to: SequenceStatus,
}

/// What a sequence deletion cancelled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub cancelled_sends: u64,
    pub cancelled_enrollments: u64,
}

// ============================================================================
// Enrollments
// ============================================================================

/// Enrollment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Paused,
    Completed,
    OptedOut,
    Cancelled,
}

impl EnrollmentStatus {
    /// Whether the enrollment can still produce sends
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EnrollmentStatus::Completed | EnrollmentStatus::OptedOut | EnrollmentStatus::Cancelled
        )
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrollmentStatus::Active => write!(f, "active"),
            EnrollmentStatus::Paused => write!(f, "paused"),
            EnrollmentStatus::Completed => write!(f, "completed"),
            EnrollmentStatus::OptedOut => write!(f, "opted_out"),
            EnrollmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for EnrollmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EnrollmentStatus::Active),
            "paused" => Ok(EnrollmentStatus::Paused),
            "completed" => Ok(EnrollmentStatus::Completed),
            "opted_out" => Ok(EnrollmentStatus::OptedOut),
            "cancelled" => Ok(EnrollmentStatus::Cancelled),
            _ => Err(format!("Invalid enrollment status: {}", s)),
        }
    }
}

/// A contact's progress through one sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: EnrollmentId,
    #[serde(skip_serializing)]
    pub tenant_id: TenantId,
    pub sequence_id: SequenceId,
    pub contact_id: ContactId,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub company: Option<String>,
    pub status: EnrollmentStatus,
    pub next_step_order: i32,
    pub next_due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    /// Address used for the given channel
    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Email => self.email.as_deref(),
            Channel::Sms | Channel::Call => self.phone.as_deref(),
        }
        .filter(|a| !a.trim().is_empty())
    }
}

/// Create enrollment input
#[derive(Debug, Clone)]
pub struct NewEnrollment {
    pub tenant_id: TenantId,
    pub sequence_id: SequenceId,
    pub contact_id: ContactId,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub company: Option<String>,
    pub next_due_at: DateTime<Utc>,
}

// ============================================================================
// Sends
// ============================================================================

/// Send status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Processing,
    Sent,
    Delivered,
    Failed,
    Cancelled,
}

impl std::fmt::Display for SendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendStatus::Processing => write!(f, "processing"),
            SendStatus::Sent => write!(f, "sent"),
            SendStatus::Delivered => write!(f, "delivered"),
            SendStatus::Failed => write!(f, "failed"),
            SendStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for SendStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(SendStatus::Processing),
            "sent" => Ok(SendStatus::Sent),
            "delivered" => Ok(SendStatus::Delivered),
            "failed" => Ok(SendStatus::Failed),
            "cancelled" => Ok(SendStatus::Cancelled),
            _ => Err(format!("Invalid send status: {}", s)),
        }
    }
}

/// One step dispatched (or being dispatched) to one contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledSend {
    pub id: SendId,
    #[serde(skip_serializing)]
    pub tenant_id: TenantId,
    pub sequence_id: Option<SequenceId>,
    pub enrollment_id: Option<EnrollmentId>,
    pub contact_id: ContactId,
    pub step_order: i32,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub status: SendStatus,
    pub error: Option<String>,
    pub provider_id: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub replied_at: Option<DateTime<Utc>>,
    /// `false` when the step failed before reaching a dispatcher
    pub dispatch_attempted: bool,
}

/// Claim input; `(sequence_id, contact_id, step_order)` is unique
#[derive(Debug, Clone)]
pub struct NewSend {
    pub tenant_id: TenantId,
    pub sequence_id: SequenceId,
    pub enrollment_id: EnrollmentId,
    pub contact_id: ContactId,
    pub step_order: i32,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub initiated_at: DateTime<Utc>,
}

/// Raw counters for one channel over a time range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCounts {
    pub channel: Channel,
    pub total_sent: i64,
    pub delivered: i64,
    pub replies: i64,
    pub failed: i64,
}

impl ChannelCounts {
    pub fn empty(channel: Channel) -> Self {
        Self {
            channel,
            total_sent: 0,
            delivered: 0,
            replies: 0,
            failed: 0,
        }
    }
}

// ============================================================================
// Opt-outs
// ============================================================================

/// Opt-out source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptOutSource {
    Manual,
    Reply,
    Link,
}

impl std::fmt::Display for OptOutSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptOutSource::Manual => write!(f, "manual"),
            OptOutSource::Reply => write!(f, "reply"),
            OptOutSource::Link => write!(f, "link"),
        }
    }
}

impl std::str::FromStr for OptOutSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(OptOutSource::Manual),
            "reply" => Ok(OptOutSource::Reply),
            "link" => Ok(OptOutSource::Link),
            _ => Err(format!("Invalid opt-out source: {}", s)),
        }
    }
}

/// Tenant-level suppression of an address on a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptOut {
    pub id: uuid::Uuid,
    #[serde(skip_serializing)]
    pub tenant_id: TenantId,
    pub channel: Channel,
    pub address: String,
    pub source: OptOutSource,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create opt-out input (address already normalized)
#[derive(Debug, Clone)]
pub struct NewOptOut {
    pub tenant_id: TenantId,
    pub channel: Channel,
    pub address: String,
    pub source: OptOutSource,
    pub reason: Option<String>,
}

// ============================================================================
// AI settings, prospecting, integrations
// ============================================================================

/// Voice agent tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Professional,
    Friendly,
    Casual,
    Formal,
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tone::Professional => write!(f, "professional"),
            Tone::Friendly => write!(f, "friendly"),
            Tone::Casual => write!(f, "casual"),
            Tone::Formal => write!(f, "formal"),
        }
    }
}

impl std::str::FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "professional" => Ok(Tone::Professional),
            "friendly" => Ok(Tone::Friendly),
            "casual" => Ok(Tone::Casual),
            "formal" => Ok(Tone::Formal),
            _ => Err(format!("Invalid tone: {}", s)),
        }
    }
}

/// AI receptionist configuration for a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    #[serde(skip)]
    pub tenant_id: TenantId,
    pub tone: Tone,
    pub greeting_message: String,
    pub escalation_threshold: f64,
    pub after_hours_message: Option<String>,
    pub max_call_minutes: i32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AiSettings {
    /// Settings returned before a tenant saves their own
    pub fn defaults(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            tone: Tone::Professional,
            greeting_message: "Thanks for calling! How can I help you today?".to_string(),
            escalation_threshold: 0.7,
            after_hours_message: None,
            max_call_minutes: 10,
            updated_at: None,
        }
    }
}

/// Lead data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProspectSource {
    Apollo,
    Clearbit,
}

impl std::fmt::Display for ProspectSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProspectSource::Apollo => write!(f, "apollo"),
            ProspectSource::Clearbit => write!(f, "clearbit"),
        }
    }
}

impl std::str::FromStr for ProspectSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apollo" => Ok(ProspectSource::Apollo),
            "clearbit" => Ok(ProspectSource::Clearbit),
            _ => Err(format!("Invalid prospect source: {}", s)),
        }
    }
}

/// Lead-sourcing filter criteria
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProspectFilters {
    #[serde(skip)]
    pub tenant_id: TenantId,
    pub source: ProspectSource,
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub titles: Vec<String>,
    pub company_size_min: Option<i32>,
    pub company_size_max: Option<i32>,
    pub auto_enroll_sequence_id: Option<SequenceId>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Prospect sync run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncRunStatus::Queued => write!(f, "queued"),
            SyncRunStatus::Running => write!(f, "running"),
            SyncRunStatus::Completed => write!(f, "completed"),
            SyncRunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SyncRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(SyncRunStatus::Queued),
            "running" => Ok(SyncRunStatus::Running),
            "completed" => Ok(SyncRunStatus::Completed),
            "failed" => Ok(SyncRunStatus::Failed),
            _ => Err(format!("Invalid sync run status: {}", s)),
        }
    }
}

/// A requested prospect ingestion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProspectSyncRun {
    pub id: uuid::Uuid,
    #[serde(skip)]
    pub tenant_id: TenantId,
    pub source: ProspectSource,
    pub status: SyncRunStatus,
    pub filters: serde_json::Value,
    pub requested_at: DateTime<Utc>,
}

/// Third-party provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationProvider {
    Telnyx,
    Openai,
    Apollo,
    Clearbit,
    GoogleCalendar,
    Smtp,
}

impl std::fmt::Display for IntegrationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrationProvider::Telnyx => write!(f, "telnyx"),
            IntegrationProvider::Openai => write!(f, "openai"),
            IntegrationProvider::Apollo => write!(f, "apollo"),
            IntegrationProvider::Clearbit => write!(f, "clearbit"),
            IntegrationProvider::GoogleCalendar => write!(f, "google_calendar"),
            IntegrationProvider::Smtp => write!(f, "smtp"),
        }
    }
}

impl std::str::FromStr for IntegrationProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telnyx" => Ok(IntegrationProvider::Telnyx),
            "openai" => Ok(IntegrationProvider::Openai),
            "apollo" => Ok(IntegrationProvider::Apollo),
            "clearbit" => Ok(IntegrationProvider::Clearbit),
            "google_calendar" => Ok(IntegrationProvider::GoogleCalendar),
            "smtp" => Ok(IntegrationProvider::Smtp),
            _ => Err(format!("Invalid integration provider: {}", s)),
        }
    }
}

/// Stored credentials; field values are ciphertext
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationRecord {
    pub tenant_id: TenantId,
    pub provider: IntegrationProvider,
    pub fields: BTreeMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// API keys
// ============================================================================

/// API key model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: uuid::Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Check if the API key has expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at < Utc::now(),
            None => false,
        }
    }

    /// Check if the API key has a specific scope
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == "*" || s == scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn enrollment() -> Enrollment {
        Enrollment {
            id: uuid::Uuid::new_v4(),
            tenant_id: uuid::Uuid::new_v4(),
            sequence_id: uuid::Uuid::new_v4(),
            contact_id: "c-1".to_string(),
            email: Some("lead@example.com".to_string()),
            phone: Some("   ".to_string()),
            first_name: None,
            company: None,
            status: EnrollmentStatus::Active,
            next_step_order: 1,
            next_due_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_address_for_channel() {
        let e = enrollment();
        assert_eq!(e.address_for(Channel::Email), Some("lead@example.com"));
        assert_eq!(e.address_for(Channel::Sms), None);
        assert_eq!(e.address_for(Channel::Call), None);
    }

    #[test]
    fn test_enrollment_status_terminal() {
        assert!(!EnrollmentStatus::Active.is_terminal());
        assert!(!EnrollmentStatus::Paused.is_terminal());
        assert!(EnrollmentStatus::OptedOut.is_terminal());
        assert_eq!(
            "opted_out".parse::<EnrollmentStatus>().unwrap(),
            EnrollmentStatus::OptedOut
        );
    }

    #[test]
    fn test_sequence_serializes_camel_case() {
        let now = Utc::now();
        let sequence = Sequence {
            id: uuid::Uuid::new_v4(),
            tenant_id: uuid::Uuid::new_v4(),
            name: "Welcome".to_string(),
            description: None,
            throttle_per_day: 100,
            send_window_start: "09:00".to_string(),
            send_window_end: "17:00".to_string(),
            timezone: "America/New_York".to_string(),
            status: SequenceStatus::Draft,
            auto_pause_on_reply: true,
            steps: vec![],
            metrics: SequenceMetrics::default(),
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&sequence).unwrap();
        assert_eq!(json["throttlePerDay"], 100);
        assert_eq!(json["sendWindowStart"], "09:00");
        assert_eq!(json["status"], "draft");
        assert!(json.get("tenantId").is_none());
    }

    #[test]
    fn test_api_key_expiry_and_scope() {
        let mut key = ApiKey {
            id: uuid::Uuid::new_v4(),
            tenant_id: uuid::Uuid::new_v4(),
            name: "admin".to_string(),
            key_hash: String::new(),
            key_prefix: "cg_abcde".to_string(),
            scopes: vec!["outreach".to_string()],
            expires_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        };
        assert!(!key.is_expired());
        assert!(key.has_scope("outreach"));
        assert!(!key.has_scope("integrations"));

        key.expires_at = Some(Utc::now() - Duration::minutes(1));
        assert!(key.is_expired());
    }
}
