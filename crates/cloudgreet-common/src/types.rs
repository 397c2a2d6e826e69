//! Common types for CloudGreet

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for tenants
pub type TenantId = Uuid;

/// Unique identifier for outreach templates
pub type TemplateId = Uuid;

/// Unique identifier for sequences
pub type SequenceId = Uuid;

/// Unique identifier for sequence steps
pub type StepId = Uuid;

/// Unique identifier for enrollments
pub type EnrollmentId = Uuid;

/// Unique identifier for scheduled sends
pub type SendId = Uuid;

/// Opaque contact identifier issued by the CRM
pub type ContactId = String;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Outreach channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Call,
}

impl Channel {
    /// All channels, in reporting order
    pub const ALL: [Channel; 3] = [Channel::Email, Channel::Sms, Channel::Call];

    /// Whether steps on this channel send a template
    pub fn requires_template(&self) -> bool {
        matches!(self, Channel::Email | Channel::Sms)
    }

    /// Whether templates may be authored for this channel
    pub fn supports_templates(&self) -> bool {
        self.requires_template()
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
            Channel::Call => write!(f, "call"),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "call" => Ok(Channel::Call),
            _ => Err(crate::Error::Validation(format!("Invalid channel: {}", s))),
        }
    }
}

/// Sequence lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStatus {
    Draft,
    Active,
    Paused,
}

impl SequenceStatus {
    /// Whether a sequence in this status may move to `next`
    ///
    /// Only `draft -> active`, `active -> paused` and `paused -> active`
    /// are legal. Nothing returns to `draft`.
    pub fn can_transition_to(&self, next: SequenceStatus) -> bool {
        matches!(
            (self, next),
            (SequenceStatus::Draft, SequenceStatus::Active)
                | (SequenceStatus::Active, SequenceStatus::Paused)
                | (SequenceStatus::Paused, SequenceStatus::Active)
        )
    }
}

impl std::fmt::Display for SequenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequenceStatus::Draft => write!(f, "draft"),
            SequenceStatus::Active => write!(f, "active"),
            SequenceStatus::Paused => write!(f, "paused"),
        }
    }
}

impl std::str::FromStr for SequenceStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(SequenceStatus::Draft),
            "active" => Ok(SequenceStatus::Active),
            "paused" => Ok(SequenceStatus::Paused),
            _ => Err(crate::Error::Validation(format!(
                "Invalid sequence status: {}",
                s
            ))),
        }
    }
}

/// Reporting range for outreach statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StatsRange {
    #[default]
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl StatsRange {
    /// Length of the range
    pub fn duration(&self) -> Duration {
        match self {
            StatsRange::Week => Duration::days(7),
            StatsRange::Month => Duration::days(30),
            StatsRange::Quarter => Duration::days(90),
        }
    }

    /// Start of the range ending at `now`
    pub fn since(&self, now: Timestamp) -> Timestamp {
        now - self.duration()
    }
}

impl std::fmt::Display for StatsRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsRange::Week => write!(f, "7d"),
            StatsRange::Month => write!(f, "30d"),
            StatsRange::Quarter => write!(f, "90d"),
        }
    }
}

impl std::str::FromStr for StatsRange {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(StatsRange::Week),
            "30d" => Ok(StatsRange::Month),
            "90d" => Ok(StatsRange::Quarter),
            _ => Err(crate::Error::Validation(format!(
                "Invalid stats range: {} (expected 7d, 30d or 90d)",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_roundtrip() {
        for channel in Channel::ALL {
            let parsed: Channel = channel.to_string().parse().unwrap();
            assert_eq!(parsed, channel);
        }
        assert!("fax".parse::<Channel>().is_err());
    }

    #[test]
    fn test_channel_template_requirement() {
        assert!(Channel::Email.requires_template());
        assert!(Channel::Sms.requires_template());
        assert!(!Channel::Call.requires_template());
    }

    #[test]
    fn test_status_transitions() {
        use SequenceStatus::*;

        assert!(Draft.can_transition_to(Active));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));

        assert!(!Active.can_transition_to(Draft));
        assert!(!Paused.can_transition_to(Draft));
        assert!(!Draft.can_transition_to(Paused));
        assert!(!Active.can_transition_to(Active));
        assert!(!Draft.can_transition_to(Draft));
    }

    #[test]
    fn test_stats_range_parse() {
        assert_eq!("30d".parse::<StatsRange>().unwrap(), StatsRange::Month);
        assert_eq!(StatsRange::default(), StatsRange::Week);
        assert_eq!(StatsRange::Quarter.duration(), Duration::days(90));
        assert!("1y".parse::<StatsRange>().is_err());

        let json = serde_json::to_string(&StatsRange::Month).unwrap();
        assert_eq!(json, "\"30d\"");
    }
}
