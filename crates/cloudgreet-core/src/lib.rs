//! CloudGreet Core - outreach engine and admin settings
//!
//! This crate provides the business logic behind the admin API, including
//! sequence lifecycle, step execution, channel dispatch, engagement tracking,
//! and encrypted integration credentials.

pub mod outreach;
pub mod settings;

pub use outreach::{
    Dispatchers, EngagementService, SequenceManager, SequenceWorker, StatsAggregator,
    TemplateLibrary,
};
pub use settings::{AiSettingsService, CredentialCipher, IntegrationService, ProspectingService};
