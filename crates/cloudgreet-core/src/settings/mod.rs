//! Admin settings: AI receptionist, prospecting and integrations

pub mod ai;
pub mod cipher;
pub mod integrations;
pub mod prospecting;

pub use ai::{AiSettingsInput, AiSettingsService};
pub use cipher::CredentialCipher;
pub use integrations::{IntegrationService, IntegrationUpsert, IntegrationView};
pub use prospecting::{ProspectFiltersInput, ProspectingService};
