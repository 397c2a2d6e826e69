//! API request handlers

pub mod health;
pub mod outreach;
pub mod sequences;
pub mod settings;
pub mod templates;

pub use health::*;

/// Scope for reading sequences, templates, opt-outs and stats
pub const OUTREACH_READ: &str = "outreach:read";
/// Scope for authoring sequences and recording engagement
pub const OUTREACH_WRITE: &str = "outreach:write";
pub const SETTINGS_READ: &str = "settings:read";
pub const SETTINGS_WRITE: &str = "settings:write";
