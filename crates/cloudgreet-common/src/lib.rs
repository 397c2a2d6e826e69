//! CloudGreet Common - Shared types and utilities
//!
//! This crate provides configuration, the error taxonomy and the
//! identifier/enum types shared by every CloudGreet component.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
