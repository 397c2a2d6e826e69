//! CloudGreet Storage - Database abstraction
//!
//! Domain models, repository traits, and the PostgreSQL and in-memory
//! backends that implement them.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
