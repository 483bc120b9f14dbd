//! Persistence layer — libSQL-backed storage for emails, conversations,
//! client profiles, alerts, the knowledge base, and settings.

pub mod libsql_backend;
pub mod migrations;
pub mod models;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use models::*;
pub use traits::Database;
