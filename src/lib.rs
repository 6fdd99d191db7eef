//! Planner Sync - keeps a Canvas planner feed and a Notion task database in
//! agreement for any number of users.
//!
//! The core pairs records from both sides by identity, normalizes due dates
//! so the two encodings compare equal, decides which side needs a write, and
//! runs that for every registered user on a fixed interval.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::AppConfig;
pub use error::AppError;
pub use services::SyncManager;
