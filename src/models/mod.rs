//! Data models for the reconciliation engine.
//!
//! Planner and database items are rebuilt from fresh snapshots on every
//! pass; nothing here is persisted between passes.

pub mod database_item;
pub mod planner_item;
pub mod sync_action;
pub mod tenant;

// Re-exports for convenient access
pub use database_item::{DatabaseItemUpdate, DownstreamItem, NewDatabaseItem, SizeLabel, TaskStatus};
pub use planner_item::{ItemDetails, PlannableKind, UpstreamItem};
pub use sync_action::{Action, SyncReport};
pub use tenant::TenantConfig;
