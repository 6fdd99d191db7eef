//! Adapter traits the sync cycle depends on.
//!
//! The HTTP clients implement these for Canvas, Notion and OpenAI; tests
//! supply in-memory versions.

use crate::error::AppError;
use crate::models::{
    DatabaseItemUpdate, DownstreamItem, ItemDetails, NewDatabaseItem, SizeLabel, UpstreamItem,
};
use async_trait::async_trait;

/// The planner feed (upstream).
#[async_trait]
pub trait PlannerSource: Send + Sync {
    /// All planner items in the sync window, every kind included.
    async fn fetch_items(&self) -> Result<Vec<UpstreamItem>, AppError>;

    /// Details for one item (due date, lock state, title, description).
    async fn fetch_details(&self, item: &UpstreamItem) -> Result<ItemDetails, AppError>;

    /// Create a planner override for an item that has none yet.
    async fn create_override(&self, item: &UpstreamItem, completed: bool) -> Result<(), AppError>;

    /// Change the completion flag on an existing planner override.
    async fn update_override(&self, override_id: i64, completed: bool) -> Result<(), AppError>;
}

/// The task database (downstream).
#[async_trait]
pub trait TaskDatabase: Send + Sync {
    /// All rows in the sync window.
    async fn fetch_items(&self) -> Result<Vec<DownstreamItem>, AppError>;

    /// Create a row, returning its record handle.
    async fn create_item(&self, item: &NewDatabaseItem) -> Result<String, AppError>;

    async fn update_item(&self, record_id: &str, update: &DatabaseItemUpdate) -> Result<(), AppError>;
}

/// Effort estimator for newly created rows.
#[async_trait]
pub trait SizeClassifier: Send + Sync {
    /// `Ok(None)` means no estimate is available; callers fall back to
    /// [`SizeLabel::DEFAULT`].
    async fn classify(
        &self,
        title: &str,
        course_name: &str,
        description: &str,
    ) -> Result<Option<SizeLabel>, AppError>;
}

/// Classifier used when no API key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoClassifier;

#[async_trait]
impl SizeClassifier for NoClassifier {
    async fn classify(
        &self,
        _title: &str,
        _course_name: &str,
        _description: &str,
    ) -> Result<Option<SizeLabel>, AppError> {
        Ok(None)
    }
}
