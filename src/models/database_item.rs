//! Task database item model.

use serde::{Deserialize, Serialize};

/// Status of a row in the task database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "Not Started")]
    NotStarted,
    Started,
    Completed,
    Locked,
    /// An option this engine does not know, or no option at all. Treated as
    /// user triage and never overwritten.
    Unrecognized,
}

impl TaskStatus {
    /// Parse a status option name. Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "not started" => Some(Self::NotStarted),
            "started" | "in progress" => Some(Self::Started),
            "completed" | "done" => Some(Self::Completed),
            "locked" => Some(Self::Locked),
            _ => None,
        }
    }

    /// Name of the status option in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::Started => "Started",
            Self::Completed => "Completed",
            Self::Locked => "Locked",
            Self::Unrecognized => "Unrecognized",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// T-shirt effort estimate stored in the `Size` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeLabel {
    XS,
    S,
    M,
    L,
    XL,
}

impl SizeLabel {
    /// Size used when no classifier answer is available.
    pub const DEFAULT: SizeLabel = SizeLabel::M;

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "XS" => Some(Self::XS),
            "S" => Some(Self::S),
            "M" => Some(Self::M),
            "L" => Some(Self::L),
            "XL" => Some(Self::XL),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::XS => "XS",
            Self::S => "S",
            Self::M => "M",
            Self::L => "L",
            Self::XL => "XL",
        }
    }
}

impl std::fmt::Display for SizeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the task database (the downstream side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamItem {
    /// Mirrors the planner's plannable ID.
    pub external_id: String,

    /// Date or date-time, as stored in the `Due date` column.
    pub due_date: Option<String>,

    pub status: TaskStatus,

    /// Opaque page handle used for updates.
    pub record_id: String,
}

/// Fields for a newly created database row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewDatabaseItem {
    pub external_id: i64,
    pub title: String,
    pub course_name: String,
    /// Canonical due form; empty means no date.
    pub due_date: String,
    pub status: TaskStatus,
    pub size: SizeLabel,
    pub url: String,
    /// Plain-text description written into the page body.
    pub description: String,
}

/// Partial update of an existing database row. `None` fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseItemUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl DatabaseItemUpdate {
    pub fn due_date(date: impl Into<String>) -> Self {
        Self {
            due_date: Some(date.into()),
            status: None,
        }
    }

    pub fn status(status: TaskStatus) -> Self {
        Self {
            due_date: None,
            status: Some(status),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.due_date.is_none() && self.status.is_none()
    }
}
