//! Planner feed item model.

use serde::{Deserialize, Serialize};

/// Kind of plannable object in the planner feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannableKind {
    Assignment,
    /// Checkpoint of a graded discussion; overrides must name it as such.
    SubAssignment,
    Quiz,
    DiscussionTopic,
    Announcement,
    CalendarEvent,
    Other,
}

impl From<&str> for PlannableKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "assignment" => Self::Assignment,
            "sub_assignment" => Self::SubAssignment,
            "quiz" => Self::Quiz,
            "discussion_topic" => Self::DiscussionTopic,
            "announcement" => Self::Announcement,
            "calendar_event" => Self::CalendarEvent,
            _ => Self::Other,
        }
    }
}

impl PlannableKind {
    /// Whether this kind represents work the student has to hand in.
    ///
    /// Announcements, events and everything else never reach the database.
    pub fn is_task(&self) -> bool {
        matches!(
            self,
            Self::Assignment | Self::SubAssignment | Self::Quiz | Self::DiscussionTopic
        )
    }
}

impl std::fmt::Display for PlannableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assignment => write!(f, "assignment"),
            Self::SubAssignment => write!(f, "sub_assignment"),
            Self::Quiz => write!(f, "quiz"),
            Self::DiscussionTopic => write!(f, "discussion_topic"),
            Self::Announcement => write!(f, "announcement"),
            Self::CalendarEvent => write!(f, "calendar_event"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A task as seen in the planner feed (the upstream side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamItem {
    /// Stable identity of the plannable object.
    pub plannable_id: i64,

    /// Authoritative deadline (ISO 8601, UTC), if any.
    pub due_at: Option<String>,

    /// Submitted, or manually marked complete through an override.
    pub completed: bool,

    /// Planner override ID, present once an override exists.
    pub override_id: Option<i64>,

    pub kind: PlannableKind,

    pub title: String,

    /// Course the item belongs to (planner `context_name`).
    pub course_name: String,

    /// Course ID, needed to look up item details.
    pub course_id: Option<i64>,

    /// Absolute link to the item in the planner's web UI.
    pub detail_url: String,
}

impl UpstreamItem {
    /// Identity key used to join against database items.
    pub fn key(&self) -> String {
        self.plannable_id.to_string()
    }
}

/// Extra information fetched for a single item before it is created
/// downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemDetails {
    pub due_at: Option<String>,

    /// Whether the item is locked for the current user.
    pub locked: bool,

    pub title: String,

    /// HTML description (assignment description or discussion message).
    pub description: Option<String>,
}
