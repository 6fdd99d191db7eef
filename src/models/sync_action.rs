//! Reconciliation action and sync report models.

use serde::{Deserialize, Serialize};

/// A write required to bring a matched pair back into agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Action {
    /// Set the database row's due date to this canonical value.
    UpdateRemoteDueDate(String),

    /// Set the database row's status to `Completed`.
    MarkDownstreamComplete,

    /// Create a planner override marking the item complete.
    CreateUpstreamOverride,

    /// Flip an existing planner override to complete.
    UpdateUpstreamOverride(i64),
}

impl Action {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::UpdateRemoteDueDate(_) => "update_due_date",
            Self::MarkDownstreamComplete => "mark_downstream_complete",
            Self::CreateUpstreamOverride => "create_override",
            Self::UpdateUpstreamOverride(_) => "update_override",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpdateRemoteDueDate(date) => write!(f, "update_due_date({})", date),
            Self::UpdateUpstreamOverride(id) => write!(f, "update_override({})", id),
            other => f.write_str(other.label()),
        }
    }
}

/// Outcome of one reconciliation pass for one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Pairs found on both sides.
    pub matched: usize,

    /// Database rows created for new planner tasks.
    pub created: usize,

    pub due_dates_updated: usize,

    pub marked_complete: usize,

    pub overrides_created: usize,

    pub overrides_updated: usize,

    /// Database rows with no planner counterpart (left untouched).
    pub unmatched_downstream: usize,

    /// Database rows sharing an ID with an earlier row.
    pub duplicate_rows: usize,

    /// Duration of the pass in milliseconds.
    pub duration_ms: i64,
}

impl SyncReport {
    /// Count an applied action.
    pub fn record(&mut self, action: &Action) {
        match action {
            Action::UpdateRemoteDueDate(_) => self.due_dates_updated += 1,
            Action::MarkDownstreamComplete => self.marked_complete += 1,
            Action::CreateUpstreamOverride => self.overrides_created += 1,
            Action::UpdateUpstreamOverride(_) => self.overrides_updated += 1,
        }
    }

    /// Total number of writes issued during the pass.
    pub fn writes(&self) -> usize {
        self.created
            + self.due_dates_updated
            + self.marked_complete
            + self.overrides_created
            + self.overrides_updated
    }
}
