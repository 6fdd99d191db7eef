//! Conflict-resolution policy for matched planner/database pairs.
//!
//! Due dates only ever flow from the planner to the database. Completion
//! flows both ways: planner completion marks an untouched database row
//! complete, and a row the user completed in the database is pushed back to
//! the planner as an override.

use crate::models::{Action, DownstreamItem, TaskStatus, UpstreamItem};
use crate::services::due_date;

/// Decide which writes a matched pair needs. An empty result means both
/// sides already agree.
pub fn decide(upstream: &UpstreamItem, downstream: &DownstreamItem) -> Vec<Action> {
    let upstream_due = due_date::normalize_opt(upstream.due_at.as_deref());
    let downstream_due = due_date::normalize_opt(downstream.due_date.as_deref());
    let upstream_done = upstream.completed;
    let downstream_not_started = downstream.status == TaskStatus::NotStarted;
    let downstream_done = downstream.status == TaskStatus::Completed;

    let mut actions = Vec::new();

    // Finished items keep whatever date the user has, and an empty planner
    // date never clears the database.
    if upstream_due != downstream_due && !upstream_done && !upstream_due.is_empty() {
        actions.push(Action::UpdateRemoteDueDate(upstream_due));
    }

    if upstream_done && downstream_not_started {
        actions.push(Action::MarkDownstreamComplete);
    }

    if downstream_done && !upstream_done {
        actions.push(match upstream.override_id {
            Some(id) => Action::UpdateUpstreamOverride(id),
            None => Action::CreateUpstreamOverride,
        });
    }

    actions
}
