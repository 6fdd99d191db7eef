//! One reconciliation pass for one tenant.
//!
//! Fetch both sides, join them by identity, apply the policy's writes to
//! every matched pair, then create database rows for new planner tasks.
//! Any adapter error aborts the pass; nothing is retried here.

use crate::config::RequestSpacing;
use crate::error::AppError;
use crate::models::{
    Action, DatabaseItemUpdate, DownstreamItem, NewDatabaseItem, SizeLabel, SyncReport,
    TaskStatus, TenantConfig, UpstreamItem,
};
use crate::services::canvas_client::{CanvasClient, CanvasClientConfig};
use crate::services::classifier::{ClassifierConfig, OpenAiClassifier};
use crate::services::due_date;
use crate::services::html_text::html_to_text;
use crate::services::keyed_merge::{duplicate_keys, merge_by_key};
use crate::services::notion_client::{NotionClient, NotionClientConfig};
use crate::services::reconcile;
use crate::services::sources::{NoClassifier, PlannerSource, SizeClassifier, TaskDatabase};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Adapters for one tenant's pass.
pub struct SyncCycle {
    tenant_id: String,
    planner: Arc<dyn PlannerSource>,
    database: Arc<dyn TaskDatabase>,
    classifier: Arc<dyn SizeClassifier>,
}

fn downstream_key(item: &DownstreamItem) -> Option<String> {
    let key = item.external_id.trim();
    (!key.is_empty()).then(|| key.to_string())
}

impl SyncCycle {
    pub fn new(
        tenant_id: impl Into<String>,
        planner: Arc<dyn PlannerSource>,
        database: Arc<dyn TaskDatabase>,
        classifier: Arc<dyn SizeClassifier>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            planner,
            database,
            classifier,
        }
    }

    /// Build the HTTP adapters for a tenant.
    pub fn from_tenant(
        tenant_id: &str,
        config: &TenantConfig,
        spacing: &RequestSpacing,
    ) -> Result<Self, AppError> {
        let planner = CanvasClient::new(CanvasClientConfig::from_tenant(config, spacing.canvas()))?;
        let database = NotionClient::new(NotionClientConfig::from_tenant(config, spacing.notion()))?;
        let classifier: Arc<dyn SizeClassifier> =
            match ClassifierConfig::from_tenant(config, spacing.openai()) {
                Some(classifier_config) => Arc::new(OpenAiClassifier::new(classifier_config)?),
                None => Arc::new(NoClassifier),
            };

        Ok(Self::new(
            tenant_id,
            Arc::new(planner),
            Arc::new(database),
            classifier,
        ))
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Run the pass.
    pub async fn run(&self) -> Result<SyncReport, AppError> {
        let start = Instant::now();
        let mut report = SyncReport::default();

        let (upstream, downstream) =
            tokio::try_join!(self.planner.fetch_items(), self.database.fetch_items())?;

        let fetched = upstream.len();
        let tasks: Vec<UpstreamItem> = upstream.into_iter().filter(|i| i.kind.is_task()).collect();
        log::debug!(
            "[sync] {}: {} planner tasks ({} items), {} database rows",
            self.tenant_id,
            tasks.len(),
            fetched,
            downstream.len()
        );

        for key in duplicate_keys(&downstream, downstream_key) {
            log::warn!(
                "[sync] {}: several database rows share ID {}; only the first is reconciled",
                self.tenant_id,
                key
            );
        }
        let mut seen = HashSet::new();
        report.duplicate_rows = downstream
            .iter()
            .filter_map(downstream_key)
            .filter(|key| !seen.insert(key.clone()))
            .count();

        let merged = merge_by_key(tasks, downstream, |u| Some(u.key()), downstream_key);
        report.matched = merged.both.len();
        report.unmatched_downstream = merged.only_b.len();

        for (upstream, downstream) in &merged.both {
            for action in reconcile::decide(upstream, downstream) {
                self.apply(upstream, downstream, &action).await?;
                report.record(&action);
            }
        }

        for item in &merged.only_a {
            self.create(item).await?;
            report.created += 1;
        }

        report.duration_ms = start.elapsed().as_millis() as i64;
        Ok(report)
    }

    /// Issue the write for one action.
    async fn apply(
        &self,
        upstream: &UpstreamItem,
        downstream: &DownstreamItem,
        action: &Action,
    ) -> Result<(), AppError> {
        log::debug!(
            "[sync] {}: {} for item {}",
            self.tenant_id,
            action,
            upstream.plannable_id
        );

        match action {
            Action::UpdateRemoteDueDate(date) => {
                self.database
                    .update_item(&downstream.record_id, &DatabaseItemUpdate::due_date(date.clone()))
                    .await
            }
            Action::MarkDownstreamComplete => {
                self.database
                    .update_item(
                        &downstream.record_id,
                        &DatabaseItemUpdate::status(TaskStatus::Completed),
                    )
                    .await
            }
            Action::CreateUpstreamOverride => self.planner.create_override(upstream, true).await,
            Action::UpdateUpstreamOverride(id) => self.planner.update_override(*id, true).await,
        }
    }

    /// Create a database row for a planner task seen for the first time.
    async fn create(&self, item: &UpstreamItem) -> Result<String, AppError> {
        let details = self.planner.fetch_details(item).await?;
        let description = html_to_text(details.description.as_deref().unwrap_or_default());

        let size = match self
            .classifier
            .classify(&details.title, &item.course_name, &description)
            .await
        {
            Ok(Some(size)) => size,
            Ok(None) => SizeLabel::DEFAULT,
            Err(e) => {
                log::warn!(
                    "[sync] {}: classifier failed for item {}: {}",
                    self.tenant_id,
                    item.plannable_id,
                    e
                );
                SizeLabel::DEFAULT
            }
        };

        let status = if item.completed {
            TaskStatus::Completed
        } else if details.locked {
            TaskStatus::Locked
        } else {
            TaskStatus::NotStarted
        };

        let due = details.due_at.as_deref().or(item.due_at.as_deref());

        let new_item = NewDatabaseItem {
            external_id: item.plannable_id,
            title: details.title.clone(),
            course_name: item.course_name.clone(),
            due_date: due_date::normalize_opt(due),
            status,
            size,
            url: item.detail_url.clone(),
            description,
        };

        let record_id = self.database.create_item(&new_item).await?;
        log::debug!(
            "[sync] {}: created row {} for item {} ({}, {})",
            self.tenant_id,
            record_id,
            item.plannable_id,
            status,
            size
        );
        Ok(record_id)
    }
}
