//! In-memory adapters shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use planner_sync::models::{
    DatabaseItemUpdate, DownstreamItem, ItemDetails, NewDatabaseItem, PlannableKind, SizeLabel,
    TaskStatus, UpstreamItem,
};
use planner_sync::services::{PlannerSource, SizeClassifier, TaskDatabase};
use planner_sync::AppError;
use std::collections::HashMap;
use std::sync::Mutex;

pub fn task(id: i64, due_at: Option<&str>, completed: bool) -> UpstreamItem {
    UpstreamItem {
        plannable_id: id,
        due_at: due_at.map(String::from),
        completed,
        override_id: None,
        kind: PlannableKind::Assignment,
        title: format!("Assignment {}", id),
        course_name: "MATH 234".to_string(),
        course_id: Some(11),
        detail_url: format!("https://canvas.example.edu/courses/11/assignments/{}", id),
    }
}

pub fn row(id: &str, due_date: Option<&str>, status: TaskStatus) -> DownstreamItem {
    DownstreamItem {
        external_id: id.to_string(),
        due_date: due_date.map(String::from),
        status,
        record_id: format!("page-{}", id),
    }
}

/// Planner write, as recorded by [`FakePlanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerWrite {
    CreateOverride { plannable_id: i64, completed: bool },
    UpdateOverride { override_id: i64, completed: bool },
}

#[derive(Default)]
pub struct FakePlanner {
    pub items: Vec<UpstreamItem>,
    pub details: HashMap<i64, ItemDetails>,
    pub fail_fetch: bool,
    pub writes: Mutex<Vec<PlannerWrite>>,
    pub detail_requests: Mutex<Vec<i64>>,
}

impl FakePlanner {
    pub fn with_items(items: Vec<UpstreamItem>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    pub fn writes(&self) -> Vec<PlannerWrite> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlannerSource for FakePlanner {
    async fn fetch_items(&self) -> Result<Vec<UpstreamItem>, AppError> {
        if self.fail_fetch {
            return Err(AppError::network("planner unreachable"));
        }
        Ok(self.items.clone())
    }

    async fn fetch_details(&self, item: &UpstreamItem) -> Result<ItemDetails, AppError> {
        self.detail_requests.lock().unwrap().push(item.plannable_id);
        Ok(self
            .details
            .get(&item.plannable_id)
            .cloned()
            .unwrap_or_else(|| ItemDetails {
                due_at: item.due_at.clone(),
                locked: false,
                title: item.title.clone(),
                description: None,
            }))
    }

    async fn create_override(&self, item: &UpstreamItem, completed: bool) -> Result<(), AppError> {
        self.writes.lock().unwrap().push(PlannerWrite::CreateOverride {
            plannable_id: item.plannable_id,
            completed,
        });
        Ok(())
    }

    async fn update_override(&self, override_id: i64, completed: bool) -> Result<(), AppError> {
        self.writes.lock().unwrap().push(PlannerWrite::UpdateOverride {
            override_id,
            completed,
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDatabase {
    pub rows: Vec<DownstreamItem>,
    pub fail_updates: bool,
    pub created: Mutex<Vec<NewDatabaseItem>>,
    pub updates: Mutex<Vec<(String, DatabaseItemUpdate)>>,
}

impl FakeDatabase {
    pub fn with_rows(rows: Vec<DownstreamItem>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn created(&self) -> Vec<NewDatabaseItem> {
        self.created.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, DatabaseItemUpdate)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskDatabase for FakeDatabase {
    async fn fetch_items(&self) -> Result<Vec<DownstreamItem>, AppError> {
        Ok(self.rows.clone())
    }

    async fn create_item(&self, item: &NewDatabaseItem) -> Result<String, AppError> {
        let mut created = self.created.lock().unwrap();
        created.push(item.clone());
        Ok(format!("new-page-{}", created.len()))
    }

    async fn update_item(
        &self,
        record_id: &str,
        update: &DatabaseItemUpdate,
    ) -> Result<(), AppError> {
        if self.fail_updates {
            return Err(AppError::api_full("Notion", "Internal error", 500, "/v1/pages"));
        }
        self.updates
            .lock()
            .unwrap()
            .push((record_id.to_string(), update.clone()));
        Ok(())
    }
}

/// Classifier answering with a fixed label (or nothing).
pub struct FixedClassifier {
    pub answer: Option<SizeLabel>,
    pub prompts: Mutex<Vec<(String, String, String)>>,
}

impl FixedClassifier {
    pub fn new(answer: Option<SizeLabel>) -> Self {
        Self {
            answer,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SizeClassifier for FixedClassifier {
    async fn classify(
        &self,
        title: &str,
        course_name: &str,
        description: &str,
    ) -> Result<Option<SizeLabel>, AppError> {
        self.prompts.lock().unwrap().push((
            title.to_string(),
            course_name.to_string(),
            description.to_string(),
        ));
        Ok(self.answer)
    }
}
