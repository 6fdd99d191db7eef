//! Canvas planner API client.
//!
//! Provides HTTP access to the planner feed, item details and planner
//! overrides, with bearer authentication and `Link`-header pagination. Every
//! request passes through the client's admission gate.

use crate::error::AppError;
use crate::models::{ItemDetails, PlannableKind, TenantConfig, UpstreamItem};
use crate::services::admission::{AdmissionScheduler, CANVAS_MIN_SPACING};
use crate::services::sources::PlannerSource;
use async_trait::async_trait;
use crate::services::due_date::shift_days;
use chrono::{SecondsFormat, Utc};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const SERVICE: &str = "Canvas";

/// Planner page size (the planner endpoint tops out well above this).
const PER_PAGE: u32 = 75;

/// Canvas API client configuration.
#[derive(Debug, Clone)]
pub struct CanvasClientConfig {
    /// Base URL of the Canvas instance (e.g., `https://canvas.example.edu`).
    pub base_url: String,

    /// API access token.
    pub token: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Days ahead of now to include in the planner window.
    pub days_to_fetch: i64,

    /// Minimum spacing between request starts.
    pub min_spacing: Duration,
}

impl Default for CanvasClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            timeout_secs: 30,
            days_to_fetch: crate::models::tenant::DEFAULT_DAYS_TO_FETCH,
            min_spacing: CANVAS_MIN_SPACING,
        }
    }
}

impl CanvasClientConfig {
    pub fn from_tenant(tenant: &TenantConfig, min_spacing: Duration) -> Self {
        Self {
            base_url: TenantConfig::normalize_url(&tenant.canvas_url),
            token: tenant.canvas_token.clone(),
            days_to_fetch: tenant.days_to_fetch,
            min_spacing,
            ..Default::default()
        }
    }
}

/// Canvas API client.
#[derive(Debug, Clone)]
pub struct CanvasClient {
    client: Client,
    config: CanvasClientConfig,
    gate: Arc<AdmissionScheduler>,
}

/// Submission state attached to a planner item.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CanvasSubmission {
    #[serde(default)]
    pub submitted: bool,
    #[serde(default)]
    pub excused: bool,
    #[serde(default)]
    pub graded: bool,
    #[serde(default)]
    pub missing: bool,
}

/// Planner override from API.
#[derive(Debug, Clone, Deserialize)]
pub struct CanvasPlannerOverride {
    pub id: i64,
    #[serde(default)]
    pub marked_complete: bool,
}

/// Plannable object nested in a planner item.
#[derive(Debug, Clone, Deserialize)]
pub struct CanvasPlannable {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    pub due_at: Option<String>,
    pub todo_date: Option<String>,
}

/// Planner item from API (GET /planner/items).
#[derive(Debug, Clone, Deserialize)]
pub struct CanvasPlannerItem {
    pub plannable_id: i64,
    pub plannable_type: String,
    pub course_id: Option<i64>,
    /// Canvas sends `false` when no override exists.
    #[serde(default, deserialize_with = "false_as_none")]
    pub planner_override: Option<CanvasPlannerOverride>,
    /// Canvas sends `false` for items that take no submission.
    #[serde(default, deserialize_with = "false_as_none")]
    pub submissions: Option<CanvasSubmission>,
    pub plannable_date: Option<String>,
    pub plannable: CanvasPlannable,
    pub html_url: Option<String>,
    pub context_name: Option<String>,
}

/// Assignment, quiz or discussion details.
#[derive(Debug, Clone, Deserialize)]
pub struct CanvasItemDetails {
    /// Assignments call this `name`, quizzes and discussions `title`.
    #[serde(alias = "name")]
    pub title: Option<String>,
    pub description: Option<String>,
    pub message: Option<String>,
    pub due_at: Option<String>,
    #[serde(default)]
    pub locked_for_user: bool,
}

/// Body for creating a planner override.
#[derive(Debug, Clone, Serialize)]
struct NewOverrideBody<'a> {
    plannable_type: &'a str,
    plannable_id: i64,
    marked_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
struct UpdateOverrideBody {
    marked_complete: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrFalse<T> {
    Value(T),
    #[allow(dead_code)]
    Flag(bool),
}

fn false_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Option::<OrFalse<T>>::deserialize(deserializer)? {
        Some(OrFalse::Value(value)) => Some(value),
        _ => None,
    })
}

impl CanvasPlannerItem {
    /// Convert to the engine's upstream model.
    pub fn into_upstream(self, base_url: &str) -> UpstreamItem {
        let submitted = self.submissions.as_ref().is_some_and(|s| s.submitted);
        let marked_complete = self
            .planner_override
            .as_ref()
            .is_some_and(|o| o.marked_complete);

        let due_at = self
            .plannable
            .due_at
            .or(self.plannable.todo_date)
            .or(self.plannable_date);

        let detail_url = match self.html_url {
            Some(url) if url.starts_with("http") => url,
            Some(path) => format!("{}{}", base_url.trim_end_matches('/'), path),
            None => String::new(),
        };

        UpstreamItem {
            plannable_id: self.plannable_id,
            due_at,
            completed: submitted || marked_complete,
            override_id: self.planner_override.map(|o| o.id),
            kind: PlannableKind::from(self.plannable_type.as_str()),
            title: self.plannable.title,
            course_name: self.context_name.unwrap_or_default(),
            course_id: self.course_id,
            detail_url,
        }
    }
}

/// Extract the `rel="next"` target from a `Link` header.
fn next_link(response: &Response) -> Option<String> {
    let link = response.headers().get(header::LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let url = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        if is_next {
            Some(url.trim_start_matches('<').trim_end_matches('>').to_string())
        } else {
            None
        }
    })
}

impl CanvasClient {
    /// Create a new Canvas client.
    pub fn new(config: CanvasClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();

        let token_value = header::HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| AppError::authentication_for(SERVICE, "Invalid token format"))?;
        headers.insert(header::AUTHORIZATION, token_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        let gate = Arc::new(AdmissionScheduler::new("canvas", config.min_spacing));

        Ok(Self {
            client,
            config,
            gate,
        })
    }

    /// Get the full URL for an API path.
    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/v1{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    /// Send a request through the admission gate.
    async fn send(&self, request: RequestBuilder) -> Result<Response, AppError> {
        Ok(self.gate.schedule(request.send()).await?)
    }

    /// Handle API response errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| AppError::internal(format!("Failed to parse response: {}", e)))
        } else if status == StatusCode::UNAUTHORIZED {
            Err(AppError::authentication_for(
                SERVICE,
                "Canvas token expired or revoked",
            ))
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Err(AppError::rate_limited(SERVICE))
        } else {
            let status_code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            // Canvas reports errors as {"errors": [{"message": "..."}]} or {"message": "..."}
            let body_message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    v.pointer("/errors/0/message")
                        .or_else(|| v.get("message"))
                        .and_then(|m| m.as_str().map(String::from))
                });

            let message = match (status, body_message) {
                (StatusCode::FORBIDDEN, _) => "Access denied".to_string(),
                (StatusCode::NOT_FOUND, _) => "Resource not found".to_string(),
                (_, Some(msg)) => msg,
                _ => format!("Request failed ({}): {}", status_code, body),
            };

            Err(AppError::api_full(SERVICE, message, status_code, endpoint))
        }
    }

    /// Fetch every page of the planner window, following `Link` headers.
    pub async fn get_planner_items(&self) -> Result<Vec<CanvasPlannerItem>, AppError> {
        let endpoint = "/planner/items";
        let now = Utc::now();
        let start = shift_days(now, -1)?.to_rfc3339_opts(SecondsFormat::Millis, true);
        let end = shift_days(now, self.config.days_to_fetch)?
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        let first = self.client.get(self.api_url(endpoint)).query(&[
            ("start_date", start),
            ("end_date", end),
            ("per_page", PER_PAGE.to_string()),
        ]);

        let mut all_items = Vec::new();
        let mut response = self.send(first).await?;
        loop {
            let next = next_link(&response);
            let page: Vec<CanvasPlannerItem> = self.handle_response(response, endpoint).await?;
            all_items.extend(page);

            match next {
                Some(url) => response = self.send(self.client.get(url)).await?,
                None => break,
            }
        }

        Ok(all_items)
    }

    /// Fetch assignment, quiz or discussion details.
    pub async fn get_item_details(
        &self,
        kind: PlannableKind,
        course_id: i64,
        item_id: i64,
    ) -> Result<Option<CanvasItemDetails>, AppError> {
        let collection = match kind {
            PlannableKind::Assignment => "assignments",
            PlannableKind::Quiz => "quizzes",
            PlannableKind::DiscussionTopic => "discussion_topics",
            // Checkpoints have no endpoint of their own; the planner entry is all there is.
            PlannableKind::SubAssignment => return Ok(None),
            _ => return Ok(None),
        };
        let endpoint = format!("/courses/{}/{}/{}", course_id, collection, item_id);
        let response = self.send(self.client.get(self.api_url(&endpoint))).await?;
        self.handle_response(response, &endpoint).await.map(Some)
    }

    /// Create a planner override.
    pub async fn create_planner_override(
        &self,
        plannable_type: &str,
        plannable_id: i64,
        marked_complete: bool,
    ) -> Result<CanvasPlannerOverride, AppError> {
        let endpoint = "/planner/overrides";
        let body = NewOverrideBody {
            plannable_type,
            plannable_id,
            marked_complete,
        };
        let request = self.client.post(self.api_url(endpoint)).json(&body);
        let response = self.send(request).await?;
        self.handle_response(response, endpoint).await
    }

    /// Update an existing planner override.
    pub async fn update_planner_override(
        &self,
        override_id: i64,
        marked_complete: bool,
    ) -> Result<CanvasPlannerOverride, AppError> {
        let endpoint = format!("/planner/overrides/{}", override_id);
        let request = self
            .client
            .put(self.api_url(&endpoint))
            .json(&UpdateOverrideBody { marked_complete });
        let response = self.send(request).await?;
        self.handle_response(response, &endpoint).await
    }
}

#[async_trait]
impl PlannerSource for CanvasClient {
    async fn fetch_items(&self) -> Result<Vec<UpstreamItem>, AppError> {
        let items = self.get_planner_items().await?;
        log::debug!("[canvas] fetched {} planner items", items.len());
        Ok(items
            .into_iter()
            .map(|item| item.into_upstream(&self.config.base_url))
            .collect())
    }

    async fn fetch_details(&self, item: &UpstreamItem) -> Result<ItemDetails, AppError> {
        let fallback = ItemDetails {
            due_at: item.due_at.clone(),
            locked: false,
            title: item.title.clone(),
            description: None,
        };

        let Some(course_id) = item.course_id else {
            return Ok(fallback);
        };

        match self
            .get_item_details(item.kind, course_id, item.plannable_id)
            .await?
        {
            Some(details) => Ok(ItemDetails {
                due_at: details.due_at.or(fallback.due_at),
                locked: details.locked_for_user,
                title: details
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or(fallback.title),
                description: details.description.or(details.message),
            }),
            None => Ok(fallback),
        }
    }

    async fn create_override(&self, item: &UpstreamItem, completed: bool) -> Result<(), AppError> {
        self.create_planner_override(&item.kind.to_string(), item.plannable_id, completed)
            .await
            .map(|_| ())
    }

    async fn update_override(&self, override_id: i64, completed: bool) -> Result<(), AppError> {
        self.update_planner_override(override_id, completed)
            .await
            .map(|_| ())
    }
}
