//! Notion database API client.
//!
//! Reads and writes task rows in one database. Page properties are flattened
//! into `property_<name>` keys with their typed envelopes removed before
//! they are mapped onto [`DownstreamItem`].

use crate::error::AppError;
use crate::models::{
    DatabaseItemUpdate, DownstreamItem, NewDatabaseItem, TaskStatus, TenantConfig,
};
use crate::services::admission::{AdmissionScheduler, NOTION_MIN_SPACING};
use crate::services::due_date;
use crate::services::html_text::truncate_chars;
use crate::services::sources::TaskDatabase;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const SERVICE: &str = "Notion";

/// Default API base URL.
pub const NOTION_API_URL: &str = "https://api.notion.com";

/// API version sent with every request.
pub const NOTION_VERSION: &str = "2022-06-28";

const PAGE_SIZE: u32 = 100;

/// Longest text a single rich-text object may hold.
const MAX_RICH_TEXT_CHARS: usize = 2000;

/// Most child blocks accepted in one create request.
const MAX_CHILD_BLOCKS: usize = 100;

/// Database column names.
pub mod columns {
    pub const NAME: &str = "Name";
    pub const ID: &str = "ID";
    pub const DUE_DATE: &str = "Due date";
    pub const STATUS: &str = "Status";
    pub const COURSE: &str = "Course";
    pub const SIZE: &str = "Size";
    pub const LINK: &str = "Link";
}

/// Notion API client configuration.
#[derive(Debug, Clone)]
pub struct NotionClientConfig {
    /// API base URL, overridable for tests.
    pub base_url: String,

    /// Integration token.
    pub token: String,

    pub database_id: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Rows edited within this many days are fetched.
    pub days_to_fetch: i64,

    /// Minimum spacing between request starts.
    pub min_spacing: Duration,
}

impl Default for NotionClientConfig {
    fn default() -> Self {
        Self {
            base_url: NOTION_API_URL.to_string(),
            token: String::new(),
            database_id: String::new(),
            timeout_secs: 30,
            days_to_fetch: crate::models::tenant::DEFAULT_DAYS_TO_FETCH,
            min_spacing: NOTION_MIN_SPACING,
        }
    }
}

impl NotionClientConfig {
    pub fn from_tenant(tenant: &TenantConfig, min_spacing: Duration) -> Self {
        Self {
            token: tenant.notion_token.clone(),
            database_id: tenant.notion_database_id.clone(),
            days_to_fetch: tenant.days_to_fetch,
            min_spacing,
            ..Default::default()
        }
    }
}

/// Notion API client.
#[derive(Debug, Clone)]
pub struct NotionClient {
    client: Client,
    config: NotionClientConfig,
    gate: Arc<AdmissionScheduler>,
}

/// A page as returned by the query endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct NotionPage {
    pub id: String,
    #[serde(default)]
    pub in_trash: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// One page of query results.
#[derive(Debug, Clone, Deserialize)]
pub struct NotionQueryResponse {
    pub results: Vec<NotionPage>,
    #[serde(default)]
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CreatedPage {
    id: String,
}

/// Key under which a property lands after flattening.
pub fn flat_key(property_name: &str) -> String {
    format!(
        "property_{}",
        property_name.trim().to_lowercase().replace(' ', "_")
    )
}

/// Flatten a page's property bag into plain values.
pub fn flatten_properties(properties: &Map<String, Value>) -> HashMap<String, Value> {
    properties
        .iter()
        .map(|(name, value)| (flat_key(name), unwrap_property(value)))
        .collect()
}

/// Strip the typed envelope from a single property value.
fn unwrap_property(property: &Value) -> Value {
    let Some(kind) = property.get("type").and_then(Value::as_str) else {
        return Value::Null;
    };
    let inner = property.get(kind).cloned().unwrap_or(Value::Null);

    match kind {
        "title" | "rich_text" => Value::String(plain_text(&inner)),
        "select" | "status" => inner.get("name").cloned().unwrap_or(Value::Null),
        "multi_select" => Value::Array(
            inner
                .as_array()
                .map(|options| {
                    options
                        .iter()
                        .filter_map(|o| o.get("name").cloned())
                        .collect()
                })
                .unwrap_or_default(),
        ),
        "date" => inner.get("start").cloned().unwrap_or(Value::Null),
        "formula" => inner
            .get("type")
            .and_then(Value::as_str)
            .and_then(|t| inner.get(t).cloned())
            .unwrap_or(Value::Null),
        _ => inner,
    }
}

fn plain_text(rich_text: &Value) -> String {
    rich_text
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("plain_text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Map a flattened row onto a database item. Rows without an ID are skipped.
pub fn to_downstream(page_id: &str, flat: &HashMap<String, Value>) -> Option<DownstreamItem> {
    let external_id = match flat.get(&flat_key(columns::ID))? {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => {
                let f = n.as_f64()?;
                if f.fract() != 0.0 {
                    return None;
                }
                (f as i64).to_string()
            }
        },
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return None,
    };

    let due_date = flat
        .get(&flat_key(columns::DUE_DATE))
        .and_then(Value::as_str)
        .map(String::from);

    let status = flat
        .get(&flat_key(columns::STATUS))
        .and_then(Value::as_str)
        .and_then(TaskStatus::parse)
        .unwrap_or(TaskStatus::Unrecognized);

    Some(DownstreamItem {
        external_id,
        due_date,
        status,
        record_id: page_id.to_string(),
    })
}

fn date_property(canonical: &str) -> Value {
    if canonical.is_empty() {
        json!({ "date": null })
    } else {
        json!({ "date": { "start": canonical } })
    }
}

/// Build the property payload for a new row.
pub fn create_properties(item: &NewDatabaseItem) -> Value {
    let mut properties = Map::new();
    properties.insert(
        columns::NAME.to_string(),
        json!({ "title": [{ "text": { "content": truncate_chars(&item.title, MAX_RICH_TEXT_CHARS) } }] }),
    );
    properties.insert(columns::ID.to_string(), json!({ "number": item.external_id }));
    properties.insert(columns::DUE_DATE.to_string(), date_property(&item.due_date));
    properties.insert(
        columns::STATUS.to_string(),
        json!({ "status": { "name": item.status.as_str() } }),
    );
    properties.insert(
        columns::SIZE.to_string(),
        json!({ "select": { "name": item.size.as_str() } }),
    );

    // Select option names may not contain commas.
    let course = item.course_name.replace(',', " ");
    if !course.trim().is_empty() {
        properties.insert(
            columns::COURSE.to_string(),
            json!({ "select": { "name": course.trim() } }),
        );
    }
    if !item.url.is_empty() {
        properties.insert(columns::LINK.to_string(), json!({ "url": item.url }));
    }

    Value::Object(properties)
}

/// Build the property payload for a partial update.
pub fn update_properties(update: &DatabaseItemUpdate) -> Value {
    let mut properties = Map::new();
    if let Some(due) = &update.due_date {
        properties.insert(columns::DUE_DATE.to_string(), date_property(due));
    }
    if let Some(status) = update.status {
        properties.insert(
            columns::STATUS.to_string(),
            json!({ "status": { "name": status.as_str() } }),
        );
    }
    Value::Object(properties)
}

/// Paragraph blocks for a description, split on blank lines and chunked to
/// the rich-text limit.
pub fn description_blocks(description: &str) -> Vec<Value> {
    let mut blocks = Vec::new();
    for paragraph in description.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let mut rest = paragraph;
        while !rest.is_empty() {
            let chunk = truncate_chars(rest, MAX_RICH_TEXT_CHARS);
            rest = &rest[chunk.len()..];
            blocks.push(json!({
                "object": "block",
                "type": "paragraph",
                "paragraph": { "rich_text": [{ "type": "text", "text": { "content": chunk } }] }
            }));
        }
    }
    blocks.truncate(MAX_CHILD_BLOCKS);
    blocks
}

impl NotionClient {
    /// Create a new Notion client.
    pub fn new(config: NotionClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();

        let token_value = header::HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| AppError::authentication_for(SERVICE, "Invalid token format"))?;
        headers.insert(header::AUTHORIZATION, token_value);
        headers.insert(
            "Notion-Version",
            header::HeaderValue::from_static(NOTION_VERSION),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        let gate = Arc::new(AdmissionScheduler::new("notion", config.min_spacing));

        Ok(Self {
            client,
            config,
            gate,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1{}", self.config.base_url.trim_end_matches('/'), path)
    }

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
                "Notion integration token is invalid",
            ))
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Err(AppError::rate_limited(SERVICE))
        } else {
            let status_code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            // {"object": "error", "code": "...", "message": "..."}
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
                .unwrap_or_else(|| format!("Request failed ({}): {}", status_code, body));

            Err(AppError::api_full(SERVICE, message, status_code, endpoint))
        }
    }

    fn query_body(&self, start_cursor: Option<&str>) -> Result<Value, AppError> {
        let now = Utc::now();
        let edited_after = due_date::shift_days(now, self.config.days_to_fetch.saturating_neg())?
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let due_from = due_date::shift_days(now, -1)?.to_rfc3339_opts(SecondsFormat::Millis, true);

        let mut body = json!({
            "page_size": PAGE_SIZE,
            "filter": {
                "or": [
                    { "timestamp": "last_edited_time", "last_edited_time": { "after": edited_after } },
                    { "property": columns::DUE_DATE, "date": { "on_or_after": due_from } }
                ]
            }
        });
        if let Some(cursor) = start_cursor {
            body["start_cursor"] = Value::String(cursor.to_string());
        }
        Ok(body)
    }

    /// Query the database, following `next_cursor` until `has_more` is false.
    pub async fn query_database(&self) -> Result<Vec<NotionPage>, AppError> {
        let endpoint = format!("/databases/{}/query", self.config.database_id);
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let request = self
                .client
                .post(self.api_url(&endpoint))
                .json(&self.query_body(cursor.as_deref())?);
            let response = self.send(request).await?;
            let page: NotionQueryResponse = self.handle_response(response, &endpoint).await?;

            pages.extend(page.results);

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        Ok(pages)
    }

    /// Create a page in the database, returning its ID.
    pub async fn create_page(&self, item: &NewDatabaseItem) -> Result<String, AppError> {
        let endpoint = "/pages";
        let mut body = json!({
            "parent": { "database_id": self.config.database_id },
            "properties": create_properties(item),
        });
        let children = description_blocks(&item.description);
        if !children.is_empty() {
            body["children"] = Value::Array(children);
        }

        let response = self
            .send(self.client.post(self.api_url(endpoint)).json(&body))
            .await?;
        let created: CreatedPage = self.handle_response(response, endpoint).await?;
        Ok(created.id)
    }

    /// Patch a page's properties.
    pub async fn update_page(
        &self,
        page_id: &str,
        update: &DatabaseItemUpdate,
    ) -> Result<(), AppError> {
        if update.is_empty() {
            return Ok(());
        }
        let endpoint = format!("/pages/{}", page_id);
        let body = json!({ "properties": update_properties(update) });
        let response = self
            .send(self.client.patch(self.api_url(&endpoint)).json(&body))
            .await?;
        self.handle_response::<Value>(response, &endpoint)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl TaskDatabase for NotionClient {
    async fn fetch_items(&self) -> Result<Vec<DownstreamItem>, AppError> {
        let pages = self.query_database().await?;
        let total = pages.len();

        let items: Vec<DownstreamItem> = pages
            .iter()
            .filter(|page| !page.in_trash && !page.archived)
            .filter_map(|page| to_downstream(&page.id, &flatten_properties(&page.properties)))
            .collect();

        if items.len() < total {
            log::debug!(
                "[notion] skipped {} rows without an ID or in trash",
                total - items.len()
            );
        }
        Ok(items)
    }

    async fn create_item(&self, item: &NewDatabaseItem) -> Result<String, AppError> {
        self.create_page(item).await
    }

    async fn update_item(
        &self,
        record_id: &str,
        update: &DatabaseItemUpdate,
    ) -> Result<(), AppError> {
        self.update_page(record_id, update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SizeLabel;

    fn sample_properties() -> Map<String, Value> {
        let value = json!({
            "Name": { "id": "title", "type": "title", "title": [
                { "type": "text", "plain_text": "Problem " },
                { "type": "text", "plain_text": "Set 3" }
            ]},
            "ID": { "id": "a1", "type": "number", "number": 5 },
            "Due date": { "id": "b2", "type": "date", "date": { "start": "2025-02-12", "end": null, "time_zone": null } },
            "Status": { "id": "c3", "type": "status", "status": { "id": "s", "name": "Started", "color": "blue" } },
            "Course": { "id": "d4", "type": "select", "select": null },
            "Last edited time": { "id": "e5", "type": "last_edited_time", "last_edited_time": "2025-02-01T10:00:00.000Z" }
        });
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_flat_key() {
        assert_eq!(flat_key("Due date"), "property_due_date");
        assert_eq!(flat_key("ID"), "property_id");
    }

    #[test]
    fn test_flatten_properties() {
        let flat = flatten_properties(&sample_properties());
        assert_eq!(flat["property_name"], json!("Problem Set 3"));
        assert_eq!(flat["property_id"], json!(5));
        assert_eq!(flat["property_due_date"], json!("2025-02-12"));
        assert_eq!(flat["property_status"], json!("Started"));
        assert_eq!(flat["property_course"], Value::Null);
        assert_eq!(
            flat["property_last_edited_time"],
            json!("2025-02-01T10:00:00.000Z")
        );
    }

    #[test]
    fn test_to_downstream() {
        let flat = flatten_properties(&sample_properties());
        let item = to_downstream("page-1", &flat).unwrap();
        assert_eq!(item.external_id, "5");
        assert_eq!(item.due_date.as_deref(), Some("2025-02-12"));
        assert_eq!(item.status, TaskStatus::Started);
        assert_eq!(item.record_id, "page-1");
    }

    #[test]
    fn test_rows_without_id_are_skipped() {
        let mut properties = sample_properties();
        properties.insert(
            "ID".to_string(),
            json!({ "id": "a1", "type": "number", "number": null }),
        );
        let flat = flatten_properties(&properties);
        assert!(to_downstream("page-1", &flat).is_none());
    }

    #[test]
    fn test_float_ids_are_integral() {
        let mut flat = HashMap::new();
        flat.insert(flat_key("ID"), json!(42.0));
        let item = to_downstream("p", &flat).unwrap();
        assert_eq!(item.external_id, "42");
        assert_eq!(item.status, TaskStatus::Unrecognized);
    }

    #[test]
    fn test_create_properties() {
        let item = NewDatabaseItem {
            external_id: 5,
            title: "Essay".to_string(),
            course_name: "HIST 1, Section 2".to_string(),
            due_date: String::new(),
            status: TaskStatus::Locked,
            size: SizeLabel::L,
            url: "https://canvas.example.edu/courses/1/assignments/5".to_string(),
            description: String::new(),
        };
        let props = create_properties(&item);
        assert_eq!(props["ID"]["number"], json!(5));
        assert_eq!(props["Due date"]["date"], Value::Null);
        assert_eq!(props["Status"]["status"]["name"], json!("Locked"));
        assert_eq!(props["Size"]["select"]["name"], json!("L"));
        assert_eq!(props["Course"]["select"]["name"], json!("HIST 1  Section 2"));
    }

    #[test]
    fn test_update_properties_only_sets_given_fields() {
        let props = update_properties(&DatabaseItemUpdate::due_date("2025-02-13"));
        assert_eq!(props["Due date"]["date"]["start"], json!("2025-02-13"));
        assert!(props.get("Status").is_none());
    }

    #[test]
    fn test_description_blocks_chunked() {
        let long = "x".repeat(4500);
        let text = format!("First paragraph\n\n{}", long);
        let blocks = description_blocks(&text);
        assert_eq!(blocks.len(), 4);
        assert_eq!(
            blocks[0]["paragraph"]["rich_text"][0]["text"]["content"],
            json!("First paragraph")
        );
        assert!(description_blocks("").is_empty());
    }
}
