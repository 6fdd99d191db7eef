//! Effort-size classifier backed by the OpenAI chat completions API.
//!
//! The classifier is optional. Without a key, or when the request or its
//! answer is unusable, it reports no estimate and the caller sizes the task
//! with the default label.

use crate::error::AppError;
use crate::models::{SizeLabel, TenantConfig};
use crate::services::admission::{AdmissionScheduler, OPENAI_MIN_SPACING};
use crate::services::html_text::{truncate_chars, MAX_DESCRIPTION_CHARS};
use crate::services::sources::SizeClassifier;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const SERVICE: &str = "OpenAI";

/// Default API base URL.
pub const OPENAI_API_URL: &str = "https://api.openai.com";

const SYSTEM_PROMPT: &str = "You are a teaching assistant for a college course. Estimate how much \
effort a student needs to complete an assignment, using T-shirt sizes (XS, S, M, L, XL), based \
only on its title, course and description. Judge the assignment as a whole. If the description \
is vague, answer M.";

const TEMPERATURE: f64 = 0.7;

/// Classifier client configuration.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub min_spacing: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: OPENAI_API_URL.to_string(),
            api_key: String::new(),
            model: crate::models::tenant::DEFAULT_OPENAI_MODEL.to_string(),
            timeout_secs: 30,
            min_spacing: OPENAI_MIN_SPACING,
        }
    }
}

impl ClassifierConfig {
    /// Build a config when the tenant has a classifier key.
    pub fn from_tenant(tenant: &TenantConfig, min_spacing: Duration) -> Option<Self> {
        tenant.classifier_key().map(|key| Self {
            api_key: key.to_string(),
            model: tenant.model().to_string(),
            min_spacing,
            ..Default::default()
        })
    }
}

/// OpenAI-backed size classifier.
#[derive(Debug, Clone)]
pub struct OpenAiClassifier {
    client: Client,
    config: ClassifierConfig,
    gate: Arc<AdmissionScheduler>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Estimate {
    estimate: String,
}

/// The JSON schema the model must answer with.
fn response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "task_complexity",
            "description": "Estimates the complexity of a given task in T-shirt sizes",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "estimate": {
                        "type": "string",
                        "description": "The complexity of the task",
                        "enum": ["XS", "S", "M", "L", "XL"]
                    }
                },
                "additionalProperties": false,
                "required": ["estimate"]
            }
        }
    })
}

/// Text of the user message.
fn user_prompt(title: &str, course_name: &str, description: &str) -> String {
    format!(
        "Course: {}\nTitle: {}\nDescription:\n{}",
        course_name,
        title,
        truncate_chars(description, MAX_DESCRIPTION_CHARS)
    )
}

/// Pull the size label out of a chat completion.
fn parse_estimate(response: ChatResponse) -> Option<SizeLabel> {
    let content = response.choices.into_iter().next()?.message.content?;
    let estimate: Estimate = serde_json::from_str(&content).ok()?;
    SizeLabel::parse(&estimate.estimate)
}

impl OpenAiClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();
        let key_value = header::HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| AppError::authentication_for(SERVICE, "Invalid API key format"))?;
        headers.insert(header::AUTHORIZATION, key_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        let gate = Arc::new(AdmissionScheduler::new("openai", config.min_spacing));

        Ok(Self {
            client,
            config,
            gate,
        })
    }

    /// Ask the model for an estimate. Errors are returned as-is.
    pub async fn request_estimate(
        &self,
        title: &str,
        course_name: &str,
        description: &str,
    ) -> Result<Option<SizeLabel>, AppError> {
        let endpoint = "/v1/chat/completions";
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let body = json!({
            "model": self.config.model,
            "temperature": TEMPERATURE,
            "response_format": response_format(),
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt(title, course_name, description) }
            ]
        });

        let response = self
            .gate
            .schedule(self.client.post(&url).json(&body).send())
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::authentication_for(SERVICE, "OpenAI API key rejected"));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::rate_limited(SERVICE));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::api_full(
                SERVICE,
                format!("Request failed ({}): {}", status.as_u16(), body),
                status.as_u16(),
                endpoint,
            ));
        }

        let chat: ChatResponse = response.json().await?;
        Ok(parse_estimate(chat))
    }
}

#[async_trait]
impl SizeClassifier for OpenAiClassifier {
    async fn classify(
        &self,
        title: &str,
        course_name: &str,
        description: &str,
    ) -> Result<Option<SizeLabel>, AppError> {
        match self.request_estimate(title, course_name, description).await {
            Ok(Some(size)) => Ok(Some(size)),
            Ok(None) => {
                log::warn!("[classifier] unusable estimate for {:?}", title);
                Ok(None)
            }
            Err(e) => {
                log::warn!("[classifier] estimate unavailable for {:?}: {}", title, e);
                Ok(None)
            }
        }
    }
}
