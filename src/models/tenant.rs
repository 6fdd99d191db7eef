//! Per-user connection settings.

use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// Default model used by the size classifier.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Default look-ahead window, in days.
pub const DEFAULT_DAYS_TO_FETCH: i64 = 16;

/// Largest accepted look-ahead window, in days.
pub const MAX_DAYS_TO_FETCH: i64 = 365;

fn default_days_to_fetch() -> i64 {
    DEFAULT_DAYS_TO_FETCH
}

/// Credentials and endpoints for one user's planner/database pair.
///
/// Owned by the sync manager once registered; never mutated afterwards.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantConfig {
    /// Canvas instance URL (e.g., `https://canvas.example.edu`).
    pub canvas_url: String,

    pub canvas_token: String,

    pub notion_token: String,

    pub notion_database_id: String,

    /// OpenAI key for size estimates; without it every new item is sized `M`.
    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default)]
    pub openai_model: Option<String>,

    #[serde(default = "default_days_to_fetch")]
    pub days_to_fetch: i64,
}

// Tokens stay out of logs.
impl std::fmt::Debug for TenantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantConfig")
            .field("canvas_url", &self.canvas_url)
            .field("notion_database_id", &self.notion_database_id)
            .field("classifier", &self.openai_api_key.is_some())
            .field("days_to_fetch", &self.days_to_fetch)
            .finish()
    }
}

impl TenantConfig {
    /// Normalize a base URL by removing trailing slashes.
    pub fn normalize_url(url: &str) -> String {
        url.trim().trim_end_matches('/').to_string()
    }

    /// Model name for the classifier, falling back to the default.
    pub fn model(&self) -> &str {
        self.openai_model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_OPENAI_MODEL)
    }

    /// The classifier key, if one is configured and non-blank.
    pub fn classifier_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Check that every required field is present and well formed.
    pub fn validate(&self) -> Result<(), AppError> {
        let required = [
            ("canvas_url", &self.canvas_url),
            ("canvas_token", &self.canvas_token),
            ("notion_token", &self.notion_token),
            ("notion_database_id", &self.notion_database_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::config_field(
                    format!("{} needs to be set", field),
                    field,
                ));
            }
        }

        let url = self.canvas_url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(AppError::config_field(
                "canvas_url must be an http(s) URL",
                "canvas_url",
            ));
        }

        if !(1..=MAX_DAYS_TO_FETCH).contains(&self.days_to_fetch) {
            return Err(AppError::config_field(
                format!("days_to_fetch must be between 1 and {}", MAX_DAYS_TO_FETCH),
                "days_to_fetch",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_config() -> TenantConfig {
    TenantConfig {
        canvas_url: "https://canvas.example.edu".to_string(),
        canvas_token: "canvas-token".to_string(),
        notion_token: "secret_notion".to_string(),
        notion_database_id: "db123".to_string(),
        openai_api_key: None,
        openai_model: None,
        days_to_fetch: DEFAULT_DAYS_TO_FETCH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            TenantConfig::normalize_url("https://canvas.example.edu/"),
            "https://canvas.example.edu"
        );
        assert_eq!(
            TenantConfig::normalize_url("https://canvas.example.edu///"),
            "https://canvas.example.edu"
        );
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_validate_names_missing_field() {
        let mut config = sample_config();
        config.notion_token = "  ".to_string();
        match config.validate() {
            Err(AppError::Config { field, .. }) => {
                assert_eq!(field.as_deref(), Some("notion_token"))
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let mut config = sample_config();
        config.canvas_url = "canvas.example.edu".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_days_to_fetch() {
        let mut config = sample_config();
        for days in [0, -3, MAX_DAYS_TO_FETCH + 1, 1_000_000_000_000] {
            config.days_to_fetch = days;
            match config.validate() {
                Err(AppError::Config { field, .. }) => {
                    assert_eq!(field.as_deref(), Some("days_to_fetch"))
                }
                other => panic!("expected config error for {}, got {:?}", days, other),
            }
        }

        config.days_to_fetch = MAX_DAYS_TO_FETCH;
        assert!(config.validate().is_ok());
        config.days_to_fetch = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_model_and_key_fallbacks() {
        let mut config = sample_config();
        assert_eq!(config.model(), DEFAULT_OPENAI_MODEL);
        assert!(config.classifier_key().is_none());

        config.openai_api_key = Some("  ".to_string());
        assert!(config.classifier_key().is_none());

        config.openai_api_key = Some("sk-test".to_string());
        config.openai_model = Some("gpt-4o".to_string());
        assert_eq!(config.classifier_key(), Some("sk-test"));
        assert_eq!(config.model(), "gpt-4o");
    }

    #[test]
    fn test_debug_hides_tokens() {
        let rendered = format!("{:?}", sample_config());
        assert!(!rendered.contains("canvas-token"));
        assert!(!rendered.contains("secret_notion"));
    }
}
