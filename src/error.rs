//! Application error types.
//!
//! These errors are serializable so that sync reports (including per-tenant
//! failures) can be emitted as structured JSON by the CLI.

use serde::Serialize;
use thiserror::Error;

/// Application-level errors returned by adapters, the sync cycle and the
/// sync manager.
///
/// All variants serialize to a structured JSON object.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// An external API answered with a non-success status.
    #[error("{service} API error: {message}")]
    Api {
        service: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },

    /// Network request failed.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Authentication failed or credentials invalid.
    #[error("Authentication error: {message}")]
    Authentication {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        service: Option<String>,
    },

    /// The external system rejected the request because of its own rate limit.
    #[error("Rate limited by {service}")]
    RateLimited { service: String },

    /// Tenant or process configuration is missing or malformed.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },

    /// Invalid input provided.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },

    /// Internal application error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create an API error with status code and endpoint.
    pub fn api_full(
        service: impl Into<String>,
        message: impl Into<String>,
        status_code: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::Api {
            service: service.into(),
            message: message.into(),
            status_code: Some(status_code),
            endpoint: Some(endpoint.into()),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            service: None,
        }
    }

    /// Create an authentication error attributed to a service.
    pub fn authentication_for(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            service: Some(service.into()),
        }
    }

    /// Create a rate-limited error.
    pub fn rate_limited(service: impl Into<String>) -> Self {
        Self::RateLimited {
            service: service.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error naming the offending field.
    pub fn config_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an invalid input error with field name.
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this failure is expected to clear up on a later tick
    /// (network trouble, a non-2xx answer, throttling).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::RateLimited { .. } => true,
            Self::Api { status_code, .. } => status_code.map_or(true, |code| code >= 500),
            _ => false,
        }
    }

    /// Check if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

// Conversions from common error types

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network("Request timed out")
        } else if err.is_connect() {
            Self::network("Failed to connect to server")
        } else if err.is_decode() {
            Self::internal(format!("Failed to parse response: {}", err))
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("Invalid config file: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::config(format!("Failed to read config: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = AppError::network("connection reset");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"Network\""));
        assert!(json.contains("connection reset"));
    }

    #[test]
    fn test_api_error_full() {
        let err = AppError::api_full("Canvas", "Not Found", 404, "/api/v1/planner/items");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"status_code\":404"));
        assert!(json.contains("/api/v1/planner/items"));
        assert_eq!(format!("{}", err), "Canvas API error: Not Found");
    }

    #[test]
    fn test_optional_fields_not_serialized() {
        let err = AppError::config("missing token");
        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("field"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::network("timeout").is_transient());
        assert!(AppError::rate_limited("Notion").is_transient());
        assert!(AppError::api_full("Notion", "boom", 502, "/v1/pages").is_transient());
        assert!(!AppError::api_full("Notion", "bad", 400, "/v1/pages").is_transient());
        assert!(!AppError::config_field("blank", "canvas_token").is_transient());
        assert!(AppError::config("x").is_config());
    }
}
