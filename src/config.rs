//! Process configuration.
//!
//! Loaded from a TOML file listing every tenant, or built from environment
//! variables for a single tenant named `default`.
//!
//! ```toml
//! interval_secs = 14400
//!
//! [min_spacing_ms]
//! notion = 400
//!
//! [[tenants]]
//! id = "alice"
//! canvas_url = "https://canvas.example.edu"
//! canvas_token = "..."
//! notion_token = "..."
//! notion_database_id = "..."
//! openai_api_key = "..."
//! ```

use crate::error::AppError;
use crate::models::TenantConfig;
use crate::services::admission::{CANVAS_MIN_SPACING, NOTION_MIN_SPACING, OPENAI_MIN_SPACING};
use crate::services::sync_manager::DEFAULT_SYNC_INTERVAL_SECS;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Tenant ID used for environment-based configuration.
pub const ENV_TENANT_ID: &str = "default";

fn default_interval_secs() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

/// Minimum spacing between request starts, per external system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RequestSpacing {
    pub canvas: u64,
    pub notion: u64,
    pub openai: u64,
}

impl Default for RequestSpacing {
    fn default() -> Self {
        Self {
            canvas: CANVAS_MIN_SPACING.as_millis() as u64,
            notion: NOTION_MIN_SPACING.as_millis() as u64,
            openai: OPENAI_MIN_SPACING.as_millis() as u64,
        }
    }
}

impl RequestSpacing {
    pub fn canvas(&self) -> Duration {
        Duration::from_millis(self.canvas)
    }

    pub fn notion(&self) -> Duration {
        Duration::from_millis(self.notion)
    }

    pub fn openai(&self) -> Duration {
        Duration::from_millis(self.openai)
    }
}

/// A tenant as listed in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantEntry {
    pub id: String,
    #[serde(flatten)]
    pub config: TenantConfig,
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Seconds between scheduled passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default)]
    pub min_spacing_ms: RequestSpacing,

    #[serde(default)]
    pub tenants: Vec<TenantEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            min_spacing_ms: RequestSpacing::default(),
            tenants: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self, AppError> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Build a single-tenant config from the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a single-tenant config from a variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::config_field(format!("{} needs to be set", key), key))
        };

        let tenant = TenantConfig {
            canvas_url: required("CANVAS_URL")?,
            canvas_token: required("CANVAS_API_KEY")?,
            notion_token: required("NOTION_API_KEY")?,
            notion_database_id: required("NOTION_DATABASE_ID")?,
            openai_api_key: lookup("OPENAI_API_KEY"),
            openai_model: lookup("OPENAI_MODEL"),
            days_to_fetch: crate::models::tenant::DEFAULT_DAYS_TO_FETCH,
        };

        Ok(Self {
            tenants: vec![TenantEntry {
                id: ENV_TENANT_ID.to_string(),
                config: tenant,
            }],
            ..Default::default()
        })
    }

    /// Process-wide checks. Individual tenants are validated on registration.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.interval_secs == 0 {
            return Err(AppError::config_field(
                "interval_secs must be positive",
                "interval_secs",
            ));
        }

        let mut ids = HashSet::new();
        for tenant in &self.tenants {
            if tenant.id.trim().is_empty() {
                return Err(AppError::config_field("tenant id must not be empty", "id"));
            }
            if !ids.insert(tenant.id.as_str()) {
                return Err(AppError::config_field(
                    format!("tenant {} is listed twice", tenant.id),
                    "id",
                ));
            }
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
