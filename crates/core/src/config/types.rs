use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
}

/// Remote report API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// API host, with or without scheme (e.g., "qualysapi.qualys.eu")
    pub base_url: String,
    /// API username (usually supplied through the environment)
    #[serde(default)]
    pub username: String,
    /// API password (usually supplied through the environment)
    #[serde(default)]
    pub password: String,
    /// Optional HTTP(S) proxy for every request
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Retries for transport failures (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_timeout() -> u32 {
    30
}

fn default_max_retries() -> u32 {
    3
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/scanreports.db")
}

/// Report download configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportsConfig {
    /// Directory downloaded reports are written to
    #[serde(default = "default_download_path")]
    pub download_path: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            download_path: default_download_path(),
        }
    }
}

fn default_download_path() -> PathBuf {
    PathBuf::from("Downloads")
}

/// Report templates used to expand a selection into report requests
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TemplatesConfig {
    /// Templates applied to every selected scan
    #[serde(default)]
    pub scan: Vec<ReportTemplate>,
    /// Host-based templates
    #[serde(default)]
    pub host: Vec<ReportTemplate>,
}

/// A single report template
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReportTemplate {
    pub template_id: String,
    pub output_format: String,
    #[serde(default)]
    pub description: String,
}

/// Sanitized config for display (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub api: SanitizedApiConfig,
    pub database: DatabaseConfig,
    pub reports: ReportsConfig,
    pub orchestrator: OrchestratorConfig,
    pub templates: TemplatesConfig,
}

/// Sanitized API config (password hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedApiConfig {
    pub base_url: String,
    pub username: String,
    pub password_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    pub timeout_secs: u32,
    pub max_retries: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            api: SanitizedApiConfig {
                base_url: config.api.base_url.clone(),
                username: config.api.username.clone(),
                password_configured: !config.api.password.is_empty(),
                proxy_url: config.api.proxy_url.clone(),
                timeout_secs: config.api.timeout_secs,
                max_retries: config.api.max_retries,
            },
            database: config.database.clone(),
            reports: config.reports.clone(),
            orchestrator: config.orchestrator.clone(),
            templates: config.templates.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> Config {
        Config {
            api: ApiConfig {
                base_url: "qualysapi.example.com".to_string(),
                username: "user".to_string(),
                password: "secret".to_string(),
                proxy_url: None,
                timeout_secs: 30,
                max_retries: 3,
            },
            database: DatabaseConfig::default(),
            reports: ReportsConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            templates: TemplatesConfig::default(),
        }
    }

    #[test]
    fn test_deserialize_minimal_config() {
        let toml = r#"
[api]
base_url = "qualysapi.example.com"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.api.base_url, "qualysapi.example.com");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.api.max_retries, 3);
        assert!(config.api.proxy_url.is_none());
        assert_eq!(
            config.database.path.to_str().unwrap(),
            "data/scanreports.db"
        );
        assert_eq!(config.reports.download_path.to_str().unwrap(), "Downloads");
        assert_eq!(config.orchestrator.batch_size, 4);
        assert!(config.templates.scan.is_empty());
    }

    #[test]
    fn test_deserialize_missing_api_fails() {
        let toml = r#"
[database]
path = "x.db"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_templates() {
        let toml = r#"
[api]
base_url = "qualysapi.example.com"

[[templates.scan]]
template_id = "91234"
output_format = "pdf"
description = "Executive summary"

[[templates.scan]]
template_id = "91235"
output_format = "csv"

[[templates.host]]
template_id = "80001"
output_format = "csv"
description = "All hosts"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.templates.scan.len(), 2);
        assert_eq!(config.templates.scan[0].template_id, "91234");
        assert_eq!(config.templates.scan[1].description, "");
        assert_eq!(config.templates.host.len(), 1);
        assert_eq!(config.templates.host[0].output_format, "csv");
    }

    #[test]
    fn test_sanitized_config_hides_password() {
        let config = minimal_config();
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.api.password_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("password_configured"));
    }

    #[test]
    fn test_sanitized_config_without_password() {
        let mut config = minimal_config();
        config.api.password.clear();
        let sanitized = SanitizedConfig::from(&config);
        assert!(!sanitized.api.password_configured);
    }
}
