use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment variable prefix for overrides (e.g. `SCANREPORTS_API__PASSWORD`)
pub const ENV_PREFIX: &str = "SCANREPORTS_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[api]
base_url = "qualysapi.example.com"

[orchestrator]
batch_size = 2
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.orchestrator.batch_size, 2);
        assert_eq!(config.orchestrator.max_running_slots, 8);
    }

    #[test]
    fn test_load_config_from_str_missing_api() {
        let toml = r#"
[orchestrator]
batch_size = 2
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[api]
base_url = "qualysapi.example.com"
username = "scanner"
timeout_secs = 60

[reports]
download_path = "/tmp/reports"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.api.username, "scanner");
        assert_eq!(config.api.timeout_secs, 60);
        assert_eq!(
            config.reports.download_path.to_str().unwrap(),
            "/tmp/reports"
        );
    }
}
