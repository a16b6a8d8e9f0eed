use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - API base URL is set
/// - Batch size and slot maximum are non-zero
/// - Poll intervals are non-zero
/// - Critical quota water mark does not exceed the low water mark
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.api.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "api.base_url cannot be empty".to_string(),
        ));
    }

    let orchestrator = &config.orchestrator;

    if orchestrator.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.batch_size cannot be 0".to_string(),
        ));
    }

    if orchestrator.max_running_slots == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.max_running_slots cannot be 0".to_string(),
        ));
    }

    if orchestrator.slot_poll_interval_ms == 0 || orchestrator.status_poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator poll intervals cannot be 0".to_string(),
        ));
    }

    if orchestrator.rate_limit_critical_water > orchestrator.rate_limit_low_water {
        return Err(ConfigError::ValidationError(format!(
            "orchestrator.rate_limit_critical_water ({}) cannot exceed rate_limit_low_water ({})",
            orchestrator.rate_limit_critical_water, orchestrator.rate_limit_low_water
        )));
    }

    Ok(())
}
