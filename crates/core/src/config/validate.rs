use super::{types::Config, ConfigError};

/// Cross-field sanity checks that serde defaults cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port must be non-zero".to_string(),
        ));
    }

    if config.server.max_upload_mb == 0 {
        return Err(ConfigError::ValidationError(
            "server.max_upload_mb must be non-zero".to_string(),
        ));
    }

    if config.engine.probe_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine.probe_timeout_secs must be non-zero".to_string(),
        ));
    }

    if config.engine.stderr_tail_chars == 0 {
        return Err(ConfigError::ValidationError(
            "engine.stderr_tail_chars must be non-zero".to_string(),
        ));
    }

    if config.engine.temp_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "engine.temp_dir must not be empty".to_string(),
        ));
    }

    Ok(())
}
