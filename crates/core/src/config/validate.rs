use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.supervisor.poll_interval_ms == 0 {
        return Err(invalid("supervisor.poll_interval_ms must be greater than 0"));
    }

    let mut seen = HashSet::new();
    for pool in &config.pools {
        if pool.job_type.trim().is_empty() {
            return Err(invalid("pools.job_type cannot be empty"));
        }
        if pool.workers == 0 {
            return Err(invalid(format!(
                "pool '{}' must have at least one worker",
                pool.job_type
            )));
        }
        if !seen.insert(pool.job_type.as_str()) {
            return Err(invalid(format!(
                "duplicate pool for job type '{}'",
                pool.job_type
            )));
        }
    }

    if !seen.contains(config.deposits.default_job_type.as_str()) {
        return Err(invalid(format!(
            "deposits.default_job_type '{}' has no pool",
            config.deposits.default_job_type
        )));
    }

    for (packaging, job_type) in &config.deposits.packaging {
        if !seen.contains(job_type.as_str()) {
            return Err(invalid(format!(
                "packaging '{}' maps to job type '{}' which has no pool",
                packaging, job_type
            )));
        }
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}
