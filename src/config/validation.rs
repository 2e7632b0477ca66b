//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation after all values have been resolved
//! - Reject deployments that would run with compiled-in secrets
//!
//! # Design Decisions
//! - Validation is a pure function: &ServiceConfig → Result<(), ConfigError>
//! - Runs before the config is handed to the orchestrator

use crate::config::loader::ConfigError;
use crate::config::schema::ServiceConfig;

/// Check a fully resolved configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), ConfigError> {
    if config.is_production() && config.auth.jwt_secret.is_placeholder() {
        return Err(ConfigError::InsecureDefault {
            environment: config.environment.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Secret;

    #[test]
    fn development_defaults_are_valid() {
        assert!(validate_config(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn production_requires_real_secret() {
        let mut config = ServiceConfig::default();
        config.environment = "production".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InsecureDefault { environment }) if environment == "production"
        ));

        config.auth.jwt_secret = Secret::new("rotated");
        assert!(validate_config(&config).is_ok());
    }
}
