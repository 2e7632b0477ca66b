//! Configuration loading from the environment.
//!
//! A missing override file is ignored. A file that exists but does not
//! parse is a startup error (`ConfigError::EnvFile`) rather than being
//! skipped silently.

use std::collections::HashMap;
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::config::schema::{LogFormat, LogLevel, Secret, ServiceConfig, ServiceKind};
use crate::config::validation::validate_config;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Production environment still carries the compiled-in secret.
    #[error("JWT_SECRET must be set when ENVIRONMENT is `{environment}`")]
    InsecureDefault { environment: String },

    /// The override file exists but could not be parsed.
    #[error("failed to read env file {}: {source}", path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

impl ConfigError {
    /// Environment tag involved in the failure, when known.
    pub fn environment(&self) -> Option<&str> {
        match self {
            ConfigError::InsecureDefault { environment } => Some(environment),
            ConfigError::EnvFile { .. } => None,
        }
    }
}

/// Builds a [`ServiceConfig`] for one member of the service family.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    kind: ServiceKind,
    env_file: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader for `kind`, reading `.env` from the working directory if present.
    pub fn new(kind: ServiceKind) -> Self {
        Self {
            kind,
            env_file: Some(PathBuf::from(".env")),
        }
    }

    pub fn with_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    pub fn without_env_file(mut self) -> Self {
        self.env_file = None;
        self
    }

    /// Load from the override file and the process environment.
    ///
    /// The environment takes precedence over the file. The process
    /// environment is only read, never modified.
    pub fn load(&self) -> Result<ServiceConfig, ConfigError> {
        let file_vars = match &self.env_file {
            Some(path) => read_env_file(path)?,
            None => HashMap::new(),
        };

        self.load_from(|key| env::var(key).ok().or_else(|| file_vars.get(key).cloned()))
    }

    /// Load through an arbitrary key lookup.
    pub fn load_from<F>(&self, lookup: F) -> Result<ServiceConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ServiceConfig::defaults_for(self.kind);
        let mut config = defaults.clone();

        config.service_name = env_string(&lookup, "SERVICE_NAME", &defaults.service_name);
        config.port = env_int(&lookup, "PORT", defaults.port);
        config.environment = env_string(&lookup, "ENVIRONMENT", &defaults.environment);

        config.database.url = env_string(&lookup, "DATABASE_URL", &defaults.database.url);
        config.database.pool_size =
            env_int(&lookup, "DATABASE_POOL_SIZE", defaults.database.pool_size);
        config.cache.redis_url = env_string(&lookup, "REDIS_URL", &defaults.cache.redis_url);

        let obs = &defaults.observability;
        config.observability.jaeger_agent_host =
            env_string(&lookup, "JAEGER_AGENT_HOST", &obs.jaeger_agent_host);
        config.observability.jaeger_agent_port =
            env_int(&lookup, "JAEGER_AGENT_PORT", obs.jaeger_agent_port);
        config.observability.prometheus_port =
            env_int(&lookup, "PROMETHEUS_PORT", obs.prometheus_port);
        config.observability.log_level =
            LogLevel::parse_or_default(&env_string(&lookup, "LOG_LEVEL", obs.log_level.as_filter()));
        config.observability.log_format =
            LogFormat::from_setting(&env_string(&lookup, "LOG_FORMAT", "json"));

        config.auth.jwt_secret = Secret::new(env_string(
            &lookup,
            "JWT_SECRET",
            defaults.auth.jwt_secret.expose(),
        ));
        config.auth.issuer = env_string(&lookup, "JWT_ISSUER", &defaults.auth.issuer);
        config.auth.audience = env_string(&lookup, "JWT_AUDIENCE", &config.service_name);

        config.features.rls_enabled =
            env_bool(&lookup, "FEATURE_RLS_ENABLED", defaults.features.rls_enabled);
        config.features.audit_enabled =
            env_bool(&lookup, "FEATURE_AUDIT_ENABLED", defaults.features.audit_enabled);

        config.shutdown_timeout = Duration::from_secs(env_int(
            &lookup,
            "SHUTDOWN_TIMEOUT_SECS",
            defaults.shutdown_timeout.as_secs(),
        ));

        validate_config(&config)?;
        Ok(config)
    }
}

/// Load the default (auth) service configuration.
pub fn load() -> Result<ServiceConfig, ConfigError> {
    ConfigLoader::new(ServiceKind::default()).load()
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(dotenvy::Error::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
            return Ok(HashMap::new())
        }
        Err(source) => {
            return Err(ConfigError::EnvFile {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    iter.map(|item| {
        item.map_err(|source| ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        })
    })
    .collect()
}

fn env_string<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}

/// Parse failures fall back to `default`.
fn env_int<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => matches!(value.as_str(), "true" | "1" | "yes"),
        None => default,
    }
}
