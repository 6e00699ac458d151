#![allow(clippy::result_large_err)]

use super::{SplicerConfig, StackBackend, StoreBackend};
use crate::core::error::AppError;
use crate::core::orchestrator::PollPolicy;
use crate::core::types::ErrorCategory;
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use url::Url;

/// File looked up in the working directory when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "splicer.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `explicit`, or `splicer.toml` under `workdir` when present.
    /// Environment variables override file values; the result is validated.
    pub fn load(explicit: Option<&Path>, workdir: &Path) -> Result<SplicerConfig, AppError> {
        let config_file = match explicit {
            Some(path) => Some(Self::load_from_file(path)?.ok_or_else(|| {
                AppError::new(
                    ErrorCategory::ConfigurationError,
                    format!("config file {} does not exist", path.display()),
                )
                .with_code("SPL-CFG-001")
            })?),
            None => Self::load_from_file(&workdir.join(CONFIG_FILE_NAME))?,
        };

        let mut config = config_file.unwrap_or_default();
        Self::apply_env_overrides(&mut config)?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Path the logging layer should read its `[logging]` section from.
    pub fn resolve_path(explicit: Option<&Path>, workdir: &Path) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| workdir.join(CONFIG_FILE_NAME))
    }

    /// Returns Ok(None) if the file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<SplicerConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: SplicerConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("SPL-CFG-002")
        })?;

        Ok(Some(config))
    }

    /// Environment variables take precedence over config file values
    fn apply_env_overrides(config: &mut SplicerConfig) -> Result<(), AppError> {
        if let Ok(backend) = env::var("SPLICER_STORE_BACKEND") {
            config.store.backend = match backend.trim().to_lowercase().as_str() {
                "fs" => StoreBackend::Fs,
                "http" => StoreBackend::Http,
                other => return Err(invalid_env("SPLICER_STORE_BACKEND", other, "fs, http")),
            };
        }
        if let Ok(root) = env::var("SPLICER_STORE_ROOT") {
            config.store.root = PathBuf::from(root);
        }
        if let Ok(endpoint) = env::var("SPLICER_STORE_ENDPOINT") {
            config.store.endpoint = Some(endpoint);
        }
        if let Ok(container) = env::var("SPLICER_STORE_CONTAINER") {
            config.store.container = container;
        }
        if let Ok(class) = env::var("SPLICER_STORE_STORAGE_CLASS") {
            config.store.storage_class = class.parse().map_err(|reason: String| {
                AppError::new(ErrorCategory::ConfigurationError, reason).with_code("SPL-CFG-003")
            })?;
        }
        if let Ok(token) = env::var("SPLICER_STORE_TOKEN") {
            config.store.auth_token = Some(token);
        }

        if let Ok(backend) = env::var("SPLICER_STACK_BACKEND") {
            config.stack.backend = match backend.trim().to_lowercase().as_str() {
                "local" => StackBackend::Local,
                "http" => StackBackend::Http,
                other => return Err(invalid_env("SPLICER_STACK_BACKEND", other, "local, http")),
            };
        }
        if let Ok(endpoint) = env::var("SPLICER_STACK_ENDPOINT") {
            config.stack.endpoint = Some(endpoint);
        }
        if let Ok(token) = env::var("SPLICER_STACK_TOKEN") {
            config.stack.auth_token = Some(token);
        }
        if let Ok(state_file) = env::var("SPLICER_STACK_STATE_FILE") {
            config.stack.state_file = PathBuf::from(state_file);
        }

        if let Ok(target) = env::var("SPLICER_HOOK_TARGET_RESOURCE") {
            config.hook.target_resource = target;
        }

        if let Ok(max_elapsed) = env::var("SPLICER_POLL_MAX_ELAPSED") {
            let parsed = humantime::parse_duration(max_elapsed.trim()).map_err(|err| {
                invalid_env("SPLICER_POLL_MAX_ELAPSED", &max_elapsed, &err.to_string())
            })?;
            config.poll.compute.max_elapsed = parsed;
            config.poll.apply.max_elapsed = parsed;
        }

        if let Ok(bind) = env::var("SPLICER_SERVER_BIND") {
            config.server.bind = bind;
        }
        Ok(())
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "SPLICER_STORE_BACKEND - Override content store backend (fs, http)",
            "SPLICER_STORE_ROOT - Override filesystem store root (default: .splicer/store)",
            "SPLICER_STORE_ENDPOINT - Override HTTP content store endpoint",
            "SPLICER_STORE_CONTAINER - Override staging container (default: workflows)",
            "SPLICER_STORE_STORAGE_CLASS - Override storage class (STANDARD, STANDARD_IA, ONEZONE_IA)",
            "SPLICER_STORE_TOKEN - Bearer token for the HTTP content store",
            "SPLICER_STACK_BACKEND - Override stack service backend (local, http)",
            "SPLICER_STACK_ENDPOINT - Override HTTP stack service endpoint",
            "SPLICER_STACK_TOKEN - Bearer token for the HTTP stack service",
            "SPLICER_STACK_STATE_FILE - Override local simulator state file",
            "SPLICER_HOOK_TARGET_RESOURCE - Override target resource name (default: MyStateMachine)",
            "SPLICER_POLL_MAX_ELAPSED - Override max elapsed time for both poll phases (e.g. 10m)",
            "SPLICER_SERVER_BIND - Override hook server bind address (default: 127.0.0.1:8080)",
        ]
    }

    /// Validate configuration values
    pub fn validate_config(config: &SplicerConfig) -> Result<(), AppError> {
        if config.store.container.trim().is_empty() || config.store.container.contains('/') {
            return Err(invalid("store.container must be a non-empty name without '/'"));
        }
        if config.store.backend == StoreBackend::Http {
            validate_endpoint("store.endpoint", config.store.endpoint.as_deref())?;
        }
        if config.stack.backend == StackBackend::Http {
            validate_endpoint("stack.endpoint", config.stack.endpoint.as_deref())?;
        }

        let hook = &config.hook;
        for (name, value) in [
            ("hook.location_parameter", &hook.location_parameter),
            ("hook.target_parameter", &hook.target_parameter),
            ("hook.target_resource", &hook.target_resource),
            ("hook.resource_type", &hook.resource_type),
            ("hook.definition_field", &hook.definition_field),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(&format!("{} cannot be empty", name)));
            }
        }
        if hook.location_parameter == hook.target_parameter {
            return Err(invalid(
                "hook.location_parameter and hook.target_parameter must differ",
            ));
        }

        validate_poll("poll.compute", &config.poll.compute)?;
        validate_poll("poll.apply", &config.poll.apply)?;

        config.server.bind.parse::<SocketAddr>().map_err(|err| {
            invalid(&format!(
                "server.bind '{}' is not a socket address: {}",
                config.server.bind, err
            ))
        })?;
        if config.server.max_body_bytes == 0 {
            return Err(invalid("server.max_body_bytes must be greater than zero"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> AppError {
    AppError::new(ErrorCategory::ValidationError, message.to_string())
        .with_code("SPL-CFG-004")
        .with_suggestion(format!("check {} or the SPLICER_* environment", CONFIG_FILE_NAME))
}

fn invalid_env(name: &str, value: &str, expected: &str) -> AppError {
    AppError::new(
        ErrorCategory::ConfigurationError,
        format!("{}='{}' is invalid (expected {})", name, value, expected),
    )
    .with_code("SPL-CFG-003")
}

fn validate_endpoint(name: &str, endpoint: Option<&str>) -> Result<(), AppError> {
    let endpoint = endpoint.ok_or_else(|| invalid(&format!("{} is required for the http backend", name)))?;
    let parsed = Url::parse(endpoint).map_err(|err| invalid(&format!("invalid {}: {}", name, err)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(&format!("{} must use http or https", name)));
    }
    Ok(())
}

fn validate_poll(name: &str, policy: &PollPolicy) -> Result<(), AppError> {
    if policy.initial_interval.is_zero() {
        return Err(invalid(&format!("{}.initial_interval must be positive", name)));
    }
    if policy.max_interval < policy.initial_interval {
        return Err(invalid(&format!(
            "{}.max_interval must not be shorter than initial_interval",
            name
        )));
    }
    if !(policy.multiplier >= 1.0 && policy.multiplier.is_finite()) {
        return Err(invalid(&format!("{}.multiplier must be at least 1.0", name)));
    }
    if policy.max_attempts == 0 {
        return Err(invalid(&format!("{}.max_attempts must be at least 1", name)));
    }
    if policy.max_elapsed.is_zero() {
        return Err(invalid(&format!("{}.max_elapsed must be positive", name)));
    }
    Ok(())
}
