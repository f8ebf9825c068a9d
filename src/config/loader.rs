//! Layered configuration loading.
//!
//! Sources in priority order: explicit flags, `APP_*` environment variables,
//! built-in defaults. The loader never touches the network.

use thiserror::Error;

use crate::config::cli::ServeArgs;
use crate::config::schema::ServiceConfig;

/// Prefix shared by every environment variable the service reads.
pub const ENV_PREFIX: &str = "APP";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} is required (set via {flag} flag or {env} env var)")]
    MissingRequiredField {
        field: &'static str,
        flag: &'static str,
        env: String,
    },

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

/// Load configuration from flags layered over the process environment.
pub fn load_config(args: &ServeArgs) -> Result<ServiceConfig, ConfigError> {
    load_config_with(args, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup.
pub fn load_config_with<F>(args: &ServeArgs, env: F) -> Result<ServiceConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ServiceConfig::default();

    // Environment layer
    if let Some(raw) = env(&env_key("PORT")) {
        config.port = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: env_key("PORT"),
            value: raw.clone(),
        })?;
    }
    if let Some(raw) = env(&env_key("DEBUG")) {
        config.debug = parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
            key: env_key("DEBUG"),
            value: raw.clone(),
        })?;
    }
    if let Some(url) = env(&env_key("DATABASE_URL")) {
        config.database_url = url;
    }
    if let Some(addr) = env(&env_key("METRICS_ADDRESS")).filter(|a| !a.is_empty()) {
        config.metrics_address = Some(addr);
    }

    // Flag layer
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(debug) = args.debug {
        config.debug = debug;
    }
    if let Some(url) = &args.database_url {
        config.database_url = url.clone();
    }
    if let Some(addr) = &args.metrics_address {
        config.metrics_address = Some(addr.clone());
    }

    validate(&config)?;
    Ok(config)
}

/// The database URL is the only mandatory field; nothing else is range-checked.
pub fn validate(config: &ServiceConfig) -> Result<(), ConfigError> {
    if config.database_url.is_empty() {
        return Err(ConfigError::MissingRequiredField {
            field: "database_url",
            flag: "--db",
            env: env_key("DATABASE_URL"),
        });
    }
    Ok(())
}

pub fn env_key(name: &str) -> String {
    format!("{ENV_PREFIX}_{name}")
}

/// Parse the boolean spellings accepted on the command line and in the environment.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn missing_database_url_is_rejected() {
        let err = load_config_with(&ServeArgs::default(), env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequiredField { field: "database_url", .. }));
        assert_eq!(
            err.to_string(),
            "database_url is required (set via --db flag or APP_DATABASE_URL env var)"
        );
    }

    #[test]
    fn empty_database_url_from_env_is_rejected() {
        let err = load_config_with(&ServeArgs::default(), env_of(&[("APP_DATABASE_URL", "")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequiredField { .. }));
    }

    #[test]
    fn defaults_fill_unset_fields() {
        let config = load_config_with(
            &ServeArgs::default(),
            env_of(&[("APP_DATABASE_URL", "postgres://db/app")]),
        )
        .unwrap();
        assert_eq!(config.port, 8080);
        assert!(!config.debug);
        assert_eq!(config.database_url, "postgres://db/app");
        assert!(config.metrics_address.is_none());
    }

    #[test]
    fn env_overrides_defaults() {
        let config = load_config_with(
            &ServeArgs::default(),
            env_of(&[
                ("APP_PORT", "9090"),
                ("APP_DEBUG", "true"),
                ("APP_DATABASE_URL", "postgres://env/app"),
            ]),
        )
        .unwrap();
        assert_eq!(config.port, 9090);
        assert!(config.debug);
    }

    #[test]
    fn flags_override_env() {
        let args = ServeArgs {
            port: Some(7000),
            debug: Some(false),
            database_url: Some("postgres://flag/app".into()),
            metrics_address: None,
        };
        let config = load_config_with(
            &args,
            env_of(&[
                ("APP_PORT", "9090"),
                ("APP_DEBUG", "1"),
                ("APP_DATABASE_URL", "postgres://env/app"),
            ]),
        )
        .unwrap();
        assert_eq!(config.port, 7000);
        assert!(!config.debug);
        assert_eq!(config.database_url, "postgres://flag/app");
    }

    #[test]
    fn flag_satisfies_required_field_without_env() {
        let args = ServeArgs {
            database_url: Some("postgres://flag/app".into()),
            ..ServeArgs::default()
        };
        assert!(load_config_with(&args, env_of(&[])).is_ok());
    }

    #[test]
    fn url_shape_is_not_checked() {
        let config = load_config_with(
            &ServeArgs::default(),
            env_of(&[("APP_DATABASE_URL", "not a url")]),
        )
        .unwrap();
        assert_eq!(config.database_url, "not a url");
    }

    #[test]
    fn unparsable_port_is_invalid_value() {
        let err = load_config_with(
            &ServeArgs::default(),
            env_of(&[("APP_PORT", "http"), ("APP_DATABASE_URL", "postgres://db")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "APP_PORT"));
    }

    #[test]
    fn bool_spellings() {
        for raw in ["1", "t", "T", "TRUE", "true", "True"] {
            assert_eq!(parse_bool(raw), Some(true), "{raw}");
        }
        for raw in ["0", "f", "F", "FALSE", "false", "False"] {
            assert_eq!(parse_bool(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_bool("yes"), None);
    }
}
