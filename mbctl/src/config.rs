//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `mbctl.yaml` but can be specified via `-f` flag or `MBCTL_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `mbctl.yaml`)
//! 2. **Environment variables** - Variables prefixed with `MBCTL_` override YAML values
//! 3. **Provider key variables** - The conventional `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`,
//!    `GROQ_API_KEY` and `COHERE_API_KEY` names are honored when the corresponding
//!    `providers.*` field is unset
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `MBCTL_THROTTLE__MONTHLY_LIMIT_USER=500` sets the `throttle.monthly_limit_user` field.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port` - HTTP server binding configuration
//! - **Security**: `secret_key`, `jwt_expiry` - shared JWT secret and token lifetime
//! - **Storage**: `storage.type` - `memory` (development/tests) or `dynamo` (production),
//!   with table names and an optional endpoint override for DynamoDB Local
//! - **Throttle**: `throttle.monthly_limit_user`, `throttle.monthly_limit_global` -
//!   monthly invocation ceilings
//! - **Providers**: `providers.*_api_key` - upstream provider credentials
//! - **Monitor**: `monitor.*` - offline API monitoring tool settings

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Simple CLI args - just for specifying config file and one-shot maintenance modes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "MBCTL_CONFIG", default_value = "mbctl.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,

    /// Create the DynamoDB projects and usage tables if they don't exist, then exit.
    #[arg(long)]
    pub init_tables: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Shared secret for JWT verification (required to serve authenticated routes)
    pub secret_key: Option<String>,
    /// JWT token expiry duration
    #[serde(with = "humantime_serde")]
    pub jwt_expiry: Duration,
    /// Storage backend - in-memory or DynamoDB
    pub storage: StorageConfig,
    /// Monthly usage ceilings per user and globally
    pub throttle: ThrottleConfig,
    /// Upstream provider API keys
    pub providers: ProviderKeys,
    /// Outbound HTTP client settings
    pub upstream: UpstreamConfig,
    /// Offline API monitoring tool settings
    pub monitor: MonitorSettings,
}

/// Storage backend configuration.
///
/// The in-memory backend keeps all state in the process and is intended for
/// development and tests; DynamoDB is the production backend. Both expose the
/// same store traits, so the rest of the application is unaware of the choice.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Keep projects and usage records in process memory (lost on restart)
    Memory,
    /// Use DynamoDB tables
    Dynamo {
        /// AWS region override (falls back to the SDK's default resolution)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
        /// Endpoint override, e.g. "http://localhost:8000" for DynamoDB Local.
        /// When set, static throwaway credentials are used.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint_url: Option<String>,
        /// Projects table name
        #[serde(default = "default_projects_table")]
        projects_table: String,
        /// Usage table name
        #[serde(default = "default_usage_table")]
        usage_table: String,
    },
}

fn default_projects_table() -> String {
    "projects-table".to_string()
}

fn default_usage_table() -> String {
    "usage-table".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory
    }
}

impl StorageConfig {
    /// Check if using the in-memory backend
    pub fn is_memory(&self) -> bool {
        matches!(self, StorageConfig::Memory)
    }
}

/// Monthly usage ceilings.
///
/// A request is rejected with 429 once the invocation count for the current
/// calendar month meets or exceeds the ceiling in either scope.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottleConfig {
    /// Maximum invocations per user per calendar month
    pub monthly_limit_user: u64,
    /// Maximum invocations across all users per calendar month
    pub monthly_limit_global: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            monthly_limit_user: 1_000,
            monthly_limit_global: 50_000,
        }
    }
}

/// Upstream provider API keys.
///
/// Keys are injected into outbound requests when the caller has not supplied
/// their own credential header.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderKeys {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub cohere_api_key: Option<String>,
}

/// Outbound HTTP client settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Timeout applied to each outbound provider request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Offline API monitoring tool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorSettings {
    /// Model to exercise in the monitoring battery
    pub model: String,
    /// API base for the monitored provider
    pub api_base: String,
    /// S3 bucket for the monitoring history; history persistence is skipped when unset
    pub bucket: Option<String>,
    /// Object key for the JSONL monitoring history
    pub object_key: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            bucket: None,
            object_key: "monitor_data.jsonl".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3200,
            secret_key: None,
            jwt_expiry: Duration::from_secs(24 * 60 * 60),
            storage: StorageConfig::default(),
            throttle: ThrottleConfig::default(),
            providers: ProviderKeys::default(),
            upstream: UpstreamConfig::default(),
            monitor: MonitorSettings::default(),
        }
    }
}

impl Config {
    fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("MBCTL_").split("__"))
    }

    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        // Honor the conventional provider key variable names when the
        // providers section doesn't set them explicitly.
        let fallbacks = [
            ("OPENAI_API_KEY", &mut config.providers.openai_api_key),
            ("ANTHROPIC_API_KEY", &mut config.providers.anthropic_api_key),
            ("GROQ_API_KEY", &mut config.providers.groq_api_key),
            ("COHERE_API_KEY", &mut config.providers.cohere_api_key),
        ];
        for (var, slot) in fallbacks {
            if slot.is_none()
                && let Ok(value) = std::env::var(var)
                && !value.is_empty()
            {
                *slot = Some(value);
            }
        }

        Ok(config)
    }

    /// Get the full bind address (host:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.port, 3200);
        assert!(config.storage.is_memory());
        assert_eq!(config.throttle.monthly_limit_user, 1_000);
        assert_eq!(config.upstream.request_timeout, Duration::from_secs(120));
        assert_eq!(config.monitor.model, "gpt-4o-mini");
    }

    #[test]
    fn environment_overrides_nested_fields() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("MBCTL_PORT", "8080");
            jail.set_env("MBCTL_THROTTLE__MONTHLY_LIMIT_USER", "42");
            jail.set_env("MBCTL_SECRET_KEY", "hunter2");

            let args = Args {
                config: "missing.yaml".to_string(),
                validate: false,
                init_tables: false,
            };
            let config = Config::load(&args).expect("config should load");
            assert_eq!(config.port, 8080);
            assert_eq!(config.throttle.monthly_limit_user, 42);
            assert_eq!(config.secret_key.as_deref(), Some("hunter2"));
            Ok(())
        });
    }

    #[test]
    fn yaml_selects_dynamo_storage() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "mbctl.yaml",
                r#"
storage:
  type: dynamo
  endpoint_url: http://localhost:8000
  projects_table: projects-table-dev
"#,
            )?;

            let args = Args {
                config: "mbctl.yaml".to_string(),
                validate: false,
                init_tables: false,
            };
            let config = Config::load(&args).expect("config should load");
            match config.storage {
                StorageConfig::Dynamo {
                    ref projects_table,
                    ref usage_table,
                    ref endpoint_url,
                    ..
                } => {
                    assert_eq!(projects_table, "projects-table-dev");
                    // unset fields fall back to their defaults
                    assert_eq!(usage_table, "usage-table");
                    assert_eq!(endpoint_url.as_deref(), Some("http://localhost:8000"));
                }
                StorageConfig::Memory => panic!("expected dynamo storage"),
            }
            Ok(())
        });
    }
}
