//! Operator configuration from command line flags and environment

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::error::{Error, Result};

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Kubernetes operator that delivers MessageRequests through sender pods
#[derive(Parser, Debug, Clone)]
#[command(name = "message-request-operator", version, about)]
pub struct OperatorConfig {
    /// Port for the metrics and health endpoints
    #[arg(long, env = "METRICS_PORT", default_value_t = 8080)]
    pub metrics_port: u16,

    /// Only watch MessageRequests in this namespace (default: all namespaces)
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Maximum number of MessageRequests reconciled in parallel
    #[arg(long, env = "RECONCILE_CONCURRENCY", default_value_t = 4)]
    pub concurrency: u16,

    /// Deadline for a single reconcile, in seconds
    #[arg(long, env = "RECONCILE_TIMEOUT_SECS", default_value_t = 30)]
    pub reconcile_timeout_secs: u64,

    /// Delay before a requested follow-up reconcile, in milliseconds
    #[arg(long, env = "REQUEUE_AFTER_MILLIS", default_value_t = 500)]
    pub requeue_after_millis: u64,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            metrics_port: 8080,
            namespace: None,
            concurrency: 4,
            reconcile_timeout_secs: 30,
            requeue_after_millis: 500,
            log_format: LogFormat::Json,
        }
    }
}

impl OperatorConfig {
    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::config("concurrency must be greater than 0"));
        }
        if self.reconcile_timeout_secs == 0 {
            return Err(Error::config("reconcile timeout must be greater than 0"));
        }
        if let Some(ns) = &self.namespace {
            if ns.trim().is_empty() {
                return Err(Error::config("namespace must not be empty when set"));
            }
        }
        Ok(())
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    pub fn requeue_after(&self) -> Duration {
        Duration::from_millis(self.requeue_after_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let config = OperatorConfig::try_parse_from([
            "message-request-operator",
            "--metrics-port",
            "9090",
            "--namespace",
            "bots",
            "--concurrency",
            "8",
            "--log-format",
            "pretty",
        ])
        .unwrap();

        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.namespace.as_deref(), Some("bots"));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults_are_valid() {
        let config = OperatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reconcile_timeout(), Duration::from_secs(30));
        assert_eq!(config.requeue_after(), Duration::from_millis(500));
    }

    #[test]
    fn rejects_zero_limits() {
        let config = OperatorConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = OperatorConfig {
            reconcile_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = OperatorConfig {
            namespace: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
