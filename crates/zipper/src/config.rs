//! Engine configuration as supplied by the embedding application.
//!
//! Values can come from a deserialized settings block (kebab-case keys) or
//! from `ZIPPER_*` environment variables:
//!
//! - `ZIPPER_SKIP_SSL_VALIDATION` - disable TLS certificate checks (`true`/`1`)
//! - `ZIPPER_PROXY` - proxy for every HTTP and git request
//! - `ZIPPER_TIMEOUT` - whole-request HTTP timeout in seconds
//!
//! When no proxy is configured, the usual `HTTP_PROXY`/`HTTPS_PROXY`
//! environment is honoured by both the HTTP client and libgit2.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::http::HttpClientConfig;
use crate::{Result, ZipperError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ZipperConfig {
    pub skip_ssl_validation: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl ZipperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the configuration from `ZIPPER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|s| !s.is_empty());
        let mut config = Self::default();

        if let Some(value) = get("ZIPPER_SKIP_SSL_VALIDATION") {
            config.skip_ssl_validation = parse_bool(&value).ok_or_else(|| {
                ZipperError::Config(format!(
                    "ZIPPER_SKIP_SSL_VALIDATION must be a boolean, got '{}'",
                    value
                ))
            })?;
        }

        config.proxy = get("ZIPPER_PROXY");

        if let Some(value) = get("ZIPPER_TIMEOUT") {
            let secs = value.parse::<u64>().map_err(|_| {
                ZipperError::Config(format!("ZIPPER_TIMEOUT must be a number of seconds, got '{}'", value))
            })?;
            config.timeout = Some(secs);
        }

        Ok(config)
    }

    pub fn with_skip_ssl_validation(mut self, skip: bool) -> Self {
        self.skip_ssl_validation = skip;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        let mut http = HttpClientConfig::new().with_skip_ssl_validation(self.skip_ssl_validation);

        if let Some(proxy) = &self.proxy {
            http = http.with_proxy(proxy.clone());
        }
        if let Some(secs) = self.timeout {
            http = http.with_timeout(Duration::from_secs(secs));
        }
        if let Some(user_agent) = &self.user_agent {
            http = http.with_user_agent(user_agent.clone());
        }

        http
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_empty_environment() {
        let config = ZipperConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ZipperConfig::default());
    }

    #[test]
    fn test_environment_values() {
        let config = ZipperConfig::from_lookup(lookup(&[
            ("ZIPPER_SKIP_SSL_VALIDATION", "TRUE"),
            ("ZIPPER_PROXY", "http://proxy:3128"),
            ("ZIPPER_TIMEOUT", "90"),
        ]))
        .unwrap();

        assert!(config.skip_ssl_validation);
        assert_eq!(config.proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(config.timeout, Some(90));
    }

    #[test]
    fn test_empty_values_are_ignored() {
        let config = ZipperConfig::from_lookup(lookup(&[
            ("ZIPPER_SKIP_SSL_VALIDATION", ""),
            ("ZIPPER_PROXY", ""),
        ]))
        .unwrap();

        assert!(!config.skip_ssl_validation);
        assert!(config.proxy.is_none());
    }

    #[test]
    fn test_invalid_values() {
        let err = ZipperConfig::from_lookup(lookup(&[("ZIPPER_SKIP_SSL_VALIDATION", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ZipperError::Config(_)));

        let err = ZipperConfig::from_lookup(lookup(&[("ZIPPER_TIMEOUT", "soon")])).unwrap_err();
        assert!(matches!(err, ZipperError::Config(_)));
    }

    #[test]
    fn test_deserialize_kebab_case() {
        let config: ZipperConfig = serde_json::from_str(
            r#"{"skip-ssl-validation": true, "proxy": "http://p:1", "user-agent": "tf/1"}"#,
        )
        .unwrap();

        assert!(config.skip_ssl_validation);
        assert_eq!(config.proxy.as_deref(), Some("http://p:1"));
        assert!(config.timeout.is_none());
        assert_eq!(config.user_agent.as_deref(), Some("tf/1"));

        let empty: ZipperConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, ZipperConfig::default());
    }

    #[test]
    fn test_http_client_config() {
        let http = ZipperConfig::new()
            .with_skip_ssl_validation(true)
            .with_proxy("http://proxy:8080")
            .http_client_config();

        assert!(http.skip_ssl_validation);
        assert_eq!(http.proxy.as_deref(), Some("http://proxy:8080"));
        assert!(http.timeout.is_none());
    }
}
