//! Blocking HTTP client shared by the HTTP and git handlers.
//!
//! This module wraps `reqwest::blocking` with the few knobs the handlers need:
//! - Proxy support (explicit, or the ambient `HTTP(S)_PROXY` environment)
//! - Disabling TLS certificate verification
//! - Custom CA certificate
//! - Basic auth taken from URL userinfo
//!
//! The client is built once from an [`HttpClientConfig`] and never mutated
//! afterwards, so a single instance can be shared between threads.
//!
//! # Examples
//!
//! ```no_run
//! use zipper::http::{HttpClient, HttpClientConfig};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HttpClientConfig::new()
//!     .with_connect_timeout(Duration::from_secs(5))
//!     .with_skip_ssl_validation(true)
//!     .with_proxy("http://proxy.example.com:8080".to_string());
//!
//! let client = HttpClient::with_config(config)?;
//! let response = client.get("https://example.com/archive.zip", None, None)?;
//! println!("{:?}", response.content_length());
//! # Ok(())
//! # }
//! ```

use reqwest::blocking::{Client, Response};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::{Result, ZipperError};

const DEFAULT_USER_AGENT: &str = concat!("zipper/", env!("CARGO_PKG_VERSION"));
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Username and password pulled out of a URL's userinfo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// Remove userinfo from `url`, returning it as decoded credentials.
///
/// Returns `None` when the URL has no username.
pub fn take_basic_auth(url: &mut Url) -> Option<BasicAuth> {
    if url.username().is_empty() {
        return None;
    }

    let decode = |raw: &str| {
        urlencoding::decode(raw)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw.to_string())
    };
    let auth = BasicAuth {
        username: decode(url.username()),
        password: url.password().map(decode).unwrap_or_default(),
    };

    // Only fails for URLs that cannot carry credentials in the first place
    let _ = url.set_username("");
    let _ = url.set_password(None);

    Some(auth)
}

#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(config.skip_ssl_validation);

        // Without an explicit proxy reqwest falls back to HTTP(S)_PROXY
        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)?;
            builder = builder.proxy(proxy);
        }

        if let Some(cafile) = &config.cafile {
            let cert_bytes = std::fs::read(cafile)?;
            let cert = reqwest::Certificate::from_pem(&cert_bytes)?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build()?;

        Ok(Self { client, config })
    }

    /// Perform a GET request and fail on any non-2xx status.
    ///
    /// No retries: transport errors and rejections go straight back to the caller.
    pub fn get(
        &self,
        url: &str,
        auth: Option<&BasicAuth>,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        let mut request = self.client.get(url);

        if let Some(auth) = auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        log::debug!("HTTP GET {}", url);
        let response = request.send()?;
        log::debug!("HTTP {} {}", response.status().as_u16(), url);

        check_status(url, response)
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    pub fn user_agent(&self) -> &str {
        &self.config.user_agent
    }

    pub fn skip_ssl_validation(&self) -> bool {
        self.config.skip_ssl_validation
    }

    pub fn proxy(&self) -> Option<&str> {
        self.config.proxy.as_deref()
    }
}

/// Turn a non-2xx response into [`ZipperError::HttpStatus`], keeping the body.
fn check_status(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    Err(ZipperError::HttpStatus {
        url: url.to_string(),
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("").to_string(),
        body,
    })
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Whole-request timeout, `None` lets large archives take as long as they need
    pub timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub proxy: Option<String>,
    pub cafile: Option<PathBuf>,
    pub user_agent: String,
    pub skip_ssl_validation: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            proxy: None,
            cafile: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            skip_ssl_validation: false,
        }
    }
}

impl HttpClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_cafile(mut self, cafile: PathBuf) -> Self {
        self.cafile = Some(cafile);
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_skip_ssl_validation(mut self, skip: bool) -> Self {
        self.skip_ssl_validation = skip;
        self
    }
}
