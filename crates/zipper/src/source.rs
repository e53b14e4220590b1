//! Origin descriptors handed to the handlers.

use std::env;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::http::HttpClient;
use crate::{Result, ZipperError};

/// Shared flag used to abort a running fetch from another thread.
///
/// Git transfers, HTTP body reads and directory walks poll the flag and
/// stop with [`ZipperError::Cancelled`] once it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What to fetch: a local path, an HTTP(S) archive URL or a git URL.
#[derive(Debug, Clone)]
pub struct Source {
    path: String,
    cancel: Option<CancelToken>,
    timeout: Option<Duration>,
    http_client: Option<Arc<HttpClient>>,
    temp_dir: Option<PathBuf>,
}

impl Source {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            cancel: None,
            timeout: None,
            http_client: None,
            temp_dir: None,
        }
    }

    /// Attach a cancellation token
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Per-request deadline applied to HTTP requests made for this source
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use this client instead of the manager's one
    pub fn with_http_client(mut self, client: Arc<HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Create clones and transcoded archives below `dir` instead of the
    /// system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cancel_token(&self) -> Option<&CancelToken> {
        self.cancel.as_ref()
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(env::temp_dir)
    }

    /// The override client if one was set, `default` otherwise.
    pub fn http_client<'a>(&'a self, default: &'a Arc<HttpClient>) -> &'a Arc<HttpClient> {
        self.http_client.as_ref().unwrap_or(default)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(ZipperError::Cancelled);
        }
        Ok(())
    }

    /// Map an IO failure, reporting it as a cancellation when the token tripped.
    pub(crate) fn io_error(&self, err: io::Error) -> ZipperError {
        if self.is_cancelled() {
            ZipperError::Cancelled
        } else {
            err.into()
        }
    }

    /// Fresh, uniquely named scratch directory below [`Source::temp_dir`].
    pub(crate) fn scratch_dir(&self, prefix: &str) -> Result<tempfile::TempDir> {
        let root = self.temp_dir();
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&root)?;
        log::debug!("Created {}", dir.path().display());
        Ok(dir)
    }

    /// Fresh, uniquely named `.zip` file below [`Source::temp_dir`].
    pub(crate) fn scratch_zip(&self, prefix: &str) -> Result<tempfile::NamedTempFile> {
        let root = self.temp_dir();
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(".zip")
            .tempfile_in(&root)?;
        log::debug!("Writing archive to {}", file.path().display());
        Ok(file)
    }

    /// Wrap a reader so that reads fail once the token is cancelled.
    pub(crate) fn guard<R: Read>(&self, inner: R) -> CancellableReader<R> {
        CancellableReader {
            inner,
            token: self.cancel.clone(),
        }
    }
}

pub(crate) struct CancellableReader<R> {
    inner: R,
    token: Option<CancelToken>,
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.token.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(io::Error::other("operation cancelled"));
        }
        self.inner.read(buf)
    }
}
