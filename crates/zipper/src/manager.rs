use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::config::ZipperConfig;
use crate::handler::{GitHandler, Handler, HttpHandler, LocalHandler};
use crate::http::{HttpClient, HttpClientConfig};
use crate::source::Source;
use crate::zip_file::ZipFile;
use crate::{Result, ZipperError};

/// Selects a handler for each source.
#[derive(Debug, Clone)]
pub struct Manager {
    /// Handlers in priority order (first = highest priority)
    handlers: Vec<Handler>,
    client: Arc<HttpClient>,
}

impl Manager {
    /// Create a manager with the git, http and local handlers, in that order.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        Ok(Self::with_http_client(Arc::new(HttpClient::with_config(config)?)))
    }

    pub fn from_config(config: &ZipperConfig) -> Result<Self> {
        Self::new(config.http_client_config())
    }

    /// Manager configured from `ZIPPER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_config(&ZipperConfig::from_env()?)
    }

    pub fn with_http_client(client: Arc<HttpClient>) -> Self {
        let handlers = vec![
            Handler::Git(GitHandler::new(client.clone())),
            Handler::Http(HttpHandler::new(client.clone())),
            Handler::Local(LocalHandler::new()),
        ];
        Self::with_handlers(client, handlers)
    }

    /// Manager with a custom handler list, tried in the given order.
    pub fn with_handlers(client: Arc<HttpClient>, handlers: Vec<Handler>) -> Self {
        Self { handlers, client }
    }

    pub fn http_client(&self) -> &Arc<HttpClient> {
        &self.client
    }

    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(Handler::name).collect()
    }

    /// Bind `path` to a handler.
    ///
    /// A non-empty `explicit_type` picks the handler by name, otherwise the
    /// first handler detecting the path wins.
    pub fn create_session(&self, path: &str, explicit_type: &str) -> Result<Session> {
        self.create_session_from_source(Source::new(path), explicit_type)
    }

    pub fn create_session_from_source(&self, source: Source, explicit_type: &str) -> Result<Session> {
        let handler = if explicit_type.is_empty() {
            self.detect_handler(&source)?
        } else {
            self.find_handler(explicit_type)?
        };

        log::debug!("Using {} handler for {}", handler.name(), source.path());
        Ok(Session {
            source,
            handler: handler.clone(),
        })
    }

    fn find_handler(&self, name: &str) -> Result<&Handler> {
        self.handlers
            .iter()
            .find(|h| h.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| ZipperError::UnknownHandlerType(name.to_string()))
    }

    fn detect_handler(&self, source: &Source) -> Result<&Handler> {
        self.handlers
            .iter()
            .find(|h| h.detect(source))
            .ok_or_else(|| ZipperError::NoHandlerMatched(source.path().to_string()))
    }
}

/// One source bound to the handler that serves it.
#[derive(Debug, Clone)]
pub struct Session {
    source: Source,
    handler: Handler,
}

impl Session {
    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn handler_name(&self) -> &'static str {
        self.handler.name()
    }

    pub fn sha1(&self) -> Result<String> {
        self.source.check_cancelled()?;
        self.handler.sha1(&self.source)
    }

    pub fn zip(&self) -> Result<ZipFile> {
        self.source.check_cancelled()?;
        self.handler.zip(&self.source)
    }

    /// Write the archive to `path`, returning its size.
    ///
    /// The archive is released whether or not the copy succeeds. A partial
    /// destination file is removed on failure.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        let mut zip_file = self.zip()?;
        let size = zip_file.size();

        let copied = File::create(path).and_then(|mut file| {
            io::copy(&mut self.source.guard(&mut zip_file), &mut file)?;
            file.sync_all()
        });

        if let Err(e) = copied {
            if let Err(remove_err) = fs::remove_file(path) {
                log::debug!("Failed to remove {}: {}", path.display(), remove_err);
            }
            if let Err(close_err) = zip_file.close() {
                log::warn!("Failed to release archive: {}", close_err);
            }
            return Err(self.source.io_error(e));
        }

        zip_file.close()?;
        log::debug!("Wrote {} bytes to {}", size, path.display());
        Ok(size)
    }
}
