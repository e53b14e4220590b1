use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZipperError {
    // Detection errors
    #[error("Handler type '{0}' does not exist")]
    UnknownHandlerType(String),

    #[error("Cannot find handler for source {0}")]
    NoHandlerMatched(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Error occurred when downloading {url}: {status} {reason}:\n{body}")]
    HttpStatus {
        url: String,
        status: u16,
        reason: String,
        body: String,
    },

    // Git errors
    #[error("Reference '{reference}' not found in {url}")]
    ReferenceNotFound { url: String, reference: String },

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[source] io::Error),

    #[error("Source path does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),

    // Format errors
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid source URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Broad failure classes, so callers can decide what is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No handler claims the origin.
    Detection,
    /// The remote could not be reached (connection, TLS, DNS).
    Transport,
    /// The remote answered but refused (non-2xx, unknown git ref).
    RemoteRejection,
    /// Local path missing or unreadable, temp space exhausted.
    Filesystem,
    /// Malformed tar/gzip/zip data or an unparsable origin.
    Format,
    Cancelled,
    Config,
}

impl ZipperError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ZipperError::UnknownHandlerType(_) | ZipperError::NoHandlerMatched(_) => {
                ErrorKind::Detection
            }
            ZipperError::Network(_) => ErrorKind::Transport,
            ZipperError::HttpStatus { .. } | ZipperError::ReferenceNotFound { .. } => {
                ErrorKind::RemoteRejection
            }
            ZipperError::Git(e) => match e.class() {
                git2::ErrorClass::Net
                | git2::ErrorClass::Ssl
                | git2::ErrorClass::Ssh
                | git2::ErrorClass::Http => ErrorKind::Transport,
                git2::ErrorClass::Os | git2::ErrorClass::Filesystem => ErrorKind::Filesystem,
                _ => ErrorKind::RemoteRejection,
            },
            ZipperError::Io(e) if is_transport_io(e) => ErrorKind::Transport,
            ZipperError::Io(_) | ZipperError::SourceNotFound(_) => ErrorKind::Filesystem,
            ZipperError::InvalidArchive(_)
            | ZipperError::Zip(_)
            | ZipperError::InvalidUrl { .. } => ErrorKind::Format,
            ZipperError::Config(_) => ErrorKind::Config,
            ZipperError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn invalid_url(url: &str, reason: impl ToString) -> Self {
        ZipperError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Body reads on a `reqwest` response fail with an `io::Error` wrapping the
/// `reqwest::Error`; those are network failures, not filesystem ones.
impl From<io::Error> for ZipperError {
    fn from(err: io::Error) -> Self {
        match err.downcast::<reqwest::Error>() {
            Ok(e) => ZipperError::Network(e),
            Err(err) => ZipperError::Io(err),
        }
    }
}

/// Whether a `reqwest::Error` sits anywhere in the chain, e.g. below a tar
/// or gzip decoding error.
pub(crate) fn is_transport_io(err: &io::Error) -> bool {
    let mut current = err.get_ref().map(|e| e as &(dyn StdError + 'static));
    while let Some(e) = current {
        if e.is::<reqwest::Error>() {
            return true;
        }
        current = e.source();
    }
    false
}

pub type Result<T> = std::result::Result<T, ZipperError>;
