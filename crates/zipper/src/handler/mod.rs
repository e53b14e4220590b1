//! Source handlers.
//!
//! Each handler recognizes one kind of source and knows how to fingerprint
//! it and turn it into a zip archive.

mod archive;
mod checksum;
mod git;
mod http;
mod local;

pub use archive::write_tar_to_zip;
pub use git::{GitHandler, GitRef};
pub use http::HttpHandler;
pub use local::LocalHandler;

use crate::source::Source;
use crate::zip_file::ZipFile;
use crate::Result;

/// The set of supported source kinds.
#[derive(Debug, Clone)]
pub enum Handler {
    Git(GitHandler),
    Http(HttpHandler),
    Local(LocalHandler),
}

impl Handler {
    /// Unique name, used to request a handler explicitly.
    pub fn name(&self) -> &'static str {
        match self {
            Handler::Git(h) => h.name(),
            Handler::Http(h) => h.name(),
            Handler::Local(h) => h.name(),
        }
    }

    /// Whether this handler recognizes `src`. Never fails.
    pub fn detect(&self, src: &Source) -> bool {
        match self {
            Handler::Git(h) => h.detect(src),
            Handler::Http(h) => h.detect(src),
            Handler::Local(h) => h.detect(src),
        }
    }

    /// 40-character lowercase hex fingerprint of the source's current content.
    pub fn sha1(&self, src: &Source) -> Result<String> {
        match self {
            Handler::Git(h) => h.sha1(src),
            Handler::Http(h) => h.sha1(src),
            Handler::Local(h) => h.sha1(src),
        }
    }

    /// Zip archive of the source's content.
    pub fn zip(&self, src: &Source) -> Result<ZipFile> {
        match self {
            Handler::Git(h) => h.zip(src),
            Handler::Http(h) => h.zip(src),
            Handler::Local(h) => h.zip(src),
        }
    }
}

impl From<GitHandler> for Handler {
    fn from(handler: GitHandler) -> Self {
        Handler::Git(handler)
    }
}

impl From<HttpHandler> for Handler {
    fn from(handler: HttpHandler) -> Self {
        Handler::Http(handler)
    }
}

impl From<LocalHandler> for Handler {
    fn from(handler: LocalHandler) -> Self {
        Handler::Local(handler)
    }
}
