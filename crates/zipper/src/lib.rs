//! Fetch content from local paths, HTTP archives or git repositories and
//! hand it out as a zip archive, with a cheap fingerprint to tell whether
//! it changed.
//!
//! ```no_run
//! use zipper::{HttpClientConfig, Manager};
//!
//! let manager = Manager::new(HttpClientConfig::new())?;
//! let session = manager.create_session("https://github.com/org/app.git#v1.2.3", "")?;
//! println!("{} at {}", session.handler_name(), session.sha1()?);
//! let size = session.write_to("/tmp/app.zip")?;
//! # let _ = size;
//! # Ok::<(), zipper::ZipperError>(())
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod manager;
pub mod source;
pub mod util;
pub mod zip_file;

pub use config::ZipperConfig;
pub use error::{ErrorKind, Result, ZipperError};
pub use handler::{write_tar_to_zip, GitHandler, Handler, HttpHandler, LocalHandler};
pub use http::{HttpClient, HttpClientConfig};
pub use manager::{Manager, Session};
pub use source::{CancelToken, Source};
pub use zip_file::ZipFile;
