//! HTTP(S) archive handler.

use std::fs::File;
use std::io;
use std::sync::Arc;

use url::Url;

use super::archive::{tar_to_zip, targz_to_zip};
use crate::http::{take_basic_auth, HttpClient};
use crate::source::Source;
use crate::util::{is_tar_file, is_tar_gz_file, is_web_url, is_zip_file, sha1_from_reader};
use crate::zip_file::ZipFile;
use crate::{Result, ZipperError};

/// Handler for zip, tar and gzipped tar archives served over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpHandler {
    client: Arc<HttpClient>,
}

/// The URL path if `path` parses, so query strings do not hide the extension.
fn url_path(path: &str) -> String {
    Url::parse(path)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| path.to_string())
}

impl HttpHandler {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    pub fn name(&self) -> &'static str {
        "http"
    }

    pub fn detect(&self, src: &Source) -> bool {
        if !is_web_url(src.path()) {
            return false;
        }
        let path = url_path(src.path());
        is_zip_file(&path) || is_tar_file(&path) || is_tar_gz_file(&path)
    }

    pub fn zip(&self, src: &Source) -> Result<ZipFile> {
        let client = src.http_client(&self.client);
        let mut url =
            Url::parse(src.path()).map_err(|e| ZipperError::invalid_url(src.path(), e))?;
        let auth = take_basic_auth(&mut url);

        let response = client.get(url.as_str(), auth.as_ref(), src.timeout())?;

        if is_tar_file(url.path()) {
            log::debug!("Transcoding tar archive {}", url);
            return tar_to_zip(response, src);
        }
        if is_tar_gz_file(url.path()) {
            log::debug!("Transcoding gzipped tar archive {}", url);
            return targz_to_zip(response, src);
        }

        match response.content_length() {
            Some(size) => Ok(ZipFile::new(src.guard(response), size)),
            None => {
                log::debug!("No content length for {}, buffering to disk", url);
                let mut file = src.scratch_zip("downloads-zipper")?;
                io::copy(&mut src.guard(response), &mut file).map_err(|e| src.io_error(e))?;

                let path = file.into_temp_path();
                let file = File::open(&path)?;
                ZipFile::from_temp_file(file, path)
            }
        }
    }

    /// Fingerprint of the first 5 KiB of the response body.
    ///
    /// The URL is requested as given. Archives that only differ after the
    /// first 5 KiB get the same fingerprint.
    pub fn sha1(&self, src: &Source) -> Result<String> {
        let client = src.http_client(&self.client);
        let response = client.get(src.path(), None, src.timeout())?;
        sha1_from_reader(src.guard(response)).map_err(|e| src.io_error(e))
    }
}
