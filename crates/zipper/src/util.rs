//! Classification helpers shared by the handlers.
//!
//! Everything in here is a pure function over a path or URL string, or over
//! a reader in the case of [`sha1_from_reader`].

use std::io::Read;

use sha1::{Digest, Sha1};

/// Number of bytes read from a stream to build its fingerprint.
pub const CHUNK_FOR_SHA1: u64 = 5 * 1024;

pub const ZIP_FILE_EXT: &[&str] = &[".zip", ".jar", ".war"];
pub const TAR_FILE_EXT: &[&str] = &[".tar"];
pub const GZIP_FILE_EXT: &[&str] = &[".gz", ".gzip"];
pub const TARGZ_FILE_EXT: &[&str] = &[".tgz"];

/// Check if a path is a web URL.
///
/// # Examples
///
/// ```
/// use zipper::util::is_web_url;
///
/// assert!(is_web_url("https://example.com/a.zip"));
/// assert!(is_web_url("http://example.com/repo.git"));
/// assert!(!is_web_url("git@github.com:org/repo.git"));
/// assert!(!is_web_url("/tmp/folder"));
/// ```
pub fn is_web_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

/// Final extension of a path including the dot, e.g. `.gz` for `a.tar.gz`.
fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    name.rfind('.').map(|idx| &name[idx..])
}

/// Check if the path's final extension is one of `extensions` (lowercase, with dot).
pub fn has_ext_file(path: &str, extensions: &[&str]) -> bool {
    match extension(path) {
        Some(ext) => {
            let ext = ext.to_lowercase();
            extensions.iter().any(|candidate| *candidate == ext)
        }
        None => false,
    }
}

pub fn is_zip_file(path: &str) -> bool {
    has_ext_file(path, ZIP_FILE_EXT)
}

pub fn is_tar_file(path: &str) -> bool {
    has_ext_file(path, TAR_FILE_EXT)
}

/// Check if the path is a gzip compressed tarball.
///
/// `.tgz` always qualifies; `.gz` and `.gzip` only when what is left once
/// that extension is removed still ends in `.tar`.
///
/// ```
/// use zipper::util::is_tar_gz_file;
///
/// assert!(is_tar_gz_file("release.tgz"));
/// assert!(is_tar_gz_file("release.tar.gz"));
/// assert!(is_tar_gz_file("release.TAR.GZIP"));
/// assert!(!is_tar_gz_file("notes.txt.gz"));
/// ```
pub fn is_tar_gz_file(path: &str) -> bool {
    if has_ext_file(path, TARGZ_FILE_EXT) {
        return true;
    }
    if !has_ext_file(path, GZIP_FILE_EXT) {
        return false;
    }
    match extension(path) {
        Some(ext) => is_tar_file(&path[..path.len() - ext.len()]),
        None => false,
    }
}

/// Check if a git reference is a full commit id (40 hex characters).
pub fn is_commit_hash(reference: &str) -> bool {
    reference.len() == 40 && reference.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Hex SHA-1 of at most the first [`CHUNK_FOR_SHA1`] bytes of `reader`.
///
/// The rest of the stream is never read; dropping the reader afterwards
/// closes the underlying connection early. Two inputs that only differ
/// after the first 5 KiB get the same fingerprint. This is a cheap
/// change detector, not an integrity check.
pub fn sha1_from_reader<R: Read>(reader: R) -> std::io::Result<String> {
    let mut buf = Vec::with_capacity(CHUNK_FOR_SHA1 as usize);
    reader.take(CHUNK_FOR_SHA1).read_to_end(&mut buf)?;

    let mut hasher = Sha1::new();
    hasher.update(&buf);
    Ok(format!("{:x}", hasher.finalize()))
}
