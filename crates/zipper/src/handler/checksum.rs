//! Fingerprints for local files and directories.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use sha1::{Digest, Sha1};
use walkdir::WalkDir;

use super::archive::entry_name;
use crate::source::Source;
use crate::util::sha1_from_reader;
use crate::Result;

/// Bounded-prefix fingerprint of a single file (first 5 KiB).
pub(crate) fn sha1_file(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    Ok(sha1_from_reader(file)?)
}

/// SHA-1 over the sorted walk of a directory.
///
/// Each entry contributes its relative name and kind; files also contribute
/// their size and full content. Renaming, adding, removing or editing any
/// entry changes the result, while timestamps do not matter.
pub(crate) fn sha1_directory(root: &Path, source: &Source) -> Result<String> {
    let mut hasher = Sha1::new();

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        source.check_cancelled()?;
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        let name = entry_name(path.strip_prefix(root).unwrap_or(path));

        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if entry.path_is_symlink() => {
                log::debug!("Skipping dangling symlink {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            hasher.update(b"d ");
            hasher.update(name.as_bytes());
            hasher.update(b"\0");
        } else if metadata.is_file() {
            hasher.update(b"f ");
            hasher.update(name.as_bytes());
            hasher.update(b"\0");
            hasher.update(metadata.len().to_le_bytes());

            let mut reader = source.guard(File::open(path)?);
            io::copy(&mut reader, &mut hasher).map_err(|e| source.io_error(e))?;
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}
