//! Zip production: directory walks, single files and tar transcoding.
//!
//! Every archive is written to a fresh temporary file which becomes the
//! backing state of the returned [`ZipFile`]. If writing fails the
//! temporary file is dropped, and so deleted, before the error is returned.

use std::fs::{self, File, Metadata};
use std::io::{self, Read, Seek, Write};
use std::path::Path;
use std::time::SystemTime;

use chrono::{Datelike, Timelike};
use flate2::read::GzDecoder;
use tempfile::NamedTempFile;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::source::Source;
use crate::zip_file::ZipFile;
use crate::error::is_transport_io;
use crate::{Result, ZipperError};

const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

/// Hand a finished temporary zip over to a [`ZipFile`].
fn finish_temp_zip(writer: ZipWriter<NamedTempFile>) -> Result<ZipFile> {
    let path = writer.finish()?.into_temp_path();
    let file = File::open(&path)?;
    ZipFile::from_temp_file(file, path)
}

/// Convert a timestamp into a zip (MS-DOS) timestamp, in UTC.
///
/// Anything the format cannot represent, e.g. before 1980, becomes 1980-01-01.
fn zip_datetime(time: chrono::DateTime<chrono::Utc>) -> zip::DateTime {
    if !(1980..=2107).contains(&time.year()) {
        return zip::DateTime::default();
    }
    zip::DateTime::from_date_and_time(
        time.year() as u16,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    )
    .unwrap_or_default()
}

fn zip_datetime_from_system(time: SystemTime) -> zip::DateTime {
    zip_datetime(time.into())
}

fn zip_datetime_from_unix(secs: u64) -> zip::DateTime {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(zip_datetime)
        .unwrap_or_default()
}

#[cfg(unix)]
fn file_mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(metadata: &Metadata) -> u32 {
    if metadata.is_dir() {
        DEFAULT_DIR_MODE
    } else if metadata.permissions().readonly() {
        0o444
    } else {
        DEFAULT_FILE_MODE
    }
}

fn entry_options(method: CompressionMethod, mode: u32, modified: zip::DateTime) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(method)
        .unix_permissions(mode)
        .last_modified_time(modified)
}

fn file_options(metadata: &Metadata) -> SimpleFileOptions {
    let modified = metadata
        .modified()
        .map(zip_datetime_from_system)
        .unwrap_or_default();
    entry_options(CompressionMethod::Deflated, file_mode(metadata), modified)
        .large_file(metadata.len() >= u32::MAX as u64)
}

fn dir_options(metadata: &Metadata) -> SimpleFileOptions {
    let modified = metadata
        .modified()
        .map(zip_datetime_from_system)
        .unwrap_or_default();
    entry_options(CompressionMethod::Stored, file_mode(metadata), modified)
}

/// Relative path rendered with `/` separators, as zip entry names require.
pub(crate) fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Zip every file and directory below `root`, in file name order.
pub(crate) fn zip_directory(root: &Path, source: &Source) -> Result<ZipFile> {
    let mut writer = ZipWriter::new(source.scratch_zip("local-zipper")?);
    write_directory(root, source, &mut writer)?;
    finish_temp_zip(writer)
}

fn write_directory<W: Write + Seek>(
    root: &Path,
    source: &Source,
    writer: &mut ZipWriter<W>,
) -> Result<()> {
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        source.check_cancelled()?;
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();

        let relative = path.strip_prefix(root).unwrap_or(path);
        let name = entry_name(relative);

        // Follow symlinks so the archive holds the content they point to
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if entry.path_is_symlink() => {
                log::debug!("Skipping dangling symlink {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            if entry.path_is_symlink() {
                log::debug!("Skipping symlinked directory {}", path.display());
                continue;
            }
            log::trace!("Adding directory {}", name);
            writer.add_directory(name, dir_options(&metadata))?;
        } else if metadata.is_file() {
            log::trace!("Adding file {}", name);
            writer.start_file(name, file_options(&metadata))?;
            let mut reader = source.guard(File::open(path)?);
            io::copy(&mut reader, writer).map_err(|e| source.io_error(e))?;
        }
    }

    Ok(())
}

/// Wrap a single regular file into an archive holding just that file.
pub(crate) fn zip_single_file(path: &Path, source: &Source) -> Result<ZipFile> {
    let metadata = fs::metadata(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ZipperError::SourceNotFound(path.to_path_buf()))?;

    let mut writer = ZipWriter::new(source.scratch_zip("local-zipper")?);
    writer.start_file(name, file_options(&metadata))?;
    let mut reader = source.guard(File::open(path)?);
    io::copy(&mut reader, &mut writer).map_err(|e| source.io_error(e))?;

    finish_temp_zip(writer)
}

/// Transcode a plain tar stream into a temporary zip archive.
pub(crate) fn tar_to_zip<R: Read>(reader: R, source: &Source) -> Result<ZipFile> {
    let mut writer = ZipWriter::new(source.scratch_zip("downloads-zipper")?);
    if let Err(e) = write_tar_to_zip(source.guard(reader), &mut writer) {
        source.check_cancelled()?;
        return Err(e);
    }
    finish_temp_zip(writer)
}

/// Transcode a gzip compressed tar stream into a temporary zip archive.
pub(crate) fn targz_to_zip<R: Read>(reader: R, source: &Source) -> Result<ZipFile> {
    tar_to_zip(GzDecoder::new(reader), source)
}

/// Failures reading the tar stream. A dropped connection stays a transport
/// error; anything else means the archive is malformed.
fn read_error(context: &str) -> impl Fn(io::Error) -> ZipperError + '_ {
    move |e| {
        if is_transport_io(&e) {
            e.into()
        } else {
            ZipperError::InvalidArchive(format!("{}: {}", context, e))
        }
    }
}

/// Copy an entry body, telling read failures apart from write failures.
fn copy_entry<R: Read, W: Write>(reader: &mut R, writer: &mut W, name: &str) -> Result<u64> {
    let mut buf = vec![0u8; 64 * 1024];
    let mut copied = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(&format!("Failed to read {}", name))(e)),
        };
        writer.write_all(&buf[..n])?;
        copied += n as u64;
    }
}

/// Everything after the first path segment, `""` if there is none.
fn strip_root_folder(name: &str) -> &str {
    name.split_once('/').map(|(_, rest)| rest).unwrap_or("")
}

/// Copy every tar entry into `writer`.
///
/// When the first entry is a directory it is treated as a root folder
/// (`repo-<sha>/` in forge archives): it is not copied and its segment is
/// stripped from every following entry name. When the first entry is
/// anything else no entry is stripped. The decision is made once.
pub fn write_tar_to_zip<R: Read, W: Write + Seek>(
    reader: R,
    writer: &mut ZipWriter<W>,
) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    let mut has_root_folder: Option<bool> = None;

    let entries = archive.entries().map_err(read_error("Failed to read tar"))?;
    for entry in entries {
        let mut entry = entry.map_err(read_error("Failed to read tar entry"))?;
        let entry_type = entry.header().entry_type();

        // pax global headers carry metadata only, e.g. the commit of a forge archive
        if entry_type == tar::EntryType::XGlobalHeader {
            continue;
        }

        let is_dir = entry_type.is_dir();
        let strip = match has_root_folder {
            Some(strip) => strip,
            None => {
                has_root_folder = Some(is_dir);
                if is_dir {
                    continue;
                }
                false
            }
        };

        let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let name = if strip {
            strip_root_folder(&raw_name)
        } else {
            raw_name.as_str()
        };
        if name.is_empty() || name == "/" {
            continue;
        }

        let header = entry.header();
        let modified = zip_datetime_from_unix(header.mtime().unwrap_or(0));

        if is_dir {
            let mode = header.mode().unwrap_or(DEFAULT_DIR_MODE);
            log::trace!("Adding directory {}", name);
            writer.add_directory(name, entry_options(CompressionMethod::Stored, mode, modified))?;
        } else if entry_type.is_file() || entry_type == tar::EntryType::Continuous {
            let mode = header.mode().unwrap_or(DEFAULT_FILE_MODE);
            let size = header.size().unwrap_or(0);
            let options = entry_options(CompressionMethod::Deflated, mode, modified)
                .large_file(size >= u32::MAX as u64);
            log::trace!("Adding file {} ({} bytes)", name, size);
            writer.start_file(name, options)?;
            copy_entry(&mut entry, writer, name)?;
        } else if entry_type.is_symlink() {
            let target = entry
                .link_name()
                .map_err(read_error("Invalid link in tar"))?
                .map(|target| entry_name(&target))
                .unwrap_or_default();
            let mode = header.mode().unwrap_or(0o777);
            log::trace!("Adding symlink {} -> {}", name, target);
            writer.add_symlink(name, target, entry_options(CompressionMethod::Stored, mode, modified))?;
        } else {
            log::debug!("Skipping tar entry {} of type {:?}", name, entry_type);
        }
    }

    Ok(())
}
