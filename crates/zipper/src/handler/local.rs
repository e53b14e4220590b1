//! Local filesystem handler.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::archive::{zip_directory, zip_single_file};
use super::checksum::{sha1_directory, sha1_file};
use crate::source::Source;
use crate::util::{is_web_url, is_zip_file};
use crate::zip_file::ZipFile;
use crate::{Result, ZipperError};

/// Handler for files and directories on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalHandler;

impl LocalHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &'static str {
        "local"
    }

    /// Any existing path that is not a web URL.
    pub fn detect(&self, src: &Source) -> bool {
        !is_web_url(src.path()) && Path::new(src.path()).exists()
    }

    pub fn sha1(&self, src: &Source) -> Result<String> {
        let path = Path::new(src.path());
        let metadata = path
            .metadata()
            .map_err(|_| ZipperError::SourceNotFound(path.to_path_buf()))?;

        if metadata.is_dir() {
            sha1_directory(path, src)
        } else {
            sha1_file(path)
        }
    }

    pub fn zip(&self, src: &Source) -> Result<ZipFile> {
        let path = Path::new(src.path());
        let metadata = path
            .metadata()
            .map_err(|_| ZipperError::SourceNotFound(path.to_path_buf()))?;

        if metadata.is_dir() {
            log::debug!("Zipping directory {}", path.display());
            return zip_directory(path, src);
        }

        if is_zip_file(src.path()) {
            log::debug!("Serving archive {} as is", path.display());
            let file = File::open(path)?;
            return Ok(ZipFile::new(BufReader::new(file), metadata.len()));
        }

        log::debug!("Zipping single file {}", path.display());
        zip_single_file(path, src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{Cursor, Read, Write};
    use tempfile::TempDir;

    fn create_test_dir(dir: &Path) {
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::write(dir.join("manifest.yml"), "name: app").unwrap();
        fs::write(dir.join("src/main.py"), "print('hi')").unwrap();
    }

    fn read_all(mut zip_file: ZipFile) -> Vec<u8> {
        let mut bytes = Vec::new();
        zip_file.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes.len() as u64, zip_file.size());
        zip_file.close().unwrap();
        bytes
    }

    #[test]
    fn test_detect() {
        let temp = TempDir::new().unwrap();
        let handler = LocalHandler::new();

        assert!(handler.detect(&Source::new(temp.path().to_string_lossy())));
        assert!(!handler.detect(&Source::new(temp.path().join("missing").to_string_lossy())));
        assert!(!handler.detect(&Source::new("https://example.com/a.zip")));
    }

    #[test]
    fn test_zip_directory() {
        let temp = TempDir::new().unwrap();
        create_test_dir(temp.path());

        let handler = LocalHandler::new();
        let bytes = read_all(handler.zip(&Source::new(temp.path().to_string_lossy())).unwrap());

        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<_> = archive.file_names().collect();
        names.sort();
        assert_eq!(names, vec!["manifest.yml", "src/", "src/main.py"]);
    }

    #[test]
    fn test_zip_existing_archive_is_passed_through() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bundle.ZIP");

        let mut writer = zip::ZipWriter::new(fs::File::create(&path).unwrap());
        writer
            .start_file("inside.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"inside").unwrap();
        writer.finish().unwrap();
        let original = fs::read(&path).unwrap();

        let handler = LocalHandler::new();
        let bytes = read_all(handler.zip(&Source::new(path.to_string_lossy())).unwrap());
        assert_eq!(bytes, original);
        // No-op release: the source archive stays put
        assert!(path.exists());
    }

    #[test]
    fn test_zip_plain_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("script.sh");
        fs::write(&path, "echo hi").unwrap();

        let handler = LocalHandler::new();
        let bytes = read_all(handler.zip(&Source::new(path.to_string_lossy())).unwrap());

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut content = String::new();
        archive.by_name("script.sh").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "echo hi");
    }

    #[test]
    fn test_missing_path() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        let handler = LocalHandler::new();

        let err = handler.zip(&Source::new(missing.to_string_lossy())).unwrap_err();
        assert!(matches!(err, ZipperError::SourceNotFound(_)));

        let err = handler.sha1(&Source::new(missing.to_string_lossy())).unwrap_err();
        assert!(matches!(err, ZipperError::SourceNotFound(_)));
    }

    #[test]
    fn test_sha1_directory_and_file() {
        let temp = TempDir::new().unwrap();
        create_test_dir(temp.path());
        let handler = LocalHandler::new();

        let dir_sha = handler.sha1(&Source::new(temp.path().to_string_lossy())).unwrap();
        assert_eq!(dir_sha.len(), 40);

        let file = temp.path().join("manifest.yml");
        let file_sha = handler.sha1(&Source::new(file.to_string_lossy())).unwrap();
        // sha1("name: app")
        assert_eq!(file_sha, crate::util::sha1_from_reader(Cursor::new("name: app")).unwrap());
    }

    #[test]
    fn test_zip_twice_is_byte_identical() {
        let temp = TempDir::new().unwrap();
        create_test_dir(temp.path());
        let handler = LocalHandler::new();
        let source = Source::new(temp.path().to_string_lossy());

        let first = read_all(handler.zip(&source).unwrap());
        let second = read_all(handler.zip(&source).unwrap());
        assert_eq!(first, second);
    }
}
