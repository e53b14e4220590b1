//! The archive handle returned by every handler.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};

use tempfile::{TempDir, TempPath};

use crate::Result;

/// Temporary state that only exists to serve one archive.
enum Backing {
    File(TempPath),
    Dir(TempDir),
}

impl Backing {
    fn close(self) -> io::Result<()> {
        match self {
            Backing::File(path) => path.close(),
            Backing::Dir(dir) => dir.close(),
        }
    }
}

/// A zip archive ready to be read, with its total size.
///
/// Any temporary file or directory created to produce the archive is
/// removed by [`ZipFile::close`]. Dropping the handle without closing it
/// removes them as well, but cleanup errors are then only logged.
pub struct ZipFile {
    reader: Option<Box<dyn Read + Send>>,
    size: u64,
    backing: Vec<Backing>,
}

impl ZipFile {
    pub(crate) fn new<R>(reader: R, size: u64) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            reader: Some(Box::new(reader)),
            size,
            backing: Vec::new(),
        }
    }

    /// Serve an already written temporary file, deleting it on release.
    pub(crate) fn from_temp_file(file: File, path: TempPath) -> Result<Self> {
        let size = file.metadata()?.len();
        let mut zip_file = Self::new(io::BufReader::new(file), size);
        zip_file.backing.push(Backing::File(path));
        Ok(zip_file)
    }

    /// Also remove `dir` on release, after everything registered before it.
    pub(crate) fn with_temp_dir(mut self, dir: TempDir) -> Self {
        self.backing.push(Backing::Dir(dir));
        self
    }

    /// Total length in bytes of the archive stream.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Close the stream and remove the temporary state behind it.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        // The reader may hold the temp file open
        self.reader.take();

        let mut first_error = None;
        for backing in self.backing.drain(..) {
            if let Err(e) = backing.close() {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl Read for ZipFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reader.as_mut() {
            Some(reader) => reader.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for ZipFile {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Failed to clean up temporary archive state: {}", e);
        }
    }
}

impl fmt::Debug for ZipFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipFile")
            .field("size", &self.size)
            .field("temporaries", &self.backing.len())
            .finish()
    }
}
