//! Spill file storage.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use log;
use tempfile;

/// Storage for named spill streams.
///
/// A stream is created and written sequentially by exactly one writer, then read sequentially by one reader,
/// and finally removed. Names are unique within a run so no locking is needed.
pub trait SpillStorage: Send + Sync {
    type Writer: Write;
    type Reader: BufRead;

    /// Creates (or truncates) the named stream for writing.
    fn create(&self, name: &str) -> io::Result<Self::Writer>;

    /// Opens the named stream for sequential reading.
    fn open(&self, name: &str) -> io::Result<Self::Reader>;

    /// Removes the named stream.
    fn remove(&self, name: &str) -> io::Result<()>;
}

/// File system storage keeping spill streams as files in one directory.
pub struct FsStorage {
    dir: PathBuf,
    rw_buf_size: Option<usize>,
    /// Keeps the temporary directory alive; it is deleted on drop.
    tmp_dir: Option<tempfile::TempDir>,
}

impl FsStorage {
    /// Uses an existing directory. The directory itself is left in place.
    pub fn in_dir(dir: &Path) -> Self {
        FsStorage {
            dir: dir.to_path_buf(),
            rw_buf_size: None,
            tmp_dir: None,
        }
    }

    /// Creates a fresh temporary directory inside `parent`, or inside the OS temporary directory if
    /// `parent` is [`None`].
    pub fn temp(parent: Option<&Path>) -> io::Result<Self> {
        let tmp_dir = if let Some(parent) = parent {
            tempfile::tempdir_in(parent)
        } else {
            tempfile::tempdir()
        }?;

        log::info!("using {} as a spill directory", tmp_dir.path().display());

        Ok(FsStorage {
            dir: tmp_dir.path().to_path_buf(),
            rw_buf_size: None,
            tmp_dir: Some(tmp_dir),
        })
    }

    /// Sets spill file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: Option<usize>) -> Self {
        self.rw_buf_size = buf_size;
        self
    }

    /// Directory holding the spill files.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Whether the directory is removed when the storage is dropped.
    pub fn is_temporary(&self) -> bool {
        self.tmp_dir.is_some()
    }
}

impl SpillStorage for FsStorage {
    type Writer = io::BufWriter<fs::File>;
    type Reader = io::BufReader<fs::File>;

    fn create(&self, name: &str) -> io::Result<Self::Writer> {
        let file = fs::File::create(self.dir.join(name))?;

        Ok(match self.rw_buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        })
    }

    fn open(&self, name: &str) -> io::Result<Self::Reader> {
        let file = fs::File::open(self.dir.join(name))?;

        Ok(match self.rw_buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        })
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.dir.join(name))
    }
}
