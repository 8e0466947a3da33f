//! Chunk sorting and spilling.

use std::error::Error;
use std::fmt::{self, Display};
use std::io::{self, Write};

use log;
use parking_lot::Mutex;

use crate::buffer::ChunkBuffer;
use crate::storage::SpillStorage;

const SPILL_FILE_PREFIX: &str = "chunk_";
const SPILL_FILE_SUFFIX: &str = ".txt";

/// Returns the spill file name of the chunk with the provided number.
pub fn spill_file_name(chunk: usize) -> String {
    format!("{}{}{}", SPILL_FILE_PREFIX, chunk, SPILL_FILE_SUFFIX)
}

/// Handle of a sorted spill file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpillFile {
    /// Number of the chunk the file was produced from.
    pub chunk: usize,
    /// Name of the stream in the spill storage.
    pub name: String,
    /// Number of lines written.
    pub lines: usize,
}

/// Spill file creation or writing error.
#[derive(Debug)]
pub struct SpillError {
    pub chunk: usize,
    pub name: String,
    pub source: io::Error,
}

impl Error for SpillError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

impl Display for SpillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk {} not spilled to {}: {}", self.chunk, self.name, self.source)
    }
}

/// Sorts the chunk lines in lexicographic order and writes them newline-delimited to a new spill file named
/// after the chunk number.
///
/// On failure the partially written file is removed (best effort) and no handle is returned.
pub fn spill_chunk<S, B>(storage: &S, chunk: usize, mut buffer: B) -> Result<SpillFile, SpillError>
where
    S: SpillStorage,
    B: ChunkBuffer,
{
    let name = spill_file_name(chunk);

    log::debug!("sorting chunk {} ({} lines) ...", chunk, buffer.len());
    buffer.par_sort_unstable();

    log::debug!("saving chunk {} to {}", chunk, name);
    let lines = buffer.len();
    let result = storage.create(&name).and_then(|mut writer| {
        for line in buffer.into_iter() {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    });

    match result {
        Ok(()) => Ok(SpillFile { chunk, name, lines }),
        Err(source) => {
            if let Err(err) = storage.remove(&name) {
                if err.kind() != io::ErrorKind::NotFound {
                    log::warn!("partial spill file {} not removed: {}", name, err);
                }
            }
            Err(SpillError { chunk, name, source })
        }
    }
}

/// Collects spill file handles reported by concurrent sorting tasks.
///
/// Handles are kept in arrival order. The registry is consumed by [`SpillRegistry::finalize`], so the list can
/// only be read once every reporting task has released its reference.
#[derive(Default)]
pub struct SpillRegistry {
    files: Mutex<Vec<SpillFile>>,
}

impl SpillRegistry {
    pub fn new() -> Self {
        SpillRegistry::default()
    }

    /// Appends a spill file handle.
    pub fn register(&self, file: SpillFile) {
        self.files.lock().push(file);
    }

    /// Number of registered spill files.
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns all registered handles in arrival order.
    pub fn finalize(self) -> Vec<SpillFile> {
        self.files.into_inner()
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;
    use std::io::{self, BufRead};

    use rand::seq::SliceRandom;
    use rayon::prelude::*;
    use rstest::*;

    use super::{spill_chunk, spill_file_name, SpillFile, SpillRegistry};
    use crate::buffer::{ChunkBuffer, ChunkBufferBuilder, LineLimitedBufferBuilder};
    use crate::storage::{FsStorage, SpillStorage};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    fn read_spill(storage: &FsStorage, name: &str) -> Vec<String> {
        storage.open(name).unwrap().lines().map(Result::unwrap).collect()
    }

    #[test]
    fn test_spill_file_names_are_distinct() {
        let names: HashSet<String> = (0..1000).map(spill_file_name).collect();
        assert_eq!(names.len(), 1000);
        assert_eq!(spill_file_name(7), "chunk_7.txt");
    }

    #[rstest]
    fn test_spilled_chunk_is_sorted(tmp_dir: tempfile::TempDir) {
        let storage = FsStorage::in_dir(tmp_dir.path());

        let mut lines: Vec<String> = (0..200).map(|i| format!("10.0.{}.{}", i % 7, i)).collect();
        lines.shuffle(&mut rand::thread_rng());

        let mut buffer = LineLimitedBufferBuilder::new(lines.len(), true).build();
        for line in lines.iter().cloned() {
            buffer.push(line);
        }

        let file = spill_chunk(&storage, 3, buffer).unwrap();
        assert_eq!(file.chunk, 3);
        assert_eq!(file.name, spill_file_name(3));
        assert_eq!(file.lines, 200);

        let spilled = read_spill(&storage, &file.name);
        assert!(spilled.windows(2).all(|pair| pair[0] <= pair[1]));

        lines.sort();
        assert_eq!(spilled, lines);
    }

    #[rstest]
    fn test_spilled_chunk_keeps_duplicates_and_empty_lines(tmp_dir: tempfile::TempDir) {
        let storage = FsStorage::in_dir(tmp_dir.path());

        let mut buffer = LineLimitedBufferBuilder::new(4, false).build();
        for line in ["b", "", "a", "b"] {
            buffer.push(line.to_string());
        }

        let file = spill_chunk(&storage, 0, buffer).unwrap();
        assert_eq!(read_spill(&storage, &file.name), vec!["", "a", "b", "b"]);
    }

    #[rstest]
    fn test_spill_failure_reports_no_file(tmp_dir: tempfile::TempDir) {
        let storage = FsStorage::in_dir(&tmp_dir.path().join("missing"));

        let mut buffer = LineLimitedBufferBuilder::new(1, false).build();
        buffer.push("1.2.3.4".to_string());

        let err = spill_chunk(&storage, 5, buffer).unwrap_err();
        assert_eq!(err.chunk, 5);
        assert_eq!(err.name, "chunk_5.txt");
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_registry_concurrent_registration() {
        let registry = SpillRegistry::new();

        (0..500usize).into_par_iter().for_each(|chunk| {
            registry.register(SpillFile {
                chunk,
                name: spill_file_name(chunk),
                lines: 1,
            })
        });
        assert_eq!(registry.len(), 500);

        let files = registry.finalize();
        let chunks: HashSet<usize> = files.iter().map(|file| file.chunk).collect();
        assert_eq!(files.len(), 500);
        assert_eq!(chunks, HashSet::from_iter(0..500));
    }
}
