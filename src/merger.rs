//! Binary heap k-way merger.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::error::Error;
use std::fmt::{self, Display};
use std::io::{self, BufRead};

use log;

use crate::spill::SpillFile;
use crate::storage::SpillStorage;

/// Spill file opening or reading error.
#[derive(Debug)]
pub struct MergeError {
    pub file: String,
    pub source: io::Error,
}

impl Error for MergeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

impl Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spill file {} not readable: {}", self.file, self.source)
    }
}

/// Open sequential reader over one sorted input.
struct MergeCursor<R> {
    name: String,
    reader: R,
}

impl<R: BufRead> MergeCursor<R> {
    /// Reads the next line without its trailing newline, [`None`] once the input is exhausted.
    fn advance(&mut self) -> Result<Option<String>, MergeError> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).map_err(|source| MergeError {
            file: self.name.clone(),
            source,
        })?;

        if read == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
        }

        Ok(Some(line))
    }
}

/// Current head line of a cursor. Ordered by line first, the cursor index only breaks ties.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry {
    line: String,
    cursor: usize,
}

/// Merges sorted newline-delimited inputs into a single sorted stream.
///
/// Time complexity is *m* \* log(*n*) where *m* is the number of lines and *n* the number of inputs. Only the
/// head line of every open input is kept in memory. Inputs that are exhausted are closed right away.
pub struct SpillMerger<R: BufRead> {
    // binary heap is max-heap by default so entries are reversed to get a min-heap
    heap: BinaryHeap<Reverse<HeapEntry>>,
    cursors: Vec<Option<MergeCursor<R>>>,
    failed: bool,
}

impl<R: BufRead> SpillMerger<R> {
    /// Creates a merger over named readers. Every input must be sorted in ascending order, otherwise the result
    /// is undefined. Empty inputs are dropped immediately.
    pub fn new<I>(inputs: I) -> Result<Self, MergeError>
    where
        I: IntoIterator<Item = (String, R)>,
    {
        let mut heap = BinaryHeap::new();
        let mut cursors = Vec::new();

        for (index, (name, reader)) in inputs.into_iter().enumerate() {
            let mut cursor = MergeCursor { name, reader };
            match cursor.advance()? {
                Some(line) => {
                    heap.push(Reverse(HeapEntry { line, cursor: index }));
                    cursors.push(Some(cursor));
                }
                None => {
                    log::debug!("skipping empty input {}", cursor.name);
                    cursors.push(None);
                }
            }
        }

        Ok(SpillMerger {
            heap,
            cursors,
            failed: false,
        })
    }

    /// Opens every spill file in the storage. A missing or unreadable file fails the whole merge.
    pub fn open<S>(storage: &S, files: &[SpillFile]) -> Result<Self, MergeError>
    where
        S: SpillStorage<Reader = R>,
    {
        log::debug!("opening {} spill files", files.len());

        let mut inputs = Vec::with_capacity(files.len());
        for file in files {
            let reader = storage.open(&file.name).map_err(|source| MergeError {
                file: file.name.clone(),
                source,
            })?;
            inputs.push((file.name.clone(), reader));
        }

        Self::new(inputs)
    }

    /// Number of inputs that still have unread lines.
    pub fn open_inputs(&self) -> usize {
        self.heap.len()
    }

    /// Drains the merged stream counting transitions to a new value, i.e. the number of distinct lines.
    pub fn count_distinct(self) -> Result<u64, MergeError> {
        let mut last: Option<String> = None;
        let mut unique = 0;

        for line in self {
            let line = line?;
            if last.as_ref() != Some(&line) {
                unique += 1;
                last = Some(line);
            }
        }

        log::debug!("merge done ({} distinct lines)", unique);

        Ok(unique)
    }
}

impl<R: BufRead> Iterator for SpillMerger<R> {
    type Item = Result<String, MergeError>;

    /// Returns the next line of all inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let Reverse(HeapEntry { line, cursor }) = self.heap.pop()?;

        let slot = &mut self.cursors[cursor];
        let advanced = match slot.as_mut() {
            Some(reader) => reader.advance(),
            None => Ok(None),
        };

        match advanced {
            Ok(Some(next)) => self.heap.push(Reverse(HeapEntry { line: next, cursor })),
            Ok(None) => *slot = None,
            Err(err) => {
                self.failed = true;
                return Some(Err(err));
            }
        }

        Some(Ok(line))
    }
}
