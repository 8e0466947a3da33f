//! Distinct line counter.

use log;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use crossbeam_channel;
use parking_lot::Mutex;

use crate::buffer::{ChunkBufferBuilder, LineLimitedBufferBuilder};
use crate::cleanup::remove_spill_files;
use crate::merger::{MergeError, SpillMerger};
use crate::reader::ChunkReader;
use crate::spill::{spill_chunk, SpillError, SpillFile, SpillRegistry};
use crate::storage::{FsStorage, SpillStorage};

/// Counting error.
#[derive(Debug)]
pub enum CountError<I: Error = io::Error> {
    /// Temporary directory creation error.
    TempDir(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Input could not be opened.
    InputUnavailable(io::Error),
    /// Input data stream error.
    InputError(I),
    /// A chunk could not be written to its spill file.
    SpillWrite(SpillError),
    /// A spill file could not be opened or read during the merge.
    SpillRead(MergeError),
}

impl<I> Error for CountError<I>
where
    I: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            CountError::TempDir(err) => err,
            CountError::ThreadPoolBuildError(err) => err,
            CountError::InputUnavailable(err) => err,
            CountError::InputError(err) => err,
            CountError::SpillWrite(err) => err,
            CountError::SpillRead(err) => err,
        })
    }
}

impl<I: Error> Display for CountError<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            CountError::TempDir(err) => write!(f, "temporary directory not created: {}", err),
            CountError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            CountError::InputUnavailable(err) => write!(f, "input not opened: {}", err),
            CountError::InputError(err) => write!(f, "input data stream error: {}", err),
            CountError::SpillWrite(err) => write!(f, "spilling failed: {}", err),
            CountError::SpillRead(err) => write!(f, "merging failed: {}", err),
        }
    }
}

/// Result of a counting run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountSummary {
    /// Number of distinct lines.
    pub unique: u64,
    /// Number of lines read from the input.
    pub lines: u64,
    /// Number of spill files the input was split into.
    pub spill_files: usize,
}

/// Distinct counter builder. Provides methods for [`DistinctCounter`] initialization.
pub struct DistinctCounterBuilder<B = LineLimitedBufferBuilder>
where
    B: ChunkBufferBuilder,
{
    /// Number of threads sorting and spilling chunks in parallel.
    threads_number: Option<usize>,
    /// Directory the temporary spill directory is created in.
    tmp_dir: Option<Box<Path>>,
    /// Spill file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Chunk buffer builder.
    buffer_builder: B,
}

impl<B> DistinctCounterBuilder<B>
where
    B: ChunkBufferBuilder,
{
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        DistinctCounterBuilder::default()
    }

    /// Builds a [`DistinctCounter`] spilling to a fresh temporary directory.
    pub fn build(self) -> Result<DistinctCounter<B, FsStorage>, CountError> {
        let storage = FsStorage::temp(self.tmp_dir.as_deref())
            .map_err(CountError::TempDir)?
            .with_rw_buf_size(self.rw_buf_size);

        DistinctCounter::new(self.threads_number, storage, self.buffer_builder)
    }

    /// Builds a [`DistinctCounter`] spilling to the provided storage.
    pub fn build_with_storage<S: SpillStorage>(self, storage: S) -> Result<DistinctCounter<B, S>, CountError> {
        DistinctCounter::new(self.threads_number, storage, self.buffer_builder)
    }

    /// Sets number of threads sorting chunks in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> Self {
        self.threads_number = Some(threads_number);
        self
    }

    /// Sets directory the temporary spill directory is created in.
    pub fn with_tmp_dir(mut self, path: &Path) -> Self {
        self.tmp_dir = Some(path.into());
        self
    }

    /// Sets chunk buffer builder.
    pub fn with_buffer(mut self, buffer_builder: B) -> Self {
        self.buffer_builder = buffer_builder;
        self
    }

    /// Sets spill file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> Self {
        self.rw_buf_size = Some(buf_size);
        self
    }
}

impl<B> Default for DistinctCounterBuilder<B>
where
    B: ChunkBufferBuilder,
{
    fn default() -> Self {
        DistinctCounterBuilder {
            threads_number: None,
            tmp_dir: None,
            rw_buf_size: None,
            buffer_builder: B::default(),
        }
    }
}

/// Counts distinct lines of inputs that do not fit in memory.
///
/// The input is split into chunks which a fixed pool of workers sorts and spills to the storage. Once every
/// chunk is spilled the sorted spill files are merged in a single streaming pass counting distinct lines.
/// Spill files are removed at the end of every run, successful or not.
pub struct DistinctCounter<B = LineLimitedBufferBuilder, S = FsStorage>
where
    B: ChunkBufferBuilder,
    S: SpillStorage,
{
    /// Sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Spill file storage.
    storage: S,
    /// Chunk buffer builder.
    buffer_builder: B,
}

impl<B, S> DistinctCounter<B, S>
where
    B: ChunkBufferBuilder,
    S: SpillStorage,
{
    /// Creates a new counter instance.
    ///
    /// # Arguments
    /// * `threads_number` - Number of workers sorting chunks in parallel. If the parameter is [`None`] the number
    ///   is selected based on available CPU core number. At most that many chunks are sorted at once, plus one
    ///   being filled.
    /// * `storage` - Storage spill files are written to.
    /// * `buffer_builder` - Builder used for chunk buffer creation.
    pub fn new(threads_number: Option<usize>, storage: S, buffer_builder: B) -> Result<Self, CountError> {
        Ok(DistinctCounter {
            thread_pool: Self::init_thread_pool(threads_number)?,
            storage,
            buffer_builder,
        })
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, CountError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }

        thread_pool_builder.build().map_err(CountError::ThreadPoolBuildError)
    }

    /// Spill file storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Number of sorting workers.
    pub fn threads_number(&self) -> usize {
        self.thread_pool.current_num_threads()
    }

    /// Counts distinct lines of a file.
    pub fn count_file(&self, path: &Path) -> Result<CountSummary, CountError> {
        let file = fs::File::open(path).map_err(CountError::InputUnavailable)?;
        log::info!("counting distinct lines of {}", path.display());

        self.count(io::BufReader::new(file).lines())
    }

    /// Counts distinct lines of the input.
    ///
    /// Every item must be a single line without its line terminator. Spill files are newline-delimited, so an item
    /// containing `\n` is counted as the separate lines it contains.
    ///
    /// # Arguments
    /// * `input` - Input lines. An input error aborts the run.
    pub fn count<I, E>(&self, input: I) -> Result<CountSummary, CountError<E>>
    where
        I: IntoIterator<Item = Result<String, E>>,
        E: Error,
    {
        let (files, spilled) = self.spill_chunks(input);

        let result = spilled.and_then(|lines| {
            log::debug!("{} lines spilled to {} files", lines, files.len());

            let merger = SpillMerger::open(&self.storage, &files).map_err(CountError::SpillRead)?;
            let unique = merger.count_distinct().map_err(CountError::SpillRead)?;

            Ok(CountSummary {
                unique,
                lines,
                spill_files: files.len(),
            })
        });

        let report = remove_spill_files(&self.storage, &files);
        if !report.is_clean() {
            log::warn!("{} spill files left behind", report.failed.len());
        }

        if let Ok(summary) = &result {
            log::info!(
                "{} distinct lines out of {} ({} spill files)",
                summary.unique,
                summary.lines,
                summary.spill_files
            );
        }

        result
    }

    /// Reads the input chunk by chunk and hands the chunks over to the workers.
    ///
    /// Returns every spill file written, even when the run failed, so that they can be removed.
    fn spill_chunks<I, E>(&self, input: I) -> (Vec<SpillFile>, Result<u64, CountError<E>>)
    where
        I: IntoIterator<Item = Result<String, E>>,
        E: Error,
    {
        let registry = SpillRegistry::new();
        let failure: Mutex<Option<SpillError>> = Mutex::new(None);
        let (sender, receiver) = crossbeam_channel::bounded::<(usize, B::Buffer)>(0);

        let read_result = self.thread_pool.in_place_scope(|scope| {
            for _ in 0..self.thread_pool.current_num_threads() {
                let receiver = receiver.clone();
                let registry = &registry;
                let failure = &failure;
                let storage = &self.storage;

                scope.spawn(move |_| {
                    for (chunk, buffer) in receiver.iter() {
                        match spill_chunk(storage, chunk, buffer) {
                            Ok(file) => registry.register(file),
                            Err(err) => {
                                log::debug!("chunk {} spilling failed: {}", chunk, err);
                                failure.lock().get_or_insert(err);
                            }
                        }
                    }
                });
            }

            // only the workers hold receivers, so sending fails once all of them are gone
            drop(receiver);

            let mut reader = ChunkReader::new(input, &self.buffer_builder);
            let outcome = loop {
                if failure.lock().is_some() {
                    break Ok(());
                }

                match reader.next() {
                    Some(Ok(job)) => {
                        if sender.send(job).is_err() {
                            break Ok(());
                        }
                    }
                    Some(Err(err)) => break Err(CountError::InputError(err)),
                    None => break Ok(()),
                }
            };

            // disconnecting the channel lets the workers exit once it is drained
            drop(sender);

            outcome.map(|()| reader.lines_read())
        });

        let files = registry.finalize();
        let outcome = match (read_result, failure.into_inner()) {
            (Err(err), _) => Err(err),
            (Ok(_), Some(err)) => Err(CountError::SpillWrite(err)),
            (Ok(lines), None) => Ok(lines),
        };

        (files, outcome)
    }
}
