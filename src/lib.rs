//! `ext-uniq` counts distinct lines (typically IP addresses) of inputs too large to be sorted in memory.
//!
//! Counting is achieved in two passes using external sorting. During the first pass the input is split into
//! bounded chunks that a fixed pool of workers sorts in parallel and spills to secondary storage. During the
//! second pass all sorted spill files are merged in a single streaming k-way merge driven by a binary heap, and
//! every transition to a new value is counted. Neither the whole input nor the whole sorted output is ever held
//! in memory: only one chunk per busy worker and one head line per spill file.
//!
//! # Overview
//!
//! * **Bounded memory:**
//!   chunks are limited by line count, or by memory consumption (`memory-limit` feature required), and at most
//!   one chunk per worker is being sorted at any time.
//! * **Multithreading support:**
//!   chunks are sorted and spilled in parallel on a `rayon` thread pool.
//! * **Storage agnostic:**
//!   spill files live in a temporary directory by default, any [`SpillStorage`] implementation can be used
//!   instead.
//! * **No silent undercount:**
//!   a chunk that cannot be spilled or a spill file that cannot be read fails the whole run.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use ext_uniq::{DistinctCounter, DistinctCounterBuilder, LineLimitedBufferBuilder};
//!
//! fn main() {
//!     let counter: DistinctCounter = DistinctCounterBuilder::new()
//!         .with_tmp_dir(Path::new("./"))
//!         .with_buffer(LineLimitedBufferBuilder::new(1_000_000, false))
//!         .build()
//!         .unwrap();
//!
//!     let summary = counter.count_file(Path::new("large_ip_file.txt")).unwrap();
//!
//!     println!("Number of unique IP addresses: {}", summary.unique);
//! }
//! ```

pub mod buffer;
pub mod cleanup;
pub mod counter;
pub mod merger;
pub mod reader;
pub mod spill;
pub mod storage;

pub use buffer::{ChunkBuffer, ChunkBufferBuilder, LineLimitedBuffer, LineLimitedBufferBuilder};
pub use cleanup::{remove_spill_files, CleanupReport};
pub use counter::{CountError, CountSummary, DistinctCounter, DistinctCounterBuilder};
pub use merger::{MergeError, SpillMerger};
pub use reader::ChunkReader;
pub use spill::{spill_chunk, spill_file_name, SpillError, SpillFile, SpillRegistry};
pub use storage::{FsStorage, SpillStorage};
