//! Chunk buffers.
//!
//! A chunk is an ordered batch of raw input lines bounded by a configured capacity. Once a buffer
//! reports it is full it is handed off to a sorting task and a fresh one is built.

use rayon;

/// Chunk buffer builder.
pub trait ChunkBufferBuilder: Default + Sync {
    type Buffer: ChunkBuffer;

    /// Creates a new empty buffer.
    fn build(&self) -> Self::Buffer;
}

/// Base capacity-bounded chunk interface.
pub trait ChunkBuffer: IntoIterator<Item = String> + rayon::slice::ParallelSliceMut<String> + Send {
    /// Appends a line to the buffer.
    fn push(&mut self, line: String);

    /// Returns the number of buffered lines.
    fn len(&self) -> usize;

    /// Checks if the buffer holds no lines.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if the buffer reached its capacity.
    fn is_full(&self) -> bool;
}

/// Builds [`LineLimitedBuffer`]s holding at most `capacity` lines.
pub struct LineLimitedBufferBuilder {
    capacity: usize,
    preallocate: bool,
}

impl LineLimitedBufferBuilder {
    /// Default chunk capacity in lines.
    pub const DEFAULT_CAPACITY: usize = 1_000_000;

    /// Creates a builder. A zero capacity is treated as one line so that every chunk makes progress.
    pub fn new(capacity: usize, preallocate: bool) -> Self {
        LineLimitedBufferBuilder {
            capacity: capacity.max(1),
            preallocate,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl ChunkBufferBuilder for LineLimitedBufferBuilder {
    type Buffer = LineLimitedBuffer;

    fn build(&self) -> Self::Buffer {
        if self.preallocate {
            LineLimitedBuffer::with_capacity(self.capacity)
        } else {
            LineLimitedBuffer::new(self.capacity)
        }
    }
}

impl Default for LineLimitedBufferBuilder {
    fn default() -> Self {
        LineLimitedBufferBuilder::new(Self::DEFAULT_CAPACITY, false)
    }
}

/// Chunk limited by line count.
pub struct LineLimitedBuffer {
    limit: usize,
    lines: Vec<String>,
}

impl LineLimitedBuffer {
    pub fn new(limit: usize) -> Self {
        LineLimitedBuffer {
            limit,
            lines: Vec::new(),
        }
    }

    pub fn with_capacity(limit: usize) -> Self {
        LineLimitedBuffer {
            limit,
            lines: Vec::with_capacity(limit),
        }
    }
}

impl ChunkBuffer for LineLimitedBuffer {
    fn push(&mut self, line: String) {
        self.lines.push(line);
    }

    fn len(&self) -> usize {
        self.lines.len()
    }

    fn is_full(&self) -> bool {
        self.lines.len() >= self.limit
    }
}

impl IntoIterator for LineLimitedBuffer {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.into_iter()
    }
}

impl rayon::slice::ParallelSliceMut<String> for LineLimitedBuffer {
    fn as_parallel_slice_mut(&mut self) -> &mut [String] {
        self.lines.as_mut_slice()
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{ChunkBuffer, ChunkBufferBuilder, LineLimitedBufferBuilder};

    #[rstest]
    #[case(true)]
    #[case(false)]
    fn test_line_limited_buffer(#[case] preallocate: bool) {
        let builder = LineLimitedBufferBuilder::new(2, preallocate);
        let mut buffer = builder.build();
        assert!(buffer.is_empty());

        buffer.push("10.0.0.2".to_string());
        assert_eq!(buffer.is_full(), false);
        buffer.push("10.0.0.1".to_string());
        assert_eq!(buffer.is_full(), true);
        assert_eq!(buffer.len(), 2);

        let lines = Vec::from_iter(buffer);
        assert_eq!(lines, vec!["10.0.0.2", "10.0.0.1"]);
    }

    #[test]
    fn test_zero_capacity_holds_one_line() {
        let builder = LineLimitedBufferBuilder::new(0, false);
        assert_eq!(builder.capacity(), 1);

        let mut buffer = builder.build();
        buffer.push("a".to_string());
        assert!(buffer.is_full());
    }
}

#[cfg(feature = "memory-limit")]
pub mod mem {
    //! Chunks bounded by the memory their lines occupy.

    use deepsize::DeepSizeOf;
    use rayon;

    use super::{ChunkBuffer, ChunkBufferBuilder};

    /// Builds [`MemoryLimitedBuffer`]s holding roughly `limit` bytes of lines.
    pub struct MemoryLimitedBufferBuilder {
        limit: u64,
    }

    impl MemoryLimitedBufferBuilder {
        /// Creates a builder. A zero limit is treated as one byte, i.e. one line per chunk.
        pub fn new(limit: u64) -> Self {
            MemoryLimitedBufferBuilder { limit: limit.max(1) }
        }
    }

    impl ChunkBufferBuilder for MemoryLimitedBufferBuilder {
        type Buffer = MemoryLimitedBuffer;

        fn build(&self) -> Self::Buffer {
            MemoryLimitedBuffer::new(self.limit)
        }
    }

    impl Default for MemoryLimitedBufferBuilder {
        fn default() -> Self {
            MemoryLimitedBufferBuilder { limit: u64::MAX }
        }
    }

    /// Chunk limited by consumed memory.
    pub struct MemoryLimitedBuffer {
        limit: u64,
        used: u64,
        lines: Vec<String>,
    }

    impl MemoryLimitedBuffer {
        pub fn new(limit: u64) -> Self {
            MemoryLimitedBuffer {
                limit,
                used: 0,
                lines: Vec::new(),
            }
        }

        /// Bytes accounted to the buffered lines.
        pub fn mem_size(&self) -> u64 {
            self.used
        }
    }

    impl ChunkBuffer for MemoryLimitedBuffer {
        fn push(&mut self, line: String) {
            self.used += line.deep_size_of() as u64;
            self.lines.push(line);
        }

        fn len(&self) -> usize {
            self.lines.len()
        }

        fn is_full(&self) -> bool {
            self.used >= self.limit
        }
    }

    impl IntoIterator for MemoryLimitedBuffer {
        type Item = String;
        type IntoIter = std::vec::IntoIter<String>;

        fn into_iter(self) -> Self::IntoIter {
            self.lines.into_iter()
        }
    }

    impl rayon::slice::ParallelSliceMut<String> for MemoryLimitedBuffer {
        fn as_parallel_slice_mut(&mut self) -> &mut [String] {
            self.lines.as_mut_slice()
        }
    }

    #[cfg(test)]
    mod test {
        use deepsize::DeepSizeOf;

        use super::{ChunkBuffer, ChunkBufferBuilder, MemoryLimitedBufferBuilder};

        #[test]
        fn test_memory_limited_buffer() {
            let first = "192.168.0.1".to_string();
            let second = "192.168.0.2".to_string();
            let line_size = first.deep_size_of() as u64;

            let builder = MemoryLimitedBufferBuilder::new(2 * line_size);
            let mut buffer = builder.build();

            buffer.push(first.clone());
            assert_eq!(buffer.mem_size(), line_size);
            assert_eq!(buffer.is_full(), false);

            buffer.push(second.clone());
            assert_eq!(buffer.mem_size(), 2 * line_size);
            assert_eq!(buffer.is_full(), true);

            assert_eq!(Vec::from_iter(buffer), vec![first, second]);
        }
    }
}
