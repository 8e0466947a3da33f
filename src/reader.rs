//! Chunk reader.

use std::error::Error;

use crate::buffer::{ChunkBuffer, ChunkBufferBuilder};

/// Groups input lines into numbered chunks.
///
/// Lines are appended verbatim to the current buffer. A buffer is yielded as soon as it is full after a push, so
/// every chunk holds at least one line whatever the buffer limit. The trailing
/// partial buffer is yielded at the end of input. Chunks are numbered from zero in read order. An input error is
/// yielded as is and ends the stream.
pub struct ChunkReader<'a, I, B>
where
    B: ChunkBufferBuilder,
{
    lines: I,
    buffer_builder: &'a B,
    next_index: usize,
    lines_read: u64,
    done: bool,
}

impl<'a, I, E, B> ChunkReader<'a, I, B>
where
    I: Iterator<Item = Result<String, E>>,
    E: Error,
    B: ChunkBufferBuilder,
{
    pub fn new<L>(lines: L, buffer_builder: &'a B) -> Self
    where
        L: IntoIterator<IntoIter = I>,
    {
        ChunkReader {
            lines: lines.into_iter(),
            buffer_builder,
            next_index: 0,
            lines_read: 0,
            done: false,
        }
    }

    /// Number of lines consumed from the input so far.
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

impl<'a, I, E, B> Iterator for ChunkReader<'a, I, B>
where
    I: Iterator<Item = Result<String, E>>,
    E: Error,
    B: ChunkBufferBuilder,
{
    type Item = Result<(usize, B::Buffer), E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buffer = self.buffer_builder.build();
        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    self.lines_read += 1;
                    buffer.push(line);
                    if buffer.is_full() {
                        break;
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if buffer.is_empty() {
            return None;
        }

        let index = self.next_index;
        self.next_index += 1;

        Some(Ok((index, buffer)))
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, ErrorKind};

    use rstest::*;

    use super::ChunkReader;
    use crate::buffer::LineLimitedBufferBuilder;

    fn lines(items: &[&str]) -> Vec<Result<String, io::Error>> {
        items.iter().map(|item| Ok(item.to_string())).collect()
    }

    #[rstest]
    #[case(1, vec![vec!["b"], vec!["a"], vec!["a"], vec!["c"]])]
    #[case(2, vec![vec!["b", "a"], vec!["a", "c"]])]
    #[case(3, vec![vec!["b", "a", "a"], vec!["c"]])]
    #[case(4, vec![vec!["b", "a", "a", "c"]])]
    #[case(10, vec![vec!["b", "a", "a", "c"]])]
    fn test_chunking(#[case] capacity: usize, #[case] expected: Vec<Vec<&str>>) {
        let builder = LineLimitedBufferBuilder::new(capacity, false);
        let mut reader = ChunkReader::new(lines(&["b", "a", "a", "c"]), &builder);

        let mut chunks = Vec::new();
        for (expected_index, chunk) in (&mut reader).enumerate() {
            let (index, buffer) = chunk.unwrap();
            assert_eq!(index, expected_index);
            chunks.push(Vec::from_iter(buffer));
        }

        assert_eq!(chunks, expected);
        assert_eq!(reader.lines_read(), 4);
    }

    #[cfg(feature = "memory-limit")]
    #[test]
    fn test_zero_memory_limit_yields_single_line_chunks() {
        use crate::buffer::mem::MemoryLimitedBufferBuilder;

        let builder = MemoryLimitedBufferBuilder::new(0);
        let chunks: Vec<Vec<String>> = ChunkReader::new(lines(&["b", "a", "c"]), &builder)
            .map(|chunk| Vec::from_iter(chunk.unwrap().1))
            .collect();

        assert_eq!(chunks, vec![vec!["b"], vec!["a"], vec!["c"]]);
    }

    #[test]
    fn test_empty_input_yields_no_chunk() {
        let builder = LineLimitedBufferBuilder::new(2, false);
        let mut reader = ChunkReader::new(lines(&[]), &builder);

        assert!(reader.next().is_none());
        assert_eq!(reader.lines_read(), 0);
    }

    #[test]
    fn test_input_error_stops_reading() {
        let input = vec![
            Ok("10.0.0.1".to_string()),
            Err(io::Error::new(ErrorKind::Other, "broken pipe")),
            Ok("10.0.0.2".to_string()),
        ];
        let builder = LineLimitedBufferBuilder::new(8, false);
        let mut reader = ChunkReader::new(input, &builder);

        let err = reader.next().unwrap().err().unwrap();
        assert_eq!(err.to_string(), "broken pipe");
        assert!(reader.next().is_none());
    }
}
