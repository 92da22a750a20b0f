//! Newline framing for the device byte stream.

use bytes::{Bytes, BytesMut};

/// Splits a byte stream into newline-terminated frames.
///
/// A trailing `\r` is stripped and empty lines are skipped. A partial line
/// that grows past `max_line` bytes is flushed as-is.
#[derive(Debug)]
pub struct LineSplitter {
    buf: BytesMut,
    max_line: usize,
}

impl LineSplitter {
    /// Splitter holding at most `max_line` bytes of an unfinished line.
    pub fn new(max_line: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_line: max_line.max(1),
        }
    }

    /// Feed a chunk, returning every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line = self.buf.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            if !line.is_empty() {
                frames.push(line.freeze());
            }
        }

        if self.buf.len() > self.max_line {
            frames.push(self.buf.split().freeze());
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines() {
        let mut splitter = LineSplitter::new(64);
        let frames = splitter.push(b"one\ntwo\n");
        assert_eq!(frames, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
        assert_eq!(splitter.push(b"\n"), Vec::<Bytes>::new());
    }

    #[test]
    fn joins_across_chunks() {
        let mut splitter = LineSplitter::new(64);
        assert!(splitter.push(b"{\"type\":\"ardu").is_empty());
        let frames = splitter.push(b"ino_state\"}\r\nrest");
        assert_eq!(frames, vec![Bytes::from_static(b"{\"type\":\"arduino_state\"}")]);
        assert_eq!(splitter.push(b"\n"), vec![Bytes::from_static(b"rest")]);
    }

    #[test]
    fn skips_blank_lines() {
        let mut splitter = LineSplitter::new(64);
        assert_eq!(splitter.push(b"\r\n\n\nx\n"), vec![Bytes::from_static(b"x")]);
    }

    #[test]
    fn flushes_oversized_partial_line() {
        let mut splitter = LineSplitter::new(4);
        let frames = splitter.push(b"abcdefg");
        assert_eq!(frames, vec![Bytes::from_static(b"abcdefg")]);
        assert_eq!(splitter.push(b"h\n"), vec![Bytes::from_static(b"h")]);
    }
}
