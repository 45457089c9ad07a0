//! Frame Splitter
//!
//! Converts raw byte chunks from a child process's stdout into complete
//! JSON-RPC text frames by newline delimitation, retaining the trailing
//! partial line across calls.
//!
//! # Contract
//!
//! [`FrameSplitter`] holds a single raw byte buffer, not a `String`. A
//! chunk boundary can split a multi-byte UTF-8 character in half (the
//! supervisor's stdout reader hands over arbitrary 8 KB reads, with no
//! regard for character boundaries), so chunks are never decoded on their
//! own. Bytes are appended to the buffer as-is, split on the `\n` byte,
//! and only a *complete* line's bytes are UTF-8-decoded (lossily, per
//! [`String::from_utf8_lossy`]) once the whole line has been assembled.
//! The final (possibly empty) segment after the last `\n` stays buffered
//! as raw bytes for the next call. Empty trimmed segments are discarded.

/// Stateful newline-delimited frame splitter.
///
/// Single-producer (the process supervisor's stdout reader),
/// single-consumer (the message router) by convention; the type itself has
/// no internal synchronization and is meant to be owned by one task.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buffer: Vec<u8>,
}

impl FrameSplitter {
    /// Create an empty splitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes read from the child's stdout.
    ///
    /// Returns the complete, trimmed frames contained in `chunk` combined
    /// with any previously buffered partial line. Empty segments (e.g. from
    /// a chunk that is just `"\n"`, or blank lines in the child's output)
    /// are discarded; they are not frames.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(idx) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=idx).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                frames.push(trimmed.to_string());
            }
        }
        frames
    }

    /// Bytes currently buffered as an incomplete trailing line, lossily
    /// decoded for diagnostics. The raw bytes themselves never round-trip
    /// through this accessor; only `push_chunk` touches the real buffer.
    pub fn pending(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }
}
