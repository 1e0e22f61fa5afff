//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management. TCP delivers chunks with no
//! relation to line or response boundaries, so bytes are appended here and
//! extracted in one of two ways depending on the connection mode:
//!
//! - [`FrameBuffer::next_frame`]: command/response mode. Complete lines are
//!   scanned from the head of the buffer; the first line starting with `+OK`
//!   or `-OK` closes the frame.
//! - [`FrameBuffer::next_line`]: receive-loop mode. Every complete line is
//!   yielded on its own.
//!
//! Scanning is incremental: lines already inspected while waiting for a
//! terminator are not inspected again.
//!
//! # Example
//!
//! ```
//! use vscp_client::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! buffer.extend(b"1,2,3,4\r\n+O");
//! assert!(buffer.next_frame().is_none());
//!
//! buffer.extend(b"K\r\n");
//! let frame = buffer.next_frame().unwrap();
//! assert_eq!(frame.lines(), ["1,2,3,4"]);
//! assert!(buffer.is_empty());
//! ```

use bytes::BytesMut;

use super::wire_format::{classify_terminator, find_line_end, LINE_END};
use super::ResponseFrame;

/// Default initial buffer capacity.
const DEFAULT_CAPACITY: usize = 8 * 1024;

/// Buffer for accumulating incoming bytes and extracting frames or lines.
pub struct FrameBuffer {
    /// Accumulated, not yet consumed bytes.
    buffer: BytesMut,
    /// Offset of the first line not yet inspected for a terminator.
    scanned: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new frame buffer with custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            scanned: 0,
        }
    }

    /// Append data to the buffer. A zero-length slice is a no-op.
    pub fn extend(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract one complete response frame.
    ///
    /// Returns `None` while no terminator line has been fully received.
    /// The frame's bytes are removed from the buffer; anything after the
    /// terminator line stays buffered for the next call.
    pub fn next_frame(&mut self) -> Option<ResponseFrame> {
        loop {
            let rest = &self.buffer[self.scanned..];
            let line_len = find_line_end(rest)?;
            let line_start = self.scanned;
            let line_end = line_start + line_len;

            let outcome = classify_terminator(&self.buffer[line_start..line_end]);
            self.scanned = line_end + LINE_END.len();

            if let Some(outcome) = outcome {
                let block = self.buffer.split_to(self.scanned);
                self.scanned = 0;
                return Some(ResponseFrame::from_block(&block, outcome));
            }
        }
    }

    /// Try to extract one complete, non-empty line (CRLF stripped).
    ///
    /// Empty lines are skipped. A trailing partial line stays buffered.
    pub fn next_line(&mut self) -> Option<String> {
        // Lines inspected by next_frame are plain lines here.
        self.scanned = 0;

        loop {
            let line_len = find_line_end(&self.buffer)?;
            let line = self.buffer.split_to(line_len + LINE_END.len());
            let text = &line[..line_len];
            if text.is_empty() {
                continue;
            }
            return Some(String::from_utf8_lossy(text).into_owned());
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset scan state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
