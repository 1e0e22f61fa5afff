//! Protocol module - wire format, framing, and event lines.
//!
//! This module implements the text protocol of the VSCP tcp/ip link:
//! - command encoding and terminator classification
//! - frame buffer for reassembling responses from partial reads
//! - response frames with the `<code>,<description>` error convention
//! - event line encoding/decoding

mod event;
mod frame;
mod frame_buffer;
mod wire_format;

pub(crate) use event::parse_number;
pub use event::{Event, Guid, GUID_LEN, LEVEL1_OVER_LEVEL2, MAX_DATA_LEN};
pub use frame::ResponseFrame;
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    classify_terminator, find_line_end, verbs, Command, Outcome, DEFAULT_PORT, LINE_END,
    NEGATIVE_TOKEN, POSITIVE_TOKEN,
};
