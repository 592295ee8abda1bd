// SSE (Server-Sent Events) framing
//
// The relay never interprets SSE events. It only needs two things:
//
// 1. **Line splitting**: upstream bytes arrive in arbitrary chunks. Lines are
//    cut on `\n` (a preceding `\r` is dropped) so every relayed emission is
//    exactly one upstream line. Blank lines are kept: they terminate events.
//
// 2. **Error frames**: failures are reported in-band as a single
//    `data: {"error": "..."}` event.

use bytes::{Buf, Bytes, BytesMut};

// ============================================================================
// Line Splitting
// ============================================================================

/// Accumulates upstream chunks and yields complete lines.
///
/// Works on bytes, so a multi-byte UTF-8 character split across two chunks is
/// decoded only once the whole line is present.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: BytesMut,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Next complete line without its terminator, if one is buffered
    pub fn next_line(&mut self) -> Option<String> {
        let newline = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line = self.pending.split_to(newline);
        self.pending.advance(1);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left once the upstream ends: a final line that had no
    /// terminator
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let mut rest = self.pending.split();
        if rest.last() == Some(&b'\r') {
            rest.truncate(rest.len() - 1);
        }
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

// ============================================================================
// Frames
// ============================================================================

/// One relayed line as written to the client
pub fn line_frame(line: &str) -> Bytes {
    let mut frame = String::with_capacity(line.len() + 1);
    frame.push_str(line);
    frame.push('\n');
    Bytes::from(frame)
}

/// `data: {"error": "<message>"}` followed by the blank line ending the event
pub fn error_frame(message: &str) -> Bytes {
    let encoded = serde_json::Value::String(message.to_string());
    Bytes::from(format!("data: {{\"error\": {}}}\n\n", encoded))
}
