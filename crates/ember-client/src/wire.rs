//! Subscription stream framing
//!
//! The server streams frames of the form
//!
//! ```text
//! event: message-added\r\n
//! data: {...}\r\n
//! \r\n
//! ```
//!
//! with bare `\r\n` blank lines as keep-alives. Frames can arrive split
//! across chunks, so the decoder buffers until a full terminator is seen.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Frame {
    pub event: String,
    pub data: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct FrameDecoder {
    buf: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes; returns every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));

        let mut frames = Vec::new();
        while let Some(end) = self.buf.find("\r\n\r\n") {
            let segment = self.buf[..end].to_string();
            self.buf.drain(..end + 4);

            if let Some(frame) = parse_segment(&segment) {
                frames.push(frame);
            }
        }

        // Keep-alives are bare blank lines that never form a full segment;
        // drop any leading ones so the buffer cannot grow unbounded while
        // idle
        while self.buf.starts_with("\r\n") {
            self.buf.drain(..2);
        }

        frames
    }
}

fn parse_segment(segment: &str) -> Option<Frame> {
    let mut event = None;
    let mut data = None;

    for line in segment.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        if let Some(value) = line.strip_prefix("event: ") {
            event = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("data: ") {
            data = Some(value.to_string());
        }
    }

    event.map(|event| Frame { event, data })
}
