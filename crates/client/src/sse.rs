//! Server-Sent Events decoding for the council message stream.
//!
//! Bytes are buffered until a full line is available, so a payload (or a
//! multi-byte character) split across network reads is decoded intact.
//! `data:` lines accumulate until the blank line that ends the event and
//! are joined with `\n`.

/// Extracts event payloads from an SSE byte stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk and return the payloads of the events it completed.
    ///
    /// Comments (`:` prefix) and other fields (`event:`, `id:`, `retry:`)
    /// are skipped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(payload) = self.process_line(&line[..newline]) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// End of stream: decode a trailing unterminated line and emit any
    /// event still waiting for its blank line.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        if let Some(payload) = self.process_line(&rest) {
            return Some(payload);
        }
        self.dispatch()
    }

    fn process_line(&mut self, raw: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            return self.dispatch();
        }
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.strip_prefix(' ').unwrap_or(data);
            self.data.push(data.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        let payload = std::mem::take(&mut self.data).join("\n");
        if payload.trim().is_empty() {
            return None;
        }
        Some(payload)
    }
}
