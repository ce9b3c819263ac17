//! Incremental decoder for `text/event-stream` bodies.
//!
//! Only `data:` fields matter to the relay; `event:`, `id:`, `retry:` and
//! comment lines are ignored. Multi-line data is joined with `\n`, as
//! `text/event-stream` framing defines it.

use crate::error::GeminiError;

/// Upper bound on one event: buffered bytes without a line terminator, and
/// the joined `data:` payload of an event not yet closed by a blank line.
const MAX_SSE_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    data: Option<String>,
}

impl SseDecoder {
    /// Feed a chunk; returns the data payload of every event it completed.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, GeminiError> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8(line)
                .map_err(|e| GeminiError::invalid_response(format!("non UTF-8 SSE line: {e}")))?;
            if let Some(event) = self.process_line(&line)? {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_SSE_BUFFER_SIZE {
            return Err(frame_too_large());
        }
        Ok(events)
    }

    /// Flush an event left open when the body ended without a blank line.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            if let Ok(line) = String::from_utf8(rest) {
                let line = line.trim_end_matches('\r').to_owned();
                if let Ok(Some(event)) = self.process_line(&line) {
                    return Some(event);
                }
            }
        }
        self.data.take()
    }

    fn process_line(&mut self, line: &str) -> Result<Option<String>, GeminiError> {
        if line.is_empty() {
            return Ok(self.data.take());
        }
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            let pending = self.data.as_ref().map_or(0, |d| d.len() + 1);
            if pending + value.len() > MAX_SSE_BUFFER_SIZE {
                self.data = None;
                return Err(frame_too_large());
            }
            match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_owned()),
            }
        }
        Ok(None)
    }
}

fn frame_too_large() -> GeminiError {
    GeminiError::invalid_response(format!("SSE frame exceeds {MAX_SSE_BUFFER_SIZE} bytes"))
}
