//! Incremental decoding of `text/event-stream` chat-completion replies.
//!
//! Bytes arrive in arbitrary chunks. Only complete lines are interpreted; a partial line stays
//! buffered until the rest of it arrives. Lines carrying `data: ` hold one JSON chunk each and
//! `data: [DONE]` ends the reply. Blank lines, comments and other fields are ignored.

use tracing::warn;

use super::utils::{stream_chunk_fragments, StreamChunk};

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment(String),
    Done,
}

#[derive(Debug, Default)]
pub struct EventStreamParser {
    buffer: Vec<u8>,
    done: bool,
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the end marker has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one read worth of bytes, returning the events completed by it
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.buffer.extend_from_slice(bytes);

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if self.interpret(&line, &mut events) {
                self.buffer.clear();
                break;
            }
        }
        events
    }

    /// Interpret whatever remains once the body has ended without a trailing newline
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done || self.buffer.is_empty() {
            return events;
        }
        let line = std::mem::take(&mut self.buffer);
        self.interpret(&line, &mut events);
        events
    }

    /// Returns true when the line ends the stream
    fn interpret(&mut self, raw: &[u8], events: &mut Vec<StreamEvent>) -> bool {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();

        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return false;
        };
        let payload = payload.trim_start();

        if payload == DONE_MARKER {
            self.done = true;
            events.push(StreamEvent::Done);
            return true;
        }
        if payload.is_empty() {
            return false;
        }

        match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => {
                events.extend(
                    stream_chunk_fragments(chunk)
                        .into_iter()
                        .map(StreamEvent::Fragment),
                );
            }
            Err(e) => warn!(error = %e, "Skipping malformed stream event"),
        }
        false
    }
}
