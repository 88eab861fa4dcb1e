//! Scripted in-memory transport
//!
//! [`MockTransport`] stands in for a serial port when exercising the command
//! engine and pump state machines without hardware. Replies are queued in
//! order; every `send()` moves the next queued reply into the read buffer.
//! A queued reply may optionally pin the exact frame it answers.
//!
//! ```
//! use pumpchain_core::protocol::{Chain, MockTransport};
//!
//! let mut mock = MockTransport::new();
//! mock.expect(b"01VER\r", b"\r\n33 V1.0\r\n01:");
//! let chain = Chain::new(mock).unwrap();
//! assert!(!chain.exchange(b"01VER\r", 80).unwrap().is_empty());
//! ```

use std::collections::VecDeque;

use super::transport::Transport;
use super::{PumpError, Result};

#[derive(Debug, Clone)]
struct Scripted {
    request: Option<Vec<u8>>,
    reply: Vec<u8>,
}

/// A [`Transport`] that replays canned replies
#[derive(Debug, Default)]
pub struct MockTransport {
    script: VecDeque<Scripted>,
    pending: Vec<u8>,
    sent: Vec<Vec<u8>>,
    clears: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next frame, whatever it is
    pub fn push_reply(&mut self, reply: &[u8]) {
        self.script.push_back(Scripted {
            request: None,
            reply: reply.to_vec(),
        });
    }

    /// Queue a reply that is only valid for exactly `request`
    pub fn expect(&mut self, request: &[u8], reply: &[u8]) {
        self.script.push_back(Scripted {
            request: Some(request.to_vec()),
            reply: reply.to_vec(),
        });
    }

    /// Queue a silent exchange (the pump does not answer)
    pub fn push_silence(&mut self) {
        self.push_reply(b"");
    }

    /// Every frame written so far, in order
    pub fn sent_frames(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Frames written so far, decoded as text without the terminator
    pub fn sent_instructions(&self) -> Vec<String> {
        self.sent
            .iter()
            .map(|f| String::from_utf8_lossy(f).trim_end_matches('\r').to_string())
            .collect()
    }

    /// Replies still queued
    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    /// How many times the buffers were flushed
    pub fn clear_count(&self) -> usize {
        self.clears
    }
}

impl Transport for MockTransport {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.sent.push(frame.to_vec());
        self.pending.clear();

        if let Some(next) = self.script.pop_front() {
            if let Some(request) = &next.request {
                if request.as_slice() != frame {
                    return Err(PumpError::Serial(format!(
                        "mock expected {:?}, got {:?}",
                        String::from_utf8_lossy(request),
                        String::from_utf8_lossy(frame)
                    )));
                }
            }
            self.pending = next.reply;
        }
        Ok(())
    }

    fn receive(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let n = max_bytes.min(self.pending.len());
        Ok(self.pending.drain(..n).collect())
    }

    fn clear(&mut self) -> Result<()> {
        self.clears += 1;
        self.pending.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unscripted_send_is_silent() {
        let mut mock = MockTransport::new();
        mock.send(b"01RUN\r").unwrap();
        assert!(mock.receive(80).unwrap().is_empty());
    }

    #[test]
    fn test_expectation_mismatch_fails_send() {
        let mut mock = MockTransport::new();
        mock.expect(b"01RUN\r", b"\r\n\r\n01>");
        assert!(mock.send(b"01STP\r").is_err());
        assert_eq!(mock.sent_instructions(), vec!["01STP".to_string()]);
    }

    #[test]
    fn test_remaining_counts_down() {
        let mut mock = MockTransport::new();
        mock.push_reply(b"a");
        mock.push_silence();
        assert_eq!(mock.remaining(), 2);
        mock.send(b"x").unwrap();
        assert_eq!(mock.remaining(), 1);
    }
}
