//! Line framing for stream transports

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{parse_operation, MAX_MESSAGE_SIZE};
use bytes::BytesMut;
use seqsync_core::Operation;

/// Newline-delimited message parser.
///
/// Bytes are fed as they arrive; every complete line is decoded as one wire
/// message. Blank lines are skipped.
pub struct LineParser {
    buffer: BytesMut,
    /// Length of the unterminated line at the end of `buffer`
    tail: usize,
    /// Skipping the rest of an oversized line
    discarding: bool,
}

impl LineParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            tail: 0,
            discarding: false,
        }
    }

    /// Add data to the parser buffer.
    ///
    /// Only the unterminated line is held to `MAX_MESSAGE_SIZE`. When it
    /// grows past the limit it is dropped, complete lines before it stay
    /// parseable, and input is skipped up to the next newline.
    pub fn feed(&mut self, mut data: &[u8]) -> ProtocolResult<()> {
        if self.discarding {
            match data.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.discarding = false;
                    data = &data[pos + 1..];
                }
                None => return Ok(()),
            }
        }

        let tail = match data.iter().rposition(|&b| b == b'\n') {
            Some(pos) => data.len() - pos - 1,
            None => self.tail + data.len(),
        };

        if tail > MAX_MESSAGE_SIZE {
            // Keep everything up to the last newline, drop the oversized line
            let keep = match data.iter().rposition(|&b| b == b'\n') {
                Some(pos) => {
                    self.buffer.extend_from_slice(&data[..=pos]);
                    self.buffer.len()
                }
                None => self.buffer.len() - self.tail,
            };
            self.buffer.truncate(keep);
            self.tail = 0;
            self.discarding = true;
            return Err(ProtocolError::MessageTooLarge {
                size: tail,
                max: MAX_MESSAGE_SIZE,
            });
        }

        self.buffer.extend_from_slice(data);
        self.tail = tail;
        Ok(())
    }

    /// Take the next complete line out of the buffer, without its line ending
    pub fn next_line(&mut self) -> Option<BytesMut> {
        loop {
            let line_end = self.buffer.iter().position(|&b| b == b'\n')?;

            let mut line = self.buffer.split_to(line_end + 1);
            line.truncate(line_end);
            if line.last() == Some(&b'\r') {
                line.truncate(line_end - 1);
            }

            if !line.iter().all(u8::is_ascii_whitespace) {
                return Some(line);
            }
        }
    }

    /// Try to parse a complete operation from the buffer.
    ///
    /// `Ok(None)` means more data is needed. A malformed line is consumed
    /// and reported, the following lines stay parseable.
    pub fn parse(&mut self) -> ProtocolResult<Option<Operation>> {
        match self.next_line() {
            Some(line) => parse_operation(&line).map(Some),
            None => Ok(None),
        }
    }

    /// Bytes buffered and not yet taken out as lines
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}
