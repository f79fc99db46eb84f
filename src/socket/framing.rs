//! Wire framing for request/response messages.
//!
//! Three modes, selected per server:
//!
//! ```text
//! Unframed        one read() == one message          (no reassembly)
//! Json            {...}{...}  self-delimiting JSON   (reassembled across reads)
//! LengthPrefixed  [u32 LE length][payload]           (reassembled across reads)
//! ```
//!
//! `Unframed` reproduces the classic plugin protocol exactly, including its
//! limitation: a message larger than one read is split into several
//! undecodable pieces. `Json` accepts the same bytes from the same clients
//! but buffers until a complete JSON value is available.

use std::fmt;
use std::str::FromStr;

use serde::de::IgnoredAny;

use crate::error::FrameError;

/// Length prefix size for [`Framing::LengthPrefixed`].
const LENGTH_PREFIX: usize = 4;

/// How messages are delimited on the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    /// Each read is taken as exactly one message.
    Unframed,
    /// Each complete top-level JSON value is one message.
    #[default]
    Json,
    /// `[u32 LE length][payload]`.
    LengthPrefixed,
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unframed" | "raw" => Ok(Self::Unframed),
            "json" => Ok(Self::Json),
            "length-prefixed" | "length" | "lp" => Ok(Self::LengthPrefixed),
            other => Err(format!(
                "unknown framing '{other}' (expected unframed, json or length-prefixed)"
            )),
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unframed => write!(f, "unframed"),
            Self::Json => write!(f, "json"),
            Self::LengthPrefixed => write!(f, "length-prefixed"),
        }
    }
}

/// Frame one outbound message.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] if a length-prefixed payload does not fit
/// in a `u32`.
pub fn encode(framing: Framing, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    match framing {
        Framing::Unframed | Framing::Json => Ok(payload.to_vec()),
        Framing::LengthPrefixed => {
            let length = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
                size: payload.len(),
                max: u32::MAX as usize,
            })?;
            let mut buf = Vec::with_capacity(LENGTH_PREFIX + payload.len());
            buf.extend_from_slice(&length.to_le_bytes());
            buf.extend_from_slice(payload);
            Ok(buf)
        }
    }
}

/// Incremental decoder that turns reads into whole messages.
///
/// Feed bytes via [`FrameDecoder::feed`] and get back every message that is
/// now complete. Incomplete data stays buffered for the next call.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    max_message_size: usize,
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create a decoder with an empty buffer.
    pub fn new(framing: Framing, max_message_size: usize) -> Self {
        Self {
            framing,
            max_message_size,
            buf: Vec::new(),
        }
    }

    /// Framing mode of this decoder.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Feed bytes and extract all complete messages, in order.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLarge`] once a message is known to exceed the
    /// size limit. The stream cannot be resynchronized after that.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
        match self.framing {
            Framing::Unframed => {
                if bytes.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![bytes.to_vec()])
            }
            Framing::Json => {
                self.buf.extend_from_slice(bytes);
                self.drain_json()
            }
            Framing::LengthPrefixed => {
                self.buf.extend_from_slice(bytes);
                self.drain_length_prefixed()
            }
        }
    }

    /// Returns true if the decoder holds part of a message.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }

    fn drain_json(&mut self) -> Result<Vec<Vec<u8>>, FrameError> {
        let mut messages = Vec::new();

        loop {
            let start = self
                .buf
                .iter()
                .position(|b| !b.is_ascii_whitespace())
                .unwrap_or(self.buf.len());
            if start == self.buf.len() {
                // Only inter-message whitespace left
                self.buf.clear();
                break;
            }

            let (next, len) = next_json_value(&self.buf[start..]);
            match next {
                Some(Ok(())) => {
                    let end = start + len;
                    if self.has_trailing_garbage(end) {
                        // A value glued to non-JSON bytes is one malformed payload, not two
                        messages.push(self.buf[start..].to_vec());
                        self.buf.clear();
                        break;
                    }
                    if len > self.max_message_size {
                        return Err(self.too_large(len));
                    }
                    messages.push(self.buf[start..end].to_vec());
                    self.buf.drain(..end);
                }
                Some(Err(e)) if e.is_eof() => {
                    let pending = self.buf.len() - start;
                    if pending > self.max_message_size {
                        return Err(self.too_large(pending));
                    }
                    break; // Incomplete value, wait for more data
                }
                Some(Err(_)) => {
                    // Not JSON: no boundary to find, hand everything over as one message
                    messages.push(self.buf[start..].to_vec());
                    self.buf.clear();
                    break;
                }
                None => {
                    self.buf.clear();
                    break;
                }
            }
        }

        Ok(messages)
    }

    /// True if the bytes after `end` start with something that can never
    /// become a JSON value. An incomplete next value does not count.
    fn has_trailing_garbage(&self, end: usize) -> bool {
        let rest = &self.buf[end..];
        let Some(offset) = rest.iter().position(|b| !b.is_ascii_whitespace()) else {
            return false;
        };
        matches!(next_json_value(&rest[offset..]).0, Some(Err(e)) if !e.is_eof())
    }

    fn drain_length_prefixed(&mut self) -> Result<Vec<Vec<u8>>, FrameError> {
        let mut messages = Vec::new();

        loop {
            if self.buf.len() < LENGTH_PREFIX {
                break;
            }

            let length =
                u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
            if length > self.max_message_size {
                return Err(self.too_large(length));
            }

            let total = LENGTH_PREFIX + length;
            if self.buf.len() < total {
                break; // Incomplete frame, wait for more data
            }

            messages.push(self.buf[LENGTH_PREFIX..total].to_vec());
            self.buf.drain(..total);
        }

        Ok(messages)
    }

    fn too_large(&self, size: usize) -> FrameError {
        FrameError::TooLarge {
            size,
            max: self.max_message_size,
        }
    }
}

/// Parse the first JSON value in `bytes`, returning the outcome and the
/// number of bytes it spans.
fn next_json_value(bytes: &[u8]) -> (Option<serde_json::Result<()>>, usize) {
    let mut values = serde_json::Deserializer::from_slice(bytes).into_iter::<IgnoredAny>();
    let next = values.next().map(|value| value.map(|_| ()));
    (next, values.byte_offset())
}
