//! Length-prefixed stream framing
//!
//! Both radio families speak a byte stream in which each frame starts with
//! a marker followed by a two-byte payload length:
//!
//! - Protocol A: `0x94 0xC3`, big-endian length, same marker both ways
//! - Protocol B: `>` from the radio, `<` to the radio, little-endian length
//!
//! The framer only splits the stream. Payload decoding belongs to the
//! [`crate::PacketDecoder`].

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::config::FramingPreset;
use crate::error::{LinkError, Result};

/// Byte order of the length field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthEndian {
    /// Most significant byte first
    Big,
    /// Least significant byte first
    Little,
}

/// Splits a byte stream into marker + length prefixed frames
#[derive(Debug, Clone)]
pub struct LengthPrefixFramer {
    inbound_marker: &'static [u8],
    outbound_marker: &'static [u8],
    endian: LengthEndian,
    max_frame: usize,
    buffer: BytesMut,
}

impl LengthPrefixFramer {
    /// Create a framer
    pub fn new(
        inbound_marker: &'static [u8],
        outbound_marker: &'static [u8],
        endian: LengthEndian,
        max_frame: usize,
    ) -> Self {
        Self {
            inbound_marker,
            outbound_marker,
            endian,
            max_frame,
            buffer: BytesMut::with_capacity(max_frame * 2),
        }
    }

    /// Framing used by Protocol A radios
    pub fn protocol_a() -> Self {
        Self::new(&[0x94, 0xC3], &[0x94, 0xC3], LengthEndian::Big, 512)
    }

    /// Framing used by Protocol B radios
    pub fn protocol_b() -> Self {
        Self::new(b">", b"<", LengthEndian::Little, 300)
    }

    /// Framer for a configured preset
    pub fn from_preset(preset: FramingPreset) -> Self {
        match preset {
            FramingPreset::ProtocolA => Self::protocol_a(),
            FramingPreset::ProtocolB => Self::protocol_b(),
        }
    }

    fn header_len(&self) -> usize {
        self.inbound_marker.len() + 2
    }

    /// Append bytes read from the stream
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Try to take one complete frame payload out of the buffer
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let header = self.header_len();
        if self.buffer.len() < header {
            return Ok(None);
        }

        if !self.buffer.starts_with(self.inbound_marker) {
            match self.find_marker() {
                Some(pos) => {
                    warn!(discarded = pos, "Discarding bytes before frame marker");
                    self.buffer.advance(pos);
                }
                None => {
                    // Keep a trailing partial marker
                    let keep = self.partial_marker_suffix();
                    let discard = self.buffer.len() - keep;
                    if discard > 0 {
                        warn!(discarded = discard, "Discarding buffer without frame marker");
                        self.buffer.advance(discard);
                    }
                    return Ok(None);
                }
            }

            if self.buffer.len() < header {
                return Ok(None);
            }
        }

        let marker_len = self.inbound_marker.len();
        let len_bytes = [self.buffer[marker_len], self.buffer[marker_len + 1]];
        let length = match self.endian {
            LengthEndian::Big => u16::from_be_bytes(len_bytes),
            LengthEndian::Little => u16::from_le_bytes(len_bytes),
        } as usize;

        if length > self.max_frame {
            warn!(length, "Frame length too large, likely corrupt");
            // Skip this marker and resync on the next one
            self.buffer.advance(marker_len);
            return Err(LinkError::InvalidFrame(format!(
                "Frame length {} exceeds maximum {}",
                length, self.max_frame
            )));
        }

        let total = header + length;
        if self.buffer.len() < total {
            trace!(have = self.buffer.len(), need = total, "Waiting for complete frame");
            return Ok(None);
        }

        let mut frame = self.buffer.split_to(total);
        frame.advance(header);
        debug!(size = frame.len(), "Received complete frame");
        Ok(Some(frame.freeze()))
    }

    /// Wrap a payload with the outbound marker and length
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() > self.max_frame || payload.len() > u16::MAX as usize {
            return Err(LinkError::InvalidFrame(format!(
                "Payload of {} bytes exceeds maximum {}",
                payload.len(),
                self.max_frame
            )));
        }
        let length = payload.len() as u16;
        let mut frame = Vec::with_capacity(self.outbound_marker.len() + 2 + payload.len());
        frame.extend_from_slice(self.outbound_marker);
        match self.endian {
            LengthEndian::Big => frame.extend_from_slice(&length.to_be_bytes()),
            LengthEndian::Little => frame.extend_from_slice(&length.to_le_bytes()),
        }
        frame.extend_from_slice(payload);
        Ok(frame)
    }

    fn find_marker(&self) -> Option<usize> {
        self.buffer
            .windows(self.inbound_marker.len())
            .position(|window| window == self.inbound_marker)
    }

    fn partial_marker_suffix(&self) -> usize {
        let marker = self.inbound_marker;
        (1..marker.len())
            .rev()
            .find(|&n| self.buffer.ends_with(&marker[..n]))
            .unwrap_or(0)
    }
}
