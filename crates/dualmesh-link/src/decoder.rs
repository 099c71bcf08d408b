//! Packet decoder seam
//!
//! Radio protocol decoding (protobuf schemas, channel crypto, CRC) is done
//! by an external library. The bridge only sees it through
//! [`PacketDecoder`], which turns one frame into one [`Packet`] and one
//! [`OutboundMessage`] into one frame.
//!
//! [`CompactCodec`] is the decoder for the compact envelope produced by a
//! protocol sidecar that has already done the radio-level work:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | sender (u32, big-endian) |
//! | 4 | 4 | destination (u32, big-endian) |
//! | 8 | 4 | packet id (u32, big-endian) |
//! | 12 | 1 | port |
//! | 13 | 1 | channel |
//! | 14.. | n | payload (UTF-8 text or CBOR) |

use bytes::{BufMut, Bytes, BytesMut};
use dualmesh_core::{
    DeviceTelemetry, NeighborInfo, NetworkSource, NodeId, NodeInfo, OutboundMessage, Packet,
    Payload, Position,
};
use tracing::trace;

use crate::config::LORA_MAX_PAYLOAD;
use crate::error::DecodeError;

/// Fixed header length of the compact envelope
pub const COMPACT_HEADER_LEN: usize = 14;

const PORT_TEXT: u8 = 1;
const PORT_POSITION: u8 = 3;
const PORT_NODEINFO: u8 = 4;
const PORT_TELEMETRY: u8 = 67;
const PORT_NEIGHBORINFO: u8 = 71;

/// Turns radio frames into packets and outbound messages into frames
pub trait PacketDecoder: Send + Sync {
    /// Decode one frame received on `network`
    ///
    /// Returns `Ok(None)` for frames that carry no mesh packet (radio
    /// status, config replies, acknowledgements).
    fn decode(&self, frame: &[u8], network: NetworkSource)
        -> Result<Option<Packet>, DecodeError>;

    /// Encode an outbound text message
    fn encode(&self, message: &OutboundMessage, packet_id: u32) -> Result<Bytes, DecodeError>;
}

/// Decoder for the compact sidecar envelope
#[derive(Debug, Clone, Default)]
pub struct CompactCodec {
    max_payload: usize,
}

impl CompactCodec {
    /// Create a codec enforcing the LoRa payload limit
    pub fn new() -> Self {
        Self {
            max_payload: LORA_MAX_PAYLOAD,
        }
    }

    fn decode_payload(port: u8, body: &[u8]) -> Result<Payload, DecodeError> {
        let cbor_err = |e: serde_cbor::Error| DecodeError::Payload(e.to_string());
        Ok(match port {
            PORT_TEXT => {
                let text = std::str::from_utf8(body).map_err(|_| DecodeError::InvalidUtf8)?;
                Payload::Text(text.to_string())
            }
            PORT_POSITION => Payload::Position(
                serde_cbor::from_slice::<Position>(body).map_err(cbor_err)?,
            ),
            PORT_NODEINFO => Payload::NodeInfo(
                serde_cbor::from_slice::<NodeInfo>(body).map_err(cbor_err)?,
            ),
            PORT_TELEMETRY => Payload::Telemetry(
                serde_cbor::from_slice::<DeviceTelemetry>(body).map_err(cbor_err)?,
            ),
            PORT_NEIGHBORINFO => Payload::NeighborInfo(
                serde_cbor::from_slice::<NeighborInfo>(body).map_err(cbor_err)?,
            ),
            other => Payload::Unknown {
                port: other as u32,
                data: body.to_vec(),
            },
        })
    }

    /// Port number used on the air for a payload
    pub fn port_for(payload: &Payload) -> u8 {
        match payload {
            Payload::Text(_) => PORT_TEXT,
            Payload::Position(_) => PORT_POSITION,
            Payload::NodeInfo(_) => PORT_NODEINFO,
            Payload::Telemetry(_) => PORT_TELEMETRY,
            Payload::NeighborInfo(_) => PORT_NEIGHBORINFO,
            Payload::Unknown { port, .. } => (*port).min(u8::MAX as u32) as u8,
        }
    }

    /// Build a compact envelope for an arbitrary payload
    pub fn encode_envelope(
        sender: NodeId,
        destination: NodeId,
        packet_id: u32,
        channel: u8,
        payload: &Payload,
    ) -> Bytes {
        let body = payload.canonical_bytes();
        let mut buf = BytesMut::with_capacity(COMPACT_HEADER_LEN + body.len());
        buf.put_u32(sender.as_u32());
        buf.put_u32(destination.as_u32());
        buf.put_u32(packet_id);
        buf.put_u8(Self::port_for(payload));
        buf.put_u8(channel);
        buf.put_slice(&body);
        buf.freeze()
    }
}

impl PacketDecoder for CompactCodec {
    fn decode(
        &self,
        frame: &[u8],
        network: NetworkSource,
    ) -> Result<Option<Packet>, DecodeError> {
        if frame.len() < COMPACT_HEADER_LEN {
            return Err(DecodeError::TooShort { len: frame.len() });
        }

        let read_u32 = |at: usize| {
            u32::from_be_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]])
        };
        let sender = NodeId(read_u32(0));
        let destination = NodeId(read_u32(4));
        let packet_id = read_u32(8);
        let port = frame[12];
        let channel = frame[13];

        // Port 0 carries radio status frames, not mesh traffic
        if port == 0 {
            trace!(%network, "Skipping radio status frame");
            return Ok(None);
        }

        let payload = Self::decode_payload(port, &frame[COMPACT_HEADER_LEN..])?;
        Ok(Some(
            Packet::new(network, sender, destination, packet_id, payload).with_channel(channel),
        ))
    }

    fn encode(&self, message: &OutboundMessage, packet_id: u32) -> Result<Bytes, DecodeError> {
        let size = message.text.len();
        let max = if self.max_payload == 0 {
            LORA_MAX_PAYLOAD
        } else {
            self.max_payload
        };
        if size > max {
            return Err(DecodeError::TooLarge { size, max });
        }
        Ok(Self::encode_envelope(
            message.from,
            message.destination,
            packet_id,
            message.channel,
            &message.payload(),
        ))
    }
}
