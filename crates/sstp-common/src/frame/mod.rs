//! SSTP frame codec.
//!
//! Every SSTP packet shares a fixed 4-byte header:
//!
//! ```text
//! ┌──────────┬───────────┬──────────────────┬─────────┐
//! │ Version  │ Type      │ Length (u16 BE)  │ Payload │
//! │ 0x10     │ 0x00/0x01 │ total frame len  │ N bytes │
//! └──────────┴───────────┴──────────────────┴─────────┘
//! ```
//!
//! Data frames carry raw PPP bytes. Control frames carry a 4-byte control
//! header (message type, attribute count, both u16 BE) followed by packed
//! attributes. All integers are network order on the wire; nonce, cert
//! hash and CMAC fields are opaque byte blobs and are never swapped.

pub mod attribute;

use crate::error::FramingError;
use crate::proto::{
    CONTROL_HEADER_SIZE, MessageType, PacketType, SSTP_HEADER_SIZE, SSTP_VERSION,
};
use attribute::Attribute;
use bytes::{Buf, BufMut};

/// A decoded SSTP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Data frame: the payload is a raw PPP frame.
    Data(Vec<u8>),
    /// Control frame: a protocol message with its attributes.
    Control(ControlFrame),
}

/// Control frame body.
///
/// The message type is kept as its wire value; whether the value names a
/// message the client can act on is the dispatcher's decision, not the
/// codec's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    pub message_type: u16,
    pub attributes: Vec<Attribute>,
}

impl ControlFrame {
    /// Build a control frame for a known message type.
    pub fn new(message_type: MessageType, attributes: Vec<Attribute>) -> Self {
        Self {
            message_type: message_type.to_u16(),
            attributes,
        }
    }
}

impl Frame {
    /// Wrap raw PPP bytes in a Data frame.
    pub fn data(payload: impl Into<Vec<u8>>) -> Self {
        Frame::Data(payload.into())
    }

    /// Build a control frame.
    pub fn control(message_type: MessageType, attributes: Vec<Attribute>) -> Self {
        Frame::Control(ControlFrame::new(message_type, attributes))
    }

    /// Serialize the frame, filling in the header length.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Frame::Data(payload) => {
                let total = SSTP_HEADER_SIZE + payload.len();
                let mut buf = Vec::with_capacity(total);
                buf.put_u8(SSTP_VERSION);
                buf.put_u8(PacketType::Data as u8);
                buf.put_u16(total as u16);
                buf.extend_from_slice(payload);
                buf
            }
            Frame::Control(control) => {
                let attrs_len: usize =
                    control.attributes.iter().map(Attribute::wire_len).sum();
                let total = SSTP_HEADER_SIZE + CONTROL_HEADER_SIZE + attrs_len;
                let mut buf = Vec::with_capacity(total);
                buf.put_u8(SSTP_VERSION);
                buf.put_u8(PacketType::Control as u8);
                buf.put_u16(total as u16);
                buf.put_u16(control.message_type);
                buf.put_u16(control.attributes.len() as u16);
                for attr in &control.attributes {
                    attr.write(&mut buf);
                }
                buf
            }
        }
    }

    /// Parse a single frame occupying exactly `data`.
    ///
    /// A [`FramingError::LengthMismatch`] marks a frame the caller should
    /// drop; every other error tears the session down.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FramingError> {
        if data.len() < SSTP_HEADER_SIZE {
            return Err(FramingError::Truncated {
                needed: SSTP_HEADER_SIZE,
                available: data.len(),
            });
        }

        let mut buf = data;
        let version = buf.get_u8();
        if version != SSTP_VERSION {
            return Err(FramingError::InvalidVersion(version));
        }

        let packet_type = buf.get_u8();
        if packet_type != PacketType::Data as u8 && packet_type != PacketType::Control as u8 {
            return Err(FramingError::InvalidType(packet_type));
        }

        let announced = buf.get_u16() as usize;
        if announced != data.len() {
            return Err(FramingError::LengthMismatch {
                announced,
                received: data.len(),
            });
        }

        let payload = &data[SSTP_HEADER_SIZE..];
        if packet_type == PacketType::Data as u8 {
            return Ok(Frame::Data(payload.to_vec()));
        }

        if payload.len() < CONTROL_HEADER_SIZE {
            return Err(FramingError::Truncated {
                needed: CONTROL_HEADER_SIZE,
                available: payload.len(),
            });
        }

        let mut control = payload;
        let message_type = control.get_u16();
        let num_attributes = control.get_u16();
        let attributes = attribute::decode_attributes(control, num_attributes as usize)?;

        Ok(Frame::Control(ControlFrame {
            message_type,
            attributes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{AttributeId, ENCAPSULATED_PROTOCOL_PPP};

    #[test]
    fn test_connect_request_encoding() {
        // CALL_CONNECT_REQUEST with one ENCAPSULATED_PROTOCOL_ID attribute:
        // 4 header + 4 control + 6 attribute = 14 bytes.
        let attr = Attribute::encapsulated_protocol(ENCAPSULATED_PROTOCOL_PPP);
        let frame = Frame::control(MessageType::CallConnectRequest, vec![attr]);

        let bytes = frame.to_bytes();
        assert_eq!(bytes, hex::decode("1001000a00010001000100060001").unwrap());
    }

    #[test]
    fn test_echo_response_encoding() {
        let frame = Frame::control(MessageType::EchoResponse, Vec::new());
        assert_eq!(frame.to_bytes(), hex::decode("1001000800090000").unwrap());
    }

    #[test]
    fn test_frame_roundtrip() {
        let attr = Attribute::encapsulated_protocol(ENCAPSULATED_PROTOCOL_PPP);
        let frame = Frame::control(MessageType::CallConnectRequest, vec![attr]);

        let bytes = frame.to_bytes();
        let parsed = Frame::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn test_data_frame_roundtrip() {
        let payload = vec![0xc2, 0x23, 0x01, 0x00, 0x00, 0x08];
        let frame = Frame::data(payload.clone());

        let bytes = frame.to_bytes();
        assert_eq!(&bytes[..4], &[0x10, 0x00, 0x00, 0x0a]);

        match Frame::from_bytes(&bytes).unwrap() {
            Frame::Data(p) => assert_eq!(p, payload),
            other => panic!("expected data frame, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_version() {
        let result = Frame::from_bytes(&hex::decode("11000004").unwrap());
        assert_eq!(result, Err(FramingError::InvalidVersion(0x11)));
    }

    #[test]
    fn test_invalid_type() {
        let result = Frame::from_bytes(&hex::decode("10020004").unwrap());
        assert_eq!(result, Err(FramingError::InvalidType(0x02)));
    }

    #[test]
    fn test_length_mismatch_is_reported_as_drop() {
        // Header claims 16 bytes, only 8 delivered.
        let result = Frame::from_bytes(&hex::decode("10000010aabbccdd").unwrap());
        assert_eq!(
            result,
            Err(FramingError::LengthMismatch {
                announced: 16,
                received: 8
            })
        );
    }

    #[test]
    fn test_control_frame_with_unknown_message_type_decodes() {
        // The codec is structural; 0x00ff is for the dispatcher to reject.
        let bytes = hex::decode("1001000800ff0000").unwrap();
        match Frame::from_bytes(&bytes).unwrap() {
            Frame::Control(control) => {
                assert_eq!(control.message_type, 0x00ff);
                assert!(control.attributes.is_empty());
            }
            other => panic!("expected control frame, got {other:?}"),
        }
    }

    #[test]
    fn test_attribute_lengths_cover_control_payload() {
        let attrs = vec![
            Attribute::encapsulated_protocol(ENCAPSULATED_PROTOCOL_PPP),
            Attribute::new(AttributeId::NoError, Vec::new()),
        ];
        let frame = Frame::control(MessageType::CallConnectRequest, attrs);
        let bytes = frame.to_bytes();

        let control_payload = bytes.len() - SSTP_HEADER_SIZE - CONTROL_HEADER_SIZE;
        match Frame::from_bytes(&bytes).unwrap() {
            Frame::Control(control) => {
                let sum: usize = control.attributes.iter().map(Attribute::wire_len).sum();
                assert_eq!(sum, control_payload);
            }
            other => panic!("expected control frame, got {other:?}"),
        }
    }
}
