//! Control message attributes.
//!
//! Attributes are packed contiguously after the control header, each with
//! a 4-byte header:
//!
//! ```text
//! Offset | Size | Field
//! -------|------|---------------------------------
//! 0x00   | 1    | reserved (0)
//! 0x01   | 1    | attribute id
//! 0x02   | 2    | packet_length (u16 BE, incl. header)
//! 0x04   | N    | value
//! ```

use crate::error::FramingError;
use crate::proto::{ATTRIBUTE_HEADER_SIZE, AttribStatus, AttributeId};
use bytes::{Buf, BufMut};

/// Byte width of the nonce, cert hash and CMAC transport fields. SHA-1
/// output occupies the first 20 bytes and the remainder stays zero.
pub const BINDING_FIELD_LEN: usize = 32;

/// Value length of a CRYPTO_BINDING_REQ attribute.
pub const CRYPTO_BINDING_REQ_LEN: usize = 4 + BINDING_FIELD_LEN;

/// Value length of a CRYPTO_BINDING attribute.
pub const CRYPTO_BINDING_LEN: usize = 4 + 3 * BINDING_FIELD_LEN;

/// A raw attribute: id plus opaque value bytes.
///
/// Typed views ([`CryptoBindingReq`], [`StatusInfo`]) are parsed on
/// demand so that re-encoding a decoded attribute reproduces the wire
/// bytes exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub id: AttributeId,
    pub value: Vec<u8>,
}

impl Attribute {
    pub fn new(id: AttributeId, value: Vec<u8>) -> Self {
        Self { id, value }
    }

    /// ENCAPSULATED_PROTOCOL_ID attribute (the request we open with).
    pub fn encapsulated_protocol(protocol: u16) -> Self {
        Self::new(
            AttributeId::EncapsulatedProtocolId,
            protocol.to_be_bytes().to_vec(),
        )
    }

    /// CRYPTO_BINDING attribute for the CALL_CONNECTED message.
    pub fn crypto_binding(
        hash_bitmask: u8,
        nonce: &[u8; BINDING_FIELD_LEN],
        cert_hash: &[u8; BINDING_FIELD_LEN],
        cmac: &[u8; BINDING_FIELD_LEN],
    ) -> Self {
        let mut value = Vec::with_capacity(CRYPTO_BINDING_LEN);
        value.extend_from_slice(&[0, 0, 0, hash_bitmask]);
        value.extend_from_slice(nonce);
        value.extend_from_slice(cert_hash);
        value.extend_from_slice(cmac);
        Self::new(AttributeId::CryptoBinding, value)
    }

    /// Total on-wire length, header included.
    pub fn wire_len(&self) -> usize {
        ATTRIBUTE_HEADER_SIZE + self.value.len()
    }

    /// Append the attribute to an outgoing buffer.
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.put_u8(0);
        buf.put_u8(self.id.to_u8());
        buf.put_u16(self.wire_len() as u16);
        buf.extend_from_slice(&self.value);
    }

    /// Parse the value as a CRYPTO_BINDING_REQ.
    pub fn as_crypto_binding_req(&self) -> Result<CryptoBindingReq, FramingError> {
        if self.value.len() < CRYPTO_BINDING_REQ_LEN {
            return Err(FramingError::Truncated {
                needed: CRYPTO_BINDING_REQ_LEN,
                available: self.value.len(),
            });
        }
        let mut nonce = [0u8; BINDING_FIELD_LEN];
        nonce.copy_from_slice(&self.value[4..4 + BINDING_FIELD_LEN]);
        Ok(CryptoBindingReq {
            hash_bitmask: self.value[3],
            nonce,
        })
    }

    /// Parse the value as a STATUS_INFO.
    pub fn as_status_info(&self) -> Result<StatusInfo, FramingError> {
        if self.value.len() < 8 {
            return Err(FramingError::Truncated {
                needed: 8,
                available: self.value.len(),
            });
        }
        let mut buf = &self.value[3..];
        let attrib_id = buf.get_u8();
        let status = buf.get_u32();
        Ok(StatusInfo {
            attrib_id,
            status,
            value: buf.to_vec(),
        })
    }
}

/// CRYPTO_BINDING_REQ value: hash bitmask plus the server nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoBindingReq {
    pub hash_bitmask: u8,
    pub nonce: [u8; BINDING_FIELD_LEN],
}

/// STATUS_INFO value: the attribute being complained about, a status
/// code, and up to 64 bytes of the offending attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusInfo {
    pub attrib_id: u8,
    pub status: u32,
    pub value: Vec<u8>,
}

impl StatusInfo {
    pub fn status(&self) -> Option<AttribStatus> {
        AttribStatus::from_u32(self.status)
    }
}

/// Parse exactly `expected_count` attributes out of a control payload.
///
/// Fails on a truncated attribute header, on a `packet_length` that runs
/// past the payload (or cannot even cover its own header), and on an
/// attribute id above CRYPTO_BINDING_REQ. Trailing bytes after the last
/// attribute are ignored.
pub fn decode_attributes(
    mut payload: &[u8],
    expected_count: usize,
) -> Result<Vec<Attribute>, FramingError> {
    let mut attributes = Vec::with_capacity(expected_count);

    for index in 0..expected_count {
        if payload.len() < ATTRIBUTE_HEADER_SIZE {
            return Err(FramingError::TruncatedAttribute { index });
        }

        let id_byte = payload[1];
        let packet_length = u16::from_be_bytes([payload[2], payload[3]]) as usize;

        if packet_length < ATTRIBUTE_HEADER_SIZE || packet_length > payload.len() {
            return Err(FramingError::TruncatedAttribute { index });
        }

        let id = AttributeId::from_u8(id_byte)
            .ok_or(FramingError::UnknownAttributeId(id_byte))?;

        attributes.push(Attribute {
            id,
            value: payload[ATTRIBUTE_HEADER_SIZE..packet_length].to_vec(),
        });
        payload = &payload[packet_length..];
    }

    Ok(attributes)
}
