//! SSTP protocol constants and enumerations.
//!
//! Values follow MS-SSTP: control message types, attribute ids, status
//! codes carried by STATUS_INFO attributes, and the certificate hash
//! protocol bitmask.

use crate::error::ProtocolError;

/// Protocol version byte carried by every SSTP header (major 1, minor 0).
pub const SSTP_VERSION: u8 = 0x10;

/// Size of the fixed SSTP header in bytes.
pub const SSTP_HEADER_SIZE: usize = 4;

/// Size of the control header (message type + attribute count).
pub const CONTROL_HEADER_SIZE: usize = 4;

/// Size of an attribute header (reserved + id + length).
pub const ATTRIBUTE_HEADER_SIZE: usize = 4;

/// The only protocol SSTP encapsulates on this client.
pub const ENCAPSULATED_PROTOCOL_PPP: u16 = 0x0001;

/// Seconds allowed for the server to answer a CALL_CONNECT_REQUEST.
pub const NEGOTIATION_TIMER_SECS: u64 = 60;

/// Seconds allowed for the server to answer an ECHO_REQUEST.
pub const HELLO_TIMER_SECS: u64 = 60;

/// Total CALL_CONNECT_REQUEST attempts allowed on one session.
pub const MAX_CONNECT_ATTEMPTS: u8 = 5;

/// SSTP packet types, second byte of the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Data = 0x00,
    Control = 0x01,
}

/// SSTP control message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    CallConnectRequest = 0x0001,
    CallConnectAck = 0x0002,
    CallConnectNak = 0x0003,
    CallConnected = 0x0004,
    CallAbort = 0x0005,
    CallDisconnect = 0x0006,
    CallDisconnectAck = 0x0007,
    EchoRequest = 0x0008,
    EchoResponse = 0x0009,
}

impl MessageType {
    /// Convert a wire value to a MessageType.
    pub fn from_u16(value: u16) -> Result<Self, ProtocolError> {
        match value {
            0x0001 => Ok(Self::CallConnectRequest),
            0x0002 => Ok(Self::CallConnectAck),
            0x0003 => Ok(Self::CallConnectNak),
            0x0004 => Ok(Self::CallConnected),
            0x0005 => Ok(Self::CallAbort),
            0x0006 => Ok(Self::CallDisconnect),
            0x0007 => Ok(Self::CallDisconnectAck),
            0x0008 => Ok(Self::EchoRequest),
            0x0009 => Ok(Self::EchoResponse),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }

    /// Convert MessageType to its wire value.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Message name for logging.
    pub fn name(self) -> &'static str {
        match self {
            Self::CallConnectRequest => "CALL_CONNECT_REQUEST",
            Self::CallConnectAck => "CALL_CONNECT_ACK",
            Self::CallConnectNak => "CALL_CONNECT_NAK",
            Self::CallConnected => "CALL_CONNECTED",
            Self::CallAbort => "CALL_ABORT",
            Self::CallDisconnect => "CALL_DISCONNECT",
            Self::CallDisconnectAck => "CALL_DISCONNECT_ACK",
            Self::EchoRequest => "ECHO_REQUEST",
            Self::EchoResponse => "ECHO_RESPONSE",
        }
    }
}

/// Attribute ids carried inside control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttributeId {
    NoError = 0x00,
    EncapsulatedProtocolId = 0x01,
    StatusInfo = 0x02,
    CryptoBinding = 0x03,
    CryptoBindingReq = 0x04,
}

impl AttributeId {
    /// Highest id the protocol defines; anything above is a decode error.
    pub const MAX: u8 = AttributeId::CryptoBindingReq as u8;

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::NoError),
            0x01 => Some(Self::EncapsulatedProtocolId),
            0x02 => Some(Self::StatusInfo),
            0x03 => Some(Self::CryptoBinding),
            0x04 => Some(Self::CryptoBindingReq),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NoError => "NO_ERROR",
            Self::EncapsulatedProtocolId => "ENCAPSULATED_PROTOCOL_ID",
            Self::StatusInfo => "STATUS_INFO",
            Self::CryptoBinding => "CRYPTO_BINDING",
            Self::CryptoBindingReq => "CRYPTO_BINDING_REQ",
        }
    }
}

/// Status codes carried by a STATUS_INFO attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AttribStatus {
    NoError = 0x00000000,
    DuplicateAttribute = 0x00000001,
    UnrecognizedAttribute = 0x00000002,
    InvalidAttribValueLength = 0x00000003,
    ValueNotSupported = 0x00000004,
    UnacceptedFrameReceived = 0x00000005,
    RetryCountExceeded = 0x00000006,
    InvalidFrameReceived = 0x00000007,
    NegotiationTimeout = 0x00000008,
    AttribNotSupportedInMsg = 0x00000009,
    RequiredAttributeMissing = 0x0000000a,
    StatusInfoNotSupportedInMsg = 0x0000000b,
}

impl AttribStatus {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x00 => Some(Self::NoError),
            0x01 => Some(Self::DuplicateAttribute),
            0x02 => Some(Self::UnrecognizedAttribute),
            0x03 => Some(Self::InvalidAttribValueLength),
            0x04 => Some(Self::ValueNotSupported),
            0x05 => Some(Self::UnacceptedFrameReceived),
            0x06 => Some(Self::RetryCountExceeded),
            0x07 => Some(Self::InvalidFrameReceived),
            0x08 => Some(Self::NegotiationTimeout),
            0x09 => Some(Self::AttribNotSupportedInMsg),
            0x0a => Some(Self::RequiredAttributeMissing),
            0x0b => Some(Self::StatusInfoNotSupportedInMsg),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for value in 1u16..=9 {
            let msg = MessageType::from_u16(value).unwrap();
            assert_eq!(msg.to_u16(), value);
        }
    }

    #[test]
    fn test_message_type_out_of_range() {
        assert_eq!(
            MessageType::from_u16(0),
            Err(ProtocolError::UnknownMessageType(0))
        );
        assert_eq!(
            MessageType::from_u16(0x000a),
            Err(ProtocolError::UnknownMessageType(0x000a))
        );
    }

    #[test]
    fn test_attribute_id_bounds() {
        assert_eq!(AttributeId::from_u8(0x04), Some(AttributeId::CryptoBindingReq));
        assert_eq!(AttributeId::from_u8(0x05), None);
        assert_eq!(AttributeId::MAX, 0x04);
    }
}
