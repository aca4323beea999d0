//! Error taxonomy for the SSTP client core.
//!
//! Every variant here terminates the session, with one exception:
//! [`FramingError::LengthMismatch`] marks a frame that must be dropped
//! while the session keeps running. Some deployed servers emit a first
//! PPP data frame whose SSTP header length does not match the bytes
//! actually delivered, so a mismatch cannot be treated as fatal.

use thiserror::Error;

/// Frame-level decode failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Header version byte was not 0x10.
    #[error("invalid SSTP version {0:#04x}")]
    InvalidVersion(u8),

    /// Header type byte was neither Data (0x00) nor Control (0x01).
    #[error("invalid SSTP packet type {0:#04x}")]
    InvalidType(u8),

    /// Header length field disagrees with the bytes on the wire.
    /// Recoverable: the frame is dropped, the session continues.
    #[error("frame length field says {announced} bytes, received {received}")]
    LengthMismatch { announced: usize, received: usize },

    /// Frame or control payload shorter than its fixed header.
    #[error("frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// Attribute header incomplete or its length runs past the payload.
    #[error("attribute {index} truncated or overruns control payload")]
    TruncatedAttribute { index: usize },

    /// Attribute id above the highest the protocol defines.
    #[error("unknown attribute id {0:#04x}")]
    UnknownAttributeId(u8),
}

/// Violations of the control-channel state machine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A message the client must never receive (e.g. CALL_CONNECT_REQUEST).
    #[error("server sent {0}, which a client never accepts")]
    UnexpectedMessage(&'static str),

    /// A defined message arriving in a state with no transition for it.
    #[error("{message} is not valid in state {state}")]
    WrongStateForMessage {
        message: &'static str,
        state: &'static str,
    },

    /// Control header message type outside the defined range.
    #[error("unknown control message type {0:#06x}")]
    UnknownMessageType(u16),

    /// An attribute only a server would act on.
    #[error("attribute {0} is not handled on the client side")]
    UnexpectedAttribute(&'static str),

    /// Connect retry budget exhausted by repeated CALL_CONNECT_NAKs.
    #[error("connect retry budget exhausted")]
    RetriesExhausted,
}

/// Failures inside the crypto-binding derivation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Hash bitmask advertised neither SHA-1 nor SHA-256.
    #[error("unsupported certificate hash bitmask {0:#04x}")]
    UnsupportedHash(u8),

    /// The TLS collaborator could not hand over the peer certificate.
    #[error("peer certificate not available in DER form")]
    CertExportFailed,

    /// The HMAC backend rejected the keying material.
    #[error("HMAC computation failed")]
    HmacFailed,

    /// CMAC requested before a PPP-CHAP response was observed.
    #[error("no CHAP response captured before CHAP success")]
    MissingChapResponse,
}

/// The one-shot timers the state machine arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Covers the window between CALL_CONNECT_REQUEST and the binding request.
    Negotiation,
    /// Covers the window between ECHO_REQUEST and its ECHO_RESPONSE.
    Hello,
}

impl std::fmt::Display for TimerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerKind::Negotiation => write!(f, "negotiation"),
            TimerKind::Hello => write!(f, "hello"),
        }
    }
}

/// Top-level session failure, as reported to the binary.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("framing: {0}")]
    Framing(#[from] FramingError),

    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("crypto binding: {0}")]
    Crypto(#[from] CryptoError),

    #[error("{0} timer expired")]
    TimerExpired(TimerKind),

    #[error("server aborted the call")]
    CallAborted,

    /// The HTTP upgrade answered with anything but `HTTP/1.1 200`.
    #[error("HTTP handshake rejected: {0}")]
    HandshakeRejected(String),

    /// I/O failure on the TLS transport or the pty.
    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),

    /// pppd could not be spawned, or died under the relay.
    #[error("pppd: {0}")]
    Child(String),
}
