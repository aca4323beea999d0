//! Passive inspection of relayed PPP frames.
//!
//! The control channel cannot finish on its own: the crypto binding
//! needs the MS-CHAPv2 NT-Response that only ever appears inside the
//! tunneled PPP stream. The relay therefore peeks at every PPP frame for
//! the CHAP protocol id, captures the response payload on the way up,
//! and reports the CHAP success on the way down. Frames are never
//! modified.

/// PPP protocol id for CHAP.
pub const PPP_PROTO_CHAP: u16 = 0xc223;

const CHAP_CODE_RESPONSE: u8 = 0x02;
const CHAP_CODE_SUCCESS: u8 = 0x03;

/// Offset of the CHAP value field inside the PPP frame:
/// protocol (2) + code (1) + identifier (1) + length (2) + value-size (1).
const CHAP_VALUE_OFFSET: usize = 7;

/// Length of the MS-CHAPv2 response value: 16-byte peer challenge,
/// 8 reserved bytes, 24-byte NT-Response, 1 flags byte.
pub const CHAP_RESPONSE_LEN: usize = 49;

/// The captured MS-CHAPv2 response value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapResponse {
    raw: [u8; CHAP_RESPONSE_LEN],
}

impl ChapResponse {
    /// The NT-Response, the only part key derivation consumes.
    pub fn nt_response(&self) -> [u8; 24] {
        let mut out = [0u8; 24];
        out.copy_from_slice(&self.raw[24..48]);
        out
    }
}

/// What a peeked PPP frame revealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapEvent {
    /// The client answered the server challenge (uplink).
    Response(ChapResponse),
    /// The server accepted the response (downlink).
    Success,
}

/// Inspect a PPP frame for CHAP traffic. Returns None for anything that
/// is not a well-formed CHAP response or success.
pub fn inspect(frame: &[u8]) -> Option<ChapEvent> {
    if frame.len() < 3 {
        return None;
    }
    if u16::from_be_bytes([frame[0], frame[1]]) != PPP_PROTO_CHAP {
        return None;
    }

    match frame[2] {
        CHAP_CODE_RESPONSE => {
            let value = frame.get(CHAP_VALUE_OFFSET..CHAP_VALUE_OFFSET + CHAP_RESPONSE_LEN)?;
            let mut raw = [0u8; CHAP_RESPONSE_LEN];
            raw.copy_from_slice(value);
            Some(ChapEvent::Response(ChapResponse { raw }))
        }
        CHAP_CODE_SUCCESS => Some(ChapEvent::Success),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chap_response_frame() -> Vec<u8> {
        // protocol, code=response, id, length, value-size, then the value.
        let mut frame = vec![0xc2, 0x23, 0x02, 0x01, 0x00, 0x3e, 0x31];
        frame.extend_from_slice(&[0xaa; 16]); // peer challenge
        frame.extend_from_slice(&[0x00; 8]); // reserved
        frame.extend_from_slice(&[0x5c; 24]); // NT-Response
        frame.push(0x00); // flags
        frame.extend_from_slice(b"user"); // trailing name field
        frame
    }

    #[test]
    fn test_inspect_captures_response() {
        match inspect(&chap_response_frame()) {
            Some(ChapEvent::Response(resp)) => {
                assert_eq!(resp.nt_response(), [0x5c; 24]);
            }
            other => panic!("expected response event, got {other:?}"),
        }
    }

    #[test]
    fn test_inspect_detects_success() {
        let frame = [0xc2, 0x23, 0x03, 0x01, 0x00, 0x04];
        assert_eq!(inspect(&frame), Some(ChapEvent::Success));
    }

    #[test]
    fn test_inspect_ignores_other_protocols() {
        // LCP configure-request
        let frame = [0xc0, 0x21, 0x01, 0x01, 0x00, 0x04];
        assert_eq!(inspect(&frame), None);
    }

    #[test]
    fn test_inspect_ignores_other_chap_codes() {
        // CHAP challenge
        let frame = [0xc2, 0x23, 0x01, 0x01, 0x00, 0x04];
        assert_eq!(inspect(&frame), None);
    }

    #[test]
    fn test_inspect_ignores_short_response() {
        let mut frame = chap_response_frame();
        frame.truncate(30);
        assert_eq!(inspect(&frame), None);
    }
}
