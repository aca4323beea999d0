//! Crypto binding: certificate hashing and Compound MAC derivation.
//!
//! The binding ties the inner MS-CHAPv2 authentication to the outer TLS
//! session. The server sends a nonce and a hash bitmask; the client
//! hashes the server certificate, derives the Compound MAC Key from the
//! MS-CHAPv2 credentials, and MACs a canonical image of the
//! CALL_CONNECTED message it is about to send.

pub mod mschap;

use crate::error::CryptoError;
use crate::frame::attribute::BINDING_FIELD_LEN;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Certificate hash protocol bits from the CRYPTO_BINDING_REQ bitmask.
pub const CERT_HASH_PROTOCOL_SHA1: u8 = 0x01;
pub const CERT_HASH_PROTOCOL_SHA256: u8 = 0x02;

/// PRF+ seed prefix for the Compound MAC Key.
const CMK_SEED_PREFIX: &[u8; 29] = b"SSTP inner method derived CMK";

/// Fixed prefix of the canonical CALL_CONNECTED image: SSTP header,
/// control header, CRYPTO_BINDING attribute header and reserved bytes,
/// with the hash bitmask byte fixed at 0x02. Deployed servers verify
/// against this literal even on SHA-1 sessions, so it is not rebuilt
/// from the negotiated algorithm.
const CALL_CONNECTED_PREFIX: [u8; 16] = [
    0x10, 0x01, 0x00, 0x70, 0x00, 0x04, 0x00, 0x01, 0x00, 0x03, 0x00, 0x68, 0x00, 0x00, 0x00, 0x02,
];

/// Hash algorithm negotiated for the binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HashAlgorithm {
    Sha1 = CERT_HASH_PROTOCOL_SHA1,
    Sha256 = CERT_HASH_PROTOCOL_SHA256,
}

impl HashAlgorithm {
    /// Pick the algorithm from the server's bitmask, preferring SHA-256
    /// when both bits are offered.
    pub fn negotiate(bitmask: u8) -> Result<Self, CryptoError> {
        match bitmask {
            b if b & CERT_HASH_PROTOCOL_SHA256 != 0 && b & !0x03 == 0 => Ok(Self::Sha256),
            CERT_HASH_PROTOCOL_SHA1 => Ok(Self::Sha1),
            other => Err(CryptoError::UnsupportedHash(other)),
        }
    }

    /// Digest length in bytes.
    pub fn hash_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
        }
    }
}

/// Hash the server certificate (DER) into the zero-padded 32-byte
/// transport field.
pub fn cert_hash(algorithm: HashAlgorithm, cert_der: &[u8]) -> [u8; BINDING_FIELD_LEN] {
    let mut out = [0u8; BINDING_FIELD_LEN];
    match algorithm {
        HashAlgorithm::Sha1 => {
            let digest = Sha1::digest(cert_der);
            out[..20].copy_from_slice(&digest);
        }
        HashAlgorithm::Sha256 => {
            let digest = Sha256::digest(cert_der);
            out.copy_from_slice(&digest);
        }
    }
    out
}

/// HMAC with the negotiated algorithm, zero-extended to the 32-byte
/// transport field. The key is always the full 32-byte field.
fn hmac_32(
    algorithm: HashAlgorithm,
    key: &[u8; BINDING_FIELD_LEN],
    msg: &[u8],
) -> Result<[u8; BINDING_FIELD_LEN], CryptoError> {
    let mut out = [0u8; BINDING_FIELD_LEN];
    match algorithm {
        HashAlgorithm::Sha1 => {
            let mut mac =
                Hmac::<Sha1>::new_from_slice(key).map_err(|_| CryptoError::HmacFailed)?;
            mac.update(msg);
            out[..20].copy_from_slice(&mac.finalize().into_bytes());
        }
        HashAlgorithm::Sha256 => {
            let mut mac =
                Hmac::<Sha256>::new_from_slice(key).map_err(|_| CryptoError::HmacFailed)?;
            mac.update(msg);
            out.copy_from_slice(&mac.finalize().into_bytes());
        }
    }
    Ok(out)
}

/// The derived binding material stored in the session context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundMac {
    pub cmk: [u8; BINDING_FIELD_LEN],
    pub cmac: [u8; BINDING_FIELD_LEN],
}

/// Derive the Compound MAC for the CALL_CONNECTED message.
///
/// Two HMAC passes: the CMK from the higher-layer authentication key and
/// the PRF+ seed, then the CMAC from the CMK over the 112-byte canonical
/// message image with a zeroed CMAC field.
pub fn compound_mac(
    algorithm: HashAlgorithm,
    password: &str,
    nt_response: &[u8; 24],
    nonce: &[u8; BINDING_FIELD_LEN],
    cert_hash: &[u8; BINDING_FIELD_LEN],
) -> Result<CompoundMac, CryptoError> {
    let hlak = mschap::higher_layer_auth_key(password, nt_response);

    // seed = prefix || hash length (u16 LE) || 0x01
    let mut seed = Vec::with_capacity(32);
    seed.extend_from_slice(CMK_SEED_PREFIX);
    seed.extend_from_slice(&(algorithm.hash_len() as u16).to_le_bytes());
    seed.push(0x01);

    let cmk = hmac_32(algorithm, &hlak, &seed)?;

    let mut canonical = [0u8; 112];
    canonical[..16].copy_from_slice(&CALL_CONNECTED_PREFIX);
    canonical[16..48].copy_from_slice(nonce);
    canonical[48..80].copy_from_slice(cert_hash);
    // bytes 80..112 stay zero where the CMAC will go

    let cmac = hmac_32(algorithm, &cmk, &canonical)?;

    Ok(CompoundMac { cmk, cmac })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_prefers_sha256() {
        assert_eq!(HashAlgorithm::negotiate(0x02), Ok(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::negotiate(0x03), Ok(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::negotiate(0x01), Ok(HashAlgorithm::Sha1));
    }

    #[test]
    fn test_negotiate_rejects_unknown_bits() {
        assert_eq!(
            HashAlgorithm::negotiate(0x00),
            Err(CryptoError::UnsupportedHash(0x00))
        );
        assert_eq!(
            HashAlgorithm::negotiate(0x04),
            Err(CryptoError::UnsupportedHash(0x04))
        );
        assert_eq!(
            HashAlgorithm::negotiate(0x06),
            Err(CryptoError::UnsupportedHash(0x06))
        );
    }

    #[test]
    fn test_cert_hash_sha1_zero_padded() {
        let hash = cert_hash(HashAlgorithm::Sha1, b"not really a certificate");
        assert_eq!(&hash[20..], &[0u8; 12]);
        assert_ne!(&hash[..20], &[0u8; 20]);
    }

    #[test]
    fn test_cert_hash_sha256_known_value() {
        // SHA-256 of the empty string, full 32 bytes occupied.
        let hash = cert_hash(HashAlgorithm::Sha256, b"");
        assert_eq!(
            hash.to_vec(),
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap()
        );
    }

    #[test]
    fn test_compound_mac_deterministic_and_pinned() {
        let nt_response = [0x11u8; 24];
        let nonce = [0x22u8; BINDING_FIELD_LEN];
        let cert = [0x33u8; BINDING_FIELD_LEN];

        let first =
            compound_mac(HashAlgorithm::Sha256, "password", &nt_response, &nonce, &cert).unwrap();
        let second =
            compound_mac(HashAlgorithm::Sha256, "password", &nt_response, &nonce, &cert).unwrap();
        assert_eq!(first, second);

        // Pinned regression vector for this fixture.
        assert_eq!(
            first.cmk.to_vec(),
            hex::decode("40e90878e6f720b888bb8d2c2b65cd90837c210a3f22b55e1aecbed3ff70b02f")
                .unwrap()
        );
        assert_eq!(
            first.cmac.to_vec(),
            hex::decode("ba8bdda239cd5d76f0aea3e92b95fe04048af9703c0a386698e4272e3592f886")
                .unwrap()
        );
    }

    #[test]
    fn test_compound_mac_sha1_zero_padded() {
        let nt_response = [0x11u8; 24];
        let nonce = [0x22u8; BINDING_FIELD_LEN];
        let cert = [0x33u8; BINDING_FIELD_LEN];

        let mac =
            compound_mac(HashAlgorithm::Sha1, "password", &nt_response, &nonce, &cert).unwrap();
        assert_eq!(
            mac.cmk.to_vec(),
            hex::decode("c2896f9f7b73b1ef936816d4af842fba077112fd000000000000000000000000")
                .unwrap()
        );
        assert_eq!(
            mac.cmac.to_vec(),
            hex::decode("22ab0092968064743a95923cedaf1d38a4054eeb000000000000000000000000")
                .unwrap()
        );
    }

    #[test]
    fn test_compound_mac_depends_on_every_input() {
        let nt_response = [0x11u8; 24];
        let nonce = [0x22u8; BINDING_FIELD_LEN];
        let cert = [0x33u8; BINDING_FIELD_LEN];
        let base =
            compound_mac(HashAlgorithm::Sha256, "password", &nt_response, &nonce, &cert).unwrap();

        let other_pw =
            compound_mac(HashAlgorithm::Sha256, "Password", &nt_response, &nonce, &cert).unwrap();
        assert_ne!(base.cmac, other_pw.cmac);

        let mut other_nt = nt_response;
        other_nt[23] ^= 1;
        let changed =
            compound_mac(HashAlgorithm::Sha256, "password", &other_nt, &nonce, &cert).unwrap();
        assert_ne!(base.cmac, changed.cmac);

        let mut other_nonce = nonce;
        other_nonce[0] ^= 1;
        let changed =
            compound_mac(HashAlgorithm::Sha256, "password", &nt_response, &other_nonce, &cert)
                .unwrap();
        assert_ne!(base.cmac, changed.cmac);

        let mut other_cert = cert;
        other_cert[31] ^= 1;
        let changed =
            compound_mac(HashAlgorithm::Sha256, "password", &nt_response, &nonce, &other_cert)
                .unwrap();
        assert_ne!(base.cmac, changed.cmac);
    }
}
