//! MS-CHAPv2 / MPPE key derivation primitives.
//!
//! RFC 2759 password hashing and the RFC 3079 master/session key
//! derivation. These feed the higher-layer authentication key that the
//! crypto binding is keyed with; nothing here touches the wire.

use md4::{Digest, Md4};
use sha1::Sha1;

/// "This is the MPPE Master Key"
const MAGIC1: &[u8; 27] = b"This is the MPPE Master Key";

/// RFC 3079 magic for the client-to-server direction.
const MAGIC2: &[u8; 84] =
    b"On the client side, this is the send key; on the server side, it is the receive key.";

/// RFC 3079 magic for the server-to-client direction.
const MAGIC3: &[u8; 84] =
    b"On the client side, this is the receive key; on the server side, it is the send key.";

const SHS_PAD1: [u8; 40] = [0x00; 40];
const SHS_PAD2: [u8; 40] = [0xf2; 40];

/// NtPasswordHash: MD4 over the password widened to UTF-16LE.
///
/// The widening is a plain zero high byte per character, which is exact
/// for the ASCII passwords pppd accepts.
pub fn nt_password_hash(password: &str) -> [u8; 16] {
    let mut widened = Vec::with_capacity(password.len() * 2);
    for byte in password.bytes() {
        widened.push(byte);
        widened.push(0);
    }

    let mut hash = [0u8; 16];
    hash.copy_from_slice(&Md4::digest(&widened));
    hash
}

/// HashNtPasswordHash: MD4 over the password hash itself.
pub fn hash_nt_password_hash(password_hash: &[u8; 16]) -> [u8; 16] {
    let mut hash = [0u8; 16];
    hash.copy_from_slice(&Md4::digest(password_hash));
    hash
}

/// GetMasterKey from RFC 3079: the first 16 bytes of
/// SHA1(PasswordHashHash || NT-Response || Magic1).
pub fn get_master_key(password_hash_hash: &[u8; 16], nt_response: &[u8; 24]) -> [u8; 16] {
    let mut sha = Sha1::new();
    sha.update(password_hash_hash);
    sha.update(nt_response);
    sha.update(MAGIC1);
    let digest = sha.finalize();

    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    key
}

/// GetAsymmetricStartKey from RFC 3079.
///
/// The magic string is picked by direction and role; the send key of one
/// side is the receive key of the other.
pub fn get_asymmetric_start_key(master_key: &[u8; 16], is_send: bool, is_server: bool) -> [u8; 16] {
    let magic: &[u8; 84] = if is_send == is_server { MAGIC3 } else { MAGIC2 };

    let mut sha = Sha1::new();
    sha.update(master_key);
    sha.update(SHS_PAD1);
    sha.update(magic);
    sha.update(SHS_PAD2);
    let digest = sha.finalize();

    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    key
}

/// Higher-Layer Authentication Key for an SSTP client.
///
/// MS-SSTP words this as MasterSendKey || MasterReceiveKey, but deployed
/// servers verify the opposite order. MasterReceiveKey || MasterSendKey
/// is what interoperates.
pub fn higher_layer_auth_key(password: &str, nt_response: &[u8; 24]) -> [u8; 32] {
    let password_hash = nt_password_hash(password);
    let password_hash_hash = hash_nt_password_hash(&password_hash);
    let master_key = get_master_key(&password_hash_hash, nt_response);

    let send_key = get_asymmetric_start_key(&master_key, true, true);
    let receive_key = get_asymmetric_start_key(&master_key, false, true);

    let mut hlak = [0u8; 32];
    hlak[..16].copy_from_slice(&receive_key);
    hlak[16..].copy_from_slice(&send_key);
    hlak
}
