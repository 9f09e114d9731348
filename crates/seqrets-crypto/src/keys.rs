//! Factor combination: password key + keyfile + share key → instruction key

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use seqrets_core::{CryptoError, SeqretsResult};

use crate::kdf::PasswordKey;
use crate::shamir::Secret;
use crate::{KEY_SIZE, SALT_SIZE};

const INSTRUCTION_INFO: &[u8] = b"seqrets-instruction-v1";
const KEYFILE_CONTEXT: &str = "seqrets 2024 keyfile factor v1";
const FINGERPRINT_CONTEXT: &str = "seqrets 2024 keyfile fingerprint v1";

const FLAG_KEYFILE: u8 = 0b01;
const FLAG_SHARE_KEY: u8 = 0b10;

/// The AEAD key for one instruction. Zeroized on drop.
#[derive(Clone)]
pub struct InstructionKey {
    bytes: [u8; KEY_SIZE],
}

impl InstructionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for InstructionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for InstructionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstructionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Compress a keyfile of any size into the 32-byte factor mixed into the key.
pub fn keyfile_digest(keyfile: &[u8]) -> [u8; KEY_SIZE] {
    blake3::derive_key(KEYFILE_CONTEXT, keyfile)
}

/// Public fingerprint of a keyfile, recorded in ciphertext headers so a
/// missing keyfile can be flagged to the user. Uses a separate derivation
/// context from `keyfile_digest`.
pub fn keyfile_fingerprint(keyfile: &[u8]) -> String {
    hex::encode(&blake3::derive_key(FINGERPRINT_CONTEXT, keyfile)[..16])
}

/// Generate a random 256-bit share key (the secret that gets split).
pub fn generate_share_key() -> Secret {
    let mut bytes = vec![0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    Secret::new(bytes)
}

/// Combine every supplied factor into the final instruction key with
/// HKDF-SHA256. The info string carries a flag byte so that the same bytes
/// supplied as a different factor never yield the same key.
pub fn derive_instruction_key(
    password_key: &PasswordKey,
    salt: &[u8; SALT_SIZE],
    keyfile: Option<&[u8]>,
    share_key: Option<&[u8]>,
) -> SeqretsResult<InstructionKey> {
    let mut ikm = Zeroizing::new(Vec::with_capacity(KEY_SIZE * 3));
    ikm.extend_from_slice(password_key.as_bytes());

    let mut flags = 0u8;
    if let Some(kf) = keyfile {
        let mut digest = keyfile_digest(kf);
        ikm.extend_from_slice(&digest);
        digest.zeroize();
        flags |= FLAG_KEYFILE;
    }
    if let Some(sk) = share_key {
        ikm.extend_from_slice(sk);
        flags |= FLAG_SHARE_KEY;
    }

    let mut info = Vec::with_capacity(INSTRUCTION_INFO.len() + 1);
    info.extend_from_slice(INSTRUCTION_INFO);
    info.push(flags);

    let hkdf = Hkdf::<Sha256>::new(Some(salt), &ikm);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(&info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(InstructionKey::from_bytes(okm))
}
