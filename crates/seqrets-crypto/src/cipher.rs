//! Instruction cipher: Argon2id + XChaCha20-Poly1305 over a `RawInstruction`
//!
//! Key schedule:
//! ```text
//! password ──Argon2id(salt, params)──┐
//! keyfile  ──BLAKE3 derive_key───────┼─ HKDF-SHA256(salt, info = domain || flags) ─→ AEAD key
//! share key (optional) ──────────────┘
//! ```
//! The AAD is a canonical rendering of the header (version, KDF record and
//! keyfile fingerprint), so any edit to the stored parameters fails
//! authentication exactly like a wrong password does.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use seqrets_core::{CryptoError, ParameterError, RawInstruction, SeqretsError, SeqretsResult};

use crate::kdf::{derive_password_key, KdfParams};
use crate::keys::{derive_instruction_key, keyfile_fingerprint};
use crate::shamir::Secret;
use crate::{NONCE_SIZE, SALT_SIZE, TAG_SIZE};

/// Ciphertext format version
pub const INSTRUCTION_FORMAT_VERSION: u32 = 1;

const KDF_ALGORITHM: &str = "argon2id";

/// Upper bounds applied to stored parameters before running the KDF, so a
/// doctored file cannot make decryption allocate without limit.
const MAX_MEM_COST_KIB: u32 = 4 * 1024 * 1024;
const MAX_TIME_COST: u32 = 64;

/// Everything needed to re-derive the key, minus the secret factors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfRecord {
    pub algorithm: String,
    /// Base64 16-byte salt
    pub salt: String,
    #[serde(flatten)]
    pub params: KdfParams,
    /// Whether a share key was mixed into the key
    #[serde(default)]
    pub share_bound: bool,
}

/// An encrypted instruction. Binary fields are base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedInstruction {
    pub version: u32,
    pub ciphertext: String,
    pub nonce: String,
    pub auth_tag: String,
    pub kdf_params: KdfRecord,
    /// Fingerprint of the keyfile used, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyfile_hash: Option<String>,
}

impl EncryptedInstruction {
    pub fn requires_keyfile(&self) -> bool {
        self.keyfile_hash.is_some()
    }

    pub fn to_json(&self) -> SeqretsResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SeqretsError::Format(format!("instruction serialization: {e}")))
    }

    pub fn from_json(text: &str) -> SeqretsResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| SeqretsError::Format(format!("not an encrypted instruction: {e}")))
    }

    fn aad(&self) -> Vec<u8> {
        let k = &self.kdf_params;
        format!(
            "seqrets-instruction|v{}|{}|{}|m={}|t={}|p={}|bound={}|kf={}",
            self.version,
            k.algorithm,
            k.salt,
            k.params.mem_cost_kib,
            k.params.time_cost,
            k.params.parallelism,
            k.share_bound,
            self.keyfile_hash.as_deref().unwrap_or("-"),
        )
        .into_bytes()
    }
}

/// Encrypt an instruction under a password and optional keyfile.
pub fn encrypt(
    instruction: &RawInstruction,
    password: &SecretString,
    keyfile: Option<&[u8]>,
    params: &KdfParams,
) -> SeqretsResult<EncryptedInstruction> {
    seal(instruction, password, keyfile, None, params)
}

/// Encrypt with an additional share key, which is then required to decrypt.
pub fn encrypt_bound(
    instruction: &RawInstruction,
    password: &SecretString,
    keyfile: Option<&[u8]>,
    share_key: &Secret,
    params: &KdfParams,
) -> SeqretsResult<EncryptedInstruction> {
    seal(instruction, password, keyfile, Some(share_key.as_bytes()), params)
}

/// Decrypt an instruction. Every failure is `CryptoError::AuthenticationFailed`.
pub fn decrypt(
    enc: &EncryptedInstruction,
    password: &SecretString,
    keyfile: Option<&[u8]>,
) -> SeqretsResult<RawInstruction> {
    open(enc, password, keyfile, None)
}

/// Decrypt an instruction sealed with `encrypt_bound`.
pub fn decrypt_bound(
    enc: &EncryptedInstruction,
    password: &SecretString,
    keyfile: Option<&[u8]>,
    share_key: &Secret,
) -> SeqretsResult<RawInstruction> {
    open(enc, password, keyfile, Some(share_key.as_bytes()))
}

fn seal(
    instruction: &RawInstruction,
    password: &SecretString,
    keyfile: Option<&[u8]>,
    share_key: Option<&[u8]>,
    params: &KdfParams,
) -> SeqretsResult<EncryptedInstruction> {
    if password.expose_secret().is_empty() {
        return Err(ParameterError::MissingPassword.into());
    }
    params.validate()?;

    let mut rng = rand::thread_rng();
    let mut salt = [0u8; SALT_SIZE];
    rng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce_bytes);

    let mut header = EncryptedInstruction {
        version: INSTRUCTION_FORMAT_VERSION,
        ciphertext: String::new(),
        nonce: STANDARD.encode(nonce_bytes),
        auth_tag: String::new(),
        kdf_params: KdfRecord {
            algorithm: KDF_ALGORITHM.into(),
            salt: STANDARD.encode(salt),
            params: *params,
            share_bound: share_key.is_some(),
        },
        keyfile_hash: keyfile.map(keyfile_fingerprint),
    };

    let password_key = derive_password_key(password, &salt, params)?;
    let key = derive_instruction_key(&password_key, &salt, keyfile, share_key)?;
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let plaintext = Zeroizing::new(
        serde_json::to_vec(instruction)
            .map_err(|e| SeqretsError::Format(format!("instruction serialization: {e}")))?,
    );
    let aad = header.aad();

    let mut sealed = cipher
        .encrypt(
            XNonce::from_slice(&nonce_bytes),
            Payload {
                msg: &plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::Encryption)?;

    let tag = sealed.split_off(sealed.len() - TAG_SIZE);
    header.ciphertext = STANDARD.encode(&sealed);
    header.auth_tag = STANDARD.encode(&tag);

    debug!(
        file = %instruction.file_name,
        keyfile = keyfile.is_some(),
        share_bound = share_key.is_some(),
        "instruction encrypted"
    );
    Ok(header)
}

fn open(
    enc: &EncryptedInstruction,
    password: &SecretString,
    keyfile: Option<&[u8]>,
    share_key: Option<&[u8]>,
) -> SeqretsResult<RawInstruction> {
    let fail = || SeqretsError::Crypto(CryptoError::AuthenticationFailed);

    let record = &enc.kdf_params;
    if enc.version != INSTRUCTION_FORMAT_VERSION
        || record.algorithm != KDF_ALGORITHM
        || record.params.mem_cost_kib > MAX_MEM_COST_KIB
        || record.params.time_cost > MAX_TIME_COST
        || record.params.validate().is_err()
    {
        return Err(fail());
    }

    let salt: [u8; SALT_SIZE] = decode_fixed(&record.salt).ok_or_else(fail)?;
    let nonce: [u8; NONCE_SIZE] = decode_fixed(&enc.nonce).ok_or_else(fail)?;
    let tag: [u8; TAG_SIZE] = decode_fixed(&enc.auth_tag).ok_or_else(fail)?;
    let mut sealed = STANDARD.decode(&enc.ciphertext).map_err(|_| fail())?;
    sealed.extend_from_slice(&tag);

    let password_key = derive_password_key(password, &salt, &record.params).map_err(|_| fail())?;
    let key =
        derive_instruction_key(&password_key, &salt, keyfile, share_key).map_err(|_| fail())?;
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let aad = enc.aad();
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &sealed,
                    aad: &aad,
                },
            )
            .map_err(|_| fail())?,
    );

    serde_json::from_slice(&plaintext).map_err(|_| fail())
}

fn decode_fixed<const N: usize>(s: &str) -> Option<[u8; N]> {
    STANDARD.decode(s).ok()?.try_into().ok()
}
