//! seqrets-crypto: threshold sharing and instruction encryption for seQRets
//!
//! Sealing pipeline:
//! ```text
//! instruction (file) ─┐
//! password ──Argon2id─┼─ HKDF ─→ XChaCha20-Poly1305 ─→ EncryptedInstruction ─┐
//! keyfile ───BLAKE3───┤                                                        ├─ vault file
//! share key (random) ─┘── Shamir k-of-n over GF(2^8) ─→ Qards ────────────────┘
//! ```
//! Any `k` Qards rebuild the share key; the password (and keyfile, if one
//! was used) are still needed to decrypt.

pub mod cipher;
pub mod kdf;
pub mod keys;
pub mod mnemonic;
pub mod shamir;
pub mod vault;

pub use cipher::{decrypt, decrypt_bound, encrypt, encrypt_bound, EncryptedInstruction, KdfRecord};
pub use kdf::{derive_password_key, KdfParams, PasswordKey};
pub use keys::{derive_instruction_key, generate_share_key, keyfile_fingerprint, InstructionKey};
pub use mnemonic::{generate_mnemonic, is_mnemonic, mnemonic_to_secret, secret_to_mnemonic};
pub use shamir::{reconstruct, split, split_with_session, Secret};
pub use vault::{open, seal, EncryptedVaultFile, ExportedVault, SharingMetadata};

/// Size of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an Argon2id salt
pub const SALT_SIZE: usize = 16;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
