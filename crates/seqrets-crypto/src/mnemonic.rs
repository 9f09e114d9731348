//! BIP-39 seed phrases as secrets
//!
//! A valid phrase is compacted to its entropy before splitting (16–32 bytes
//! instead of the full word list) and expanded again after reconstruction.

use bip39::Mnemonic;
use rand::RngCore;
use zeroize::Zeroizing;

use seqrets_core::{ParameterError, SeqretsResult};

use crate::shamir::Secret;

/// Whether `text` parses as a BIP-39 English mnemonic.
pub fn is_mnemonic(text: &str) -> bool {
    text.trim().parse::<Mnemonic>().is_ok()
}

/// Generate a fresh mnemonic of 12, 15, 18, 21 or 24 words.
pub fn generate_mnemonic(word_count: usize) -> SeqretsResult<String> {
    if !(12..=24).contains(&word_count) || word_count % 3 != 0 {
        return Err(ParameterError::Mnemonic(format!(
            "unsupported word count {word_count}"
        ))
        .into());
    }
    let mut entropy = Zeroizing::new(vec![0u8; word_count / 3 * 4]);
    rand::thread_rng().fill_bytes(&mut entropy);

    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| ParameterError::Mnemonic(format!("generation failed: {e}")))?;
    Ok(mnemonic.to_string())
}

/// Validate a phrase and return its entropy as a splittable secret.
pub fn mnemonic_to_secret(words: &str) -> SeqretsResult<Secret> {
    let mnemonic: Mnemonic = words
        .trim()
        .parse()
        .map_err(|e| ParameterError::Mnemonic(format!("{e}")))?;
    Ok(Secret::new(mnemonic.to_entropy()))
}

/// Expand recovered entropy back into its phrase.
pub fn secret_to_mnemonic(secret: &Secret) -> SeqretsResult<String> {
    let mnemonic = Mnemonic::from_entropy(secret.as_bytes()).map_err(|e| {
        ParameterError::Mnemonic(format!("{} bytes is not BIP-39 entropy: {e}", secret.len()))
    })?;
    Ok(mnemonic.to_string())
}
