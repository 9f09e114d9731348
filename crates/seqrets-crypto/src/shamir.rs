//! Byte-wise Shamir secret sharing over GF(2^8)
//!
//! Each secret byte is the constant term of its own random polynomial of
//! degree `k - 1`; share `x` carries the evaluation of every polynomial at
//! `x` (1..=n). Reconstruction is Lagrange interpolation at zero.
//!
//! Field arithmetic uses the AES reduction polynomial (0x11B) and is written
//! without data-dependent branches or table lookups.

use std::collections::BTreeMap;

use rand::{CryptoRng, RngCore};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use seqrets_core::{
    ParameterError, SeqretsResult, SessionId, Share, ShareError, ShareView, SESSION_ID_LEN,
};

/// Maximum number of shares (evaluation points are the non-zero bytes)
pub const MAX_SHARES: usize = 255;

/// Secret bytes held only in memory. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    bytes: Vec<u8>,
}

impl Secret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<&[u8]> for Secret {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

pub(crate) mod gf256 {
    /// Multiply in GF(2^8) mod x^8 + x^4 + x^3 + x + 1.
    pub fn mul(mut a: u8, mut b: u8) -> u8 {
        let mut p = 0u8;
        for _ in 0..8 {
            p ^= a & 0u8.wrapping_sub(b & 1);
            let carry = 0u8.wrapping_sub(a >> 7);
            a = (a << 1) ^ (0x1b & carry);
            b >>= 1;
        }
        p
    }

    /// Multiplicative inverse via a^254. Maps 0 to 0.
    pub fn inv(a: u8) -> u8 {
        // 254 = 0b1111_1110
        let mut result = 1u8;
        let mut base = a;
        let mut e = 254u8;
        while e > 0 {
            if e & 1 == 1 {
                result = mul(result, base);
            }
            base = mul(base, base);
            e >>= 1;
        }
        result
    }
}

/// Evaluate `constant + c[0]·x + c[1]·x² + …` with Horner's rule.
fn eval_poly(constant: u8, coeffs: &[u8], x: u8) -> u8 {
    let mut acc = 0u8;
    for &c in coeffs.iter().rev() {
        acc = gf256::mul(acc, x) ^ c;
    }
    gf256::mul(acc, x) ^ constant
}

fn check_parameters(secret: &[u8], threshold: usize, total: usize) -> Result<(), ParameterError> {
    if threshold < 1 || threshold > total || total > MAX_SHARES {
        return Err(ParameterError::InvalidParameters { threshold, total });
    }
    if secret.is_empty() {
        return Err(ParameterError::EmptySecret);
    }
    Ok(())
}

/// Split `secret` into `total` shares, any `threshold` of which reconstruct it.
pub fn split(secret: &[u8], threshold: usize, total: usize, label: &str) -> SeqretsResult<Vec<Share>> {
    let mut rng = rand::thread_rng();
    let mut session = [0u8; SESSION_ID_LEN];
    rng.fill_bytes(&mut session);
    split_with_rng(
        &mut rng,
        secret,
        threshold,
        total,
        label,
        SessionId::from_bytes(session),
    )
}

/// Split under a caller-chosen session id.
pub fn split_with_session(
    secret: &[u8],
    threshold: usize,
    total: usize,
    label: &str,
    session: SessionId,
) -> SeqretsResult<Vec<Share>> {
    split_with_rng(&mut rand::thread_rng(), secret, threshold, total, label, session)
}

/// Split drawing polynomial coefficients from `rng`.
pub fn split_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
    secret: &[u8],
    threshold: usize,
    total: usize,
    label: &str,
    session: SessionId,
) -> SeqretsResult<Vec<Share>> {
    check_parameters(secret, threshold, total)?;

    let degree = threshold - 1;
    let mut coeffs = Zeroizing::new(vec![0u8; secret.len() * degree]);
    rng.fill_bytes(&mut coeffs);

    let mut values = Zeroizing::new(vec![0u8; secret.len()]);
    let shares: Vec<Share> = (1..=total as u8)
        .map(|x| {
            for (b, &s) in secret.iter().enumerate() {
                values[b] = eval_poly(s, &coeffs[b * degree..(b + 1) * degree], x);
            }
            Share::from_parts(session, threshold as u8, total as u8, x, &values, label)
        })
        .collect();

    debug!(threshold, total, len = secret.len(), session = %session, "secret split");
    Ok(shares)
}

/// Reconstruct the secret from at least `threshold` shares of one session.
pub fn reconstruct(shares: &[Share]) -> SeqretsResult<Secret> {
    let views = shares
        .iter()
        .map(Share::validate)
        .collect::<Result<Vec<ShareView<'_>>, ShareError>>()?;

    let Some(first) = views.first() else {
        return Err(ShareError::InsufficientShares { needed: 1, got: 0 }.into());
    };

    let mut points: BTreeMap<u8, &[u8]> = BTreeMap::new();
    for view in &views {
        check_compatible(first, view)?;
        match points.get(&view.index) {
            Some(existing) if *existing != view.values => {
                return Err(ShareError::ConflictingShares { index: view.index }.into());
            }
            Some(_) => {}
            None => {
                points.insert(view.index, view.values);
            }
        }
    }

    let needed = first.threshold as usize;
    if points.len() < needed {
        return Err(ShareError::InsufficientShares {
            needed,
            got: points.len(),
        }
        .into());
    }

    let used: Vec<(u8, &[u8])> = points.into_iter().take(needed).collect();
    let weights = lagrange_weights_at_zero(&used);

    let mut secret = vec![0u8; first.values.len()];
    for ((_, ys), &w) in used.iter().zip(weights.iter()) {
        for (out, &y) in secret.iter_mut().zip(ys.iter()) {
            *out ^= gf256::mul(y, w);
        }
    }

    debug!(threshold = needed, len = secret.len(), "secret reconstructed");
    Ok(Secret::new(secret))
}

fn check_compatible(first: &ShareView<'_>, other: &ShareView<'_>) -> Result<(), ShareError> {
    if other.session_id != first.session_id {
        return Err(ShareError::IncompatibleShare(format!(
            "share #{} belongs to a different sharing session",
            other.index
        )));
    }
    if (other.threshold, other.total_shares) != (first.threshold, first.total_shares) {
        return Err(ShareError::IncompatibleShare(format!(
            "share #{} is {}-of-{}, expected {}-of-{}",
            other.index, other.threshold, other.total_shares, first.threshold, first.total_shares
        )));
    }
    if other.values.len() != first.values.len() {
        return Err(ShareError::IncompatibleShare(format!(
            "share #{} carries {} bytes, expected {}",
            other.index,
            other.values.len(),
            first.values.len()
        )));
    }
    Ok(())
}

/// λ_i(0) = Π_{j≠i} x_j / (x_j − x_i); subtraction is XOR in GF(2^8).
fn lagrange_weights_at_zero(points: &[(u8, &[u8])]) -> Vec<u8> {
    points
        .iter()
        .map(|&(xi, _)| {
            let mut num = 1u8;
            let mut den = 1u8;
            for &(xj, _) in points {
                if xj != xi {
                    num = gf256::mul(num, xj);
                    den = gf256::mul(den, xj ^ xi);
                }
            }
            gf256::mul(num, gf256::inv(den))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use seqrets_core::SeqretsError;
    use std::collections::HashSet;

    fn subsets(n: usize, k: usize) -> Vec<Vec<usize>> {
        fn go(start: usize, n: usize, k: usize, cur: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
            if cur.len() == k {
                out.push(cur.clone());
                return;
            }
            for i in start..n {
                cur.push(i);
                go(i + 1, n, k, cur, out);
                cur.pop();
            }
        }
        let mut out = Vec::new();
        go(0, n, k, &mut Vec::new(), &mut out);
        out
    }

    #[test]
    fn gf_known_vector() {
        // FIPS-197 §4.2 example
        assert_eq!(gf256::mul(0x57, 0x83), 0xc1);
        assert_eq!(gf256::mul(0x57, 0x13), 0xfe);
    }

    #[test]
    fn gf_inverse_for_every_nonzero_element() {
        for a in 1..=255u8 {
            assert_eq!(gf256::mul(a, gf256::inv(a)), 1, "inverse of {a:#04x}");
        }
        assert_eq!(gf256::inv(0), 0);
    }

    #[test]
    fn every_k_subset_reconstructs() {
        let secret = b"correct horse battery staple";
        for n in 1..=5 {
            for k in 1..=n {
                let shares = split(secret, k, n, "t").unwrap();
                assert_eq!(shares.len(), n);
                for subset in subsets(n, k) {
                    let picked: Vec<Share> = subset.iter().map(|&i| shares[i].clone()).collect();
                    let recovered = reconstruct(&picked).unwrap();
                    assert_eq!(recovered.as_bytes(), secret, "k={k} n={n} subset={subset:?}");
                }
            }
        }
    }

    #[test]
    fn evaluation_order_does_not_matter() {
        let shares = split(b"order", 3, 5, "t").unwrap();
        let picked = vec![shares[4].clone(), shares[0].clone(), shares[2].clone()];
        assert_eq!(reconstruct(&picked).unwrap().as_bytes(), b"order");
    }

    #[test]
    fn shares_carry_label_and_header() {
        let shares = split(b"x", 2, 3, "grandma").unwrap();
        for (i, s) in shares.iter().enumerate() {
            assert_eq!(s.index() as usize, i + 1);
            assert_eq!((s.threshold(), s.total_shares()), (2, 3));
            assert_eq!(s.label(), "grandma");
        }
        let session = shares[0].session_id().unwrap();
        assert!(shares.iter().all(|s| s.session_id().unwrap() == session));
    }

    #[test]
    fn invalid_parameters_rejected() {
        for (k, n) in [(0, 3), (4, 3), (1, 0), (2, 256)] {
            let err = split(b"s", k, n, "t").unwrap_err();
            assert!(
                matches!(
                    err,
                    SeqretsError::Parameter(ParameterError::InvalidParameters { .. })
                ),
                "k={k} n={n}"
            );
        }
        assert!(matches!(
            split(b"", 2, 3, "t").unwrap_err(),
            SeqretsError::Parameter(ParameterError::EmptySecret)
        ));
    }

    #[test]
    fn full_255_shares() {
        let shares = split(b"max", 255, 255, "t").unwrap();
        assert_eq!(shares.len(), 255);
        assert_eq!(shares[254].index(), 255);
        assert_eq!(reconstruct(&shares).unwrap().as_bytes(), b"max");
    }

    #[test]
    fn insufficient_shares() {
        let shares = split(b"secret", 3, 5, "t").unwrap();
        let err = reconstruct(&shares[..2]).unwrap_err();
        assert!(matches!(
            err,
            SeqretsError::Share(ShareError::InsufficientShares { needed: 3, got: 2 })
        ));
        assert!(matches!(
            reconstruct(&[]).unwrap_err(),
            SeqretsError::Share(ShareError::InsufficientShares { got: 0, .. })
        ));
    }

    #[test]
    fn identical_duplicates_are_ignored() {
        let shares = split(b"secret", 2, 3, "t").unwrap();
        let picked = vec![shares[0].clone(), shares[0].clone(), shares[1].clone()];
        assert_eq!(reconstruct(&picked).unwrap().as_bytes(), b"secret");

        // A duplicate does not count toward the threshold.
        let err = reconstruct(&[shares[0].clone(), shares[0].clone()]).unwrap_err();
        assert!(matches!(
            err,
            SeqretsError::Share(ShareError::InsufficientShares { needed: 2, got: 1 })
        ));
    }

    #[test]
    fn conflicting_duplicate_index() {
        let session = SessionId::from_bytes([1u8; SESSION_ID_LEN]);
        let a = split_with_session(b"secret-a", 2, 3, "t", session).unwrap();
        let b = split_with_session(b"secret-b", 2, 3, "t", session).unwrap();
        let err = reconstruct(&[a[0].clone(), b[0].clone(), a[1].clone()]).unwrap_err();
        assert!(matches!(
            err,
            SeqretsError::Share(ShareError::ConflictingShares { index: 1 })
        ));
    }

    #[test]
    fn shares_from_different_sessions_are_incompatible() {
        let a = split(b"same secret", 2, 3, "t").unwrap();
        let b = split(b"same secret", 2, 3, "t").unwrap();
        let err = reconstruct(&[a[0].clone(), b[1].clone()]).unwrap_err();
        assert!(matches!(
            err,
            SeqretsError::Share(ShareError::IncompatibleShare(_))
        ));
    }

    #[test]
    fn mismatched_headers_are_incompatible() {
        let session = SessionId::from_bytes([2u8; SESSION_ID_LEN]);
        let a = split_with_session(b"secret", 2, 3, "t", session).unwrap();
        let b = split_with_session(b"secret", 2, 4, "t", session).unwrap();
        let err = reconstruct(&[a[0].clone(), b[1].clone()]).unwrap_err();
        assert!(err.to_string().contains("2-of-4"));
    }

    #[test]
    fn corrupt_payload_detected() {
        let shares = split(b"secret", 2, 3, "t").unwrap();
        let mut value = serde_json::to_value(&shares[0]).unwrap();
        value["payload"] = serde_json::Value::String("AAAA".into());
        let tampered: Share = serde_json::from_value(value).unwrap();
        let err = reconstruct(&[tampered, shares[1].clone()]).unwrap_err();
        assert!(matches!(
            err,
            SeqretsError::Share(ShareError::CorruptShareEncoding(_))
        ));
    }

    #[test]
    fn single_share_of_2_of_n_is_uniform_for_every_secret() {
        // With one random coefficient c, y = s + c·x. For every secret s the
        // map c ↦ y is a bijection, so y is uniform and independent of s.
        for x in 1..=255u8 {
            for s in [0u8, 1, 0x41, 0xff] {
                let ys: HashSet<u8> = (0..=255u8).map(|c| eval_poly(s, &[c], x)).collect();
                assert_eq!(ys.len(), 256, "x={x} s={s}");
            }
        }
    }

    #[test]
    fn two_shares_of_3_of_n_are_uniform_for_every_secret() {
        for s in [0u8, 0x42, 0xff] {
            let mut seen = HashSet::with_capacity(65536);
            for c1 in 0..=255u8 {
                for c2 in 0..=255u8 {
                    let coeffs = [c1, c2];
                    seen.insert((eval_poly(s, &coeffs, 1), eval_poly(s, &coeffs, 2)));
                }
            }
            assert_eq!(seen.len(), 65536, "s={s}");
        }
    }

    #[test]
    fn single_share_statistics_do_not_depend_on_secret() {
        const TRIALS: usize = 4096;
        for secret in [b"A", b"B"] {
            let mut counts = [0usize; 256];
            for _ in 0..TRIALS {
                let shares = split(secret, 2, 3, "t").unwrap();
                let v = shares[0].validate().unwrap().values[0];
                counts[v as usize] += 1;
            }
            let distinct = counts.iter().filter(|&&c| c > 0).count();
            let mean = counts
                .iter()
                .enumerate()
                .map(|(v, &c)| v * c)
                .sum::<usize>() as f64
                / TRIALS as f64;
            assert!(distinct >= 250, "only {distinct} distinct values");
            assert!((mean - 127.5).abs() < 12.0, "mean {mean}");
        }
    }

    #[test]
    fn debug_redacts_secret() {
        let s = Secret::new(b"hunter2".to_vec());
        let rendered = format!("{s:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("104"));
    }

    fn split_case() -> impl Strategy<Value = (Vec<u8>, usize, Vec<usize>)> {
        (1usize..=255)
            .prop_flat_map(|n| (Just(n), 1..=n))
            .prop_flat_map(|(n, k)| {
                (
                    proptest::collection::vec(any::<u8>(), 1..=48),
                    Just(n),
                    proptest::sample::subsequence((0..n).collect::<Vec<_>>(), k),
                )
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn any_k_of_n_reconstructs((secret, n, picked) in split_case()) {
            let k = picked.len();
            let shares = split(&secret, k, n, "prop").unwrap();
            let subset: Vec<Share> = picked.iter().map(|&i| shares[i].clone()).collect();
            let recovered = reconstruct(&subset).unwrap();
            prop_assert_eq!(recovered.as_bytes(), &secret[..]);
        }
    }
}
