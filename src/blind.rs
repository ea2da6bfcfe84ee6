//! The four Chaumian blind-signature primitives (spec §4.1).
//!
//! Pure functions over byte strings and an RSA keypair. No padding is used
//! anywhere here: raw RSA preserves the multiplicative structure the
//! blinding factor depends on, which a padding scheme would destroy.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::bigint;
use crate::error::CryptoError;
use crate::keystore::{RsaPrivateKey, RsaPublicKey};
use crate::token::HashAlg;

/// A blinding factor retained by the caller between `blind` and `unblind`.
#[derive(Clone)]
pub struct BlindingFactor(BigUint);

impl BlindingFactor {
    fn as_biguint(&self) -> &BigUint {
        &self.0
    }
}

fn bytes_to_uint(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

fn uint_to_bytes_padded(value: &BigUint, modulus_byte_len: usize) -> Vec<u8> {
    let raw = value.to_bytes_be();
    if raw.len() >= modulus_byte_len {
        return raw;
    }
    let mut out = vec![0u8; modulus_byte_len - raw.len()];
    out.extend_from_slice(&raw);
    out
}

fn modulus_byte_len(pub_key: &RsaPublicKey) -> usize {
    ((pub_key.n.bits() + 7) / 8) as usize
}

/// Selects SHA-256, falling back to SHA-1 only when the modulus is too
/// small to accept a 32-byte integer (`hash >= n` would be possible).
///
/// This is the compatibility concession described in spec §4.1: real
/// deployments run ≥3072-bit keys and always land on SHA-256.
pub fn select_hash_alg(pub_key: &RsaPublicKey) -> HashAlg {
    let max_sha256 = BigUint::from(2u32).pow(256);
    if max_sha256 < pub_key.n {
        HashAlg::Sha256
    } else {
        HashAlg::Sha1
    }
}

/// Hashes `data` with the given algorithm.
pub fn hash_with(alg: HashAlg, data: &[u8]) -> Vec<u8> {
    match alg {
        HashAlg::Sha256 => Sha256::digest(data).to_vec(),
        HashAlg::Sha1 => Sha1::digest(data).to_vec(),
    }
}

/// `blind(message_bytes, pub_key) -> (blinded_bytes, blinding_factor)`.
///
/// Samples a uniformly random `r` with `gcd(r, n) = 1` and `1 < r < n`, and
/// computes `m * r^e mod n`.
pub fn blind(
    message_bytes: &[u8],
    pub_key: &RsaPublicKey,
) -> Result<(Vec<u8>, BlindingFactor), CryptoError> {
    let m = bytes_to_uint(message_bytes);
    if m >= pub_key.n {
        return Err(CryptoError::MessageTooLarge);
    }

    let mut rng = rand::thread_rng();
    let r = bigint::random_coprime_below(&mut rng, &pub_key.n);

    let r_pow_e = bigint::mod_pow(&r, &pub_key.e, &pub_key.n);
    let blinded = (&m * &r_pow_e) % &pub_key.n;

    Ok((
        uint_to_bytes_padded(&blinded, modulus_byte_len(pub_key)),
        BlindingFactor(r),
    ))
}

/// `sign_blinded(blinded_bytes, priv_key) -> signature_bytes`.
///
/// Computes `blinded^d mod n`. The caller is responsible for never
/// invoking this on anything it has not itself validated as blinded; this
/// function performs no such validation because it has no way to tell a
/// blinded value from any other integer less than `n`.
pub fn sign_blinded(
    blinded_bytes: &[u8],
    priv_key: &RsaPrivateKey,
) -> Result<Vec<u8>, CryptoError> {
    let blinded = bytes_to_uint(blinded_bytes);
    if blinded >= priv_key.n {
        return Err(CryptoError::MessageTooLarge);
    }
    let sig = bigint::mod_pow(&blinded, &priv_key.d, &priv_key.n);
    Ok(uint_to_bytes_padded(&sig, modulus_byte_len(&priv_key.public())))
}

/// `unblind(blind_sig_bytes, blinding_factor, pub_key) -> signature_bytes`.
///
/// Computes `blind_sig * r^-1 mod n`, left-padded to the modulus byte
/// length.
pub fn unblind(
    blind_sig_bytes: &[u8],
    blinding_factor: &BlindingFactor,
    pub_key: &RsaPublicKey,
) -> Result<Vec<u8>, CryptoError> {
    let r = blinding_factor.as_biguint();
    if r.is_zero() {
        return Err(CryptoError::InvalidBlindingFactor);
    }
    let r_inv = bigint::mod_inverse(r, &pub_key.n).ok_or(CryptoError::InvalidBlindingFactor)?;

    let blind_sig = bytes_to_uint(blind_sig_bytes);
    let sig = (&blind_sig * &r_inv) % &pub_key.n;
    Ok(uint_to_bytes_padded(&sig, modulus_byte_len(pub_key)))
}

/// `verify(message_bytes, signature_bytes, pub_key) -> bool`.
///
/// Computes `signature^e mod n` and compares against `message_bytes`
/// against the minimal big-endian encoding of the recovered integer. Also
/// accepts `message_bytes` equal to that encoding with exactly one extra
/// leading zero byte prepended, tolerating the ambiguity of fixed-width
/// big-integer encodings; no other variant is accepted. Comparing byte
/// forms directly (rather than re-deriving an integer from `message_bytes`
/// and comparing integers) matters here: `BigUint::from_bytes_be` silently
/// strips *every* leading zero byte, so an integer comparison alone would
/// accept two, three, or any number of prepended zero bytes instead of
/// exactly one.
pub fn verify(message_bytes: &[u8], signature_bytes: &[u8], pub_key: &RsaPublicKey) -> bool {
    let sig = bytes_to_uint(signature_bytes);
    if sig >= pub_key.n {
        return false;
    }
    let recovered = bigint::mod_pow(&sig, &pub_key.e, &pub_key.n);
    let recovered_bytes = recovered.to_bytes_be();

    if message_bytes == recovered_bytes.as_slice() {
        return true;
    }

    message_bytes.len() == recovered_bytes.len() + 1
        && message_bytes[0] == 0
        && message_bytes[1..] == recovered_bytes[..]
}

/// Raw RSA signing without blinding, used only to state property P6 in
/// tests (`verify(m, sign_raw(m, priv), pub) == true`). Not part of the
/// mint's operational surface: the mint only ever signs blinded values.
#[cfg(test)]
pub(crate) fn sign_raw(message_bytes: &[u8], priv_key: &RsaPrivateKey) -> Vec<u8> {
    let m = bytes_to_uint(message_bytes);
    let sig = bigint::mod_pow(&m, &priv_key.d, &priv_key.n);
    uint_to_bytes_padded(&sig, modulus_byte_len(&priv_key.public()))
}
