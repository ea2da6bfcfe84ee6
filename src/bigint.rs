//! Big-integer primitives backing the RSA Chaumian construction.
//!
//! Everything here is pure math over [`BigUint`]: modular exponentiation,
//! modular inverse, uniform sampling below a bound, probabilistic
//! primality testing, and RSA keypair synthesis. Nothing in this module
//! touches mint state.

use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Signed, Zero};
use rand::RngCore;

/// `base^exp mod modulus`.
pub fn mod_pow(base: &BigUint, exp: &BigUint, modulus: &BigUint) -> BigUint {
    base.modpow(exp, modulus)
}

/// The modular inverse of `a` mod `modulus`, or `None` if `gcd(a, modulus) != 1`.
pub fn mod_inverse(a: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    let (g, x, _) = extended_gcd(&BigInt::from(a.clone()), &BigInt::from(modulus.clone()));
    if g != BigInt::one() {
        return None;
    }
    let m = BigInt::from(modulus.clone());
    let x = ((x % &m) + &m) % &m;
    x.to_biguint()
}

/// Extended Euclidean algorithm: returns `(gcd, x, y)` such that
/// `a*x + b*y == gcd`.
fn extended_gcd(a: &BigInt, b: &BigInt) -> (BigInt, BigInt, BigInt) {
    if b.is_zero() {
        (a.clone(), BigInt::one(), BigInt::zero())
    } else {
        let (g, x1, y1) = extended_gcd(b, &(a % b));
        let x = y1.clone();
        let y = x1 - (a / b) * y1;
        (g, x, y)
    }
}

/// Uniformly samples an integer `r` with `1 < r < bound` and `gcd(r, bound) == 1`.
///
/// Used for blinding factors: the spec requires `gcd(r, n) = 1` and
/// `1 < r < n`. Rejection sampling is the standard approach and terminates
/// quickly in practice because coprimality with an RSA modulus is the
/// overwhelmingly common case.
pub fn random_coprime_below<R: rand::Rng + ?Sized>(rng: &mut R, bound: &BigUint) -> BigUint {
    loop {
        let candidate = rng.gen_biguint_below(bound);
        if candidate > BigUint::one() && candidate.gcd(bound) == BigUint::one() {
            return candidate;
        }
    }
}

/// Uniformly samples an integer in `[0, bound)`.
pub fn random_below<R: rand::Rng + ?Sized>(rng: &mut R, bound: &BigUint) -> BigUint {
    rng.gen_biguint_below(bound)
}

const SMALL_PRIMES: &[u64] = &[
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
    97, 101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181, 191,
    193, 197, 199, 211, 223, 227, 229, 233, 239, 241, 251,
];

/// Miller-Rabin primality test with `rounds` independent witnesses.
///
/// Probability of a false positive is at most `4^-rounds`; the RSA keypair
/// generator below uses enough rounds that a composite slipping through is
/// cryptographically negligible.
pub fn is_probable_prime<R: rand::Rng + ?Sized>(n: &BigUint, rounds: u32, rng: &mut R) -> bool {
    if *n < BigUint::from(2u32) {
        return false;
    }
    for &p in SMALL_PRIMES {
        let p = BigUint::from(p);
        if *n == p {
            return true;
        }
        if (n % &p).is_zero() {
            return false;
        }
    }

    // n - 1 = 2^s * d, d odd
    let one = BigUint::one();
    let n_minus_one = n - &one;
    let mut d = n_minus_one.clone();
    let mut s = 0u32;
    while (&d).is_even() {
        d >>= 1;
        s += 1;
    }

    'witness: for _ in 0..rounds {
        // 2 <= a <= n - 2
        let a = {
            let range = &n_minus_one - &BigUint::from(3u32);
            BigUint::from(2u32) + random_below(rng, &(&range + &one))
        };
        let mut x = mod_pow(&a, &d, n);
        if x == one || x == n_minus_one {
            continue;
        }
        for _ in 0..s.saturating_sub(1) {
            x = mod_pow(&x, &BigUint::from(2u32), n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Generates a random probable prime of exactly `bits` bits (top and bottom
/// bit forced to 1, so the prime is odd and the product of two such primes
/// has the expected bit length).
pub fn random_prime<R: rand::Rng + RngCore + ?Sized>(bits: usize, rng: &mut R) -> BigUint {
    assert!(bits >= 16, "prime bit length too small to be meaningful");
    loop {
        let mut candidate = rng.gen_biguint(bits as u64);
        candidate.set_bit((bits - 1) as u64, true);
        candidate.set_bit(0, true);
        if is_probable_prime(&candidate, 40, rng) {
            return candidate;
        }
    }
}

/// An RSA keypair: modulus `n`, public exponent `e`, private exponent `d`.
pub struct RsaKeyMaterial {
    pub n: BigUint,
    pub e: BigUint,
    pub d: BigUint,
}

/// The conventional practical-default RSA public exponent (2^16 + 1).
pub const DEFAULT_PUBLIC_EXPONENT: u64 = 65_537;

/// Synthesizes a fresh RSA keypair with an `n` of exactly `modulus_bits` bits.
///
/// `modulus_bits` must be even; `p` and `q` are each generated with
/// `modulus_bits / 2` bits. Retries internally whenever `gcd(e, phi) != 1`
/// or the resulting modulus lands a bit short, which is rare but possible
/// when the two high bits don't carry as expected.
pub fn generate_rsa_keypair<R: rand::Rng + RngCore + ?Sized>(
    modulus_bits: usize,
    rng: &mut R,
) -> RsaKeyMaterial {
    assert!(modulus_bits % 2 == 0, "modulus_bits must be even");
    let half = modulus_bits / 2;
    let e = BigUint::from(DEFAULT_PUBLIC_EXPONENT);

    loop {
        let p = random_prime(half, rng);
        let q = loop {
            let candidate = random_prime(half, rng);
            if candidate != p {
                break candidate;
            }
        };

        let n = &p * &q;
        if n.bits() as usize != modulus_bits {
            continue;
        }

        let one = BigUint::one();
        let phi = (&p - &one) * (&q - &one);
        if phi.gcd(&e) != one {
            continue;
        }

        let d = match mod_inverse(&e, &phi) {
            Some(d) => d,
            None => continue,
        };

        return RsaKeyMaterial { n, e, d };
    }
}
