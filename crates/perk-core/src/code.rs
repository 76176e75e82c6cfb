//! # Coupon Codes
//!
//! Random codes for per-recipient coupons. The alphabet drops `0`, `O`, `1`
//! and `I` so a code read aloud or off a phone screen is unambiguous.
//!
//! 32 symbols × 8 positions ≈ 1.1 × 10¹² codes; collisions are rare and are
//! retried by the caller against the UNIQUE index.

use rand::Rng;

use crate::{COUPON_CODE_ALPHABET, COUPON_CODE_LENGTH};

/// Generates a fresh code with the thread-local RNG.
pub fn generate_code() -> String {
    generate_code_with(&mut rand::thread_rng())
}

/// Generates a code from a caller-supplied RNG (seeded in tests).
pub fn generate_code_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..COUPON_CODE_LENGTH)
        .map(|_| COUPON_CODE_ALPHABET[rng.gen_range(0..COUPON_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Whether `code` could have come from [`generate_code`].
pub fn is_generated_shape(code: &str) -> bool {
    code.len() == COUPON_CODE_LENGTH && code.bytes().all(|b| COUPON_CODE_ALPHABET.contains(&b))
}
