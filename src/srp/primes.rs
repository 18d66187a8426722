//! Fixed group parameters for the legacy SRP6 flavor.
//!
//! The client only accepts the 256-bit prime below; the prime, generator and
//! multiplier are protocol constants, not configuration.

use num_bigint::{BigInt, Sign};

/// The 256-bit large safe prime `N`, little-endian. This is the byte order
/// sent over the wire in the challenge response.
pub const LARGE_SAFE_PRIME_LE: [u8; 32] = [
    0xb7, 0x9b, 0x3e, 0x2a, 0x87, 0x82, 0x3c, 0xab, 0x8f, 0x5e, 0xbf, 0xbf, 0x8e, 0xb1, 0x01, 0x08,
    0x53, 0x50, 0x06, 0x29, 0x8b, 0x5b, 0xad, 0xbd, 0x5b, 0x53, 0xe1, 0x89, 0x5e, 0x64, 0x4b, 0x89,
];

/// Generator `g`.
pub const GENERATOR: u8 = 7;

/// Multiplier parameter `k` for the SRP6 variant the client speaks.
pub const K_VALUE: u8 = 3;

pub(crate) fn large_safe_prime() -> BigInt {
    BigInt::from_bytes_le(Sign::Plus, &LARGE_SAFE_PRIME_LE)
}

pub(crate) fn generator() -> BigInt {
    BigInt::from(GENERATOR)
}

pub(crate) fn k_value() -> BigInt {
    BigInt::from(K_VALUE)
}
