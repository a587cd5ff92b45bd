//! Verification code generation.

use rand::Rng;

/// Smallest code that can be issued
pub const CODE_MIN: u32 = 100_000;

/// Largest code that can be issued
pub const CODE_MAX: u32 = 999_999;

/// Number of digits in every code
pub const CODE_LENGTH: usize = 6;

/// Generate a 6-digit numeric code, uniform over [`CODE_MIN`, `CODE_MAX`].
///
/// Codes are not unique across calls; the store is keyed by email, so a
/// collision between two addresses is harmless.
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX).to_string()
}
