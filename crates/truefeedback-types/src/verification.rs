//! One-time email verification codes.
//!
//! A code is six decimal digits, zero-padded, drawn uniformly from
//! `000000..=999999`. It is valid strictly before its expiry instant.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Lifetime of a freshly issued code, in seconds.
pub const CODE_TTL_SECS: i64 = 60 * 60;

pub const CODE_LEN: usize = 6;

/// A code together with the instant it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{:06}", rng.random_range(0..1_000_000u32))
}

pub fn issue(now: DateTime<Utc>) -> IssuedCode {
    IssuedCode {
        code: generate_code(&mut rand::rng()),
        expires_at: now + Duration::seconds(CODE_TTL_SECS),
    }
}

/// Outcome of comparing a submitted code with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Accepted,
    Expired,
    Mismatch,
}

/// Expiry wins over a mismatch: once the code is dead the caller has to
/// re-register whatever they typed.
pub fn check_code(
    stored: &str,
    expires_at: DateTime<Utc>,
    submitted: &str,
    now: DateTime<Utc>,
) -> CodeCheck {
    if now >= expires_at {
        CodeCheck::Expired
    } else if stored == submitted {
        CodeCheck::Accepted
    } else {
        CodeCheck::Mismatch
    }
}
