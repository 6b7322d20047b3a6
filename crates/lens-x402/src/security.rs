//! Secret comparison helpers shared by every service.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compare two secrets without leaking content or length through timing.
///
/// Both sides are hashed to fixed-length digests first; the digests are
/// compared with `subtle::ConstantTimeEq`.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    ha.ct_eq(&hb).into()
}

/// Check an `Authorization: Bearer <token>` header value against `expected`.
pub fn bearer_matches(header: Option<&str>, expected: &str) -> bool {
    let provided = header
        .and_then(|h| h.strip_prefix("Bearer "))
        .unwrap_or("");
    // Compare even when absent so both paths do the same work.
    constant_time_eq(provided.as_bytes(), expected.as_bytes()) && !provided.is_empty()
}
