//! 17TRACK webhook signature verification.
//!
//! 17TRACK signs each push with a plain SHA-256 digest, sent in the `sign`
//! header as lowercase hex of `"{raw_body}/{api_key}"`.

use sha2::{Digest, Sha256};
use tracing::warn;

/// Compute the signature 17TRACK attaches to `body`.
///
/// `body` must be the raw request text exactly as received. Re-serialized
/// JSON will not match.
pub fn sign(body: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}/{}", body, secret).as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a received `sign` header against the raw body.
///
/// The received value is trimmed and lowercased before comparison. An empty
/// value never verifies.
pub fn verify_signature(body: &str, received: &str, secret: &str) -> bool {
    let received = received.trim().to_ascii_lowercase();
    if received.is_empty() {
        warn!("track17_signature_empty");
        return false;
    }

    let expected = sign(body, secret);

    let valid = constant_time_compare(&expected, &received);

    if !valid {
        warn!(
            expected_length = expected.len(),
            actual_length = received.len(),
            "track17_signature_mismatch"
        );
    }

    valid
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
