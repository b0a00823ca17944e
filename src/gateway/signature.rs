//! Payment-callback signature verification.
//!
//! The gateway signs successful checkouts with HMAC-SHA256 over
//! `"{order_id}|{payment_id}"` using the shared key secret. Verifying that
//! signature is the only proof that a success callback originated from the
//! gateway rather than a tampering client.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the expected hex-encoded signature for a (gateway order id,
/// payment id) pair.
pub fn sign(order_id: &str, payment_id: &str, secret: &str) -> String {
    let payload = format!("{}|{}", order_id, payment_id);
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a callback signature. Comparison is constant-time.
pub fn verify(order_id: &str, payment_id: &str, supplied: &str, secret: &str) -> bool {
    let expected = sign(order_id, payment_id, secret);
    constant_time_eq(&expected, supplied)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
