//! HMAC-SHA256 body signatures.
//!
//! Signatures are lowercase hex over the raw request body, keyed by the
//! caller's secret. Verification runs through `Mac::verify_slice`, which
//! compares in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size")
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(body: &[u8], secret: &[u8]) -> String {
    let mut mac = mac(secret);
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Check `signature` (hex, case-insensitive) against `body`.
pub fn verify(signature: &str, body: &[u8], secret: &[u8]) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let mut mac = mac(secret);
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
