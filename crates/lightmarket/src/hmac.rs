use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the raw HMAC-SHA256 tag of `message` under `secret`.
pub fn compute_tag(secret: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Compute the hex-encoded HMAC-SHA256 signature of a webhook body.
pub fn compute_signature(secret: &[u8], body: &[u8]) -> String {
    hex::encode(compute_tag(secret, body))
}

/// Verify a hex HMAC-SHA256 signature against the raw request body.
///
/// The body must be the exact bytes as received on the wire — hashing a
/// re-serialized copy of the parsed JSON produces a different byte sequence
/// and the signature will not match.
///
/// Never panics: a missing, empty, non-hex or wrong-length signature all
/// report `false`. Comparison is constant-time.
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);

    // Malformed hex decodes to zeros so the comparison still runs in
    // constant time instead of bailing early.
    let supplied = hex::decode(signature).unwrap_or_else(|_| vec![0u8; 32]);

    // hmac's verify_slice is constant-time and rejects length mismatches.
    mac.verify_slice(&supplied).is_ok()
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().fold(String::new(), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{b:02x}");
            s
        })
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, ()> {
        if s.is_empty() || s.len() % 2 != 0 || !s.is_ascii() {
            return Err(());
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
            .collect()
    }
}
