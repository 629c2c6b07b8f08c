//! Codec primitives: base64url, big-endian integer <-> octet-string, and
//! deterministic JSON serialization. No dependency on the rest of the crate.

use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
use serde_json::Value;

use crate::error::Error;

/// Encode bytes as base64url without padding.
#[must_use]
pub fn b64url_encode(bytes: impl AsRef<[u8]>) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url (no padding) text, rejecting padding and non-alphabet bytes.
pub fn b64url_decode(text: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
    let text = text.as_ref();
    if text.contains(&b'=') {
        return Err(Error::decode("base64url input must not be padded"));
    }
    BASE64_URL_SAFE_NO_PAD
        .decode(text)
        .map_err(|e| Error::decode(format!("invalid base64url: {e}")))
}

/// Left-pad `n` to exactly `size` bytes, big-endian. Fails if `n` does not fit.
pub fn int_to_octets(n: &[u8], size: usize) -> Result<Vec<u8>, Error> {
    // `n` is assumed already big-endian without a leading sign byte.
    let n = strip_leading_zeros(n);
    if n.len() > size {
        return Err(Error::invalid_key(format!(
            "integer does not fit in {size} bytes (needs {})",
            n.len()
        )));
    }
    let mut out = vec![0u8; size - n.len()];
    out.extend_from_slice(n);
    Ok(out)
}

/// Interpret `bytes` as a big-endian unsigned integer, returned as minimal
/// big-endian octets (no leading zero byte unless the value is zero).
#[must_use]
pub fn octets_to_int(bytes: &[u8]) -> Vec<u8> {
    let stripped = strip_leading_zeros(bytes);
    if stripped.is_empty() {
        vec![0]
    } else {
        stripped.to_vec()
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first_nonzero = bytes.iter().position(|&b| b != 0);
    match first_nonzero {
        Some(idx) => &bytes[idx..],
        None => &[],
    }
}

/// Serialize `value` to deterministic, compact UTF-8 JSON: no insignificant
/// whitespace, and key ordering preserved exactly as constructed (the crate
/// relies on `serde_json`'s `preserve_order` feature so this is just
/// `to_vec`, never a re-sort).
pub fn compact_json(value: &Value) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(value).map_err(|e| Error::decode(format!("failed to serialize JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn b64url_round_trips() {
        let data = b"i";
        let encoded = b64url_encode(data);
        assert_eq!(encoded, "aQ");
        assert_eq!(b64url_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn b64url_rejects_padding() {
        assert!(b64url_decode("aQ==").is_err());
    }

    #[test]
    fn int_to_octets_pads_left() {
        let out = int_to_octets(&[1, 2], 4).unwrap();
        assert_eq!(out, vec![0, 0, 1, 2]);
    }

    #[test]
    fn int_to_octets_rejects_overflow() {
        assert!(int_to_octets(&[1, 2, 3, 4, 5], 2).is_err());
    }

    #[test]
    fn octets_to_int_strips_leading_zeros() {
        assert_eq!(octets_to_int(&[0, 0, 7]), vec![7]);
        assert_eq!(octets_to_int(&[0, 0, 0]), vec![0]);
    }

    #[test]
    fn compact_json_has_no_whitespace() {
        let v: Value = serde_json::from_str(r#"{"alg": "HS256"}"#).unwrap();
        let bytes = compact_json(&v).unwrap();
        assert_eq!(bytes, br#"{"alg":"HS256"}"#);
    }
}
