//! # JOSE: JSON Object Signing and Encryption
//!
//! JOSE is an IETF standard for securely transferring data between parties
//! using JSON. This crate implements its four components end to end:
//!
//! * JWS (JSON Web Signature): a digital signature over arbitrary data,
//!   proving integrity and authenticity. See [`rfc7515`].
//! * JWE (JSON Web Encryption): confidentiality for arbitrary data, with
//!   pluggable key-management and content-encryption algorithms. See
//!   [`rfc7516`].
//! * JWK (JSON Web Key): a JSON representation of cryptographic key
//!   material, covering `oct`, `RSA`, `EC` (P-256/384/521, `secp256k1`),
//!   and `OKP` (Ed25519/Ed448/X25519/X448). See [`rfc7517`].
//! * JWA (JSON Web Algorithm): the named algorithms `alg`/`enc`/`zip`
//!   identify. See [`rfc7518`] and [`rfc8812`].
//!
//! The top-level functions in this module are the facade most callers need;
//! `jws`/`jwe` expose the full pipeline (JSON general/flattened forms,
//! per-signature reporting, multi-recipient encryption) for callers who need
//! more than single-key compact round trips.
//!
//! [`rfc7515`]: https://datatracker.ietf.org/doc/html/rfc7515
//! [`rfc7516`]: https://datatracker.ietf.org/doc/html/rfc7516
//! [`rfc7517`]: https://datatracker.ietf.org/doc/html/rfc7517
//! [`rfc7518`]: https://datatracker.ietf.org/doc/html/rfc7518
//! [`rfc8812`]: https://datatracker.ietf.org/doc/html/rfc8812

pub mod alg;
pub mod codec;
pub mod error;
pub mod header;
pub mod jwa;
pub mod jwe;
pub mod jwk;
pub mod jws;

pub use error::{Error, Result};
pub use jwk::{Key, KeyCandidate, KeyOperation, KeyUse};

use serde_json::Value;

use crate::alg::{JweRegistry, JwsRegistry};

/// Compose a Compact-serialized JWS, consulting [`JwsRegistry::default_registry`].
///
/// `protected` must be a JSON object and must carry `alg`; the caller picks
/// the algorithm, this crate never infers one from the key.
pub fn sign_compact(protected: &Value, payload: &[u8], key: &Key) -> Result<String> {
    jws::serialize_compact(protected, payload, KeyCandidate::Single(key), JwsRegistry::default_registry())
}

/// Parse and verify a Compact-serialized JWS, returning `{protected, payload}`.
pub fn verify_compact(token: &str, key: &Key) -> Result<Value> {
    jws::deserialize_compact(token, KeyCandidate::Single(key), JwsRegistry::default_registry())
}

/// Parse and verify a Compact-serialized JWS against a key set, resolving
/// by `kid` (or by algorithm match if the set and header leave no ambiguity).
pub fn verify_compact_with_keys(token: &str, keys: &[Key]) -> Result<Value> {
    jws::deserialize_compact(token, KeyCandidate::Set(keys), JwsRegistry::default_registry())
}

/// Compose a Compact-serialized JWE, consulting [`JweRegistry::default_registry`].
pub fn encrypt_compact(header: &Value, plaintext: &[u8], key: &Key) -> Result<String> {
    jwe::encrypt_compact(header, plaintext, key, JweRegistry::default_registry())
}

/// Parse and decrypt a Compact-serialized JWE.
pub fn decrypt_compact(token: &str, key: &Key) -> Result<Vec<u8>> {
    jwe::decrypt_compact(token, KeyCandidate::Single(key), JweRegistry::default_registry())
}

/// Parse and decrypt a Compact-serialized JWE against a key set. Recipients
/// (in the JSON case) and this single compact recipient are resolved the
/// same way: `kid` match first, then first successful decrypt.
pub fn decrypt_compact_with_keys(token: &str, keys: &[Key]) -> Result<Vec<u8>> {
    jwe::decrypt_compact(token, KeyCandidate::Set(keys), JweRegistry::default_registry())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hs256_compact_round_trips() {
        let key = Key::from_oct_secret(b"0123456789abcdef0123456789abcdef".to_vec());
        let header = json!({"alg": "HS256", "typ": "JWT"});
        let token = sign_compact(&header, b"hello", &key).unwrap();
        let decoded = verify_compact(&token, &key).unwrap();
        assert_eq!(decoded["payload"], "hello");
    }

    #[test]
    fn hs256_compact_rejects_tampered_signature() {
        let key = Key::from_oct_secret(b"0123456789abcdef0123456789abcdef".to_vec());
        let header = json!({"alg": "HS256"});
        let mut token = sign_compact(&header, b"hello", &key).unwrap();
        token.push('x');
        assert!(verify_compact(&token, &key).is_err());
    }

    #[test]
    fn none_alg_is_rejected_by_default_registry() {
        let key = Key::from_oct_secret(b"secret".to_vec());
        let header = json!({"alg": "none"});
        assert!(sign_compact(&header, b"hello", &key).is_err());
    }

    #[test]
    fn dir_a128gcm_compact_round_trips() {
        let key = Key::from_oct_secret(vec![7u8; 16]);
        let header = json!({"alg": "dir", "enc": "A128GCM"});
        let token = encrypt_compact(&header, b"top secret", &key).unwrap();
        let plaintext = decrypt_compact(&token, &key).unwrap();
        assert_eq!(plaintext, b"top secret");
    }
}
