//! End-to-end scenarios across the public facade and the fuller `jws`/`jwe`
//! pipelines: round trips, tamper detection, and the policy surfaces
//! (registries, header validation) a caller actually leans on.

use serde_json::json;

use jose_rs::alg::{JweRegistry, JwsRegistry};
use jose_rs::error::Error;
use jose_rs::header::{HeaderRegistry, ParamSchema, ParamType};
use jose_rs::jwa::{JweKeyManagementAlgorithm, JwsAlgorithm};
use jose_rs::jwe::{self, EncryptRecipient};
use jose_rs::jwk::{EcCurve, EcKeyMaterial, KeyMaterial};
use jose_rs::jws;
use jose_rs::{Key, KeyCandidate, KeyUse, decrypt_compact, encrypt_compact, sign_compact, verify_compact};

fn rsa_keypair(bits: usize) -> (rsa::RsaPublicKey, rsa::RsaPrivateKey) {
    let private = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, bits).expect("rsa key generation");
    let public = private.to_public_key();
    (public, private)
}

fn rsa_key(bits: usize) -> Key {
    let (public, private) = rsa_keypair(bits);
    Key::new(KeyMaterial::Rsa(Box::new(jose_rs::jwk::RsaKeyMaterial::from_keypair(
        public,
        Some(private),
    ))))
}

fn ec_key(curve: EcCurve) -> Key {
    Key::new(KeyMaterial::Ec(EcKeyMaterial::generate(curve)))
}

#[test]
fn rs256_compact_round_trips() {
    let key = rsa_key(2048);
    let header = json!({"alg": "RS256"});
    let token = sign_compact(&header, b"payload", &key).unwrap();
    let decoded = verify_compact(&token, &key).unwrap();
    assert_eq!(decoded["payload"], "payload");
}

#[test]
fn rs256_rejects_verification_with_a_different_key() {
    let signing_key = rsa_key(2048);
    let other_key = rsa_key(2048);
    let header = json!({"alg": "RS256"});
    let token = sign_compact(&header, b"payload", &signing_key).unwrap();
    assert!(matches!(verify_compact(&token, &other_key), Err(Error::BadSignature)));
}

#[test]
fn es256_rejects_a_key_on_the_wrong_curve() {
    let wrong_curve_key = ec_key(EcCurve::P521);
    let header = json!({"alg": "ES256"});
    let err = sign_compact(&header, b"payload", &wrong_curve_key).unwrap_err();
    assert!(matches!(err, Error::InvalidKey(_)));
}

#[test]
fn es256_compact_round_trips_and_rejects_tampering() {
    let key = ec_key(EcCurve::P256);
    let header = json!({"alg": "ES256"});
    let mut token = sign_compact(&header, b"hello world", &key).unwrap();
    let decoded = verify_compact(&token, &key).unwrap();
    assert_eq!(decoded["payload"], "hello world");

    // Flip a byte inside the signature segment.
    let last = token.len() - 1;
    let flipped = if token.as_bytes()[last] == b'A' { 'B' } else { 'A' };
    token.replace_range(last.., &flipped.to_string());
    assert!(matches!(verify_compact(&token, &key), Err(Error::BadSignature)));
}

#[test]
fn crit_header_naming_an_unregistered_extension_is_rejected() {
    let key = Key::from_oct_secret(b"0123456789abcdef0123456789abcdef".to_vec());
    // Strict unknown-parameter rejection is off here so the failure we
    // observe is specifically the crit check, not the stricter one.
    let registry = JwsRegistry::builder().strict_check_header(false).build();
    let header = json!({"alg": "HS256", "act": "transfer", "crit": ["act"]});
    let err = jws::serialize_compact(&header, b"payload", KeyCandidate::Single(&key), &registry).unwrap_err();
    assert!(matches!(err, Error::CriticalHeader(_)));
}

#[test]
fn crit_header_is_accepted_once_the_extension_is_registered() {
    let key = Key::from_oct_secret(b"0123456789abcdef0123456789abcdef".to_vec());
    let header_registry = HeaderRegistry::new().with_param("act", ParamSchema::required(ParamType::String));
    let registry = JwsRegistry::builder().header_registry(header_registry).build();
    let header = json!({"alg": "HS256", "act": "transfer", "crit": ["act"]});
    let token = jws::serialize_compact(&header, b"payload", KeyCandidate::Single(&key), &registry).unwrap();
    let decoded = jws::deserialize_compact(&token, KeyCandidate::Single(&key), &registry).unwrap();
    assert_eq!(decoded["payload"], "payload");
}

#[test]
fn unregistered_header_parameter_is_rejected_in_strict_mode() {
    let key = Key::from_oct_secret(b"secret-key-material".to_vec());
    let header = json!({"alg": "HS256", "x-custom": "value"});
    // `JwsRegistry::default_registry()` has `strict_check_header` enabled.
    let err = sign_compact(&header, b"payload", &key).unwrap_err();
    assert!(matches!(err, Error::InvalidHeaderValue { .. }));
}

#[test]
fn unregistered_header_parameter_is_allowed_once_strict_mode_is_disabled() {
    let key = Key::from_oct_secret(b"secret-key-material".to_vec());
    let registry = JwsRegistry::builder().strict_check_header(false).build();
    let header = json!({"alg": "HS256", "x-custom": "value"});
    let token = jws::serialize_compact(&header, b"payload", KeyCandidate::Single(&key), &registry).unwrap();
    assert!(jws::deserialize_compact(&token, KeyCandidate::Single(&key), &registry).is_ok());
}

#[test]
fn json_form_reports_one_result_per_signature() {
    let key_a = Key::from_oct_secret(b"first-signer-secret-key".to_vec()).with_kid("a");
    let key_b = Key::from_oct_secret(b"second-signer-secret-key".to_vec()).with_kid("b");
    let signers = vec![
        jws::JsonSigner { protected: json!({"alg": "HS256", "kid": "a"}), unprotected: None, key: &key_a },
        jws::JsonSigner { protected: json!({"alg": "HS256", "kid": "b"}), unprotected: None, key: &key_b },
    ];
    let serialized = jws::serialize_json(b"shared payload", &signers, JwsRegistry::default_registry()).unwrap();

    let wrong_key_b = Key::from_oct_secret(b"not-the-real-secret-key".to_vec()).with_kid("b");
    // Verify with a key set where `b`'s secret is wrong: that signature
    // should fail independently, `a`'s should still succeed.
    let decoded = jws::deserialize_json(
        &serialized,
        KeyCandidate::Set(&[key_a, wrong_key_b]),
        JwsRegistry::default_registry(),
    )
    .unwrap();
    assert_eq!(decoded.signatures.len(), 2);
    assert!(decoded.any_valid());
    assert!(!decoded.all_valid());
}

#[test]
fn dir_a128gcm_compact_round_trips_and_detects_ciphertext_tampering() {
    let key = Key::from_oct_secret(vec![9u8; 16]);
    let header = json!({"alg": "dir", "enc": "A128GCM"});
    let mut token = encrypt_compact(&header, b"confidential payload", &key).unwrap();
    let plaintext = decrypt_compact(&token, &key).unwrap();
    assert_eq!(plaintext, b"confidential payload");

    let last = token.len() - 1;
    let flipped = if token.as_bytes()[last] == b'A' { 'B' } else { 'A' };
    token.replace_range(last.., &flipped.to_string());
    assert!(decrypt_compact(&token, &key).is_err());
}

#[test]
fn ecdh_es_a128gcm_compact_round_trips() {
    let recipient = ec_key(EcCurve::P256).with_use(KeyUse::Encryption);
    let header = json!({"alg": "ECDH-ES", "enc": "A128GCM"});
    let token = encrypt_compact(&header, b"agreed in secret", &recipient).unwrap();
    let plaintext = decrypt_compact(&token, &recipient).unwrap();
    assert_eq!(plaintext, b"agreed in secret");
}

#[test]
fn ecdh_es_a128kw_compact_round_trips_with_an_ephemeral_key_per_message() {
    let recipient = ec_key(EcCurve::P256).with_use(KeyUse::Encryption);
    let header = json!({"alg": "ECDH-ES+A128KW", "enc": "A128CBC-HS256"});
    let token_one = encrypt_compact(&header, b"message one", &recipient).unwrap();
    let token_two = encrypt_compact(&header, b"message one", &recipient).unwrap();
    // Same plaintext, same key: ciphertexts must still differ, since a
    // fresh ephemeral key (and CEK) is generated per message.
    assert_ne!(token_one, token_two);
    assert_eq!(decrypt_compact(&token_one, &recipient).unwrap(), b"message one");
    assert_eq!(decrypt_compact(&token_two, &recipient).unwrap(), b"message one");
}

#[test]
fn rsa_oaep_256_compact_round_trips() {
    let key = rsa_key(2048).with_use(KeyUse::Encryption);
    let header = json!({"alg": "RSA-OAEP-256", "enc": "A256GCM"});
    let token = encrypt_compact(&header, b"rsa wrapped secret", &key).unwrap();
    assert_eq!(decrypt_compact(&token, &key).unwrap(), b"rsa wrapped secret");
}

#[test]
fn rsa1_5_is_excluded_from_the_default_registry() {
    let key = rsa_key(2048).with_use(KeyUse::Encryption);
    let header = json!({"alg": "RSA1_5", "enc": "A128CBC-HS256"});
    let err = jwe::encrypt_compact(&header, b"payload", &key, JweRegistry::default_registry()).unwrap_err();
    assert!(matches!(err, Error::AlgorithmNotAllowed(_)));

    let registry = JweRegistry::builder().allow_alg(JweKeyManagementAlgorithm::Rsa1_5).build();
    assert!(jwe::encrypt_compact(&header, b"payload", &key, &registry).is_ok());
}

#[test]
fn json_multi_recipient_each_party_decrypts_with_their_own_key() {
    let alice = Key::from_oct_secret(vec![1u8; 16]).with_kid("alice");
    let bob = Key::from_oct_secret(vec![2u8; 16]).with_kid("bob");
    let recipients = vec![
        EncryptRecipient { header: Some(json!({"alg": "A128KW", "kid": "alice"})), key: &alice },
        EncryptRecipient { header: Some(json!({"alg": "A128KW", "kid": "bob"})), key: &bob },
    ];
    let protected = json!({"enc": "A128GCM"});
    let encrypted = jwe::encrypt_json(
        Some(&protected),
        None,
        &recipients,
        b"shared secret for two parties",
        None,
        JweRegistry::default_registry(),
    )
    .unwrap();
    assert!(encrypted.get("recipients").unwrap().as_array().unwrap().len() == 2);

    let plaintext_for_alice = jwe::decrypt_json(&encrypted, KeyCandidate::Single(&alice), JweRegistry::default_registry()).unwrap();
    let plaintext_for_bob = jwe::decrypt_json(&encrypted, KeyCandidate::Single(&bob), JweRegistry::default_registry()).unwrap();
    assert_eq!(plaintext_for_alice, b"shared secret for two parties");
    assert_eq!(plaintext_for_bob, b"shared secret for two parties");
}

#[test]
fn json_multi_recipient_rejects_direct_mode_algorithms() {
    let alice = Key::from_oct_secret(vec![1u8; 16]).with_kid("alice");
    let bob = Key::from_oct_secret(vec![2u8; 16]).with_kid("bob");
    let recipients = vec![
        EncryptRecipient { header: Some(json!({"alg": "dir", "kid": "alice"})), key: &alice },
        EncryptRecipient { header: Some(json!({"alg": "dir", "kid": "bob"})), key: &bob },
    ];
    let protected = json!({"enc": "A128GCM"});
    let err = jwe::encrypt_json(
        Some(&protected),
        None,
        &recipients,
        b"payload",
        None,
        JweRegistry::default_registry(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidHeaderValue { .. }));
}

#[test]
fn key_thumbprint_is_stable_across_calls_and_differs_between_keys() {
    let a = Key::from_oct_secret(b"one-secret".to_vec());
    let b = Key::from_oct_secret(b"a-different-secret".to_vec());
    assert_eq!(a.thumbprint().unwrap(), a.thumbprint().unwrap());
    assert_ne!(a.thumbprint().unwrap(), b.thumbprint().unwrap());
}

#[test]
fn none_algorithm_is_rejected_unless_explicitly_allow_listed() {
    let key = Key::from_oct_secret(b"unused".to_vec());
    let header = json!({"alg": "none"});
    assert!(matches!(
        sign_compact(&header, b"payload", &key),
        Err(Error::AlgorithmNotAllowed(_))
    ));

    let registry = JwsRegistry::builder().allow_none().build();
    let token = jws::serialize_compact(&header, b"payload", KeyCandidate::Single(&key), &registry).unwrap();
    assert!(token.ends_with('.'));
    let decoded = jws::deserialize_compact(&token, KeyCandidate::Single(&key), &registry).unwrap();
    assert_eq!(decoded["payload"], "payload");
}

#[test]
fn wrong_key_use_is_rejected_before_touching_the_algorithm() {
    let signing_only_key = Key::from_oct_secret(b"secret".to_vec()).with_use(KeyUse::Signature);
    let header = json!({"alg": "dir", "enc": "A128GCM"});
    let err = jwe::encrypt_compact(&header, b"payload", &signing_only_key, JweRegistry::default_registry())
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedKeyUse { .. }));
}

#[test]
fn alg_none_signature_segment_must_be_empty() {
    let key = Key::from_oct_secret(b"unused".to_vec());
    let registry = JwsRegistry::builder().allow_none().build();
    let header = json!({"alg": "none"});
    let mut token = jws::serialize_compact(&header, b"payload", KeyCandidate::Single(&key), &registry).unwrap();
    // Valid base64url, decodes to non-empty bytes: the unsecured `none`
    // algorithm requires an empty signature segment.
    token.push_str("AAAA");
    assert!(matches!(
        jws::deserialize_compact(&token, KeyCandidate::Single(&key), &registry),
        Err(Error::BadSignature)
    ));
}
