//! [C6] JWE pipeline: compose and decrypt Compact and JSON (flattened +
//! general) encryptions.
//!
//! The teacher carries no JWE code at all (`rama_crypto::jose` stops at
//! JWS/JWK), so this module is built fresh on top of the C3 primitives in
//! `crate::alg::{jwe_keymgmt, jwe_enc, zip}`, in the same "typed pipeline
//! over a registry" shape `crate::jws` already established for JWS.

use serde_json::{Map, Value, json};

use crate::alg::{JweRegistry, jwe_enc, jwe_keymgmt, zip as zip_mod};
use crate::codec::{b64url_decode, b64url_encode, compact_json};
use crate::error::Error;
use crate::header;
use crate::jwa::{JweCompression, JweContentEncryption, JweKeyManagementAlgorithm};
use crate::jwk::{EcKeyMaterial, Key, KeyCandidate, KeyMaterial, Operation, OkpKeyMaterial, guess_key};

/// PBES2 iteration count this crate picks when composing a new encryption
/// and the caller hasn't pinned one; well above the RFC 7518 section
/// 4.8.1.2 floor of 1000 ([`jwe_keymgmt::MIN_PBES2_ITERATIONS`]).
const DEFAULT_PBES2_ITERATIONS: u32 = 310_000;

fn resolve_enc(merged: &Map<String, Value>) -> Result<JweContentEncryption, Error> {
    let name = merged.get("enc").and_then(Value::as_str).ok_or(Error::MissingHeader("enc"))?;
    serde_json::from_value(json!(name)).map_err(|_| Error::UnknownAlgorithm(name.to_owned()))
}

fn resolve_alg(merged: &Map<String, Value>, registry: &JweRegistry) -> Result<JweKeyManagementAlgorithm, Error> {
    let name = merged.get("alg").and_then(Value::as_str).ok_or(Error::MissingHeader("alg"))?;
    let alg: JweKeyManagementAlgorithm =
        serde_json::from_value(json!(name)).map_err(|_| Error::UnknownAlgorithm(name.to_owned()))?;
    if !registry.is_alg_enabled(alg) {
        return Err(Error::AlgorithmNotAllowed(name.to_owned()));
    }
    Ok(alg)
}

fn resolve_zip(merged: &Map<String, Value>, registry: &JweRegistry) -> Result<Option<JweCompression>, Error> {
    let Some(name) = merged.get("zip").and_then(Value::as_str) else {
        return Ok(None);
    };
    let zip: JweCompression = serde_json::from_value(json!(name)).map_err(|_| Error::UnknownAlgorithm(name.to_owned()))?;
    if !registry.is_zip_enabled(zip) {
        return Err(Error::AlgorithmNotAllowed(name.to_owned()));
    }
    Ok(Some(zip))
}

fn b64url_header_field(merged: &Map<String, Value>, name: &'static str) -> Result<Vec<u8>, Error> {
    let text = merged.get(name).and_then(Value::as_str).ok_or(Error::MissingHeader(name))?;
    b64url_decode(text)
}

fn optional_b64url_header_field(merged: &Map<String, Value>, name: &'static str) -> Result<Vec<u8>, Error> {
    match merged.get(name).and_then(Value::as_str) {
        Some(text) => b64url_decode(text),
        None => Ok(Vec::new()),
    }
}

/// A sender-generated ephemeral key on the same curve family as `peer`'s
/// key material, plus its exported-public `epk` value.
fn generate_ephemeral(peer: &Key) -> Result<(Key, Value), Error> {
    let key = match &peer.material {
        KeyMaterial::Ec(ec) => Key::new(KeyMaterial::Ec(EcKeyMaterial::generate(ec.curve()))),
        KeyMaterial::Okp(okp) => Key::new(KeyMaterial::Okp(OkpKeyMaterial::generate(okp.curve())?)),
        _ => return Err(Error::invalid_key("ECDH-ES requires an EC or OKP key")),
    };
    let epk = key.export_jwk(false)?;
    Ok((key, epk))
}

/// Wrap (or directly derive) the content-encryption key for one recipient.
/// `shared_cek` is `Some` for every algorithm except the direct modes,
/// which compute their own CEK via key agreement.
fn wrap_cek(
    alg: JweKeyManagementAlgorithm,
    enc: JweContentEncryption,
    key: &Key,
    header_in: &Map<String, Value>,
    shared_cek: Option<&[u8]>,
) -> Result<(Vec<u8>, Vec<u8>, jwe_keymgmt::HeaderUpdates), Error> {
    key.check_use(Operation::Encrypt)?;
    key.check_alg(alg.name())?;

    match alg {
        JweKeyManagementAlgorithm::Dir => {
            let cek = oct_secret(key)?.to_vec();
            Ok((cek, Vec::new(), Map::new()))
        }
        JweKeyManagementAlgorithm::EcdhEs => {
            key.check_ops(Operation::DeriveBits)?;
            let (ephemeral, epk) = generate_ephemeral(key)?;
            let peer_public = key.export_jwk(false)?;
            let shared_secret = jwe_keymgmt::ecdh_shared_secret(&ephemeral, &peer_public)?;
            let apu = optional_b64url_header_field(header_in, "apu")?;
            let apv = optional_b64url_header_field(header_in, "apv")?;
            let cek = jwe_keymgmt::concat_kdf(
                &shared_secret,
                (enc.cek_size() * 8) as u32,
                jwe_keymgmt::concat_kdf_algorithm_id(alg, enc).as_bytes(),
                &apu,
                &apv,
            );
            let mut updates = Map::new();
            updates.insert("epk".to_owned(), epk);
            Ok((cek, Vec::new(), updates))
        }
        JweKeyManagementAlgorithm::EcdhEsA128Kw
        | JweKeyManagementAlgorithm::EcdhEsA192Kw
        | JweKeyManagementAlgorithm::EcdhEsA256Kw => {
            key.check_ops(Operation::WrapKey)?;
            let cek = shared_cek.expect("key-wrap modes always carry a pre-generated CEK").to_vec();
            let (ephemeral, epk) = generate_ephemeral(key)?;
            let peer_public = key.export_jwk(false)?;
            let shared_secret = jwe_keymgmt::ecdh_shared_secret(&ephemeral, &peer_public)?;
            let apu = optional_b64url_header_field(header_in, "apu")?;
            let apv = optional_b64url_header_field(header_in, "apv")?;
            let kek = jwe_keymgmt::concat_kdf(
                &shared_secret,
                jwe_keymgmt::concat_kdf_key_len_bits(alg, enc)?,
                jwe_keymgmt::concat_kdf_algorithm_id(alg, enc).as_bytes(),
                &apu,
                &apv,
            );
            let encrypted_key = jwe_keymgmt::aes_kw_wrap(&kek, &cek)?;
            let mut updates = Map::new();
            updates.insert("epk".to_owned(), epk);
            Ok((cek, encrypted_key, updates))
        }
        JweKeyManagementAlgorithm::A128Kw | JweKeyManagementAlgorithm::A192Kw | JweKeyManagementAlgorithm::A256Kw => {
            key.check_ops(Operation::WrapKey)?;
            let cek = shared_cek.expect("key-wrap modes always carry a pre-generated CEK").to_vec();
            let encrypted_key = jwe_keymgmt::aes_kw_wrap(oct_secret(key)?, &cek)?;
            Ok((cek, encrypted_key, Map::new()))
        }
        JweKeyManagementAlgorithm::A128GcmKw | JweKeyManagementAlgorithm::A192GcmKw | JweKeyManagementAlgorithm::A256GcmKw => {
            key.check_ops(Operation::WrapKey)?;
            let cek = shared_cek.expect("key-wrap modes always carry a pre-generated CEK").to_vec();
            let (encrypted_key, updates) = jwe_keymgmt::aes_gcmkw_wrap(oct_secret(key)?, &cek)?;
            Ok((cek, encrypted_key, updates))
        }
        JweKeyManagementAlgorithm::Pbes2Hs256A128Kw
        | JweKeyManagementAlgorithm::Pbes2Hs384A192Kw
        | JweKeyManagementAlgorithm::Pbes2Hs512A256Kw => {
            key.check_ops(Operation::WrapKey)?;
            let cek = shared_cek.expect("key-wrap modes always carry a pre-generated CEK").to_vec();
            let (encrypted_key, updates) = jwe_keymgmt::pbes2_wrap(alg, oct_secret(key)?, &cek, DEFAULT_PBES2_ITERATIONS)?;
            Ok((cek, encrypted_key, updates))
        }
        JweKeyManagementAlgorithm::Rsa1_5 | JweKeyManagementAlgorithm::RsaOaep | JweKeyManagementAlgorithm::RsaOaep256 => {
            key.check_ops(Operation::WrapKey)?;
            let cek = shared_cek.expect("key-wrap modes always carry a pre-generated CEK").to_vec();
            let encrypted_key = jwe_keymgmt::rsa_wrap(alg, key, &cek)?;
            Ok((cek, encrypted_key, Map::new()))
        }
    }
}

fn unwrap_cek(
    alg: JweKeyManagementAlgorithm,
    enc: JweContentEncryption,
    key: &Key,
    merged: &Map<String, Value>,
    encrypted_key: &[u8],
) -> Result<Vec<u8>, Error> {
    key.check_use(Operation::Decrypt)?;
    key.check_alg(alg.name())?;

    match alg {
        JweKeyManagementAlgorithm::Dir => Ok(oct_secret(key)?.to_vec()),
        JweKeyManagementAlgorithm::EcdhEs => {
            key.check_ops(Operation::DeriveBits)?;
            let epk = merged.get("epk").ok_or(Error::MissingHeader("epk"))?;
            let shared_secret = jwe_keymgmt::ecdh_shared_secret(key, epk)?;
            let apu = optional_b64url_header_field(merged, "apu")?;
            let apv = optional_b64url_header_field(merged, "apv")?;
            Ok(jwe_keymgmt::concat_kdf(
                &shared_secret,
                (enc.cek_size() * 8) as u32,
                jwe_keymgmt::concat_kdf_algorithm_id(alg, enc).as_bytes(),
                &apu,
                &apv,
            ))
        }
        JweKeyManagementAlgorithm::EcdhEsA128Kw
        | JweKeyManagementAlgorithm::EcdhEsA192Kw
        | JweKeyManagementAlgorithm::EcdhEsA256Kw => {
            key.check_ops(Operation::UnwrapKey)?;
            let epk = merged.get("epk").ok_or(Error::MissingHeader("epk"))?;
            let shared_secret = jwe_keymgmt::ecdh_shared_secret(key, epk)?;
            let apu = optional_b64url_header_field(merged, "apu")?;
            let apv = optional_b64url_header_field(merged, "apv")?;
            let kek = jwe_keymgmt::concat_kdf(
                &shared_secret,
                jwe_keymgmt::concat_kdf_key_len_bits(alg, enc)?,
                jwe_keymgmt::concat_kdf_algorithm_id(alg, enc).as_bytes(),
                &apu,
                &apv,
            );
            jwe_keymgmt::aes_kw_unwrap(&kek, encrypted_key)
        }
        JweKeyManagementAlgorithm::A128Kw | JweKeyManagementAlgorithm::A192Kw | JweKeyManagementAlgorithm::A256Kw => {
            key.check_ops(Operation::UnwrapKey)?;
            jwe_keymgmt::aes_kw_unwrap(oct_secret(key)?, encrypted_key)
        }
        JweKeyManagementAlgorithm::A128GcmKw | JweKeyManagementAlgorithm::A192GcmKw | JweKeyManagementAlgorithm::A256GcmKw => {
            key.check_ops(Operation::UnwrapKey)?;
            let iv = b64url_header_field(merged, "iv")?;
            let tag = b64url_header_field(merged, "tag")?;
            jwe_keymgmt::aes_gcmkw_unwrap(oct_secret(key)?, encrypted_key, &iv, &tag)
        }
        JweKeyManagementAlgorithm::Pbes2Hs256A128Kw
        | JweKeyManagementAlgorithm::Pbes2Hs384A192Kw
        | JweKeyManagementAlgorithm::Pbes2Hs512A256Kw => {
            key.check_ops(Operation::UnwrapKey)?;
            let p2s = b64url_header_field(merged, "p2s")?;
            let p2c = merged.get("p2c").and_then(Value::as_u64).ok_or(Error::MissingHeader("p2c"))? as u32;
            jwe_keymgmt::pbes2_unwrap(alg, oct_secret(key)?, encrypted_key, &p2s, p2c)
        }
        JweKeyManagementAlgorithm::Rsa1_5 | JweKeyManagementAlgorithm::RsaOaep | JweKeyManagementAlgorithm::RsaOaep256 => {
            key.check_ops(Operation::UnwrapKey)?;
            jwe_keymgmt::rsa_unwrap(alg, key, encrypted_key)
        }
    }
}

fn oct_secret(key: &Key) -> Result<&[u8], Error> {
    match &key.material {
        KeyMaterial::Oct(oct) => Ok(oct.secret()),
        _ => Err(Error::invalid_key("this algorithm requires an oct key")),
    }
}

fn apply_compression(zip: Option<JweCompression>, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    match zip {
        Some(z) => zip_mod::compress(z, plaintext),
        None => Ok(plaintext.to_vec()),
    }
}

fn undo_compression(zip: Option<JweCompression>, plaintext: Vec<u8>) -> Result<Vec<u8>, Error> {
    match zip {
        Some(z) => zip_mod::decompress(z, &plaintext),
        None => Ok(plaintext),
    }
}

fn compute_aad(protected_b64: &str, extra_aad: Option<&[u8]>) -> Vec<u8> {
    let mut aad = protected_b64.as_bytes().to_vec();
    if let Some(extra) = extra_aad {
        aad.push(b'.');
        aad.extend_from_slice(b64url_encode(extra).as_bytes());
    }
    aad
}

/// Compose a Compact-serialized JWE (RFC 7516 section 7.1): exactly one
/// recipient, all per-recipient header additions folded into the single
/// protected header.
pub fn encrypt_compact(header: &Value, plaintext: &[u8], key: &Key, registry: &JweRegistry) -> Result<String, Error> {
    let header_obj = header.as_object().ok_or_else(|| Error::decode("header must be a JSON object"))?;
    let enc = resolve_enc(header_obj)?;
    if !registry.is_enc_enabled(enc) {
        return Err(Error::AlgorithmNotAllowed(enc.name().to_owned()));
    }
    let alg = resolve_alg(header_obj, registry)?;
    let zip = resolve_zip(header_obj, registry)?;
    let names = header_obj.keys().cloned().collect();
    header::validate(header_obj, &names, &registry.header_registry, registry.strict_check_header)?;

    let shared_cek = if alg.is_direct_mode() { None } else { Some(jwe_keymgmt::generate_cek(enc)) };
    let (cek, encrypted_key, updates) = wrap_cek(alg, enc, key, header_obj, shared_cek.as_deref())?;

    let mut protected = header_obj.clone();
    protected.extend(updates);

    let plaintext = apply_compression(zip, plaintext)?;
    let iv = jwe_keymgmt::generate_iv(enc);
    let protected_b64 = b64url_encode(compact_json(&Value::Object(protected))?);
    let aad = compute_aad(&protected_b64, None);
    let (ciphertext, tag) = jwe_enc::encrypt(enc, &plaintext, &cek, &iv, &aad)?;

    tracing::debug!(alg = alg.name(), enc = enc.name(), "JWE compact encryption composed");
    Ok(format!(
        "{protected_b64}.{}.{}.{}.{}",
        b64url_encode(encrypted_key),
        b64url_encode(&iv),
        b64url_encode(ciphertext),
        b64url_encode(tag)
    ))
}

/// Parse and decrypt a Compact-serialized JWE.
pub fn decrypt_compact(token: &str, candidate: KeyCandidate<'_>, registry: &JweRegistry) -> Result<Vec<u8>, Error> {
    let parts: Vec<&str> = token.split('.').collect();
    let [protected_b64, encrypted_key_b64, iv_b64, ciphertext_b64, tag_b64] = parts.as_slice() else {
        return Err(Error::decode("compact JWE must have exactly five segments"));
    };

    let protected_bytes = b64url_decode(protected_b64)?;
    let protected: Value = serde_json::from_slice(&protected_bytes).map_err(|e| Error::decode(e.to_string()))?;
    let header_obj = protected.as_object().ok_or_else(|| Error::decode("protected header must be a JSON object"))?;

    let enc = resolve_enc(header_obj)?;
    if !registry.is_enc_enabled(enc) {
        return Err(Error::AlgorithmNotAllowed(enc.name().to_owned()));
    }
    let alg = resolve_alg(header_obj, registry)?;
    let zip = resolve_zip(header_obj, registry)?;
    let names = header_obj.keys().cloned().collect();
    header::validate(header_obj, &names, &registry.header_registry, registry.strict_check_header)?;

    let key = guess_key(candidate, header_obj.get("kid").and_then(Value::as_str), alg.name())?;
    let encrypted_key = b64url_decode(encrypted_key_b64)?;
    let cek = unwrap_cek(alg, enc, key, header_obj, &encrypted_key)?;

    let iv = b64url_decode(iv_b64)?;
    let ciphertext = b64url_decode(ciphertext_b64)?;
    let tag = b64url_decode(tag_b64)?;
    let aad = compute_aad(protected_b64, None);
    let plaintext = jwe_enc::decrypt(enc, &ciphertext, &cek, &iv, &aad, &tag)?;
    tracing::debug!(alg = alg.name(), enc = enc.name(), "JWE compact decryption verified");
    undo_compression(zip, plaintext)
}

/// One recipient's key for [`encrypt_json`]: its own per-recipient
/// unprotected header plus the key to wrap (or derive) the CEK with.
pub struct EncryptRecipient<'a> {
    pub header: Option<Value>,
    pub key: &'a Key,
}

/// Compose a general-form JSON JWE (RFC 7516 section 7.2). Flattened form
/// is this with exactly one recipient, hoisted at the serialization
/// boundary (see `lib.rs`'s facade). Direct-mode algorithms (`dir`,
/// `ECDH-ES`) are only valid with exactly one recipient, since their CEK
/// is inseparable from that recipient's key agreement.
pub fn encrypt_json(
    protected: Option<&Value>,
    unprotected: Option<&Value>,
    recipients: &[EncryptRecipient<'_>],
    plaintext: &[u8],
    aad: Option<&[u8]>,
    registry: &JweRegistry,
) -> Result<Value, Error> {
    if recipients.is_empty() {
        return Err(Error::invalid_header("recipients", "at least one recipient is required"));
    }
    let protected_obj = protected.and_then(Value::as_object).cloned().unwrap_or_default();
    let unprotected_obj = unprotected.and_then(Value::as_object).cloned().unwrap_or_default();

    let mut per_recipient_merged = Vec::with_capacity(recipients.len());
    for r in recipients {
        let recipient_header = r.header.as_ref().and_then(Value::as_object).cloned().unwrap_or_default();
        header::assert_disjoint(&[&protected_obj, &unprotected_obj, &recipient_header])?;
        per_recipient_merged.push(header::merge(&[&protected_obj, &unprotected_obj, &recipient_header]));
    }

    let enc = resolve_enc(&per_recipient_merged[0])?;
    if !registry.is_enc_enabled(enc) {
        return Err(Error::AlgorithmNotAllowed(enc.name().to_owned()));
    }
    let zip = resolve_zip(&per_recipient_merged[0])?;
    let protected_names: std::collections::HashSet<String> = protected_obj.keys().cloned().collect();

    let mut resolved_algs = Vec::with_capacity(recipients.len());
    for merged in &per_recipient_merged {
        header::validate(merged, &protected_names, &registry.header_registry, registry.strict_check_header)?;
        resolved_algs.push(resolve_alg(merged, registry)?);
    }
    if recipients.len() > 1 && resolved_algs.iter().any(|a| a.is_direct_mode()) {
        return Err(Error::invalid_header(
            "alg",
            "direct and ECDH-ES direct modes cannot be used with more than one recipient",
        ));
    }

    let shared_cek = if resolved_algs[0].is_direct_mode() { None } else { Some(jwe_keymgmt::generate_cek(enc)) };

    let mut protected_updates = Map::new();
    let mut entries = Vec::with_capacity(recipients.len());
    let mut cek = shared_cek.clone();
    for (i, r) in recipients.iter().enumerate() {
        let (this_cek, encrypted_key, updates) =
            wrap_cek(resolved_algs[i], enc, r.key, &per_recipient_merged[i], shared_cek.as_deref())?;
        cek = Some(this_cek);

        let mut entry = Map::new();
        let mut header_obj = r.header.as_ref().and_then(Value::as_object).cloned().unwrap_or_default();
        if recipients.len() == 1 {
            // Single-recipient JSON form folds per-recipient additions
            // (epk, iv, tag, p2s, p2c) into the shared header view, same
            // as compact does, rather than a recipient-local "header".
            protected_updates.extend(updates);
        } else {
            header_obj.extend(updates);
        }
        if !header_obj.is_empty() {
            entry.insert("header".to_owned(), Value::Object(header_obj));
        }
        entry.insert("encrypted_key".to_owned(), json!(b64url_encode(encrypted_key)));
        entries.push(Value::Object(entry));
    }
    let cek = cek.expect("at least one recipient was processed");

    let mut final_protected = protected_obj;
    final_protected.extend(protected_updates);
    let plaintext = apply_compression(zip, plaintext)?;
    let iv = jwe_keymgmt::generate_iv(enc);

    let protected_b64 = if final_protected.is_empty() {
        String::new()
    } else {
        b64url_encode(compact_json(&Value::Object(final_protected.clone()))?)
    };
    let mut aad_bytes = protected_b64.as_bytes().to_vec();
    if let Some(extra) = aad {
        aad_bytes.push(b'.');
        aad_bytes.extend_from_slice(b64url_encode(extra).as_bytes());
    }
    let (ciphertext, tag) = jwe_enc::encrypt(enc, &plaintext, &cek, &iv, &aad_bytes)?;

    let mut out = Map::new();
    if !final_protected.is_empty() {
        out.insert("protected".to_owned(), json!(protected_b64));
    }
    if !unprotected_obj.is_empty() {
        out.insert("unprotected".to_owned(), Value::Object(unprotected_obj));
    }
    out.insert("iv".to_owned(), json!(b64url_encode(&iv)));
    out.insert("ciphertext".to_owned(), json!(b64url_encode(ciphertext)));
    out.insert("tag".to_owned(), json!(b64url_encode(tag)));
    if let Some(extra) = aad {
        out.insert("aad".to_owned(), json!(b64url_encode(extra)));
    }
    if entries.len() == 1 {
        if let Value::Object(entry) = entries.into_iter().next().expect("checked non-empty above") {
            for (k, v) in entry {
                out.insert(k, v);
            }
        }
    } else {
        out.insert("recipients".to_owned(), Value::Array(entries));
    }
    tracing::debug!(enc = enc.name(), recipients = recipients.len(), "JWE JSON encryption composed");
    Ok(Value::Object(out))
}

/// Parse and decrypt a JSON-form JWE (general or flattened).
///
/// Recipients are tried in order: first a `kid` match against the caller's
/// key candidate, and failing that, the first recipient whose unwrap and
/// content decryption both succeed.
pub fn decrypt_json(value: &Value, candidate: KeyCandidate<'_>, registry: &JweRegistry) -> Result<Vec<u8>, Error> {
    let obj = value.as_object().ok_or_else(|| Error::decode("JSON JWE must be an object"))?;
    let protected_obj: Map<String, Value> = match obj.get("protected").and_then(Value::as_str) {
        Some(p) => serde_json::from_slice(&b64url_decode(p)?)
            .map_err(|e| Error::decode(e.to_string()))
            .and_then(|v: Value| v.as_object().cloned().ok_or_else(|| Error::decode("protected header must be an object")))?,
        None => Map::new(),
    };
    let unprotected_obj = obj.get("unprotected").and_then(Value::as_object).cloned().unwrap_or_default();
    let protected_b64 = obj.get("protected").and_then(Value::as_str).unwrap_or("");

    let recipient_entries: Vec<Map<String, Value>> = if let Some(list) = obj.get("recipients").and_then(Value::as_array) {
        list.iter()
            .map(|v| v.as_object().cloned().ok_or_else(|| Error::decode("each recipient must be an object")))
            .collect::<Result<_, _>>()?
    } else {
        vec![obj.clone()]
    };
    if recipient_entries.is_empty() {
        return Err(Error::invalid_header("recipients", "must be non-empty"));
    }

    let protected_names: std::collections::HashSet<String> = protected_obj.keys().cloned().collect();
    let iv = b64url_decode(obj.get("iv").and_then(Value::as_str).ok_or(Error::MissingHeader("iv"))?)?;
    let ciphertext = b64url_decode(obj.get("ciphertext").and_then(Value::as_str).ok_or(Error::MissingHeader("ciphertext"))?)?;
    let tag = b64url_decode(obj.get("tag").and_then(Value::as_str).ok_or(Error::MissingHeader("tag"))?)?;
    let extra_aad = obj.get("aad").and_then(Value::as_str).map(b64url_decode).transpose()?;

    let mut aad_bytes = protected_b64.as_bytes().to_vec();
    if let Some(extra) = &extra_aad {
        aad_bytes.push(b'.');
        aad_bytes.extend_from_slice(b64url_encode(extra).as_bytes());
    }

    let candidate_kid = match candidate {
        KeyCandidate::Single(k) => k.kid.clone(),
        KeyCandidate::Set(_) => None,
    };

    let mut ordered: Vec<&Map<String, Value>> = recipient_entries.iter().collect();
    if let Some(kid) = &candidate_kid {
        ordered.sort_by_key(|entry| {
            let recipient_header = entry.get("header").and_then(Value::as_object).cloned().unwrap_or_default();
            let merged = header::merge(&[&protected_obj, &unprotected_obj, &recipient_header]);
            if merged.get("kid").and_then(Value::as_str) == Some(kid.as_str()) { 0 } else { 1 }
        });
    }

    let mut last_err = Error::invalid_key("no recipient could be decrypted");
    for entry in ordered {
        let recipient_header = entry.get("header").and_then(Value::as_object).cloned().unwrap_or_default();
        match header::assert_disjoint(&[&protected_obj, &unprotected_obj, &recipient_header]) {
            Ok(()) => {}
            Err(e) => {
                last_err = e;
                continue;
            }
        }
        let merged = header::merge(&[&protected_obj, &unprotected_obj, &recipient_header]);

        let result = (|| -> Result<Vec<u8>, Error> {
            let enc = resolve_enc(&merged)?;
            if !registry.is_enc_enabled(enc) {
                return Err(Error::AlgorithmNotAllowed(enc.name().to_owned()));
            }
            let zip = resolve_zip(&merged, registry)?;
            header::validate(&merged, &protected_names, &registry.header_registry, registry.strict_check_header)?;
            let alg = resolve_alg(&merged, registry)?;
            let key = guess_key(candidate, merged.get("kid").and_then(Value::as_str), alg.name())?;
            let encrypted_key = match entry.get("encrypted_key").and_then(Value::as_str) {
                Some(s) => b64url_decode(s)?,
                None => Vec::new(),
            };
            let cek = unwrap_cek(alg, enc, key, &merged, &encrypted_key)?;
            let plaintext = jwe_enc::decrypt(enc, &ciphertext, &cek, &iv, &aad_bytes, &tag)?;
            undo_compression(zip, plaintext)
        })();

        match result {
            Ok(plaintext) => {
                tracing::debug!("JWE JSON decryption verified");
                return Ok(plaintext);
            }
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}
