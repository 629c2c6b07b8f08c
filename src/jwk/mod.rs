//! [`JWK`] or JSON Web Key as defined in [`rfc7517`], generalized from
//! `rama_crypto::jose::jwk::JWK` to the full key kind set this crate needs
//! (`oct`, `RSA`, `EC` over four curves, `OKP` over four curves), plus
//! import/export, thumbprints (RFC 7638), and the use/ops/alg compatibility
//! checks the registries consult before handing a key to an algorithm.
//!
//! [`rfc7517`]: https://datatracker.ietf.org/doc/html/rfc7517

mod ec;
mod oct;
mod okp;
mod rsa_key;

pub use ec::{EcCurve, EcKeyMaterial};
pub use oct::OctKeyMaterial;
pub use okp::{OkpCurve, OkpKeyMaterial};
pub use rsa_key::{MIN_SIGNING_MODULUS_BITS, RsaKeyMaterial};

use aws_lc_rs::digest::{SHA256, digest};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::Error;

/// The intended use of a key, per RFC 7517 section 4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyUse {
    #[serde(rename = "sig")]
    Signature,
    #[serde(rename = "enc")]
    Encryption,
}

impl KeyUse {
    fn as_str(self) -> &'static str {
        match self {
            Self::Signature => "sig",
            Self::Encryption => "enc",
        }
    }
}

/// One entry of `key_ops`, per RFC 7517 section 4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyOperation {
    #[serde(rename = "sign")]
    Sign,
    #[serde(rename = "verify")]
    Verify,
    #[serde(rename = "encrypt")]
    Encrypt,
    #[serde(rename = "decrypt")]
    Decrypt,
    #[serde(rename = "wrapKey")]
    WrapKey,
    #[serde(rename = "unwrapKey")]
    UnwrapKey,
    #[serde(rename = "deriveKey")]
    DeriveKey,
    #[serde(rename = "deriveBits")]
    DeriveBits,
}

impl KeyOperation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Sign => "sign",
            Self::Verify => "verify",
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::WrapKey => "wrapKey",
            Self::UnwrapKey => "unwrapKey",
            Self::DeriveKey => "deriveKey",
            Self::DeriveBits => "deriveBits",
        }
    }

    fn matches_use(self, key_use: KeyUse) -> bool {
        match key_use {
            KeyUse::Signature => matches!(self, Self::Sign | Self::Verify),
            KeyUse::Encryption => !matches!(self, Self::Sign | Self::Verify),
        }
    }
}

/// The kind-specific key material. Each variant carries its public parts
/// unconditionally and its private parts (if any) behind `secrecy`, so a
/// public-only key simply has no private payload to leak.
#[derive(Debug)]
pub enum KeyMaterial {
    Oct(OctKeyMaterial),
    Rsa(Box<RsaKeyMaterial>),
    Ec(EcKeyMaterial),
    Okp(OkpKeyMaterial),
}

impl KeyMaterial {
    fn kty(&self) -> &'static str {
        match self {
            Self::Oct(_) => "oct",
            Self::Rsa(_) => "RSA",
            Self::Ec(_) => "EC",
            Self::Okp(_) => "OKP",
        }
    }

    fn is_private(&self) -> bool {
        match self {
            Self::Oct(_) => true,
            Self::Rsa(k) => k.is_private(),
            Self::Ec(k) => k.is_private(),
            Self::Okp(k) => k.is_private(),
        }
    }

    /// Whether this key's kind (and, for EC/OKP, curve) is capable of the
    /// named JWS/JWE algorithm at all, independent of whatever the key's own
    /// `alg` field happens to declare. Used to narrow a [`KeyCandidate::Set`]
    /// down to keys that could plausibly work, so an incompatible key never
    /// silently falls through to the algorithm layer's own, less specific
    /// rejection.
    fn supports_alg(&self, alg_name: &str) -> bool {
        match alg_name {
            "none" => true,
            "HS256" | "HS384" | "HS512" => matches!(self, Self::Oct(_)),
            "RS256" | "RS384" | "RS512" | "PS256" | "PS384" | "PS512" | "RSA1_5" | "RSA-OAEP" | "RSA-OAEP-256" => {
                matches!(self, Self::Rsa(_))
            }
            "ES256" => matches!(self, Self::Ec(ec) if ec.curve() == EcCurve::P256),
            "ES384" => matches!(self, Self::Ec(ec) if ec.curve() == EcCurve::P384),
            "ES512" => matches!(self, Self::Ec(ec) if ec.curve() == EcCurve::P521),
            "ES256K" => matches!(self, Self::Ec(ec) if ec.curve() == EcCurve::Secp256k1),
            "EdDSA" => matches!(self, Self::Okp(okp) if okp.curve().is_signing()),
            "dir" | "A128KW" | "A192KW" | "A256KW" | "A128GCMKW" | "A192GCMKW" | "A256GCMKW"
            | "PBES2-HS256+A128KW" | "PBES2-HS384+A192KW" | "PBES2-HS512+A256KW" => matches!(self, Self::Oct(_)),
            "ECDH-ES" | "ECDH-ES+A128KW" | "ECDH-ES+A192KW" | "ECDH-ES+A256KW" => {
                matches!(self, Self::Ec(_)) || matches!(self, Self::Okp(okp) if !okp.curve().is_signing())
            }
            // Unrecognized name: let the algorithm layer's own dispatch reject it.
            _ => true,
        }
    }
}

/// A typed JSON Web Key: tagged variant over {Oct, RSA, EC, OKP} plus the
/// common JWK metadata (`kid`, `use`, `alg`, `key_ops`).
///
/// Keys are immutable after import. A public-only key rejects `sign`,
/// `unwrapKey`, and `decrypt`.
#[derive(Debug)]
pub struct Key {
    pub kid: Option<String>,
    pub r#use: Option<KeyUse>,
    pub alg: Option<String>,
    pub key_ops: Option<Vec<KeyOperation>>,
    pub material: KeyMaterial,
}

/// The operation a caller is about to perform with a key, used by
/// [`Key::check_use`]/[`Key::check_ops`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Sign,
    Verify,
    Encrypt,
    Decrypt,
    WrapKey,
    UnwrapKey,
    DeriveKey,
    DeriveBits,
}

impl Operation {
    fn as_key_op(self) -> KeyOperation {
        match self {
            Self::Sign => KeyOperation::Sign,
            Self::Verify => KeyOperation::Verify,
            Self::Encrypt => KeyOperation::Encrypt,
            Self::Decrypt => KeyOperation::Decrypt,
            Self::WrapKey => KeyOperation::WrapKey,
            Self::UnwrapKey => KeyOperation::UnwrapKey,
            Self::DeriveKey => KeyOperation::DeriveKey,
            Self::DeriveBits => KeyOperation::DeriveBits,
        }
    }

    fn intended_use(self) -> KeyUse {
        match self {
            Self::Sign | Self::Verify => KeyUse::Signature,
            _ => KeyUse::Encryption,
        }
    }

    fn requires_private(self) -> bool {
        matches!(self, Self::Sign | Self::Decrypt | Self::UnwrapKey | Self::DeriveBits | Self::DeriveKey)
    }

    fn name(self) -> &'static str {
        match self {
            Self::Sign => "sign",
            Self::Verify => "verify",
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::WrapKey => "wrapKey",
            Self::UnwrapKey => "unwrapKey",
            Self::DeriveKey => "deriveKey",
            Self::DeriveBits => "deriveBits",
        }
    }
}

impl Key {
    #[must_use]
    pub fn new(material: KeyMaterial) -> Self {
        Self {
            kid: None,
            r#use: None,
            alg: None,
            key_ops: None,
            material,
        }
    }

    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    #[must_use]
    pub fn with_use(mut self, key_use: KeyUse) -> Self {
        self.r#use = Some(key_use);
        self
    }

    #[must_use]
    pub fn with_alg(mut self, alg: impl Into<String>) -> Self {
        self.alg = Some(alg.into());
        self
    }

    /// Symmetric key straight from raw secret bytes (not a JWK-shaped value).
    #[must_use]
    pub fn from_oct_secret(secret: impl Into<Vec<u8>>) -> Self {
        Self::new(KeyMaterial::Oct(OctKeyMaterial::new(secret.into())))
    }

    /// Import a JWK-shaped JSON object (`{"kty": ..., ...}`).
    pub fn from_jwk_value(value: &Value) -> Result<Self, Error> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::decode("JWK must be a JSON object"))?;

        let kty = obj
            .get("kty")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MissingHeader("kty"))?;

        let material = match kty {
            "oct" => KeyMaterial::Oct(OctKeyMaterial::from_jwk(obj)?),
            "RSA" => KeyMaterial::Rsa(Box::new(RsaKeyMaterial::from_jwk(obj)?)),
            "EC" => KeyMaterial::Ec(EcKeyMaterial::from_jwk(obj)?),
            "OKP" => KeyMaterial::Okp(OkpKeyMaterial::from_jwk(obj)?),
            other => return Err(Error::invalid_key(format!("unsupported kty: {other}"))),
        };

        let mut key = Self::new(material);
        key.kid = obj.get("kid").and_then(Value::as_str).map(str::to_owned);
        key.alg = obj.get("alg").and_then(Value::as_str).map(str::to_owned);
        key.r#use = obj
            .get("use")
            .and_then(Value::as_str)
            .map(|s| match s {
                "sig" => Ok(KeyUse::Signature),
                "enc" => Ok(KeyUse::Encryption),
                other => Err(Error::invalid_header("use", format!("unknown use: {other}"))),
            })
            .transpose()?;
        key.key_ops = match obj.get("key_ops") {
            Some(Value::Array(ops)) => Some(
                ops.iter()
                    .map(|v| {
                        serde_json::from_value::<KeyOperation>(v.clone())
                            .map_err(|e| Error::invalid_header("key_ops", e.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(_) => return Err(Error::invalid_header("key_ops", "must be an array")),
            None => None,
        };

        key.validate_use_ops_consistency()?;
        Ok(key)
    }

    /// Import from PEM (PKCS#1/PKCS#8/SPKI), delegated to the kind-specific
    /// crypto provider crates.
    pub fn from_pem(pem_text: &str, key_use: Option<KeyUse>) -> Result<Self, Error> {
        let pem = pem::parse(pem_text).map_err(|e| Error::decode(format!("invalid PEM: {e}")))?;
        let material = match pem.tag() {
            "RSA PRIVATE KEY" | "PRIVATE KEY" => {
                match RsaKeyMaterial::from_pkcs8_der(pem.contents()) {
                    Ok(rsa) => KeyMaterial::Rsa(Box::new(rsa)),
                    Err(_) => KeyMaterial::Ec(EcKeyMaterial::from_pkcs8_der(pem.contents())?),
                }
            }
            "RSA PUBLIC KEY" => KeyMaterial::Rsa(Box::new(RsaKeyMaterial::from_pkcs1_public_der(
                pem.contents(),
            )?)),
            "PUBLIC KEY" => match RsaKeyMaterial::from_spki_der(pem.contents()) {
                Ok(rsa) => KeyMaterial::Rsa(Box::new(rsa)),
                Err(_) => KeyMaterial::Ec(EcKeyMaterial::from_spki_der(pem.contents())?),
            },
            "EC PRIVATE KEY" => KeyMaterial::Ec(EcKeyMaterial::from_sec1_der(pem.contents())?),
            other => return Err(Error::invalid_key(format!("unsupported PEM tag: {other}"))),
        };
        let mut key = Self::new(material);
        key.r#use = key_use;
        Ok(key)
    }

    /// Export to a JWK-shaped JSON value. Private components are included
    /// only if `private` is true *and* this key actually carries them.
    pub fn export_jwk(&self, private: bool) -> Result<Value, Error> {
        let mut map = Map::new();
        match &self.material {
            KeyMaterial::Oct(k) => k.export_into(&mut map, private)?,
            KeyMaterial::Rsa(k) => k.export_into(&mut map, private)?,
            KeyMaterial::Ec(k) => k.export_into(&mut map, private)?,
            KeyMaterial::Okp(k) => k.export_into(&mut map, private)?,
        }
        if let Some(kid) = &self.kid {
            map.insert("kid".to_owned(), json!(kid));
        }
        if let Some(alg) = &self.alg {
            map.insert("alg".to_owned(), json!(alg));
        }
        if let Some(use_) = self.r#use {
            map.insert("use".to_owned(), json!(use_.as_str()));
        }
        if let Some(ops) = &self.key_ops {
            map.insert(
                "key_ops".to_owned(),
                json!(ops.iter().map(|o| o.as_str()).collect::<Vec<_>>()),
            );
        }
        Ok(Value::Object(map))
    }

    /// RFC 7638 JWK thumbprint: SHA-256 over the canonical (required-members
    /// only, lexicographically ordered) JSON representation of the key.
    pub fn thumbprint(&self) -> Result<[u8; 32], Error> {
        let canonical = self.canonical_required_members()?;
        let bytes = crate::codec::compact_json(&canonical)?;
        let digest = digest(&SHA256, &bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(digest.as_ref());
        Ok(out)
    }

    fn canonical_required_members(&self) -> Result<Value, Error> {
        // RFC 7638 section 3.2/3.3: members are restricted to the REQUIRED
        // ones for the `kty`, ordered lexicographically by member name.
        let full = self.export_jwk(false)?;
        let obj = full.as_object().expect("export_jwk always returns an object");
        let required: &[&str] = match &self.material {
            KeyMaterial::Oct(_) => &["k", "kty"],
            KeyMaterial::Rsa(_) => &["e", "kty", "n"],
            KeyMaterial::Ec(_) => &["crv", "kty", "x", "y"],
            KeyMaterial::Okp(_) => &["crv", "kty", "x"],
        };
        let mut canonical = Map::new();
        for name in required {
            if let Some(v) = obj.get(*name) {
                canonical.insert((*name).to_owned(), v.clone());
            }
        }
        Ok(Value::Object(canonical))
    }

    /// Check the key's declared `use` permits `operation`.
    pub fn check_use(&self, operation: Operation) -> Result<(), Error> {
        if let Some(declared) = self.r#use {
            let intended = operation.intended_use();
            if declared != intended {
                return Err(Error::UnsupportedKeyUse {
                    declared: declared.as_str(),
                    requested: operation.name(),
                });
            }
        }
        if operation.requires_private() && !self.material.is_private() {
            return Err(Error::UnsupportedKeyOperation(operation.name()));
        }
        Ok(())
    }

    /// Check the key's declared `alg` constraint (if any) matches `alg_name`.
    pub fn check_alg(&self, alg_name: &str) -> Result<(), Error> {
        if let Some(declared) = &self.alg
            && declared != alg_name
        {
            return Err(Error::UnsupportedKeyAlgorithm {
                declared: declared.clone(),
                requested: alg_name.to_owned(),
            });
        }
        Ok(())
    }

    /// Check the key's `key_ops` (if declared) permits `operation`.
    pub fn check_ops(&self, operation: Operation) -> Result<(), Error> {
        if let Some(ops) = &self.key_ops {
            let wanted = operation.as_key_op();
            if !ops.iter().any(|op| op.as_str() == wanted.as_str()) {
                return Err(Error::UnsupportedKeyOperation(operation.name()));
            }
        }
        Ok(())
    }

    fn validate_use_ops_consistency(&self) -> Result<(), Error> {
        if let (Some(use_), Some(ops)) = (self.r#use, &self.key_ops) {
            for op in ops {
                if !op.matches_use(use_) {
                    return Err(Error::invalid_header(
                        "key_ops",
                        format!("{} is inconsistent with use={}", op.as_str(), use_.as_str()),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A single key, a named set of keys, or a resolver callback: the shapes
/// [`guess_key`] accepts when the caller hands the facade key material.
#[derive(Clone, Copy)]
pub enum KeyCandidate<'a> {
    Single(&'a Key),
    Set(&'a [Key]),
}

/// Resolve a user-provided key (or set) into a single [`Key`] appropriate
/// for `operation`, consulting the header's `kid` when a set is given.
pub fn guess_key<'a>(
    candidate: KeyCandidate<'a>,
    header_kid: Option<&str>,
    alg_name: &str,
) -> Result<&'a Key, Error> {
    match candidate {
        KeyCandidate::Single(key) => Ok(key),
        KeyCandidate::Set(keys) => {
            if let Some(kid) = header_kid
                && let Some(found) = keys.iter().find(|k| k.kid.as_deref() == Some(kid))
            {
                return Ok(found);
            }
            let matching: Vec<&Key> = keys
                .iter()
                .filter(|k| k.check_alg(alg_name).is_ok() && k.material.supports_alg(alg_name))
                .collect();
            match matching.as_slice() {
                [single] => Ok(single),
                [] => Err(Error::invalid_key("no key in the set matches this algorithm")),
                _ => Err(Error::invalid_key(
                    "ambiguous key set: multiple keys match, and no kid was provided to disambiguate",
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oct_thumbprint_is_stable() {
        let key = Key::from_oct_secret(b"secret".to_vec());
        let a = key.thumbprint().unwrap();
        let b = key.thumbprint().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn enc_use_rejects_sign() {
        let key = Key::from_oct_secret(b"secret".to_vec()).with_use(KeyUse::Encryption);
        assert!(key.check_use(Operation::Sign).is_err());
    }

    #[test]
    fn verify_only_ops_rejects_sign() {
        let mut key = Key::from_oct_secret(b"secret".to_vec());
        key.key_ops = Some(vec![KeyOperation::Verify]);
        assert!(key.check_ops(Operation::Sign).is_err());
        assert!(key.check_ops(Operation::Verify).is_ok());
    }

    #[test]
    fn alg_constraint_is_enforced() {
        let key = Key::from_oct_secret(b"secret".to_vec()).with_alg("HS512");
        assert!(key.check_alg("HS256").is_err());
        assert!(key.check_alg("HS512").is_ok());
    }

    #[test]
    fn guess_key_rejects_a_set_where_no_key_is_capable_of_the_algorithm() {
        let oct = Key::from_oct_secret(b"secret".to_vec());
        let ec = Key::new(KeyMaterial::Ec(EcKeyMaterial::generate(EcCurve::P256)));
        let keys = vec![oct, ec];
        // Neither key declares an `alg`, so the old check_alg-only filter would
        // have let the EC key through for "RS256" with no error at all.
        let err = guess_key(KeyCandidate::Set(&keys), None, "RS256").unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }

    #[test]
    fn guess_key_picks_the_one_key_capable_of_the_algorithm() {
        let oct = Key::from_oct_secret(b"secret".to_vec());
        let ec = Key::new(KeyMaterial::Ec(EcKeyMaterial::generate(EcCurve::P256)));
        let keys = vec![oct, ec];
        let found = guess_key(KeyCandidate::Set(&keys), None, "ES256").unwrap();
        assert!(matches!(found.material, KeyMaterial::Ec(_)));
    }
}
