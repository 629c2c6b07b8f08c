use elliptic_curve::JwkEcKey;
use elliptic_curve::pkcs8::{DecodePrivateKey, DecodePublicKey};
use elliptic_curve::sec1::DecodeEcPrivateKey;
use serde_json::{Map, Value, json};

use crate::error::Error;

/// The four curves this crate accepts for `kty: "EC"` keys. `Secp256k1`
/// exists for [`rfc8812`]'s `ES256K`; it is not part of RFC 7518 proper.
///
/// [`rfc8812`]: https://datatracker.ietf.org/doc/html/rfc8812
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
    Secp256k1,
}

impl EcCurve {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
            Self::Secp256k1 => "secp256k1",
        }
    }

    fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "P-256" => Ok(Self::P256),
            "P-384" => Ok(Self::P384),
            "P-521" => Ok(Self::P521),
            "secp256k1" => Ok(Self::Secp256k1),
            other => Err(Error::invalid_key(format!("unsupported EC curve: {other}"))),
        }
    }
}

/// One of the four curve-typed key pairs this crate supports, carried in
/// a single enum so `jwk::Key` can stay curve-agnostic. `aws-lc-rs` drives
/// signing for the three NIST curves; `secp256k1` has no `aws-lc-rs`
/// support, so it's carried via `k256`/`ecdsa` instead (grounded on
/// `less-crypto`'s use of the `p256` RustCrypto crate for JWK handling).
pub enum EcKeyMaterial {
    P256 {
        public: p256::PublicKey,
        private: Option<p256::SecretKey>,
    },
    P384 {
        public: p384::PublicKey,
        private: Option<p384::SecretKey>,
    },
    P521 {
        public: p521::PublicKey,
        private: Option<p521::SecretKey>,
    },
    Secp256k1 {
        public: k256::PublicKey,
        private: Option<k256::SecretKey>,
    },
}

impl std::fmt::Debug for EcKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcKeyMaterial")
            .field("curve", &self.curve().name())
            .field("has_private", &self.is_private())
            .finish()
    }
}

/// Applies `$body` once per curve variant, binding `$public`/`$private` to
/// the curve-typed fields. Keeps the four near-identical match arms this
/// module needs (import, export, predicate) from being written out longhand
/// four times each.
macro_rules! for_each_curve {
    ($self:expr, |$public:ident, $private:ident| $body:expr) => {
        match $self {
            EcKeyMaterial::P256 { public: $public, private: $private } => $body,
            EcKeyMaterial::P384 { public: $public, private: $private } => $body,
            EcKeyMaterial::P521 { public: $public, private: $private } => $body,
            EcKeyMaterial::Secp256k1 { public: $public, private: $private } => $body,
        }
    };
}

impl EcKeyMaterial {
    #[must_use]
    pub fn curve(&self) -> EcCurve {
        match self {
            Self::P256 { .. } => EcCurve::P256,
            Self::P384 { .. } => EcCurve::P384,
            Self::P521 { .. } => EcCurve::P521,
            Self::Secp256k1 { .. } => EcCurve::Secp256k1,
        }
    }

    pub(super) fn is_private(&self) -> bool {
        for_each_curve!(self, |_public, private| private.is_some())
    }

    #[must_use]
    pub fn public_key_p256(&self) -> Option<&p256::PublicKey> {
        match self {
            Self::P256 { public, .. } => Some(public),
            _ => None,
        }
    }

    #[must_use]
    pub fn public_key_p384(&self) -> Option<&p384::PublicKey> {
        match self {
            Self::P384 { public, .. } => Some(public),
            _ => None,
        }
    }

    #[must_use]
    pub fn public_key_p521(&self) -> Option<&p521::PublicKey> {
        match self {
            Self::P521 { public, .. } => Some(public),
            _ => None,
        }
    }

    #[must_use]
    pub fn public_key_secp256k1(&self) -> Option<&k256::PublicKey> {
        match self {
            Self::Secp256k1 { public, .. } => Some(public),
            _ => None,
        }
    }

    #[must_use]
    pub fn private_key_p256(&self) -> Option<&p256::SecretKey> {
        match self {
            Self::P256 { private, .. } => private.as_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn private_key_p384(&self) -> Option<&p384::SecretKey> {
        match self {
            Self::P384 { private, .. } => private.as_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn private_key_p521(&self) -> Option<&p521::SecretKey> {
        match self {
            Self::P521 { private, .. } => private.as_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn private_key_secp256k1(&self) -> Option<&k256::SecretKey> {
        match self {
            Self::Secp256k1 { private, .. } => private.as_ref(),
            _ => None,
        }
    }

    /// A fresh ephemeral key pair on `curve`, for ECDH-ES's sender-side `epk`.
    #[must_use]
    pub fn generate(curve: EcCurve) -> Self {
        use rand::rngs::OsRng;
        match curve {
            EcCurve::P256 => {
                let secret = p256::SecretKey::random(&mut OsRng);
                Self::P256 { public: secret.public_key(), private: Some(secret) }
            }
            EcCurve::P384 => {
                let secret = p384::SecretKey::random(&mut OsRng);
                Self::P384 { public: secret.public_key(), private: Some(secret) }
            }
            EcCurve::P521 => {
                let secret = p521::SecretKey::random(&mut OsRng);
                Self::P521 { public: secret.public_key(), private: Some(secret) }
            }
            EcCurve::Secp256k1 => {
                let secret = k256::SecretKey::random(&mut OsRng);
                Self::Secp256k1 { public: secret.public_key(), private: Some(secret) }
            }
        }
    }

    /// PKCS8 DER of the private key, the shape `aws_lc_rs::EcdsaKeyPair`
    /// consumes for the three NIST curves.
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>, Error> {
        use elliptic_curve::pkcs8::EncodePrivateKey;
        match self {
            Self::P256 { private: Some(k), .. } => Ok(k
                .to_pkcs8_der()
                .map_err(|e| Error::invalid_key(format!("failed to encode P-256 PKCS8: {e}")))?
                .as_bytes()
                .to_vec()),
            Self::P384 { private: Some(k), .. } => Ok(k
                .to_pkcs8_der()
                .map_err(|e| Error::invalid_key(format!("failed to encode P-384 PKCS8: {e}")))?
                .as_bytes()
                .to_vec()),
            Self::P521 { private: Some(k), .. } => Ok(k
                .to_pkcs8_der()
                .map_err(|e| Error::invalid_key(format!("failed to encode P-521 PKCS8: {e}")))?
                .as_bytes()
                .to_vec()),
            Self::Secp256k1 { private: Some(_), .. } => Err(Error::invalid_key(
                "secp256k1 signing goes through k256::ecdsa directly, not aws-lc-rs",
            )),
            _ => Err(Error::invalid_key("EC private key material is required for this operation")),
        }
    }

    pub(super) fn from_jwk(obj: &Map<String, Value>) -> Result<Self, Error> {
        let crv = obj
            .get("crv")
            .and_then(Value::as_str)
            .ok_or(Error::MissingHeader("crv"))?;
        let curve = EcCurve::from_name(crv)?;
        let jwk: JwkEcKey = serde_json::from_value(Value::Object(obj.clone()))
            .map_err(|e| Error::invalid_key(format!("invalid EC JWK: {e}")))?;
        let has_private = obj.contains_key("d");

        let material = match curve {
            EcCurve::P256 => {
                if has_private {
                    let secret = p256::SecretKey::from_jwk(&jwk)
                        .map_err(|e| Error::invalid_key(format!("invalid EC private JWK: {e}")))?;
                    let public = secret.public_key();
                    Self::P256 { public, private: Some(secret) }
                } else {
                    let public = p256::PublicKey::from_jwk(&jwk)
                        .map_err(|e| Error::invalid_key(format!("invalid EC public JWK: {e}")))?;
                    Self::P256 { public, private: None }
                }
            }
            EcCurve::P384 => {
                if has_private {
                    let secret = p384::SecretKey::from_jwk(&jwk)
                        .map_err(|e| Error::invalid_key(format!("invalid EC private JWK: {e}")))?;
                    let public = secret.public_key();
                    Self::P384 { public, private: Some(secret) }
                } else {
                    let public = p384::PublicKey::from_jwk(&jwk)
                        .map_err(|e| Error::invalid_key(format!("invalid EC public JWK: {e}")))?;
                    Self::P384 { public, private: None }
                }
            }
            EcCurve::P521 => {
                if has_private {
                    let secret = p521::SecretKey::from_jwk(&jwk)
                        .map_err(|e| Error::invalid_key(format!("invalid EC private JWK: {e}")))?;
                    let public = secret.public_key();
                    Self::P521 { public, private: Some(secret) }
                } else {
                    let public = p521::PublicKey::from_jwk(&jwk)
                        .map_err(|e| Error::invalid_key(format!("invalid EC public JWK: {e}")))?;
                    Self::P521 { public, private: None }
                }
            }
            EcCurve::Secp256k1 => {
                if has_private {
                    let secret = k256::SecretKey::from_jwk(&jwk)
                        .map_err(|e| Error::invalid_key(format!("invalid EC private JWK: {e}")))?;
                    let public = secret.public_key();
                    Self::Secp256k1 { public, private: Some(secret) }
                } else {
                    let public = k256::PublicKey::from_jwk(&jwk)
                        .map_err(|e| Error::invalid_key(format!("invalid EC public JWK: {e}")))?;
                    Self::Secp256k1 { public, private: None }
                }
            }
        };
        Ok(material)
    }

    pub(super) fn from_pkcs8_der(der: &[u8]) -> Result<Self, Error> {
        if let Ok(k) = p256::SecretKey::from_pkcs8_der(der) {
            return Ok(Self::P256 { public: k.public_key(), private: Some(k) });
        }
        if let Ok(k) = p384::SecretKey::from_pkcs8_der(der) {
            return Ok(Self::P384 { public: k.public_key(), private: Some(k) });
        }
        if let Ok(k) = p521::SecretKey::from_pkcs8_der(der) {
            return Ok(Self::P521 { public: k.public_key(), private: Some(k) });
        }
        if let Ok(k) = k256::SecretKey::from_pkcs8_der(der) {
            return Ok(Self::Secp256k1 { public: k.public_key(), private: Some(k) });
        }
        Err(Error::invalid_key("not a recognized EC PKCS8 DER document"))
    }

    pub(super) fn from_sec1_der(der: &[u8]) -> Result<Self, Error> {
        if let Ok(k) = p256::SecretKey::from_sec1_der(der) {
            return Ok(Self::P256 { public: k.public_key(), private: Some(k) });
        }
        if let Ok(k) = p384::SecretKey::from_sec1_der(der) {
            return Ok(Self::P384 { public: k.public_key(), private: Some(k) });
        }
        if let Ok(k) = p521::SecretKey::from_sec1_der(der) {
            return Ok(Self::P521 { public: k.public_key(), private: Some(k) });
        }
        if let Ok(k) = k256::SecretKey::from_sec1_der(der) {
            return Ok(Self::Secp256k1 { public: k.public_key(), private: Some(k) });
        }
        Err(Error::invalid_key("not a recognized SEC1 EC private key DER document"))
    }

    pub(super) fn from_spki_der(der: &[u8]) -> Result<Self, Error> {
        if let Ok(k) = p256::PublicKey::from_public_key_der(der) {
            return Ok(Self::P256 { public: k, private: None });
        }
        if let Ok(k) = p384::PublicKey::from_public_key_der(der) {
            return Ok(Self::P384 { public: k, private: None });
        }
        if let Ok(k) = p521::PublicKey::from_public_key_der(der) {
            return Ok(Self::P521 { public: k, private: None });
        }
        if let Ok(k) = k256::PublicKey::from_public_key_der(der) {
            return Ok(Self::Secp256k1 { public: k, private: None });
        }
        Err(Error::invalid_key("not a recognized EC SubjectPublicKeyInfo DER document"))
    }

    pub(super) fn export_into(&self, map: &mut Map<String, Value>, private: bool) -> Result<(), Error> {
        map.insert("kty".to_owned(), json!("EC"));
        map.insert("crv".to_owned(), json!(self.curve().name()));

        let jwk_value = match self {
            Self::P256 { public, private: priv_key } => {
                if private && let Some(k) = priv_key {
                    serde_json::to_value(k.to_jwk())
                } else {
                    serde_json::to_value(public.to_jwk())
                }
            }
            Self::P384 { public, private: priv_key } => {
                if private && let Some(k) = priv_key {
                    serde_json::to_value(k.to_jwk())
                } else {
                    serde_json::to_value(public.to_jwk())
                }
            }
            Self::P521 { public, private: priv_key } => {
                if private && let Some(k) = priv_key {
                    serde_json::to_value(k.to_jwk())
                } else {
                    serde_json::to_value(public.to_jwk())
                }
            }
            Self::Secp256k1 { public, private: priv_key } => {
                if private && let Some(k) = priv_key {
                    serde_json::to_value(k.to_jwk())
                } else {
                    serde_json::to_value(public.to_jwk())
                }
            }
        }
        .map_err(|e| Error::invalid_key(format!("failed to encode EC JWK: {e}")))?;

        let jwk_obj = jwk_value
            .as_object()
            .ok_or_else(|| Error::invalid_key("EC JWK encoding did not produce an object"))?;
        for key in ["x", "y", "d"] {
            if let Some(v) = jwk_obj.get(key) {
                map.insert(key.to_owned(), v.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn p256_export_then_import_round_trips() {
        let secret = p256::SecretKey::random(&mut OsRng);
        let material = EcKeyMaterial::P256 {
            public: secret.public_key(),
            private: Some(secret),
        };
        let mut map = Map::new();
        material.export_into(&mut map, true).unwrap();
        let restored = EcKeyMaterial::from_jwk(&map).unwrap();
        assert_eq!(restored.curve(), EcCurve::P256);
        assert!(restored.is_private());
    }

    #[test]
    fn secp256k1_curve_name_round_trips() {
        let secret = k256::SecretKey::random(&mut OsRng);
        let material = EcKeyMaterial::Secp256k1 {
            public: secret.public_key(),
            private: Some(secret),
        };
        let mut map = Map::new();
        material.export_into(&mut map, false).unwrap();
        assert_eq!(map.get("crv").unwrap(), "secp256k1");
    }
}
