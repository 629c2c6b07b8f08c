use secrecy::{ExposeSecret, SecretBox};
use serde_json::{Map, Value, json};

use crate::codec::{b64url_decode, b64url_encode};
use crate::error::Error;

/// The four Octet Key Pair curves from [`rfc8037`]: two for signing
/// (`EdDSA`), two for key agreement (`ECDH-ES*`).
///
/// [`rfc8037`]: https://datatracker.ietf.org/doc/html/rfc8037
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OkpCurve {
    Ed25519,
    Ed448,
    X25519,
    X448,
}

impl OkpCurve {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Ed25519 => "Ed25519",
            Self::Ed448 => "Ed448",
            Self::X25519 => "X25519",
            Self::X448 => "X448",
        }
    }

    fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "Ed25519" => Ok(Self::Ed25519),
            "Ed448" => Ok(Self::Ed448),
            "X25519" => Ok(Self::X25519),
            "X448" => Ok(Self::X448),
            other => Err(Error::invalid_key(format!("unsupported OKP curve: {other}"))),
        }
    }

    /// Fixed encoded length, in bytes, of both the public key and the
    /// private seed/scalar on this curve (RFC 8037 section 2).
    #[must_use]
    pub fn key_len(self) -> usize {
        match self {
            Self::Ed25519 | Self::X25519 => 32,
            Self::X448 => 56,
            Self::Ed448 => 57,
        }
    }

    #[must_use]
    pub fn is_signing(self) -> bool {
        matches!(self, Self::Ed25519 | Self::Ed448)
    }
}

/// An Octet Key Pair. Keys are kept as raw fixed-length byte strings here;
/// the concrete signing/agreement object (`aws_lc_rs::signature::Ed25519KeyPair`,
/// `x25519-dalek`, `ed448-goldilocks`) is reconstructed by the algorithm
/// layer at the point of use, the same pattern `EcKeyMaterial` uses for
/// `secp256k1`.
pub struct OkpKeyMaterial {
    curve: OkpCurve,
    x: Vec<u8>,
    d: Option<SecretBox<Vec<u8>>>,
}

impl std::fmt::Debug for OkpKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OkpKeyMaterial")
            .field("curve", &self.curve.name())
            .field("has_private", &self.d.is_some())
            .finish()
    }
}

impl OkpKeyMaterial {
    pub fn new(curve: OkpCurve, x: Vec<u8>, d: Option<Vec<u8>>) -> Result<Self, Error> {
        if x.len() != curve.key_len() {
            return Err(Error::invalid_key(format!(
                "{} public key must be {} bytes, got {}",
                curve.name(),
                curve.key_len(),
                x.len()
            )));
        }
        if let Some(d) = &d
            && d.len() != curve.key_len()
        {
            return Err(Error::invalid_key(format!(
                "{} private key must be {} bytes, got {}",
                curve.name(),
                curve.key_len(),
                d.len()
            )));
        }
        Ok(Self {
            curve,
            x,
            d: d.map(|d| SecretBox::new(Box::new(d))),
        })
    }

    #[must_use]
    pub fn curve(&self) -> OkpCurve {
        self.curve
    }

    /// A fresh ephemeral key pair on `curve`, for ECDH-ES's sender-side
    /// `epk`. Only meaningful for the agreement curves (`X25519`/`X448`);
    /// callers never generate ephemeral `Ed25519`/`Ed448` signing keys here.
    pub fn generate(curve: OkpCurve) -> Result<Self, Error> {
        use rand::rngs::OsRng;
        match curve {
            OkpCurve::X25519 => {
                let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
                let public = x25519_dalek::PublicKey::from(&secret);
                Self::new(curve, public.as_bytes().to_vec(), Some(secret.to_bytes().to_vec()))
            }
            OkpCurve::X448 => {
                let secret = ed448_goldilocks::x448::Secret::new(&mut OsRng);
                let public = secret.public_key();
                Self::new(curve, public.to_bytes().to_vec(), Some(secret.to_bytes().to_vec()))
            }
            OkpCurve::Ed25519 | OkpCurve::Ed448 => {
                Err(Error::invalid_key("ephemeral generation is only supported for X25519/X448"))
            }
        }
    }

    #[must_use]
    pub fn public_bytes(&self) -> &[u8] {
        &self.x
    }

    pub fn private_bytes(&self) -> Result<&[u8], Error> {
        self.d
            .as_ref()
            .map(|d| d.expose_secret().as_slice())
            .ok_or_else(|| Error::invalid_key("OKP private key material is required for this operation"))
    }

    pub(super) fn is_private(&self) -> bool {
        self.d.is_some()
    }

    pub(super) fn from_jwk(obj: &Map<String, Value>) -> Result<Self, Error> {
        let crv = obj
            .get("crv")
            .and_then(Value::as_str)
            .ok_or(Error::MissingHeader("crv"))?;
        let curve = OkpCurve::from_name(crv)?;
        let x = obj
            .get("x")
            .and_then(Value::as_str)
            .ok_or(Error::MissingHeader("x"))?;
        let x = b64url_decode(x)?;
        let d = obj
            .get("d")
            .and_then(Value::as_str)
            .map(b64url_decode)
            .transpose()?;
        Self::new(curve, x, d)
    }

    pub(super) fn export_into(&self, map: &mut Map<String, Value>, private: bool) -> Result<(), Error> {
        map.insert("kty".to_owned(), json!("OKP"));
        map.insert("crv".to_owned(), json!(self.curve.name()));
        map.insert("x".to_owned(), json!(b64url_encode(&self.x)));
        if private && let Some(d) = &self.d {
            map.insert("d".to_owned(), json!(b64url_encode(d.expose_secret())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length_public_key() {
        let err = OkpKeyMaterial::new(OkpCurve::Ed25519, vec![0u8; 16], None);
        assert!(err.is_err());
    }

    #[test]
    fn export_then_import_round_trips() {
        let material = OkpKeyMaterial::new(OkpCurve::X25519, vec![7u8; 32], Some(vec![9u8; 32])).unwrap();
        let mut map = Map::new();
        material.export_into(&mut map, true).unwrap();
        let restored = OkpKeyMaterial::from_jwk(&map).unwrap();
        assert_eq!(restored.public_bytes(), material.public_bytes());
        assert!(restored.is_private());
    }
}
