use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde_json::{Map, Value, json};

use crate::codec::{b64url_decode, b64url_encode};
use crate::error::Error;

/// Minimum RSA modulus size, in bits, this crate will sign with. Enforced in
/// `alg::jws_sign` before any RS*/PS* private-key operation.
pub const MIN_SIGNING_MODULUS_BITS: usize = 2048;

/// An `RSA` key. Carries the public modulus/exponent unconditionally and
/// the full private key (CRT parameters included) when imported from a
/// private JWK or PEM/DER document.
pub struct RsaKeyMaterial {
    public: RsaPublicKey,
    private: Option<RsaPrivateKey>,
}

impl std::fmt::Debug for RsaKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKeyMaterial")
            .field("bits", &self.public.size())
            .field("has_private", &self.private.is_some())
            .finish()
    }
}

impl RsaKeyMaterial {
    #[must_use]
    pub fn from_keypair(public: RsaPublicKey, private: Option<RsaPrivateKey>) -> Self {
        Self { public, private }
    }

    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn private_key(&self) -> Result<&RsaPrivateKey, Error> {
        self.private
            .as_ref()
            .ok_or_else(|| Error::invalid_key("RSA private key material is required for this operation"))
    }

    #[must_use]
    pub fn modulus_bits(&self) -> usize {
        self.public.size() * 8
    }

    pub(super) fn is_private(&self) -> bool {
        self.private.is_some()
    }

    pub(super) fn from_jwk(obj: &Map<String, Value>) -> Result<Self, Error> {
        let n = decode_uint(obj, "n")?;
        let e = decode_uint(obj, "e")?;
        let public = RsaPublicKey::new(n.clone(), e.clone())
            .map_err(|err| Error::invalid_key(format!("invalid RSA public key: {err}")))?;

        let private = if obj.contains_key("d") {
            let d = decode_uint(obj, "d")?;
            let p = decode_uint(obj, "p")?;
            let q = decode_uint(obj, "q")?;
            let primes = vec![p, q];
            let mut key = RsaPrivateKey::from_components(n, e, d, primes)
                .map_err(|err| Error::invalid_key(format!("invalid RSA private key: {err}")))?;
            key.validate()
                .map_err(|err| Error::invalid_key(format!("invalid RSA private key: {err}")))?;
            key.precompute()
                .map_err(|err| Error::invalid_key(format!("failed to precompute CRT params: {err}")))?;
            Some(key)
        } else {
            None
        };

        Ok(Self { public, private })
    }

    pub(super) fn from_pkcs8_der(der: &[u8]) -> Result<Self, Error> {
        let private = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|err| Error::invalid_key(format!("invalid RSA PKCS8 DER: {err}")))?;
        let public = private.to_public_key();
        Ok(Self {
            public,
            private: Some(private),
        })
    }

    pub(super) fn from_pkcs1_public_der(der: &[u8]) -> Result<Self, Error> {
        let public = RsaPublicKey::from_pkcs1_der(der)
            .map_err(|err| Error::invalid_key(format!("invalid RSA PKCS1 DER: {err}")))?;
        Ok(Self {
            public,
            private: None,
        })
    }

    pub(super) fn from_spki_der(der: &[u8]) -> Result<Self, Error> {
        let public = RsaPublicKey::from_public_key_der(der)
            .map_err(|err| Error::invalid_key(format!("invalid RSA SPKI DER: {err}")))?;
        Ok(Self {
            public,
            private: None,
        })
    }

    /// PKCS8 (private) or SPKI (public) PEM, matching whichever material this
    /// key carries.
    pub fn to_pem(&self, line_ending: pem::LineEnding) -> Result<String, Error> {
        if let Some(private) = &self.private {
            private
                .to_pkcs1_pem(line_ending)
                .map(|s| s.to_string())
                .map_err(|err| Error::invalid_key(format!("failed to encode RSA PEM: {err}")))
        } else {
            self.public
                .to_pkcs1_pem(line_ending)
                .map_err(|err| Error::invalid_key(format!("failed to encode RSA PEM: {err}")))
        }
    }

    pub(super) fn export_into(&self, map: &mut Map<String, Value>, private: bool) -> Result<(), Error> {
        map.insert("kty".to_owned(), json!("RSA"));
        map.insert("n".to_owned(), json!(encode_uint(self.public.n())));
        map.insert("e".to_owned(), json!(encode_uint(self.public.e())));
        if private && let Some(key) = &self.private {
            map.insert("d".to_owned(), json!(encode_uint(key.d())));
            let primes = key.primes();
            if primes.len() == 2 {
                map.insert("p".to_owned(), json!(encode_uint(&primes[0])));
                map.insert("q".to_owned(), json!(encode_uint(&primes[1])));
            }
            if let (Some(dp), Some(dq), Some(qi)) = (key.dp(), key.dq(), key.qinv()) {
                map.insert("dp".to_owned(), json!(encode_uint(dp)));
                map.insert("dq".to_owned(), json!(encode_uint(dq)));
                // `qinv` is stored as a signed big integer by the `rsa` crate;
                // JWK requires the unsigned representative mod p.
                let qi = qi.to_biguint().unwrap_or_default();
                map.insert("qi".to_owned(), json!(encode_uint(&qi)));
            }
        }
        Ok(())
    }
}

fn decode_uint(obj: &Map<String, Value>, name: &'static str) -> Result<BigUint, Error> {
    let text = obj
        .get(name)
        .and_then(Value::as_str)
        .ok_or(Error::MissingHeader(name))?;
    let bytes = b64url_decode(text)?;
    Ok(BigUint::from_bytes_be(&bytes))
}

fn encode_uint(value: &BigUint) -> String {
    b64url_encode(value.to_bytes_be())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn export_then_import_round_trips() {
        let private = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let material = RsaKeyMaterial::from_keypair(private.to_public_key(), Some(private));

        let mut map = Map::new();
        material.export_into(&mut map, true).unwrap();
        let restored = RsaKeyMaterial::from_jwk(&map).unwrap();

        assert_eq!(material.public_key().n(), restored.public_key().n());
        assert!(restored.is_private());
    }
}
