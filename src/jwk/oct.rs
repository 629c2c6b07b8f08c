use secrecy::{ExposeSecret, SecretBox};
use serde_json::{Map, Value, json};

use crate::codec::{b64url_decode, b64url_encode};
use crate::error::Error;

/// A symmetric (`kty: "oct"`) key: raw bytes used with HMAC, AES-KW,
/// AES-GCM(KW), `dir`, and PBES2 (as the password).
pub struct OctKeyMaterial {
    k: SecretBox<Vec<u8>>,
}

impl std::fmt::Debug for OctKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctKeyMaterial")
            .field("k", &"<redacted>")
            .finish()
    }
}

impl OctKeyMaterial {
    #[must_use]
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            k: SecretBox::new(Box::new(secret)),
        }
    }

    #[must_use]
    pub fn secret(&self) -> &[u8] {
        self.k.expose_secret()
    }

    pub(super) fn is_private(&self) -> bool {
        true
    }

    pub(super) fn from_jwk(obj: &Map<String, Value>) -> Result<Self, Error> {
        let k = obj
            .get("k")
            .and_then(Value::as_str)
            .ok_or(Error::MissingHeader("k"))?;
        Ok(Self::new(b64url_decode(k)?))
    }

    pub(super) fn export_into(&self, map: &mut Map<String, Value>, _private: bool) -> Result<(), Error> {
        map.insert("kty".to_owned(), json!("oct"));
        map.insert("k".to_owned(), json!(b64url_encode(self.secret())));
        Ok(())
    }
}
