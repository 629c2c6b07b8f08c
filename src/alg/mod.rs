//! [C3] Algorithm registry: named identifiers bound to capability
//! descriptors, generalized from the teacher's implicit "whatever `JWA`
//! supports" model (`rama_crypto::jose::jwa`) to an explicit, caller-
//! configurable enabled-set plus header policy, in the shape `joserfc`'s
//! `JWSRegistry`/`JWERegistry`/`default_registry()` singletons take
//! (`original_source/src/joserfc/jwe.py`).

pub mod jwe_enc;
pub mod jwe_keymgmt;
pub mod jws_sign;
pub mod zip;

use std::sync::OnceLock;

use crate::header::HeaderRegistry;
use crate::jwa::{JweCompression, JweContentEncryption, JweKeyManagementAlgorithm, JwsAlgorithm};

/// The full JWS algorithm set, `none` excluded (RFC 7518 section 3.1 plus
/// RFC 8812's `ES256K`).
const ALL_JWS: &[JwsAlgorithm] = &[
    JwsAlgorithm::Hs256,
    JwsAlgorithm::Hs384,
    JwsAlgorithm::Hs512,
    JwsAlgorithm::Rs256,
    JwsAlgorithm::Rs384,
    JwsAlgorithm::Rs512,
    JwsAlgorithm::Es256,
    JwsAlgorithm::Es384,
    JwsAlgorithm::Es512,
    JwsAlgorithm::Es256K,
    JwsAlgorithm::Ps256,
    JwsAlgorithm::Ps384,
    JwsAlgorithm::Ps512,
    JwsAlgorithm::EdDsa,
];

/// The recommended-safe JWE key-management set: everything except
/// `RSA1_5` (legacy, padding-oracle-prone) and `PBES2-*` (password-based,
/// opt-in only), per spec.md section 4.3.
const SAFE_JWE_ALG: &[JweKeyManagementAlgorithm] = &[
    JweKeyManagementAlgorithm::Dir,
    JweKeyManagementAlgorithm::RsaOaep,
    JweKeyManagementAlgorithm::RsaOaep256,
    JweKeyManagementAlgorithm::A128Kw,
    JweKeyManagementAlgorithm::A192Kw,
    JweKeyManagementAlgorithm::A256Kw,
    JweKeyManagementAlgorithm::A128GcmKw,
    JweKeyManagementAlgorithm::A192GcmKw,
    JweKeyManagementAlgorithm::A256GcmKw,
    JweKeyManagementAlgorithm::EcdhEs,
    JweKeyManagementAlgorithm::EcdhEsA128Kw,
    JweKeyManagementAlgorithm::EcdhEsA192Kw,
    JweKeyManagementAlgorithm::EcdhEsA256Kw,
];

const ALL_JWE_ENC: &[JweContentEncryption] = &[
    JweContentEncryption::A128CbcHs256,
    JweContentEncryption::A192CbcHs384,
    JweContentEncryption::A256CbcHs512,
    JweContentEncryption::A128Gcm,
    JweContentEncryption::A192Gcm,
    JweContentEncryption::A256Gcm,
];

const ALL_JWE_ZIP: &[JweCompression] = &[JweCompression::Deflate];

/// The enabled-algorithm subset and header policy a JWS facade call
/// consults, per spec.md section 4.3 ("A `JWSRegistry`/`JWERegistry`
/// instance carries ... the subset of enabled algorithms").
#[derive(Debug, Clone)]
pub struct JwsRegistry {
    enabled: Vec<JwsAlgorithm>,
    pub strict_check_header: bool,
    pub header_registry: HeaderRegistry,
}

impl JwsRegistry {
    /// The recommended-safe registry: every algorithm except `none`.
    #[must_use]
    pub fn default_registry() -> &'static JwsRegistry {
        static DEFAULT: OnceLock<JwsRegistry> = OnceLock::new();
        DEFAULT.get_or_init(|| JwsRegistry {
            enabled: ALL_JWS.to_vec(),
            strict_check_header: true,
            header_registry: HeaderRegistry::new(),
        })
    }

    #[must_use]
    pub fn builder() -> JwsRegistryBuilder {
        JwsRegistryBuilder {
            enabled: ALL_JWS.to_vec(),
            strict_check_header: true,
            header_registry: HeaderRegistry::new(),
        }
    }

    #[must_use]
    pub fn is_enabled(&self, alg: JwsAlgorithm) -> bool {
        self.enabled.contains(&alg)
    }
}

pub struct JwsRegistryBuilder {
    enabled: Vec<JwsAlgorithm>,
    strict_check_header: bool,
    header_registry: HeaderRegistry,
}

impl JwsRegistryBuilder {
    /// Opt into `none`, which is otherwise never part of any registry.
    #[must_use]
    pub fn allow_none(mut self) -> Self {
        if !self.enabled.contains(&JwsAlgorithm::None) {
            self.enabled.push(JwsAlgorithm::None);
        }
        self
    }

    #[must_use]
    pub fn only(mut self, algs: &[JwsAlgorithm]) -> Self {
        self.enabled = algs.to_vec();
        self
    }

    #[must_use]
    pub fn strict_check_header(mut self, strict: bool) -> Self {
        self.strict_check_header = strict;
        self
    }

    #[must_use]
    pub fn header_registry(mut self, registry: HeaderRegistry) -> Self {
        self.header_registry = registry;
        self
    }

    #[must_use]
    pub fn build(self) -> JwsRegistry {
        JwsRegistry {
            enabled: self.enabled,
            strict_check_header: self.strict_check_header,
            header_registry: self.header_registry,
        }
    }
}

/// The JWE counterpart of [`JwsRegistry`], additionally carrying the
/// enabled `enc` and `zip` sets.
#[derive(Debug, Clone)]
pub struct JweRegistry {
    enabled_alg: Vec<JweKeyManagementAlgorithm>,
    enabled_enc: Vec<JweContentEncryption>,
    enabled_zip: Vec<JweCompression>,
    pub strict_check_header: bool,
    pub header_registry: HeaderRegistry,
}

impl JweRegistry {
    #[must_use]
    pub fn default_registry() -> &'static JweRegistry {
        static DEFAULT: OnceLock<JweRegistry> = OnceLock::new();
        DEFAULT.get_or_init(|| JweRegistry {
            enabled_alg: SAFE_JWE_ALG.to_vec(),
            enabled_enc: ALL_JWE_ENC.to_vec(),
            enabled_zip: ALL_JWE_ZIP.to_vec(),
            strict_check_header: true,
            header_registry: HeaderRegistry::new(),
        })
    }

    #[must_use]
    pub fn builder() -> JweRegistryBuilder {
        JweRegistryBuilder {
            enabled_alg: SAFE_JWE_ALG.to_vec(),
            enabled_enc: ALL_JWE_ENC.to_vec(),
            enabled_zip: ALL_JWE_ZIP.to_vec(),
            strict_check_header: true,
            header_registry: HeaderRegistry::new(),
        }
    }

    #[must_use]
    pub fn is_alg_enabled(&self, alg: JweKeyManagementAlgorithm) -> bool {
        self.enabled_alg.contains(&alg)
    }

    #[must_use]
    pub fn is_enc_enabled(&self, enc: JweContentEncryption) -> bool {
        self.enabled_enc.contains(&enc)
    }

    #[must_use]
    pub fn is_zip_enabled(&self, zip: JweCompression) -> bool {
        self.enabled_zip.contains(&zip)
    }
}

pub struct JweRegistryBuilder {
    enabled_alg: Vec<JweKeyManagementAlgorithm>,
    enabled_enc: Vec<JweContentEncryption>,
    enabled_zip: Vec<JweCompression>,
    strict_check_header: bool,
    header_registry: HeaderRegistry,
}

impl JweRegistryBuilder {
    /// Opt into `RSA1_5` and/or `PBES2-*`, excluded from the safe default.
    #[must_use]
    pub fn allow_alg(mut self, alg: JweKeyManagementAlgorithm) -> Self {
        if !self.enabled_alg.contains(&alg) {
            self.enabled_alg.push(alg);
        }
        self
    }

    #[must_use]
    pub fn only_alg(mut self, algs: &[JweKeyManagementAlgorithm]) -> Self {
        self.enabled_alg = algs.to_vec();
        self
    }

    #[must_use]
    pub fn strict_check_header(mut self, strict: bool) -> Self {
        self.strict_check_header = strict;
        self
    }

    #[must_use]
    pub fn header_registry(mut self, registry: HeaderRegistry) -> Self {
        self.header_registry = registry;
        self
    }

    #[must_use]
    pub fn build(self) -> JweRegistry {
        JweRegistry {
            enabled_alg: self.enabled_alg,
            enabled_enc: self.enabled_enc,
            enabled_zip: self.enabled_zip,
            strict_check_header: self.strict_check_header,
            header_registry: self.header_registry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_excludes_none() {
        assert!(!JwsRegistry::default_registry().is_enabled(JwsAlgorithm::None));
        assert!(JwsRegistry::default_registry().is_enabled(JwsAlgorithm::Hs256));
    }

    #[test]
    fn allow_none_opts_in_explicitly() {
        let registry = JwsRegistry::builder().allow_none().build();
        assert!(registry.is_enabled(JwsAlgorithm::None));
    }

    #[test]
    fn default_jwe_registry_excludes_rsa1_5_and_pbes2() {
        let registry = JweRegistry::default_registry();
        assert!(!registry.is_alg_enabled(JweKeyManagementAlgorithm::Rsa1_5));
        assert!(!registry.is_alg_enabled(JweKeyManagementAlgorithm::Pbes2Hs256A128Kw));
        assert!(registry.is_alg_enabled(JweKeyManagementAlgorithm::Dir));
    }
}
