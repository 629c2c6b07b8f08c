//! Sign/verify primitives for every [`JwsAlgorithm`], dispatched from the
//! generalized key model (`crate::jwk`) rather than the teacher's single
//! `EcdsaKey`/`RsaKey` pair.
//!
//! HMAC and the three NIST ECDSA curves go through `aws-lc-rs`, matching the
//! teacher's `rama_crypto::jose::jwk` choice of provider. RSA goes through
//! the `rsa` crate (grounded on `HumanAssisted-JACS`) because the key model
//! already carries `rsa::{RsaPublicKey, RsaPrivateKey}` for CRT-component
//! JWK export. `secp256k1` (RFC 8812) and `Ed448` have no `aws-lc-rs`
//! support, so they go through `k256`/`ecdsa` and `ed448-goldilocks`
//! respectively.

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{
    self as lc_signature, EcdsaKeyPair, Ed25519KeyPair, KeyPair as _, UnparsedPublicKey,
};
use elliptic_curve::sec1::ToEncodedPoint;
use rsa::pkcs1v15;
use rsa::pss;
use sha2::{Sha256, Sha384, Sha512};
use signature::{RandomizedSigner, Signer as _, Verifier as _};

use crate::error::Error;
use crate::jwa::JwsAlgorithm;
use crate::jwk::{EcCurve, Key, KeyMaterial, MIN_SIGNING_MODULUS_BITS, OkpCurve};

pub fn sign(alg: JwsAlgorithm, signing_input: &[u8], key: &Key) -> Result<Vec<u8>, Error> {
    match alg {
        JwsAlgorithm::None => Ok(Vec::new()),
        JwsAlgorithm::Hs256 | JwsAlgorithm::Hs384 | JwsAlgorithm::Hs512 => {
            hmac_sign(alg, signing_input, key)
        }
        JwsAlgorithm::Rs256 | JwsAlgorithm::Rs384 | JwsAlgorithm::Rs512 => {
            rsa_pkcs1v15_sign(alg, signing_input, key)
        }
        JwsAlgorithm::Ps256 | JwsAlgorithm::Ps384 | JwsAlgorithm::Ps512 => {
            rsa_pss_sign(alg, signing_input, key)
        }
        JwsAlgorithm::Es256 | JwsAlgorithm::Es384 | JwsAlgorithm::Es512 => {
            ecdsa_sign(alg, signing_input, key)
        }
        JwsAlgorithm::Es256K => ecdsa_secp256k1_sign(signing_input, key),
        JwsAlgorithm::EdDsa => eddsa_sign(signing_input, key),
    }
}

pub fn verify(alg: JwsAlgorithm, signing_input: &[u8], signature: &[u8], key: &Key) -> Result<(), Error> {
    match alg {
        JwsAlgorithm::None => {
            if signature.is_empty() {
                Ok(())
            } else {
                Err(Error::BadSignature)
            }
        }
        JwsAlgorithm::Hs256 | JwsAlgorithm::Hs384 | JwsAlgorithm::Hs512 => {
            hmac_verify(alg, signing_input, signature, key)
        }
        JwsAlgorithm::Rs256 | JwsAlgorithm::Rs384 | JwsAlgorithm::Rs512 => {
            rsa_pkcs1v15_verify(alg, signing_input, signature, key)
        }
        JwsAlgorithm::Ps256 | JwsAlgorithm::Ps384 | JwsAlgorithm::Ps512 => {
            rsa_pss_verify(alg, signing_input, signature, key)
        }
        JwsAlgorithm::Es256 | JwsAlgorithm::Es384 | JwsAlgorithm::Es512 => {
            ecdsa_verify(alg, signing_input, signature, key)
        }
        JwsAlgorithm::Es256K => ecdsa_secp256k1_verify(signing_input, signature, key),
        JwsAlgorithm::EdDsa => eddsa_verify(signing_input, signature, key),
    }
}

fn oct_secret(key: &Key) -> Result<&[u8], Error> {
    match &key.material {
        KeyMaterial::Oct(oct) => Ok(oct.secret()),
        _ => Err(Error::invalid_key("this algorithm requires an oct key")),
    }
}

fn hmac_algorithm(alg: JwsAlgorithm) -> &'static aws_lc_rs::hmac::Algorithm {
    match alg {
        JwsAlgorithm::Hs256 => &aws_lc_rs::hmac::HMAC_SHA256,
        JwsAlgorithm::Hs384 => &aws_lc_rs::hmac::HMAC_SHA384,
        JwsAlgorithm::Hs512 => &aws_lc_rs::hmac::HMAC_SHA512,
        _ => unreachable!("hmac_algorithm only called for HS* variants"),
    }
}

fn hmac_sign(alg: JwsAlgorithm, signing_input: &[u8], key: &Key) -> Result<Vec<u8>, Error> {
    let secret = oct_secret(key)?;
    let hmac_key = aws_lc_rs::hmac::Key::new(*hmac_algorithm(alg), secret);
    Ok(aws_lc_rs::hmac::sign(&hmac_key, signing_input).as_ref().to_vec())
}

fn hmac_verify(alg: JwsAlgorithm, signing_input: &[u8], signature: &[u8], key: &Key) -> Result<(), Error> {
    let secret = oct_secret(key)?;
    let hmac_key = aws_lc_rs::hmac::Key::new(*hmac_algorithm(alg), secret);
    aws_lc_rs::hmac::verify(&hmac_key, signing_input, signature).map_err(|_| Error::BadSignature)
}

fn rsa_private(key: &Key) -> Result<rsa::RsaPrivateKey, Error> {
    match &key.material {
        KeyMaterial::Rsa(rsa) => {
            if rsa.modulus_bits() < MIN_SIGNING_MODULUS_BITS {
                return Err(Error::invalid_key(format!(
                    "RSA modulus is {} bits, signing requires at least {}",
                    rsa.modulus_bits(),
                    MIN_SIGNING_MODULUS_BITS
                )));
            }
            rsa.private_key().map(Clone::clone)
        }
        _ => Err(Error::invalid_key("this algorithm requires an RSA key")),
    }
}

fn rsa_public(key: &Key) -> Result<&rsa::RsaPublicKey, Error> {
    match &key.material {
        KeyMaterial::Rsa(rsa) => Ok(rsa.public_key()),
        _ => Err(Error::invalid_key("this algorithm requires an RSA key")),
    }
}

macro_rules! rsa_pkcs1v15_dispatch {
    ($alg:expr, $private:expr, $input:expr) => {
        match $alg {
            JwsAlgorithm::Rs256 => {
                pkcs1v15::SigningKey::<Sha256>::new($private).try_sign($input)
            }
            JwsAlgorithm::Rs384 => {
                pkcs1v15::SigningKey::<Sha384>::new($private).try_sign($input)
            }
            JwsAlgorithm::Rs512 => {
                pkcs1v15::SigningKey::<Sha512>::new($private).try_sign($input)
            }
            _ => unreachable!("rsa_pkcs1v15_dispatch only called for RS* variants"),
        }
    };
}

fn rsa_pkcs1v15_sign(alg: JwsAlgorithm, signing_input: &[u8], key: &Key) -> Result<Vec<u8>, Error> {
    let private = rsa_private(key)?;
    let sig = rsa_pkcs1v15_dispatch!(alg, private, signing_input)
        .map_err(|e| Error::invalid_key(format!("RSA signing failed: {e}")))?;
    Ok(sig.to_vec())
}

fn rsa_pkcs1v15_verify(alg: JwsAlgorithm, signing_input: &[u8], signature: &[u8], key: &Key) -> Result<(), Error> {
    let public = rsa_public(key)?.clone();
    let sig = pkcs1v15::Signature::try_from(signature).map_err(|_| Error::BadSignature)?;
    let result = match alg {
        JwsAlgorithm::Rs256 => pkcs1v15::VerifyingKey::<Sha256>::new(public).verify(signing_input, &sig),
        JwsAlgorithm::Rs384 => pkcs1v15::VerifyingKey::<Sha384>::new(public).verify(signing_input, &sig),
        JwsAlgorithm::Rs512 => pkcs1v15::VerifyingKey::<Sha512>::new(public).verify(signing_input, &sig),
        _ => unreachable!("rsa_pkcs1v15_verify only called for RS* variants"),
    };
    result.map_err(|_| Error::BadSignature)
}

fn rsa_pss_sign(alg: JwsAlgorithm, signing_input: &[u8], key: &Key) -> Result<Vec<u8>, Error> {
    let private = rsa_private(key)?;
    let mut rng = rand::rngs::OsRng;
    let sig = match alg {
        JwsAlgorithm::Ps256 => pss::BlindedSigningKey::<Sha256>::new(private).sign_with_rng(&mut rng, signing_input),
        JwsAlgorithm::Ps384 => pss::BlindedSigningKey::<Sha384>::new(private).sign_with_rng(&mut rng, signing_input),
        JwsAlgorithm::Ps512 => pss::BlindedSigningKey::<Sha512>::new(private).sign_with_rng(&mut rng, signing_input),
        _ => unreachable!("rsa_pss_sign only called for PS* variants"),
    };
    Ok(sig.to_vec())
}

fn rsa_pss_verify(alg: JwsAlgorithm, signing_input: &[u8], signature: &[u8], key: &Key) -> Result<(), Error> {
    let public = rsa_public(key)?.clone();
    let sig = pss::Signature::try_from(signature).map_err(|_| Error::BadSignature)?;
    let result = match alg {
        JwsAlgorithm::Ps256 => pss::VerifyingKey::<Sha256>::new(public).verify(signing_input, &sig),
        JwsAlgorithm::Ps384 => pss::VerifyingKey::<Sha384>::new(public).verify(signing_input, &sig),
        JwsAlgorithm::Ps512 => pss::VerifyingKey::<Sha512>::new(public).verify(signing_input, &sig),
        _ => unreachable!("rsa_pss_verify only called for PS* variants"),
    };
    result.map_err(|_| Error::BadSignature)
}

fn expected_ec_curve(alg: JwsAlgorithm) -> EcCurve {
    match alg {
        JwsAlgorithm::Es256 => EcCurve::P256,
        JwsAlgorithm::Es384 => EcCurve::P384,
        JwsAlgorithm::Es512 => EcCurve::P521,
        _ => unreachable!("expected_ec_curve only called for ES256/384/512"),
    }
}

fn ecdsa_signing_algorithm(alg: JwsAlgorithm) -> &'static lc_signature::EcdsaSigningAlgorithm {
    match alg {
        JwsAlgorithm::Es256 => &lc_signature::ECDSA_P256_SHA256_FIXED_SIGNING,
        JwsAlgorithm::Es384 => &lc_signature::ECDSA_P384_SHA384_FIXED_SIGNING,
        JwsAlgorithm::Es512 => &lc_signature::ECDSA_P521_SHA512_FIXED_SIGNING,
        _ => unreachable!("ecdsa_signing_algorithm only called for ES256/384/512"),
    }
}

fn ecdsa_verification_algorithm(alg: JwsAlgorithm) -> &'static lc_signature::EcdsaVerificationAlgorithm {
    match alg {
        JwsAlgorithm::Es256 => &lc_signature::ECDSA_P256_SHA256_FIXED,
        JwsAlgorithm::Es384 => &lc_signature::ECDSA_P384_SHA384_FIXED,
        JwsAlgorithm::Es512 => &lc_signature::ECDSA_P521_SHA512_FIXED,
        _ => unreachable!("ecdsa_verification_algorithm only called for ES256/384/512"),
    }
}

fn ec_material(key: &Key) -> Result<&crate::jwk::EcKeyMaterial, Error> {
    match &key.material {
        KeyMaterial::Ec(ec) => Ok(ec),
        _ => Err(Error::invalid_key("this algorithm requires an EC key")),
    }
}

fn ecdsa_sign(alg: JwsAlgorithm, signing_input: &[u8], key: &Key) -> Result<Vec<u8>, Error> {
    let ec = ec_material(key)?;
    if ec.curve() != expected_ec_curve(alg) {
        return Err(Error::invalid_key(format!(
            "{} requires curve {}, key is {}",
            alg.name(),
            expected_ec_curve(alg).name(),
            ec.curve().name()
        )));
    }
    let pkcs8 = ec.to_pkcs8_der()?;
    let keypair = EcdsaKeyPair::from_pkcs8(ecdsa_signing_algorithm(alg), &pkcs8, &SystemRandom::new())
        .map_err(|e| Error::invalid_key(format!("invalid EC signing key: {e}")))?;
    let sig = keypair
        .sign(&SystemRandom::new(), signing_input)
        .map_err(|e| Error::Provider(format!("ECDSA signing failed: {e}")))?;
    Ok(sig.as_ref().to_vec())
}

fn ecdsa_verify(alg: JwsAlgorithm, signing_input: &[u8], signature: &[u8], key: &Key) -> Result<(), Error> {
    let ec = ec_material(key)?;
    if ec.curve() != expected_ec_curve(alg) {
        return Err(Error::invalid_key(format!(
            "{} requires curve {}, key is {}",
            alg.name(),
            expected_ec_curve(alg).name(),
            ec.curve().name()
        )));
    }
    let public_bytes: Vec<u8> = match alg {
        JwsAlgorithm::Es256 => ec.public_key_p256().unwrap().to_encoded_point(false).as_bytes().to_vec(),
        JwsAlgorithm::Es384 => ec.public_key_p384().unwrap().to_encoded_point(false).as_bytes().to_vec(),
        JwsAlgorithm::Es512 => ec.public_key_p521().unwrap().to_encoded_point(false).as_bytes().to_vec(),
        _ => unreachable!(),
    };
    let unparsed = UnparsedPublicKey::new(ecdsa_verification_algorithm(alg), &public_bytes);
    unparsed.verify(signing_input, signature).map_err(|_| Error::BadSignature)
}

fn ecdsa_secp256k1_sign(signing_input: &[u8], key: &Key) -> Result<Vec<u8>, Error> {
    let ec = ec_material(key)?;
    let secret = ec
        .private_key_secp256k1()
        .ok_or_else(|| Error::invalid_key("ES256K requires a secp256k1 private key"))?;
    use k256::ecdsa::signature::Signer;
    let signing_key = k256::ecdsa::SigningKey::from(secret.clone());
    let sig: k256::ecdsa::Signature = signing_key.sign(signing_input);
    Ok(sig.to_bytes().to_vec())
}

fn ecdsa_secp256k1_verify(signing_input: &[u8], signature: &[u8], key: &Key) -> Result<(), Error> {
    let ec = ec_material(key)?;
    let public = ec
        .public_key_secp256k1()
        .ok_or_else(|| Error::invalid_key("ES256K requires a secp256k1 key"))?;
    use k256::ecdsa::signature::Verifier;
    let verifying_key = k256::ecdsa::VerifyingKey::from(public);
    let sig = k256::ecdsa::Signature::try_from(signature).map_err(|_| Error::BadSignature)?;
    verifying_key.verify(signing_input, &sig).map_err(|_| Error::BadSignature)
}

fn okp_material(key: &Key) -> Result<&crate::jwk::OkpKeyMaterial, Error> {
    match &key.material {
        KeyMaterial::Okp(okp) => Ok(okp),
        _ => Err(Error::invalid_key("EdDSA requires an OKP key")),
    }
}

fn eddsa_sign(signing_input: &[u8], key: &Key) -> Result<Vec<u8>, Error> {
    let okp = okp_material(key)?;
    match okp.curve() {
        OkpCurve::Ed25519 => {
            let seed = okp.private_bytes()?;
            let keypair = Ed25519KeyPair::from_seed_unchecked(seed)
                .map_err(|e| Error::invalid_key(format!("invalid Ed25519 key: {e}")))?;
            Ok(keypair.sign(signing_input).as_ref().to_vec())
        }
        OkpCurve::Ed448 => {
            let seed = okp.private_bytes()?;
            let signing_key = ed448_goldilocks::sign::SigningKey::from_bytes(seed)
                .map_err(|e| Error::invalid_key(format!("invalid Ed448 key: {e:?}")))?;
            let sig = signing_key.sign(signing_input);
            Ok(sig.to_bytes().to_vec())
        }
        OkpCurve::X25519 | OkpCurve::X448 => Err(Error::invalid_key("EdDSA requires a signing curve (Ed25519/Ed448)")),
    }
}

fn eddsa_verify(signing_input: &[u8], signature: &[u8], key: &Key) -> Result<(), Error> {
    let okp = okp_material(key)?;
    match okp.curve() {
        OkpCurve::Ed25519 => {
            let unparsed = UnparsedPublicKey::new(&lc_signature::ED25519, okp.public_bytes());
            unparsed.verify(signing_input, signature).map_err(|_| Error::BadSignature)
        }
        OkpCurve::Ed448 => {
            let verifying_key = ed448_goldilocks::sign::VerifyingKey::from_bytes(okp.public_bytes())
                .map_err(|_| Error::invalid_key("invalid Ed448 public key"))?;
            let sig = ed448_goldilocks::sign::Signature::from_bytes(signature)
                .map_err(|_| Error::BadSignature)?;
            verifying_key.verify(signing_input, &sig).map_err(|_| Error::BadSignature)
        }
        OkpCurve::X25519 | OkpCurve::X448 => Err(Error::invalid_key("EdDSA requires a signing curve (Ed25519/Ed448)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::RsaKeyMaterial;

    #[test]
    fn rsa_signing_rejects_a_modulus_below_the_minimum() {
        let private = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, 512).unwrap();
        let key = Key::new(KeyMaterial::Rsa(Box::new(RsaKeyMaterial::from_keypair(
            private.to_public_key(),
            Some(private),
        ))));
        let err = sign(JwsAlgorithm::Rs256, b"signing input", &key).unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }
}
