//! [C3 JWE-enc] Content encryption: AES-GCM and the composite AES-CBC +
//! HMAC construction from RFC 7518 section 5.2.
//!
//! `aws-lc-rs`'s `aead` module has no AES-192-GCM, so all three GCM sizes go
//! through the RustCrypto `aes-gcm` crate uniformly instead (grounded on
//! `less-crypto`, which already depends on `aes-gcm`). CBC-HMAC has no
//! `aws-lc-rs` equivalent at all and is built from `aes`/`cbc` + `hmac`.

use aead::{Aead, KeyInit, Payload};
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::{Aes128Gcm, Aes192Gcm, Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};

use crate::error::Error;
use crate::jwa::JweContentEncryption;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub fn encrypt(
    enc: JweContentEncryption,
    plaintext: &[u8],
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    check_sizes(enc, cek, iv)?;
    match enc {
        JweContentEncryption::A128Gcm | JweContentEncryption::A192Gcm | JweContentEncryption::A256Gcm => {
            gcm_encrypt(enc, plaintext, cek, iv, aad)
        }
        JweContentEncryption::A128CbcHs256
        | JweContentEncryption::A192CbcHs384
        | JweContentEncryption::A256CbcHs512 => cbc_hmac_encrypt(enc, plaintext, cek, iv, aad),
    }
}

pub fn decrypt(
    enc: JweContentEncryption,
    ciphertext: &[u8],
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, Error> {
    check_sizes(enc, cek, iv)?;
    match enc {
        JweContentEncryption::A128Gcm | JweContentEncryption::A192Gcm | JweContentEncryption::A256Gcm => {
            gcm_decrypt(enc, ciphertext, cek, iv, aad, tag)
        }
        JweContentEncryption::A128CbcHs256
        | JweContentEncryption::A192CbcHs384
        | JweContentEncryption::A256CbcHs512 => cbc_hmac_decrypt(enc, ciphertext, cek, iv, aad, tag),
    }
}

fn check_sizes(enc: JweContentEncryption, cek: &[u8], iv: &[u8]) -> Result<(), Error> {
    if cek.len() != enc.cek_size() {
        return Err(Error::invalid_key(format!(
            "{} requires a {}-byte CEK, got {}",
            enc.name(),
            enc.cek_size(),
            cek.len()
        )));
    }
    if iv.len() != enc.iv_size() {
        return Err(Error::invalid_header(
            "iv",
            format!("{} requires a {}-byte IV, got {}", enc.name(), enc.iv_size(), iv.len()),
        ));
    }
    Ok(())
}

fn gcm_encrypt(
    enc: JweContentEncryption,
    plaintext: &[u8],
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let nonce = Nonce::from_slice(iv);
    let payload = Payload { msg: plaintext, aad };
    let mut combined = match enc {
        JweContentEncryption::A128Gcm => Aes128Gcm::new_from_slice(cek)
            .map_err(|e| Error::invalid_key(e.to_string()))?
            .encrypt(nonce, payload),
        JweContentEncryption::A192Gcm => Aes192Gcm::new_from_slice(cek)
            .map_err(|e| Error::invalid_key(e.to_string()))?
            .encrypt(nonce, payload),
        JweContentEncryption::A256Gcm => Aes256Gcm::new_from_slice(cek)
            .map_err(|e| Error::invalid_key(e.to_string()))?
            .encrypt(nonce, payload),
        _ => unreachable!("gcm_encrypt only called for GCM variants"),
    }
    .map_err(|e| Error::Provider(format!("AES-GCM encryption failed: {e}")))?;
    let tag = combined.split_off(combined.len() - enc.tag_size());
    Ok((combined, tag))
}

fn gcm_decrypt(
    enc: JweContentEncryption,
    ciphertext: &[u8],
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, Error> {
    let nonce = Nonce::from_slice(iv);
    let mut combined = Vec::with_capacity(ciphertext.len() + tag.len());
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);
    let payload = Payload { msg: &combined, aad };
    match enc {
        JweContentEncryption::A128Gcm => Aes128Gcm::new_from_slice(cek)
            .map_err(|e| Error::invalid_key(e.to_string()))?
            .decrypt(nonce, payload),
        JweContentEncryption::A192Gcm => Aes192Gcm::new_from_slice(cek)
            .map_err(|e| Error::invalid_key(e.to_string()))?
            .decrypt(nonce, payload),
        JweContentEncryption::A256Gcm => Aes256Gcm::new_from_slice(cek)
            .map_err(|e| Error::invalid_key(e.to_string()))?
            .decrypt(nonce, payload),
        _ => unreachable!("gcm_decrypt only called for GCM variants"),
    }
    .map_err(|_| Error::BadSignature)
}

fn split_cek(enc: JweContentEncryption, cek: &[u8]) -> (&[u8], &[u8]) {
    let half = cek.len() / 2;
    (&cek[..half], &cek[half..])
}

/// RFC 7518 section 5.2.2.1: `AL` is the 64-bit big-endian bit length of
/// the AAD, appended after the IV and ciphertext before MAC'ing.
fn al_octets(aad: &[u8]) -> [u8; 8] {
    ((aad.len() as u64) * 8).to_be_bytes()
}

fn cbc_hmac_encrypt(
    enc: JweContentEncryption,
    plaintext: &[u8],
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let (mac_key, enc_key) = split_cek(enc, cek);
    let ciphertext = match enc {
        JweContentEncryption::A128CbcHs256 => {
            Aes128CbcEnc::new(enc_key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
        }
        JweContentEncryption::A192CbcHs384 => {
            Aes192CbcEnc::new(enc_key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
        }
        JweContentEncryption::A256CbcHs512 => {
            Aes256CbcEnc::new(enc_key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
        }
        _ => unreachable!("cbc_hmac_encrypt only called for CBC-HMAC variants"),
    };
    let tag = cbc_hmac_tag(enc, mac_key, aad, iv, &ciphertext)?;
    Ok((ciphertext, tag))
}

fn cbc_hmac_decrypt(
    enc: JweContentEncryption,
    ciphertext: &[u8],
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, Error> {
    let (mac_key, enc_key) = split_cek(enc, cek);
    let expected_tag = cbc_hmac_tag(enc, mac_key, aad, iv, ciphertext)?;
    // Constant-time tag comparison: `aws_lc_rs::constant_time` covers byte
    // equality without leaking timing on the early mismatch.
    aws_lc_rs::constant_time::verify_slices_are_equal(&expected_tag, tag).map_err(|_| Error::BadSignature)?;

    match enc {
        JweContentEncryption::A128CbcHs256 => Aes128CbcDec::new(enc_key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        JweContentEncryption::A192CbcHs384 => Aes192CbcDec::new(enc_key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        JweContentEncryption::A256CbcHs512 => Aes256CbcDec::new(enc_key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        _ => unreachable!("cbc_hmac_decrypt only called for CBC-HMAC variants"),
    }
    .map_err(|_| Error::BadSignature)
}

fn cbc_hmac_tag(enc: JweContentEncryption, mac_key: &[u8], aad: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    let al = al_octets(aad);
    let full = match enc {
        JweContentEncryption::A128CbcHs256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(mac_key).expect("HMAC accepts any key length");
            mac.update(aad);
            mac.update(iv);
            mac.update(ciphertext);
            mac.update(&al);
            mac.finalize().into_bytes().to_vec()
        }
        JweContentEncryption::A192CbcHs384 => {
            let mut mac = Hmac::<Sha384>::new_from_slice(mac_key).expect("HMAC accepts any key length");
            mac.update(aad);
            mac.update(iv);
            mac.update(ciphertext);
            mac.update(&al);
            mac.finalize().into_bytes().to_vec()
        }
        JweContentEncryption::A256CbcHs512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(mac_key).expect("HMAC accepts any key length");
            mac.update(aad);
            mac.update(iv);
            mac.update(ciphertext);
            mac.update(&al);
            mac.finalize().into_bytes().to_vec()
        }
        _ => unreachable!("cbc_hmac_tag only called for CBC-HMAC variants"),
    };
    Ok(full[..enc.tag_size()].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcm_round_trips() {
        let cek = vec![7u8; 16];
        let iv = vec![1u8; 12];
        let aad = b"header";
        let (ct, tag) = encrypt(JweContentEncryption::A128Gcm, b"hello world", &cek, &iv, aad).unwrap();
        let pt = decrypt(JweContentEncryption::A128Gcm, &ct, &cek, &iv, aad, &tag).unwrap();
        assert_eq!(pt, b"hello world");
    }

    #[test]
    fn cbc_hmac_round_trips() {
        let cek = vec![3u8; 32];
        let iv = vec![2u8; 16];
        let aad = b"header";
        let (ct, tag) = encrypt(JweContentEncryption::A128CbcHs256, b"hello world", &cek, &iv, aad).unwrap();
        let pt = decrypt(JweContentEncryption::A128CbcHs256, &ct, &cek, &iv, aad, &tag).unwrap();
        assert_eq!(pt, b"hello world");
    }

    #[test]
    fn gcm_tamper_detected() {
        let cek = vec![7u8; 32];
        let iv = vec![1u8; 12];
        let aad = b"header";
        let (mut ct, tag) = encrypt(JweContentEncryption::A256Gcm, b"hello world", &cek, &iv, aad).unwrap();
        ct[0] ^= 0xff;
        assert!(decrypt(JweContentEncryption::A256Gcm, &ct, &cek, &iv, aad, &tag).is_err());
    }
}
