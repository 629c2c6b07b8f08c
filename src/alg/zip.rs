//! [C3 JWE-zip] Plaintext compression. Only `DEF` (raw DEFLATE, RFC 1951)
//! is registered, matching the `zip` values RFC 7516 section 4.1.3 defines.
//! Grounded on `HumanAssisted-JACS`'s use of `flate2` for payload
//! compression.

use flate2::Compression;
use flate2::read::{DeflateDecoder, DeflateEncoder};
use std::io::Read;

use crate::error::Error;
use crate::jwa::JweCompression;

pub fn compress(zip: JweCompression, data: &[u8]) -> Result<Vec<u8>, Error> {
    match zip {
        JweCompression::Deflate => {
            let mut encoder = DeflateEncoder::new(data, Compression::default());
            let mut out = Vec::new();
            encoder
                .read_to_end(&mut out)
                .map_err(|e| Error::Provider(format!("DEF compression failed: {e}")))?;
            Ok(out)
        }
    }
}

pub fn decompress(zip: JweCompression, data: &[u8]) -> Result<Vec<u8>, Error> {
    match zip {
        JweCompression::Deflate => {
            let mut decoder = DeflateDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| Error::decode(format!("DEF decompression failed: {e}")))?;
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let compressed = compress(JweCompression::Deflate, &data).unwrap();
        assert!(compressed.len() < data.len());
        let restored = decompress(JweCompression::Deflate, &compressed).unwrap();
        assert_eq!(restored, data);
    }
}
