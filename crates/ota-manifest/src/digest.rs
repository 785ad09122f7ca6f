use crate::error::{ManifestError, Result};
use md5::{Digest, Md5};
use std::fmt;
use std::str::FromStr;

/// Length of a hex-encoded [`ContentDigest`].
pub const DIGEST_HEX_LEN: usize = 32;

/// MD5 checksum of a complete firmware artifact.
///
/// The device compares this value against the image it downloads, and the
/// hex form is part of the signed payload, so it binds the signature to one
/// concrete artifact rather than just a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 16]);

impl ContentDigest {
    /// Digest the full byte sequence.
    pub fn compute(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 16];
        raw.copy_from_slice(&Md5::digest(bytes));
        Self(raw)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex encoding, always 32 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentDigest {
    type Err = ManifestError;

    /// Parse a 32 character lowercase hex digest. Uppercase is rejected because
    /// the signed payload uses the exact string.
    fn from_str(s: &str) -> Result<Self> {
        if s.len() != DIGEST_HEX_LEN {
            return Err(ManifestError::invalid(format!(
                "md5sum must be {DIGEST_HEX_LEN} hex characters, got {}",
                s.len()
            )));
        }
        if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(ManifestError::invalid("md5sum must be lowercase hex"));
        }
        let mut raw = [0u8; 16];
        hex::decode_to_slice(s, &mut raw)
            .map_err(|err| ManifestError::invalid(format!("md5sum is not hex: {err}")))?;
        Ok(Self(raw))
    }
}

/// Build the exact byte sequence covered by the manifest signature: the URL
/// followed directly by the hex digest, with no separator.
pub fn signature_input(url: &str, hex_digest: &str) -> Vec<u8> {
    let mut input = Vec::with_capacity(url.len() + hex_digest.len());
    input.extend_from_slice(url.as_bytes());
    input.extend_from_slice(hex_digest.as_bytes());
    input
}
