use crate::error::{ManifestError, Result};
use ed25519_dalek::{SigningKey, VerifyingKey, KEYPAIR_LENGTH, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Ed25519 private key stored as hex text on disk.
///
/// Two layouts are accepted: the 32-byte seed (64 hex characters) and the
/// 64-byte seed-plus-public-key form (128 hex characters) that Go tooling
/// writes out for `ed25519.PrivateKey`.
#[derive(Debug, Clone)]
pub struct HexKeyFile {
    path: PathBuf,
}

impl HexKeyFile {
    /// Reference a key file; nothing is read until [`HexKeyFile::load`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the key file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and decode the signing key.
    pub fn load(&self) -> Result<SigningKey> {
        let text = fs::read_to_string(&self.path)
            .map(Zeroizing::new)
            .map_err(|source| ManifestError::KeyIo {
                path: self.path.clone(),
                source,
            })?;
        let key = parse_signing_key_hex(&text)?;
        tracing::debug!(path = ?self.path, "loaded signing key");
        Ok(key)
    }

    /// Write `key` as a hex seed. Refuses to replace an existing file.
    pub fn store(&self, key: &SigningKey) -> Result<()> {
        let encoded = Zeroizing::new(hex::encode(key.to_bytes()));

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let io_err = |source| ManifestError::KeyIo {
            path: self.path.clone(),
            source,
        };
        let mut file = options.open(&self.path).map_err(io_err)?;
        file.write_all(encoded.as_bytes()).map_err(io_err)?;
        file.write_all(b"\n").map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        Ok(())
    }
}

/// Decode a hex private key in either accepted layout.
pub fn parse_signing_key_hex(text: &str) -> Result<SigningKey> {
    let raw = decode_key_hex(text)?;
    match raw.len() {
        SECRET_KEY_LENGTH => {
            let mut seed = Zeroizing::new([0u8; SECRET_KEY_LENGTH]);
            seed.copy_from_slice(&raw);
            Ok(SigningKey::from_bytes(&seed))
        }
        KEYPAIR_LENGTH => {
            let mut pair = Zeroizing::new([0u8; KEYPAIR_LENGTH]);
            pair.copy_from_slice(&raw);
            SigningKey::from_keypair_bytes(&pair)
                .map_err(|_| ManifestError::key("embedded public key does not match seed"))
        }
        other => Err(ManifestError::key(format!(
            "expected {SECRET_KEY_LENGTH} or {KEYPAIR_LENGTH} key bytes, got {other}"
        ))),
    }
}

/// Decode a hex public key as provisioned on the device.
pub fn parse_verifying_key_hex(text: &str) -> Result<VerifyingKey> {
    let raw = decode_key_hex(text)?;
    let bytes: [u8; PUBLIC_KEY_LENGTH] = raw.as_slice().try_into().map_err(|_| {
        ManifestError::key(format!(
            "expected {PUBLIC_KEY_LENGTH} public key bytes, got {}",
            raw.len()
        ))
    })?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| ManifestError::key("public key is not a valid curve point"))
}

fn decode_key_hex(text: &str) -> Result<Zeroizing<Vec<u8>>> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(ManifestError::key("key file is empty"));
    }
    hex::decode(digits)
        .map(Zeroizing::new)
        .map_err(|err| ManifestError::key(format!("key is not valid hex: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // RFC 8032 section 7.1, test 1.
    const SEED_HEX: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
    const PUBLIC_HEX: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

    #[test]
    fn parses_seed_hex() {
        let key = parse_signing_key_hex(SEED_HEX).unwrap();
        assert_eq!(hex::encode(key.verifying_key().to_bytes()), PUBLIC_HEX);
    }

    #[test]
    fn parses_go_style_keypair_hex() {
        let text = format!("{SEED_HEX}{PUBLIC_HEX}\n");
        let key = parse_signing_key_hex(&text).unwrap();
        assert_eq!(hex::encode(key.to_bytes()), SEED_HEX);
    }

    #[test]
    fn rejects_keypair_with_foreign_public_half() {
        let text = format!("{SEED_HEX}{}", "11".repeat(32));
        assert!(parse_signing_key_hex(&text).unwrap_err().is_key());
    }

    #[test]
    fn tolerates_whitespace_and_prefix() {
        let text = format!("  0x{SEED_HEX}\r\n");
        assert!(parse_signing_key_hex(&text).is_ok());
    }

    #[test]
    fn rejects_malformed_material() {
        for text in ["", "   ", "abcd", "zz", &SEED_HEX[..62]] {
            let err = parse_signing_key_hex(text).unwrap_err();
            assert!(err.is_key(), "{text:?} gave {err}");
        }
    }

    #[test]
    fn parses_public_key() {
        let verifying = parse_verifying_key_hex(PUBLIC_HEX).unwrap();
        let signing = parse_signing_key_hex(SEED_HEX).unwrap();
        assert_eq!(verifying, signing.verifying_key());
        assert!(parse_verifying_key_hex(SEED_HEX.get(..10).unwrap()).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempdir().unwrap();
        let err = HexKeyFile::new(dir.path().join("absent.key"))
            .load()
            .unwrap_err();
        assert!(matches!(err, ManifestError::KeyIo { .. }));
    }

    #[test]
    fn store_then_load() {
        let dir = tempdir().unwrap();
        let file = HexKeyFile::new(dir.path().join("signing.key"));
        let key = SigningKey::from_bytes(&[9u8; 32]);

        file.store(&key).unwrap();
        let loaded = file.load().unwrap();
        assert_eq!(loaded.to_bytes(), key.to_bytes());

        // A second store must not clobber the existing key.
        let other = SigningKey::from_bytes(&[1u8; 32]);
        assert!(file.store(&other).is_err());
        assert_eq!(file.load().unwrap().to_bytes(), key.to_bytes());
    }
}
