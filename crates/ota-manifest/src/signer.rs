use crate::error::{ManifestError, Result};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};

/// Length of a raw Ed25519 signature.
pub const SIGNATURE_LENGTH: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// Produces signatures over manifest signature input.
pub trait ManifestSigner: Send + Sync {
    /// Sign `message`, returning the raw signature bytes.
    fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LENGTH]>;

    /// Public half matching the signing key.
    fn verifying_key(&self) -> VerifyingKey;
}

/// Ed25519 signer holding a key for the lifetime of one invocation.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Wrap an already loaded signing key.
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("public_key", &hex::encode(self.key.verifying_key().as_bytes()))
            .finish_non_exhaustive()
    }
}

impl ManifestSigner for Ed25519Signer {
    fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LENGTH]> {
        let signature = self
            .key
            .try_sign(message)
            .map_err(|err| ManifestError::Signing(err.to_string()))?;
        Ok(signature.to_bytes())
    }

    fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }
}

/// Check a raw signature against `message`.
pub fn verify_signature(
    key: &VerifyingKey,
    message: &[u8],
    signature: &[u8; SIGNATURE_LENGTH],
) -> Result<()> {
    key.verify(message, &Signature::from_bytes(signature))
        .map_err(|_| ManifestError::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 8032 section 7.1, test 1: empty message.
    const SEED: [u8; 32] = [
        0x9d, 0x61, 0xb1, 0x9d, 0xef, 0xfd, 0x5a, 0x60, 0xba, 0x84, 0x4a, 0xf4, 0x92, 0xec, 0x2c,
        0xc4, 0x44, 0x49, 0xc5, 0x69, 0x7b, 0x32, 0x69, 0x19, 0x70, 0x3b, 0xac, 0x03, 0x1c, 0xae,
        0x7f, 0x60,
    ];
    const EMPTY_MESSAGE_SIGNATURE: &str = "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e065224901555fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b";

    #[test]
    fn matches_rfc8032_vector() {
        let signer = Ed25519Signer::new(SigningKey::from_bytes(&SEED));
        let signature = signer.sign(b"").unwrap();
        assert_eq!(hex::encode(signature), EMPTY_MESSAGE_SIGNATURE);
    }

    #[test]
    fn signature_verifies_with_matching_key_only() {
        let signer = Ed25519Signer::new(SigningKey::from_bytes(&[7u8; 32]));
        let message = b"https://example.com/fw.bindeadbeefdeadbeefdeadbeefdeadbeef";
        let signature = signer.sign(message).unwrap();

        verify_signature(&signer.verifying_key(), message, &signature).unwrap();

        let other = SigningKey::from_bytes(&[8u8; 32]).verifying_key();
        assert!(matches!(
            verify_signature(&other, message, &signature),
            Err(ManifestError::SignatureInvalid)
        ));
    }

    #[test]
    fn any_single_byte_change_breaks_verification() {
        let signer = Ed25519Signer::new(SigningKey::from_bytes(&[7u8; 32]));
        let message = b"https://example.com/fw.bin900150983cd24fb0d6963f7d28e17f72".to_vec();
        let signature = signer.sign(&message).unwrap();
        let key = signer.verifying_key();

        for index in 0..message.len() {
            let mut tampered = message.clone();
            tampered[index] ^= 0x01;
            assert!(
                verify_signature(&key, &tampered, &signature).is_err(),
                "flip at {index} still verified"
            );
        }
    }

    #[test]
    fn signing_is_deterministic() {
        let signer = Ed25519Signer::new(SigningKey::from_bytes(&[3u8; 32]));
        assert_eq!(signer.sign(b"abc").unwrap(), signer.sign(b"abc").unwrap());
    }

    #[test]
    fn debug_output_omits_secret() {
        let signer = Ed25519Signer::new(SigningKey::from_bytes(&SEED));
        let rendered = format!("{signer:?}");
        assert!(!rendered.contains("9d61b19d"));
        assert!(rendered.contains("d75a9801"));
    }
}
