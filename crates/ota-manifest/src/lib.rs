//! Signed firmware update manifests for e-paper displays.
//!
//! A manifest binds a firmware URL to the MD5 digest of the image found there.
//! The Ed25519 signature covers the URL immediately followed by the hex digest,
//! with no separator, which is the exact construction the display firmware
//! verifies before it downloads anything.
//!
//! ```ignore
//! use ota_manifest::{ArtifactFetcher, Ed25519Signer, HexKeyFile, HttpArtifactFetcher, ManifestBuilder};
//!
//! # async fn demo() -> ota_manifest::Result<()> {
//! let fetcher = HttpArtifactFetcher::builder().build()?;
//! let artifact = fetcher
//!     .fetch("https://example.com/releases/download/100/e-paper.100.bin")
//!     .await?;
//!
//! let signer = Ed25519Signer::new(HexKeyFile::new("ota.key").load()?);
//! let (manifest, payload) = ManifestBuilder::new(&signer).build_payload(&artifact, "100")?;
//! println!("{} -> {} bytes", manifest.md5sum, payload.len());
//! # Ok(())
//! # }
//! ```

mod digest;
mod error;
mod fetcher;
mod keystore;
mod manifest;
mod signer;

pub use digest::{signature_input, ContentDigest, DIGEST_HEX_LEN};
pub use error::{ManifestError, Result};
pub use fetcher::{
    ArtifactFetcher, FirmwareArtifact, HttpArtifactFetcher, HttpArtifactFetcherBuilder,
    DEFAULT_FETCH_TIMEOUT,
};
pub use keystore::{parse_signing_key_hex, parse_verifying_key_hex, HexKeyFile};
pub use manifest::{ManifestBuilder, UpdateManifest, DEVICE_PAYLOAD_LIMIT};
pub use signer::{verify_signature, Ed25519Signer, ManifestSigner, SIGNATURE_LENGTH};

pub use ed25519_dalek::{SigningKey, VerifyingKey};
