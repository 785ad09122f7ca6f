use crate::digest::{signature_input, ContentDigest};
use crate::error::{ManifestError, Result};
use crate::fetcher::FirmwareArtifact;
use crate::signer::{verify_signature, ManifestSigner, SIGNATURE_LENGTH};
use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

/// Size of the JSON document the display firmware parses the manifest into.
pub const DEVICE_PAYLOAD_LIMIT: usize = 512;

/// Update notification delivered to a display.
///
/// The four keys are the wire contract with the device firmware. Decoding also
/// accepts the single-letter keys the firmware understands; when both forms
/// are present the long key wins, as on the device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "WireManifest")]
pub struct UpdateManifest {
    /// Firmware download location, also the first half of the signed input.
    pub url: String,
    /// Caller supplied version tag.
    pub version: String,
    /// Lowercase hex MD5 of the firmware image.
    pub md5sum: String,
    /// Base64 encoded Ed25519 signature over `url ++ md5sum`.
    pub signature: String,
}

/// Manifest as received, long and short keys side by side.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireManifest {
    url: Option<String>,
    u: Option<String>,
    version: Option<String>,
    v: Option<String>,
    md5sum: Option<String>,
    m: Option<String>,
    signature: Option<String>,
    s: Option<String>,
}

impl TryFrom<WireManifest> for UpdateManifest {
    type Error = String;

    fn try_from(wire: WireManifest) -> std::result::Result<Self, String> {
        fn pick(
            long: Option<String>,
            short: Option<String>,
            name: &str,
        ) -> std::result::Result<String, String> {
            long.or(short).ok_or_else(|| format!("missing field `{name}`"))
        }
        Ok(Self {
            url: pick(wire.url, wire.u, "url")?,
            version: pick(wire.version, wire.v, "version")?,
            md5sum: pick(wire.md5sum, wire.m, "md5sum")?,
            signature: pick(wire.signature, wire.s, "signature")?,
        })
    }
}

impl UpdateManifest {
    /// Exact bytes covered by the signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        signature_input(&self.url, &self.md5sum)
    }

    /// Parse the Ed25519 signature from the manifest.
    pub fn parsed_signature(&self) -> Result<[u8; SIGNATURE_LENGTH]> {
        let raw = general_purpose::STANDARD
            .decode(self.signature.as_bytes())
            .map_err(|err| ManifestError::invalid(format!("malformed base64 signature: {err}")))?;

        raw.try_into()
            .map_err(|_| ManifestError::invalid("signature must be 64 bytes"))
    }

    /// Parse the recorded digest.
    pub fn parsed_digest(&self) -> Result<ContentDigest> {
        self.md5sum.parse()
    }

    /// Run the same acceptance checks as the display before it downloads the
    /// firmware: all fields present, well formed digest and a valid signature.
    pub fn verify(&self, key: &VerifyingKey) -> Result<()> {
        if self.url.is_empty() || self.md5sum.is_empty() || self.signature.is_empty() {
            return Err(ManifestError::invalid("empty url, md5sum or signature"));
        }
        self.parsed_digest()?;
        let signature = self.parsed_signature()?;
        verify_signature(key, &self.signing_bytes(), &signature)
    }

    /// Confirm that `bytes` is the artifact this manifest describes.
    pub fn verify_artifact(&self, bytes: &[u8]) -> Result<()> {
        let actual = ContentDigest::compute(bytes).to_hex();
        if actual != self.md5sum {
            return Err(ManifestError::DigestMismatch {
                expected: self.md5sum.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Serialize to the compact JSON sent over the wire.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a manifest received from the wire.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Assembles signed manifests from fetched artifacts.
pub struct ManifestBuilder<'a, S: ?Sized> {
    signer: &'a S,
}

impl<'a, S> ManifestBuilder<'a, S>
where
    S: ManifestSigner + ?Sized,
{
    pub fn new(signer: &'a S) -> Self {
        Self { signer }
    }

    /// Digest the artifact, sign `url ++ digest` and assemble the manifest.
    ///
    /// The digest and signature are always derived here; callers only choose
    /// the version tag.
    pub fn build(&self, artifact: &FirmwareArtifact, version: &str) -> Result<UpdateManifest> {
        if artifact.is_empty() {
            return Err(ManifestError::EmptyArtifact(artifact.url().to_string()));
        }

        let digest = ContentDigest::compute(artifact.bytes()).to_hex();
        tracing::info!(md5sum = %digest, len = artifact.len(), "computed artifact digest");

        let input = signature_input(artifact.url(), &digest);
        tracing::debug!(
            input = %String::from_utf8_lossy(&input),
            "signing manifest input"
        );
        let signature = self.signer.sign(&input)?;

        Ok(UpdateManifest {
            url: artifact.url().to_string(),
            version: version.to_string(),
            md5sum: digest,
            signature: general_purpose::STANDARD.encode(signature),
        })
    }

    /// Build the manifest and serialize it, warning when the payload will not
    /// fit the device's JSON buffer.
    pub fn build_payload(
        &self,
        artifact: &FirmwareArtifact,
        version: &str,
    ) -> Result<(UpdateManifest, Vec<u8>)> {
        let manifest = self.build(artifact, version)?;
        let payload = manifest.to_json()?;
        if payload.len() > DEVICE_PAYLOAD_LIMIT {
            tracing::warn!(
                len = payload.len(),
                limit = DEVICE_PAYLOAD_LIMIT,
                "manifest payload exceeds the display's JSON buffer"
            );
        }
        Ok((manifest, payload))
    }
}
