use std::path::PathBuf;
use std::time::Duration;

/// Convenient result alias for manifest operations.
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Errors that can occur while fetching, signing or assembling a manifest.
#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    /// Network request for the firmware artifact failed.
    #[error("artifact fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    /// The content host answered with a non-success status.
    #[error("artifact fetch from {url} failed with HTTP status {status}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// Status code returned by the server.
        status: u16,
    },
    /// The fetch did not complete in time.
    #[error("artifact fetch from {url} timed out after {timeout:?}")]
    FetchTimeout {
        /// Requested URL.
        url: String,
        /// Configured request timeout.
        timeout: Duration,
    },
    /// The firmware URL could not be parsed.
    #[error("invalid artifact url {url}: {reason}")]
    InvalidUrl {
        /// Offending input.
        url: String,
        /// Parser message.
        reason: String,
    },
    /// The artifact contained no bytes.
    #[error("artifact from {0} is empty")]
    EmptyArtifact(String),
    /// The key file could not be read.
    #[error("failed to read key file {path:?}: {source}")]
    KeyIo {
        /// Key file location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The key file did not contain a usable Ed25519 key.
    #[error("malformed key material: {0}")]
    KeyMaterial(String),
    /// The signing primitive reported a failure.
    #[error("signing failed: {0}")]
    Signing(String),
    /// The manifest could not be encoded or decoded as JSON.
    #[error("manifest encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    /// A manifest field failed validation.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    /// The manifest signature did not verify.
    #[error("manifest signature invalid")]
    SignatureInvalid,
    /// The artifact digest does not match the manifest.
    #[error("artifact digest mismatch (expected {expected}, got {actual})")]
    DigestMismatch {
        /// Digest recorded in the manifest.
        expected: String,
        /// Digest of the supplied bytes.
        actual: String,
    },
}

impl ManifestError {
    /// Helper for wrapping key material validation failures.
    pub fn key(msg: impl Into<String>) -> Self {
        ManifestError::KeyMaterial(msg.into())
    }

    /// Helper for wrapping manifest validation failures.
    pub fn invalid(msg: impl Into<String>) -> Self {
        ManifestError::InvalidManifest(msg.into())
    }

    /// True when the error came from retrieving the firmware artifact.
    pub fn is_artifact(&self) -> bool {
        matches!(
            self,
            ManifestError::Fetch(_)
                | ManifestError::HttpStatus { .. }
                | ManifestError::InvalidUrl { .. }
                | ManifestError::EmptyArtifact(_)
        )
    }

    /// True when the error came from loading key material.
    pub fn is_key(&self) -> bool {
        matches!(
            self,
            ManifestError::KeyIo { .. } | ManifestError::KeyMaterial(_)
        )
    }

    /// True when an operation ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ManifestError::FetchTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        let status = ManifestError::HttpStatus {
            url: "https://example.com/fw.bin".into(),
            status: 404,
        };
        assert!(status.is_artifact());
        assert!(!status.is_key());
        assert!(status.to_string().contains("404"));

        assert!(ManifestError::key("too short").is_key());
        assert!(ManifestError::FetchTimeout {
            url: "https://example.com/fw.bin".into(),
            timeout: Duration::from_secs(1),
        }
        .is_timeout());
        assert!(!ManifestError::SignatureInvalid.is_artifact());
    }
}
