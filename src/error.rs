//! Error types for the update pipeline.

use ota_delivery::DeliveryError;
use ota_manifest::ManifestError;
use std::fmt;

/// Pipeline stage, reported with every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Validate,
    Fetch,
    LoadKey,
    Sign,
    Encode,
    Connect,
    Publish,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Validate => "validate input",
            Step::Fetch => "fetch firmware",
            Step::LoadKey => "load signing key",
            Step::Sign => "sign manifest",
            Step::Encode => "encode manifest",
            Step::Connect => "connect to broker",
            Step::Publish => "publish update",
        };
        f.write_str(name)
    }
}

/// Failure categories an operator acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Artifact,
    Key,
    Signing,
    Encoding,
    Connection,
    Publish,
    Timeout,
    Cancelled,
    InvalidInput,
}

/// Underlying cause of a pipeline failure.
#[derive(thiserror::Error, Debug)]
pub enum OtaError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    /// The version tag cannot be sent to a device.
    #[error("invalid version tag {tag:?}: {reason}")]
    InvalidVersion { tag: String, reason: &'static str },
    /// A run setting is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The run was interrupted before this step.
    #[error("cancelled")]
    Cancelled,
}

impl OtaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OtaError::Manifest(err) if err.is_timeout() => ErrorKind::Timeout,
            OtaError::Manifest(err) if err.is_artifact() => ErrorKind::Artifact,
            OtaError::Manifest(err) if err.is_key() => ErrorKind::Key,
            OtaError::Manifest(ManifestError::Encoding(_)) => ErrorKind::Encoding,
            OtaError::Manifest(ManifestError::InvalidManifest(_)) => ErrorKind::InvalidInput,
            OtaError::Manifest(_) => ErrorKind::Signing,
            OtaError::Delivery(err) => match err {
                DeliveryError::Connection { .. } => ErrorKind::Connection,
                DeliveryError::Publish { .. } => ErrorKind::Publish,
                DeliveryError::Timeout { .. } => ErrorKind::Timeout,
                DeliveryError::InvalidDeviceName { .. } | DeliveryError::InvalidConfig { .. } => {
                    ErrorKind::InvalidInput
                }
            },
            OtaError::InvalidVersion { .. } | OtaError::InvalidConfig(_) => {
                ErrorKind::InvalidInput
            }
            OtaError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// A pipeline failure tagged with the step that produced it.
#[derive(thiserror::Error, Debug)]
#[error("{step} failed: {source}")]
pub struct PipelineError {
    pub step: Step,
    #[source]
    pub source: OtaError,
}

impl PipelineError {
    pub fn new(step: Step, source: impl Into<OtaError>) -> Self {
        Self {
            step,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}
