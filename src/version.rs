use crate::error::OtaError;
use std::fmt;
use std::str::FromStr;

/// Firmware version tag carried in the manifest.
///
/// The tag is not checked against the artifact. Release tags are three
/// digits (`100`, `101`, `110`); anything else is accepted with a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTag(String);

impl VersionTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the conventional three digit release tag.
    pub fn is_conventional(&self) -> bool {
        self.0.len() == 3 && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl FromStr for VersionTag {
    type Err = OtaError;

    fn from_str(tag: &str) -> Result<Self, OtaError> {
        let invalid = |reason| OtaError::InvalidVersion {
            tag: tag.to_string(),
            reason,
        };
        if tag.trim().is_empty() {
            return Err(invalid("tag is empty"));
        }
        if tag.chars().any(char::is_control) {
            return Err(invalid("tag contains control characters"));
        }

        let version = Self(tag.to_string());
        if !version.is_conventional() {
            tracing::warn!(tag, "version tag is not a three digit release number");
        }
        Ok(version)
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
