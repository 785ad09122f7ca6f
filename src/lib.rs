//! Signed OTA update notifications for e-paper displays.
//!
//! A run downloads the firmware image, signs `url ++ md5(image)` with the
//! operator's Ed25519 key and publishes the resulting manifest as a retained
//! MQTT message on `displays/<device>/rx`. The display picks it up on its next
//! wake, verifies the signature with its provisioned public key and clears
//! the retained message.

pub mod config;
pub mod error;
pub mod pipeline;
mod version;

pub use config::{FetchConfig, PublisherConfig};
pub use error::{ErrorKind, OtaError, PipelineError, Step};
pub use pipeline::{PreparedUpdate, PublishReport, UpdatePipeline, UpdateRequest};
pub use version::VersionTag;
