//! The update run: fetch, digest, sign, assemble, connect, publish, disconnect.

use crate::config::PublisherConfig;
use crate::error::{OtaError, PipelineError, Step};
use crate::version::VersionTag;
use bytes::Bytes;
use ota_delivery::{Broker, BrokerSession, DeliveryChannel, DeliveryReceipt, DeliveryTopic, MqttBroker};
use ota_manifest::{
    ArtifactFetcher, Ed25519Signer, HexKeyFile, HttpArtifactFetcher, ManifestBuilder,
    ManifestError, UpdateManifest,
};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Inputs of one update run.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    /// Where the display will download the firmware from
    pub firmware_url: String,
    /// Version tag placed in the manifest
    pub version: VersionTag,
    /// Device whose pending update slot is written
    pub topic: DeliveryTopic,
}

impl UpdateRequest {
    /// Validate raw CLI style inputs.
    pub fn new(firmware_url: &str, version: &str, device_name: &str) -> Result<Self, PipelineError> {
        let version = version
            .parse::<VersionTag>()
            .map_err(|err| PipelineError::new(Step::Validate, err))?;
        let topic = DeliveryTopic::for_device(device_name)
            .map_err(|err| PipelineError::new(Step::Validate, err))?;
        Ok(Self {
            firmware_url: firmware_url.to_string(),
            version,
            topic,
        })
    }
}

/// A signed manifest ready to publish.
#[derive(Debug, Clone)]
pub struct PreparedUpdate {
    pub topic: DeliveryTopic,
    pub manifest: UpdateManifest,
    /// Serialized manifest as sent on the wire
    pub payload: Bytes,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub manifest: UpdateManifest,
    pub receipt: DeliveryReceipt,
}

/// Single-shot publisher for one device.
///
/// Every step either completes or fails the run with the step attached; there
/// are no retries. Cancellation is honoured between steps and while fetching
/// or connecting. A publish that has started runs to completion or timeout.
pub struct UpdatePipeline<F, B> {
    fetcher: F,
    channel: DeliveryChannel<B>,
    cancel: CancellationToken,
}

impl UpdatePipeline<HttpArtifactFetcher, MqttBroker> {
    /// HTTP fetcher and MQTT broker built from `config`.
    pub fn from_config(config: &PublisherConfig) -> Result<Self, PipelineError> {
        config
            .fetch
            .validate()
            .map_err(|err| PipelineError::new(Step::Validate, err))?;
        let fetcher = HttpArtifactFetcher::builder()
            .timeout(config.fetch.timeout)
            .build()
            .map_err(|err| PipelineError::new(Step::Validate, err))?;
        let broker = MqttBroker::new(config.broker.clone())
            .map_err(|err| PipelineError::new(Step::Validate, err))?;
        Ok(Self::new(fetcher, broker))
    }
}

impl<F, B> UpdatePipeline<F, B>
where
    F: ArtifactFetcher,
    B: Broker,
{
    pub fn new(fetcher: F, broker: B) -> Self {
        Self {
            fetcher,
            channel: DeliveryChannel::new(broker),
            cancel: CancellationToken::new(),
        }
    }

    /// Use `token` to interrupt the run.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn channel(&self) -> &DeliveryChannel<B> {
        &self.channel
    }

    /// Full run for `request`, signing with the key in `key_file`.
    pub async fn run(
        &self,
        request: &UpdateRequest,
        key_file: &HexKeyFile,
    ) -> Result<PublishReport, PipelineError> {
        let prepared = self.prepare(request, key_file).await?;
        self.publish(&prepared).await
    }

    /// Fetch the artifact and produce the signed manifest, without touching
    /// the broker.
    pub async fn prepare(
        &self,
        request: &UpdateRequest,
        key_file: &HexKeyFile,
    ) -> Result<PreparedUpdate, PipelineError> {
        info!(
            device = request.topic.device(),
            url = %request.firmware_url,
            version = %request.version,
            "preparing firmware update"
        );

        let artifact = self
            .guarded(Step::Fetch, self.fetcher.fetch(&request.firmware_url))
            .await?;
        info!(len = artifact.len(), "firmware downloaded");

        self.checkpoint(Step::LoadKey)?;
        let key = key_file
            .load()
            .map_err(|err| PipelineError::new(Step::LoadKey, err))?;
        let signer = Ed25519Signer::new(key);
        info!("signing key loaded");

        self.checkpoint(Step::Sign)?;
        let (manifest, payload) = ManifestBuilder::new(&signer)
            .build_payload(&artifact, request.version.as_str())
            .map_err(|err| {
                let step = match err {
                    ManifestError::Encoding(_) => Step::Encode,
                    _ => Step::Sign,
                };
                PipelineError::new(step, err)
            })?;
        drop(signer);
        info!(len = payload.len(), "manifest signed");

        Ok(PreparedUpdate {
            topic: request.topic.clone(),
            manifest,
            payload: Bytes::from(payload),
        })
    }

    /// Connect, publish the prepared manifest retained, and disconnect.
    pub async fn publish(&self, prepared: &PreparedUpdate) -> Result<PublishReport, PipelineError> {
        let mut session = self
            .guarded(Step::Connect, self.channel.broker().connect())
            .await?;
        info!("connected to broker");

        if self.cancel.is_cancelled() {
            if let Err(err) = session.disconnect().await {
                warn!(%err, "disconnect after cancellation failed");
            }
            return Err(PipelineError::new(Step::Publish, OtaError::Cancelled));
        }

        info!(topic = %prepared.topic, "publishing retained update");
        let receipt = self
            .channel
            .publish_retained(&mut session, &prepared.topic, prepared.payload.clone())
            .await
            .map_err(|err| PipelineError::new(Step::Publish, err))?;

        Ok(PublishReport {
            manifest: prepared.manifest.clone(),
            receipt,
        })
    }

    fn checkpoint(&self, step: Step) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::new(step, OtaError::Cancelled));
        }
        Ok(())
    }

    /// Run `fut` unless the run is cancelled first or while it is pending.
    async fn guarded<T, E>(
        &self,
        step: Step,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<T, PipelineError>
    where
        E: Into<OtaError>,
    {
        self.checkpoint(step)?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PipelineError::new(step, OtaError::Cancelled)),
            result = fut => result.map_err(|err| PipelineError::new(step, err)),
        }
    }
}
