//! Operator CLI for publishing signed firmware updates to e-paper displays.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use display_ota::{PublisherConfig, UpdatePipeline, UpdateRequest};
use ota_delivery::{
    config::{
        DEFAULT_CLIENT_ID, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DISCONNECT_GRACE, DEFAULT_KEEP_ALIVE,
        DEFAULT_WRITE_TIMEOUT,
    },
    BrokerAddress, BrokerConfig, DeliveryChannel, DeliveryTopic, MqttBroker,
};
use ota_manifest::{
    parse_verifying_key_hex, HexKeyFile, SigningKey, UpdateManifest, DEFAULT_FETCH_TIMEOUT,
};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

/// Command-line arguments for the publisher
#[derive(Parser, Debug)]
#[command(name = "display-ota", version, about = "Publish signed firmware updates to e-paper displays")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign a firmware release and publish it to a display
    UpdateDisplay(UpdateArgs),

    /// Remove a pending update from a display's topic
    ClearUpdate {
        /// Name of the display device (node name)
        #[arg(long, env = "DEVICE_NAME")]
        device_name: String,

        #[command(flatten)]
        broker: BrokerArgs,
    },

    /// Check a manifest the way a display does before installing
    Verify {
        /// Manifest JSON file, or `-` for stdin
        manifest: PathBuf,

        /// Hex encoded Ed25519 public key provisioned on the display
        #[arg(long, env = "PUBLIC_KEY")]
        public_key: String,

        /// Firmware image to compare against the manifest's md5sum
        #[arg(long)]
        artifact: Option<PathBuf>,
    },

    /// Print the hex public key for a private key file
    Pubkey {
        /// Path to private key file (hex format)
        #[arg(long, env = "PRIVATE_KEY_PATH")]
        private_key: PathBuf,
    },

    /// Generate a new signing key
    Keygen {
        /// Where to write the hex encoded private key; must not exist
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Args, Debug)]
struct UpdateArgs {
    /// URL for the firmware binary (e.g. https://github.com/.../releases/download/100/e-paper.100.bin)
    #[arg(long, env = "FIRMWARE_URL")]
    url: String,

    /// Path to private key file (hex format)
    #[arg(long, env = "PRIVATE_KEY_PATH")]
    private_key: PathBuf,

    /// Firmware version (3-digit format, e.g. 100, 101, 110)
    #[arg(long, env = "FIRMWARE_VERSION")]
    version: String,

    /// Name of the display device (node name)
    #[arg(long, env = "DEVICE_NAME")]
    device_name: String,

    /// Firmware download timeout in seconds
    #[arg(long, env = "FIRMWARE_FETCH_TIMEOUT", value_name = "SECS", default_value_t = DEFAULT_FETCH_TIMEOUT.as_secs())]
    fetch_timeout: u64,

    /// Build and print the manifest without publishing it
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    #[command(flatten)]
    broker: BrokerArgs,
}

#[derive(Args, Debug)]
struct BrokerArgs {
    /// MQTT broker address (e.g. tcp://192.168.1.100:1883)
    #[arg(long, env = "MQTT_BROKER")]
    mqtt_broker: Option<String>,

    /// MQTT username
    #[arg(long, env = "MQTT_USERNAME")]
    mqtt_username: Option<String>,

    /// MQTT password
    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    mqtt_password: Option<String>,

    /// MQTT client ID
    #[arg(long, env = "MQTT_CLIENT_ID", default_value = DEFAULT_CLIENT_ID)]
    mqtt_client_id: String,

    /// Broker connect timeout in seconds
    #[arg(long, env = "MQTT_CONNECT_TIMEOUT", value_name = "SECS", default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs())]
    connect_timeout: u64,

    /// Publish write timeout in seconds
    #[arg(long, env = "MQTT_WRITE_TIMEOUT", value_name = "SECS", default_value_t = DEFAULT_WRITE_TIMEOUT.as_secs())]
    write_timeout: u64,

    /// MQTT keep-alive interval in seconds
    #[arg(long, env = "MQTT_KEEP_ALIVE", value_name = "SECS", default_value_t = DEFAULT_KEEP_ALIVE.as_secs())]
    keep_alive: u64,

    /// Graceful disconnect period in milliseconds
    #[arg(long, env = "MQTT_DISCONNECT_GRACE_MS", value_name = "MILLIS", default_value_t = DEFAULT_DISCONNECT_GRACE.as_millis() as u64)]
    disconnect_grace_ms: u64,
}

impl BrokerArgs {
    fn config(&self) -> anyhow::Result<BrokerConfig> {
        let Some(address) = self.mqtt_broker.as_deref() else {
            bail!("--mqtt-broker (or MQTT_BROKER) is required");
        };
        let address: BrokerAddress = address.parse()?;
        let config = BrokerConfig::new(address)
            .client_id(self.mqtt_client_id.clone())
            .credentials(self.mqtt_username.clone(), self.mqtt_password.clone())
            .connect_timeout(Duration::from_secs(self.connect_timeout))
            .write_timeout(Duration::from_secs(self.write_timeout))
            .keep_alive(Duration::from_secs(self.keep_alive))
            .disconnect_grace(Duration::from_millis(self.disconnect_grace_ms));
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries manifests and keys.
    let default_filter = if cli.debug {
        "debug,display_ota=debug,ota_manifest=debug,ota_delivery=debug"
    } else {
        "info,display_ota=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            interrupt.cancel();
        }
    });

    match cli.command {
        Commands::UpdateDisplay(args) => update_display(args, cancel).await,
        Commands::ClearUpdate {
            device_name,
            broker,
        } => clear_update(&device_name, &broker).await,
        Commands::Verify {
            manifest,
            public_key,
            artifact,
        } => verify(&manifest, &public_key, artifact.as_deref()),
        Commands::Pubkey { private_key } => {
            let key = HexKeyFile::new(private_key).load()?;
            println!("{}", hex::encode(key.verifying_key().as_bytes()));
            Ok(())
        }
        Commands::Keygen { out } => keygen(out),
    }
}

async fn update_display(args: UpdateArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let request = UpdateRequest::new(&args.url, &args.version, &args.device_name)?;
    let key_file = HexKeyFile::new(&args.private_key);
    let fetch_timeout = Duration::from_secs(args.fetch_timeout);

    if args.dry_run {
        // Any broker address works; it is never contacted.
        let config = PublisherConfig::new("tcp://localhost".parse()?).fetch_timeout(fetch_timeout);
        let pipeline = UpdatePipeline::from_config(&config)?.with_cancellation(cancel);
        let prepared = pipeline.prepare(&request, &key_file).await?;
        println!("{}", String::from_utf8_lossy(&prepared.payload));
        tracing::info!(topic = %prepared.topic, "dry run, nothing published");
        return Ok(());
    }

    let broker = args.broker.config()?;
    let config = PublisherConfig::new(broker.address.clone())
        .fetch_timeout(fetch_timeout)
        .broker(broker);
    let pipeline = UpdatePipeline::from_config(&config)?.with_cancellation(cancel);
    let report = pipeline.run(&request, &key_file).await?;

    tracing::info!(
        topic = %report.receipt.topic,
        md5sum = %report.manifest.md5sum,
        "firmware update published; the display applies it on its next wake"
    );
    println!("{}", report.receipt.topic);
    Ok(())
}

async fn clear_update(device_name: &str, broker: &BrokerArgs) -> anyhow::Result<()> {
    let topic = DeliveryTopic::for_device(device_name)?;
    let channel = DeliveryChannel::new(MqttBroker::new(broker.config()?)?);
    channel
        .clear(&topic)
        .await
        .with_context(|| format!("failed to clear pending update on {topic}"))?;
    println!("{topic}");
    Ok(())
}

fn verify(
    manifest_path: &std::path::Path,
    public_key: &str,
    artifact: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let bytes = if manifest_path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read manifest from stdin")?;
        buf
    } else {
        std::fs::read(manifest_path)
            .with_context(|| format!("failed to read manifest {}", manifest_path.display()))?
    };

    let manifest = UpdateManifest::from_json(&bytes)?;
    let key = parse_verifying_key_hex(public_key)?;
    manifest.verify(&key).context("manifest rejected")?;

    if let Some(path) = artifact {
        let image = std::fs::read(path)
            .with_context(|| format!("failed to read artifact {}", path.display()))?;
        manifest.verify_artifact(&image)?;
    }

    tracing::info!(url = %manifest.url, version = %manifest.version, "manifest verified");
    println!("ok");
    Ok(())
}

fn keygen(out: PathBuf) -> anyhow::Result<()> {
    let key = SigningKey::generate(&mut rand::rngs::OsRng);
    HexKeyFile::new(&out)
        .store(&key)
        .with_context(|| format!("failed to write key to {}", out.display()))?;
    tracing::info!(path = %out.display(), "signing key written");
    println!("{}", hex::encode(key.verifying_key().as_bytes()));
    Ok(())
}
