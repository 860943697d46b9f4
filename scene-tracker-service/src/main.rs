mod error;

use std::collections::BTreeMap;
use std::sync::Arc;

use analytics_types::{config::load_toml, Detection, TrackerConfig};
use clap::Parser;
use scene_tracker::{CategoryRegistry, InputMode, RateRegulator, SceneTracker};
use tracing::{error, info, warn};
use transport::{MqttTransport, Qos, TopicTemplate, TransportConfig};

use error::Result;

#[derive(Parser, Debug)]
#[command(author, version, about = "Per-scene multi-category object tracker")]
struct Cli {
    /// TOML configuration file (section 6.5).
    #[arg(long)]
    config: std::path::PathBuf,
    /// Scene identifier this process tracks.
    #[arg(long)]
    scene_id: String,
    /// Human-readable scene name included in published messages.
    #[arg(long, default_value = "")]
    scene_name: String,
    /// MQTT broker host.
    #[arg(long, default_value = "127.0.0.1")]
    mqtt_host: String,
    /// MQTT broker port.
    #[arg(long, default_value_t = 1883)]
    mqtt_port: u16,
}

fn main() -> Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "scene_tracker_service=info,scene_tracker=info,transport=info");
    }
    let _tracing_guard = env_tracing_logger::init();
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let config: TrackerConfig = load_toml(&cli.config)?;
    info!(scene_id = %cli.scene_id, "starting scene tracker service");

    let scene = Arc::new(SceneTracker::new(cli.scene_id.clone(), config.clone(), CategoryRegistry::new()));

    let client_id = format!("scene-tracker-{}", cli.scene_id);
    let transport_config = TransportConfig::new(client_id, cli.mqtt_host, cli.mqtt_port);
    let (transport, reader_handle) = MqttTransport::connect(transport_config);

    let camera_topic = TopicTemplate::new("scenescape/data/camera/{camera_id}");
    let dispatch_scene = scene.clone();
    transport
        .subscribe(
            camera_topic,
            Qos::AtMostOnce,
            Box::new(move |bindings, payload| {
                let camera_id = bindings.get("camera_id").cloned().unwrap_or_default();
                match Detection::from_json(&payload) {
                    Ok(detection) => {
                        let when = detection.timestamp_secs(wall_clock_now());
                        let objects = detection.objects.clone();
                        dispatch_scene.dispatch(&camera_id, when, objects, InputMode::Streaming);
                    }
                    Err(e) => {
                        warn!(camera_id = %camera_id, error = %e, "dropping malformed camera detection payload");
                    }
                }
            }),
        )
        .await?;

    let regulated_topic = TopicTemplate::new("scenescape/data/scene/{scene_id}/regulated");
    let publish_transport = transport.clone();
    let publish_scene_id = cli.scene_id.clone();
    let rt_handle = tokio::runtime::Handle::current();
    let regulator = RateRegulator::spawn(
        scene.clone(),
        cli.scene_name,
        config.regulate_period(),
        wall_clock_now,
        move |message| {
            let payload = match serde_json::to_vec(&message) {
                Ok(p) => p,
                Err(e) => {
                    error!(error = %e, "failed to serialize scene message");
                    return;
                }
            };
            let mut bindings = BTreeMap::new();
            bindings.insert("scene_id".to_string(), publish_scene_id.clone());
            let transport = publish_transport.clone();
            let topic = regulated_topic.clone();
            rt_handle.spawn(async move {
                if let Err(e) = transport.publish(&topic, &bindings, payload, Qos::AtMostOnce).await {
                    warn!(error = %e, "failed to publish scene-regulated message");
                }
            });
        },
    );

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");

    regulator.shutdown();
    scene.shutdown();
    transport.disconnect().await.ok();
    reader_handle.abort();

    Ok(())
}

fn wall_clock_now() -> f64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs_f64()
}
