mod error;

use std::collections::BTreeMap;
use std::sync::Arc;

use analytics_types::{config::load_toml, ClusterAnalyticsConfig, SceneMessage};
use clap::Parser;
use cluster_analytics::ClusterCoordinator;
use parking_lot::Mutex;
use tracing::{error, info, warn};
use transport::{MqttTransport, Qos, TopicTemplate, TransportConfig};

use error::Result;

#[derive(Parser, Debug)]
#[command(author, version, about = "Cluster-analytics tracker for a scene's regulated objects")]
struct Cli {
    #[arg(long)]
    config: std::path::PathBuf,
    #[arg(long)]
    scene_id: String,
    #[arg(long, default_value = "127.0.0.1")]
    mqtt_host: String,
    #[arg(long, default_value_t = 1883)]
    mqtt_port: u16,
}

fn main() -> Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "cluster_analytics_service=info,cluster_analytics=info,transport=info");
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
    let config: ClusterAnalyticsConfig = load_toml(&cli.config)?;
    info!(scene_id = %cli.scene_id, "starting cluster-analytics tracker");
    let coordinator = Arc::new(Mutex::new(ClusterCoordinator::new(config)));

    let client_id = format!("cluster-analytics-{}", cli.scene_id);
    let transport_config = TransportConfig::new(client_id, cli.mqtt_host, cli.mqtt_port);
    let (transport, reader_handle) = MqttTransport::connect(transport_config);

    let regulated_topic = TopicTemplate::new("scenescape/data/scene/{scene_id}/regulated");
    let cluster_topic = TopicTemplate::new("scenescape/analytics/clusters/{scene_id}");

    let publish_transport = transport.clone();
    let publish_coordinator = coordinator.clone();
    let rt_handle = tokio::runtime::Handle::current();
    transport
        .subscribe(
            regulated_topic,
            Qos::AtMostOnce,
            Box::new(move |bindings, payload| {
                let scene_id = bindings.get("scene_id").cloned().unwrap_or_default();
                let message: SceneMessage = match serde_json::from_slice(&payload) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(scene_id = %scene_id, error = %e, "dropping malformed scene-regulated payload");
                        return;
                    }
                };
                let now = message.timestamp;
                let batch = publish_coordinator.lock().process(&message, now);

                let payload = match serde_json::to_vec(&batch) {
                    Ok(p) => p,
                    Err(e) => {
                        error!(error = %e, "failed to serialize cluster batch");
                        return;
                    }
                };
                let mut cluster_bindings = BTreeMap::new();
                cluster_bindings.insert("scene_id".to_string(), scene_id);
                let transport = publish_transport.clone();
                let topic = cluster_topic.clone();
                rt_handle.spawn(async move {
                    if let Err(e) = transport.publish(&topic, &cluster_bindings, payload, Qos::AtMostOnce).await {
                        warn!(error = %e, "failed to publish cluster batch");
                    }
                });
            }),
        )
        .await?;

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
    transport.disconnect().await.ok();
    reader_handle.abort();
    Ok(())
}
