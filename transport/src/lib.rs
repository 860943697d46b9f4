//! Publish/subscribe transport adapter (C1): topic templates, automatic
//! reconnect with resubscription, and non-blocking callback dispatch, built
//! on `rumqttc`.

mod error;
mod topic;

pub use error::{Error, Result};
pub use topic::TopicTemplate;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tracing::{debug, info, warn};

pub type Bindings = BTreeMap<String, String>;
pub type Handler = Box<dyn Fn(Bindings, Vec<u8>) + Send + Sync>;

/// Username/password or certificate material injected at construction
/// (section 4.1: "Authentication material ... is injected at construction").
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    pub credentials: Credentials,
}

impl TransportConfig {
    pub fn new(client_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        TransportConfig {
            client_id: client_id.into(),
            host: host.into(),
            port,
            keep_alive: Duration::from_secs(240),
            credentials: Credentials::default(),
        }
    }
}

struct Subscription {
    template: TopicTemplate,
    qos: QoS,
    handler: Handler,
}

/// Concrete wire QoS level for a publish or subscribe. `AtMostOnce` is the
/// default for unauthenticated local-network deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl From<Qos> for QoS {
    fn from(q: Qos) -> Self {
        match q {
            Qos::AtMostOnce => QoS::AtMostOnce,
            Qos::AtLeastOnce => QoS::AtLeastOnce,
            Qos::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

struct Inner {
    subscriptions: Mutex<Vec<Subscription>>,
    connected: AtomicBool,
}

/// The transport adapter. Cheaply cloneable; the background reader task and
/// every clone share the same subscription table and connection state.
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
    inner: Arc<Inner>,
}

impl MqttTransport {
    /// Connect to the broker and spawn the background reader loop that
    /// dispatches incoming publishes to registered handlers. The returned
    /// `JoinHandle` runs for the lifetime of the process; drop the transport
    /// and abort the handle to shut down.
    pub fn connect(config: TransportConfig) -> (Self, tokio::task::JoinHandle<()>) {
        let mut options = MqttOptions::new(config.client_id, config.host, config.port);
        options.set_keep_alive(config.keep_alive);
        if let (Some(user), Some(pass)) = (config.credentials.username, config.credentials.password) {
            options.set_credentials(user, pass);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let inner = Arc::new(Inner {
            subscriptions: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
        });

        let transport = MqttTransport {
            client,
            inner: inner.clone(),
        };

        let loop_inner = inner.clone();
        let loop_client = transport.client.clone();
        let handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("transport connected, reissuing subscriptions");
                        loop_inner.connected.store(true, Ordering::SeqCst);
                        let filters: Vec<(String, QoS)> = loop_inner
                            .subscriptions
                            .lock()
                            .iter()
                            .map(|s| (s.template.subscription_filter(), s.qos))
                            .collect();
                        for (filter, qos) in filters {
                            if let Err(e) = loop_client.subscribe(&filter, qos).await {
                                warn!(filter = %filter, error = %e, "resubscribe failed");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        debug!(topic = %publish.topic, "incoming publish");
                        let subs = loop_inner.subscriptions.lock();
                        for sub in subs.iter() {
                            if let Some(bindings) = sub.template.parse(&publish.topic) {
                                (sub.handler)(bindings, publish.payload.to_vec());
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "transport connection lost, reconnecting");
                        loop_inner.connected.store(false, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        });

        (transport, handle)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Register a handler for every publish matching `template`. Subscribed
    /// immediately if connected, and automatically reissued on reconnect.
    pub async fn subscribe(&self, template: TopicTemplate, qos: Qos, handler: Handler) -> Result<()> {
        let filter = template.subscription_filter();
        let qos: QoS = qos.into();
        self.inner.subscriptions.lock().push(Subscription {
            template,
            qos,
            handler,
        });
        if self.is_connected() {
            self.client.subscribe(&filter, qos).await?;
        }
        Ok(())
    }

    /// Format `template` with `bindings` and publish `payload`. Fails
    /// immediately (no silent queueing) if the adapter is not currently
    /// connected, per section 4.1's failure semantics.
    pub async fn publish(
        &self,
        template: &TopicTemplate,
        bindings: &Bindings,
        payload: impl Into<Vec<u8>>,
        qos: Qos,
    ) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let topic = template.format(bindings)?;
        self.client.publish(topic, qos.into(), false, payload).await?;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        self.inner.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
