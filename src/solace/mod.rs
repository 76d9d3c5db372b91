//! Solace PubSub+ publisher, subscriber and queue drain.
//!
//! The tools talk to the broker's MQTT 5 service through `rumqttc::v5`.
//! Message metadata that the native API carries as header fields
//! (application message id, content type, custom properties) travels as
//! MQTT 5 publish properties. A durable exclusive queue is consumed
//! through a persistent session: clean start off, a session expiry
//! interval, QoS 1 and manual acknowledgements, so anything not
//! acknowledged is redelivered on the next run.

pub mod archive;
pub mod drain;
pub mod endpoint;
pub mod publisher;
pub mod receiver;
pub mod subscriber;

use std::time::Duration;

use rumqttc::Transport;
use rumqttc::v5::mqttbytes::v5::{
    ConnectProperties, ConnectReturnCode, Packet, Publish, PublishProperties,
};
use rumqttc::v5::{AsyncClient, Event, EventLoop, MqttOptions};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::LoadgenError;

pub use endpoint::Endpoint;

/// Default topic for publishers and subscribers.
pub const DEFAULT_TOPIC: &str = "solace/loadtest/topic";

/// User property carrying the application message id.
pub const APPLICATION_MESSAGE_ID: &str = "application_message_id";

/// Custom properties attached to every published message.
pub const MESSAGE_PROPERTIES: &[(&str, &str)] = &[("app_id", "loadtest")];

/// Seconds the broker keeps a persistent session after disconnect.
pub const PERSISTENT_SESSION_EXPIRY_SECS: u32 = 7 * 24 * 60 * 60;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// How the session treats broker-side state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Clean start; direct (QoS 0) delivery.
    Direct,
    /// Persistent session standing in for a durable exclusive queue.
    /// `manual_acks` leaves acknowledgement to the caller.
    Queue {
        /// Whether the caller acknowledges each message explicitly.
        manual_acks: bool,
    },
}

/// Connection properties for a PubSub+ broker.
#[derive(Debug, Clone)]
pub struct SolaceSettings {
    /// Candidate brokers, tried in order.
    pub endpoints: Vec<Endpoint>,
    /// Message VPN. Selected by the broker's MQTT listener port; logged
    /// for reference.
    pub vpn: String,
    /// Basic-auth username.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
    /// MQTT client identifier.
    pub client_name: String,
    /// Session behaviour.
    pub mode: SessionMode,
}

impl SolaceSettings {
    /// Builds the `rumqttc` options for one endpoint.
    #[must_use]
    pub fn to_options(&self, endpoint: &Endpoint) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_name, &endpoint.host, endpoint.port);
        options
            .set_keep_alive(KEEP_ALIVE)
            .set_credentials(&self.username, &self.password);
        match self.mode {
            SessionMode::Direct => {
                options.set_clean_start(true);
            }
            SessionMode::Queue { manual_acks } => {
                let mut properties = ConnectProperties::new();
                properties.session_expiry_interval = Some(PERSISTENT_SESSION_EXPIRY_SECS);
                options
                    .set_clean_start(false)
                    .set_connect_properties(properties)
                    .set_manual_acks(manual_acks);
            }
        }
        if endpoint.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }
}

/// A connected session.
pub struct Session {
    /// Request handle.
    pub client: AsyncClient,
    /// Broker that accepted the connection.
    pub endpoint: Endpoint,
    closing: watch::Sender<bool>,
    driver: Option<JoinHandle<Result<(), LoadgenError>>>,
    eventloop: Option<EventLoop>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("driving", &self.driver.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Starts the event loop on a background task, passing every event to
    /// `on_event`. Must be called once, before any traffic is expected.
    pub fn drive<F>(&mut self, mut on_event: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        let Some(mut eventloop) = self.eventloop.take() else {
            tracing::warn!("event loop already running");
            return;
        };
        let closing = self.closing.subscribe();
        self.driver = Some(tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(event) => on_event(&event),
                    Err(e) if *closing.borrow() => {
                        tracing::debug!(error = %e, "event loop closed");
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "solace event loop stopped");
                        return Err(LoadgenError::Connection(e.to_string()));
                    }
                }
            }
        }));
    }

    /// Resolves once the event loop stops without being asked to, with the
    /// reason. Pends forever if the loop was never started.
    pub async fn lost(&mut self) -> LoadgenError {
        let Some(driver) = self.driver.as_mut() else {
            return std::future::pending().await;
        };
        let reason = match driver.await {
            Ok(Ok(())) => LoadgenError::Connection("event loop ended".to_string()),
            Ok(Err(e)) => e,
            Err(e) => LoadgenError::Connection(format!("event loop task failed: {e}")),
        };
        self.driver = None;
        reason
    }

    /// Sends DISCONNECT and stops the event loop.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::Client`] if the request cannot be queued.
    pub async fn disconnect(mut self) -> Result<(), LoadgenError> {
        tracing::info!(endpoint = %self.endpoint, "disconnecting");
        let _ = self.closing.send(true);
        let queued = self.client.disconnect().await;
        if let Some(mut driver) = self.driver.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut driver).await.is_err() {
                driver.abort();
            }
        }
        queued?;
        tracing::info!("disconnected");
        Ok(())
    }
}

/// Tries each endpoint in order and returns the first accepted session.
///
/// # Errors
///
/// Returns [`LoadgenError::InvalidArgument`] when no endpoint is given and
/// [`LoadgenError::Connection`] when every endpoint fails.
pub async fn connect_first(
    settings: &SolaceSettings,
    capacity: usize,
    timeout: Duration,
) -> Result<Session, LoadgenError> {
    if settings.endpoints.is_empty() {
        return Err(LoadgenError::InvalidArgument(
            "at least one broker is required".to_string(),
        ));
    }

    let mut failures = Vec::with_capacity(settings.endpoints.len());
    for (n, endpoint) in settings.endpoints.iter().enumerate() {
        tracing::info!(
            broker = n + 1,
            %endpoint,
            vpn = %settings.vpn,
            username = %settings.username,
            "connecting to solace messaging service"
        );
        let (client, mut eventloop) = AsyncClient::new(settings.to_options(endpoint), capacity);
        let outcome = tokio::time::timeout(timeout, wait_for_connack(&mut eventloop)).await;
        match outcome {
            Ok(Ok(())) => {
                tracing::info!(broker = n + 1, %endpoint, "connected");
                let (closing, _) = watch::channel(false);
                return Ok(Session {
                    client,
                    endpoint: endpoint.clone(),
                    closing,
                    driver: None,
                    eventloop: Some(eventloop),
                });
            }
            Ok(Err(e)) => {
                tracing::warn!(broker = n + 1, %endpoint, error = %e, "failed to connect");
                failures.push(format!("{endpoint}: {e}"));
            }
            Err(_) => {
                tracing::warn!(broker = n + 1, %endpoint, "timed out waiting for CONNACK");
                failures.push(format!("{endpoint}: timed out"));
            }
        }
    }

    Err(LoadgenError::Connection(format!(
        "no broker accepted the connection ({})",
        failures.join("; ")
    )))
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), LoadgenError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(LoadgenError::Connection(format!(
                    "broker refused connection: {:?}",
                    ack.code
                )));
            }
            Ok(_) => {}
            Err(e) => return Err(LoadgenError::Connection(e.to_string())),
        }
    }
}

/// A message received from a topic or queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Receiver-assigned id used to acknowledge the message.
    pub delivery_id: u64,
    /// Topic the message was published to.
    pub topic: String,
    /// Raw payload.
    pub payload: Vec<u8>,
    /// Application message id, if the publisher set one.
    pub application_message_id: Option<String>,
    /// Content type, if the publisher set one.
    pub content_type: Option<String>,
}

impl InboundMessage {
    /// Converts a received MQTT publish.
    #[must_use]
    pub fn from_publish(delivery_id: u64, publish: &Publish) -> Self {
        let properties = publish.properties.as_ref();
        let application_message_id = properties.and_then(|p| {
            p.user_properties
                .iter()
                .find(|(key, _)| key == APPLICATION_MESSAGE_ID)
                .map(|(_, value)| value.clone())
        });
        Self {
            delivery_id,
            topic: String::from_utf8_lossy(&publish.topic).into_owned(),
            payload: publish.payload.to_vec(),
            application_message_id,
            content_type: properties.and_then(|p| p.content_type.clone()),
        }
    }

    /// Payload size in kilobytes.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn size_kb(&self) -> f64 {
        self.payload.len() as f64 / 1024.0
    }

    /// First `limit` characters of the payload, with `...` when cut.
    #[must_use]
    pub fn snippet(&self, limit: usize) -> String {
        let text = String::from_utf8_lossy(&self.payload);
        let mut chars = text.chars();
        let head: String = chars.by_ref().take(limit).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }
}

/// Publish properties for an outbound message.
#[must_use]
pub fn outbound_properties(
    application_message_id: &str,
    content_type: Option<&str>,
) -> PublishProperties {
    let mut user_properties = vec![(
        APPLICATION_MESSAGE_ID.to_string(),
        application_message_id.to_string(),
    )];
    user_properties.extend(
        MESSAGE_PROPERTIES
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
    );
    PublishProperties {
        content_type: content_type.map(str::to_string),
        user_properties,
        ..PublishProperties::default()
    }
}
