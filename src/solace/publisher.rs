//! `solace-pub`: direct publishing of text or random JSON messages.

use std::time::Instant;

use rumqttc::v5::AsyncClient;
use rumqttc::v5::mqttbytes::QoS;

use super::{SolaceSettings, connect_first, outbound_properties};
use crate::config::EnvConfig;
use crate::error::LoadgenError;
use crate::pacing::{Pace, Throughput};
use crate::payload::random_json;

/// Default text body.
pub const DEFAULT_TEXT_BODY: &str = "Load test message payload";

/// Payload flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PayloadFormat {
    /// The same text body on every message.
    #[default]
    Text,
    /// A freshly generated JSON document per message.
    Json,
}

/// What to publish.
#[derive(Debug, Clone)]
pub struct SolacePublishPlan {
    /// Destination topic.
    pub topic: String,
    /// Number of messages.
    pub count: u64,
    /// Delay after each publish.
    pub pace: Pace,
    /// Text or JSON.
    pub format: PayloadFormat,
    /// Body for text messages.
    pub text: String,
    /// Approximate JSON size in KB.
    pub size_kb: usize,
}

/// A message ready to hand to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Application message id.
    pub application_message_id: String,
    /// Content type, set for JSON.
    pub content_type: Option<&'static str>,
    /// Body.
    pub payload: Vec<u8>,
}

impl SolacePublishPlan {
    /// Builds message `index` (0-based).
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::Json`] if the JSON document cannot be
    /// serialized.
    pub fn message(&self, index: u64) -> Result<OutboundMessage, LoadgenError> {
        Ok(match self.format {
            PayloadFormat::Text => OutboundMessage {
                application_message_id: format!("loadtest-msg-{index}"),
                content_type: None,
                payload: self.text.as_bytes().to_vec(),
            },
            PayloadFormat::Json => {
                let body = random_json(self.size_kb)?;
                tracing::debug!(
                    kb = %format!("{:.2}", kilobytes(body.len())),
                    "generated json payload"
                );
                OutboundMessage {
                    application_message_id: format!("loadtest-json-{index}"),
                    content_type: Some("application/json"),
                    payload: body.into_bytes(),
                }
            }
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn kilobytes(bytes: usize) -> f64 {
    bytes as f64 / 1024.0
}

/// Destination for direct messages.
#[allow(async_fn_in_trait)]
pub trait DirectSink {
    /// Queues one message. Waits while the request queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::Client`] if the session has gone away.
    async fn send(&self, topic: &str, message: OutboundMessage) -> Result<(), LoadgenError>;
}

impl DirectSink for AsyncClient {
    async fn send(&self, topic: &str, message: OutboundMessage) -> Result<(), LoadgenError> {
        let properties =
            outbound_properties(&message.application_message_id, message.content_type);
        self.publish_with_properties(topic, QoS::AtMostOnce, false, message.payload, properties)
            .await?;
        Ok(())
    }
}

/// Connects, publishes the plan and disconnects.
///
/// # Errors
///
/// Returns [`LoadgenError::Connection`] when no broker accepts the
/// session, or the first error hit while publishing.
pub async fn run(
    settings: &SolaceSettings,
    plan: &SolacePublishPlan,
    env: &EnvConfig,
) -> Result<Throughput, LoadgenError> {
    let mut session =
        connect_first(settings, env.request_queue_capacity, env.connect_timeout()).await?;
    session.drive(|_| {});
    println!(
        "Publishing {} messages to topic '{}' with {} sec delay",
        plan.count,
        plan.topic,
        plan.pace.delay().as_secs_f64()
    );

    let outcome = publish_all(&session.client, plan).await;
    let disconnected = session.disconnect().await;
    let throughput = outcome?;
    match plan.format {
        PayloadFormat::Text => println!(
            "Published {} messages to topic '{}' {throughput}",
            throughput.count, plan.topic
        ),
        PayloadFormat::Json => println!(
            "Published {} messages of ~{} KB to topic '{}' {throughput}",
            throughput.count, plan.size_kb, plan.topic
        ),
    }
    disconnected?;
    println!("Disconnected");
    Ok(throughput)
}

/// Publishes every message in the plan in order.
///
/// # Errors
///
/// Returns the first payload or sink error.
pub async fn publish_all<S: DirectSink>(
    sink: &S,
    plan: &SolacePublishPlan,
) -> Result<Throughput, LoadgenError> {
    let started = Instant::now();
    for index in 0..plan.count {
        let message = plan.message(index)?;
        tracing::debug!(id = %message.application_message_id, bytes = message.payload.len(), "publishing");
        sink.send(&plan.topic, message).await?;
        plan.pace.wait().await;
    }
    Ok(Throughput::since(plan.count, started))
}
