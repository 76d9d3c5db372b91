//! `mqtt-pub`: publish N messages, one at a time, waiting for each
//! publish to complete before the next.

use std::time::Instant;

use rumqttc::{AsyncClient, QoS};

use super::{AckWaiter, MqttSettings, ack_channel, connect, disconnect, drive};
use crate::config::EnvConfig;
use crate::error::LoadgenError;
use crate::pacing::{Pace, Throughput};
use crate::payload::MessageSpec;

/// Bodies up to this many bytes are logged verbatim; longer ones by size.
const LOG_CONTENT_LIMIT: usize = 30;

/// What to publish and how fast.
#[derive(Debug, Clone)]
pub struct PublishPlan {
    /// Destination topic.
    pub topic: String,
    /// Delivery guarantee.
    pub qos: QoS,
    /// Number of messages to send.
    pub count: u64,
    /// Delay before each publish.
    pub pace: Pace,
    /// Message body source.
    pub message: MessageSpec,
    /// Suppress per-message logging.
    pub silent: bool,
}

/// Destination for a single publish.
#[allow(async_fn_in_trait)]
pub trait PublishSink {
    /// Queues one message for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::Client`] if the request cannot be queued.
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), LoadgenError>;
}

impl PublishSink for AsyncClient {
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), LoadgenError> {
        AsyncClient::publish(self, topic, qos, false, payload).await?;
        Ok(())
    }
}

/// Connects, publishes the plan, prints the summary and disconnects.
///
/// # Errors
///
/// Returns [`LoadgenError::Connection`] if the broker is unreachable, or
/// the first client or acknowledgement error hit while publishing.
pub async fn run(
    settings: &MqttSettings,
    plan: &PublishPlan,
    env: &EnvConfig,
) -> Result<Throughput, LoadgenError> {
    let (client, eventloop) =
        connect(settings, env.request_queue_capacity, env.connect_timeout()).await?;

    let (tracker, mut waiter) = ack_channel(plan.qos);
    let driver = drive(eventloop, move |event| tracker.observe(event));

    println!("Publishing {} messages...", plan.count);
    let outcome = publish_all(&client, &mut waiter, plan, &settings.client_id).await;
    let disconnected = disconnect(&client, driver).await;
    let throughput = outcome?;
    println!(
        "Published {} messages to topic '{}' {throughput}",
        throughput.count, plan.topic
    );

    disconnected?;
    println!("Done");
    Ok(throughput)
}

/// Publishes every message in the plan, awaiting completion of each one.
///
/// # Errors
///
/// Returns the first error from the sink, or
/// [`LoadgenError::AckChannelClosed`] if completions stop arriving.
pub async fn publish_all<S: PublishSink>(
    sink: &S,
    waiter: &mut AckWaiter,
    plan: &PublishPlan,
    client_id: &str,
) -> Result<Throughput, LoadgenError> {
    let started = Instant::now();
    let baseline = waiter.acked();

    for i in 1..=plan.count {
        plan.pace.wait().await;

        let body = plan.message.render(i);
        if !plan.silent {
            if body.len() <= LOG_CONTENT_LIMIT {
                tracing::info!(client_id, topic = %plan.topic, qos = ?plan.qos, body = %body, "publishing");
            } else {
                tracing::info!(client_id, topic = %plan.topic, qos = ?plan.qos, bytes = body.len(), "publishing");
            }
        }

        sink.publish(&plan.topic, plan.qos, body.into_owned().into_bytes())
            .await?;
        waiter.wait_for(baseline.saturating_add(i)).await?;
        tracing::debug!(seq = i, "broker ack received");
    }

    Ok(Throughput::since(plan.count, started))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::super::AckTracker;
    use super::*;

    #[derive(Debug)]
    struct RecordingSink {
        tracker: AckTracker,
        sent: Mutex<Vec<(String, Vec<u8>)>>,
        ack: bool,
    }

    impl PublishSink for RecordingSink {
        async fn publish(
            &self,
            topic: &str,
            _qos: QoS,
            payload: Vec<u8>,
        ) -> Result<(), LoadgenError> {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push((topic.to_string(), payload));
            }
            if self.ack {
                self.tracker.record();
            }
            Ok(())
        }
    }

    fn plan(count: u64, delay_ms: u64) -> PublishPlan {
        PublishPlan {
            topic: "sometopic".to_string(),
            qos: QoS::AtLeastOnce,
            count,
            pace: Pace::new(Duration::from_millis(delay_ms)),
            message: MessageSpec::Counter,
            silent: true,
        }
    }

    #[tokio::test]
    async fn publishes_every_message_in_order() {
        let (tracker, mut waiter) = ack_channel(QoS::AtLeastOnce);
        let sink = RecordingSink {
            tracker,
            sent: Mutex::new(Vec::new()),
            ack: true,
        };

        let result = publish_all(&sink, &mut waiter, &plan(3, 0), "loader-pub-01").await;
        let Ok(throughput) = result else {
            panic!("publish failed");
        };
        assert_eq!(throughput.count, 3);

        let Ok(sent) = sink.sent.lock() else {
            panic!("poisoned");
        };
        let bodies: Vec<String> = sent
            .iter()
            .map(|(_, body)| String::from_utf8_lossy(body).into_owned())
            .collect();
        assert_eq!(bodies, vec!["Message 1", "Message 2", "Message 3"]);
        assert!(sent.iter().all(|(topic, _)| topic == "sometopic"));
    }

    #[tokio::test(start_paused = true)]
    async fn total_time_is_count_times_delay() {
        let (tracker, mut waiter) = ack_channel(QoS::AtLeastOnce);
        let sink = RecordingSink {
            tracker,
            sent: Mutex::new(Vec::new()),
            ack: true,
        };

        let started = tokio::time::Instant::now();
        let result = publish_all(&sink, &mut waiter, &plan(4, 250), "loader-pub-01").await;
        assert!(result.is_ok());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_millis(1010));
    }

    #[tokio::test]
    async fn missing_acks_surface_as_error() {
        let (tracker, mut waiter) = ack_channel(QoS::AtLeastOnce);
        // Dropping the tracker stands in for the event loop dying.
        drop(tracker);
        let (unrelated, _) = ack_channel(QoS::AtLeastOnce);
        let sink = RecordingSink {
            tracker: unrelated,
            sent: Mutex::new(Vec::new()),
            ack: false,
        };

        let result = publish_all(&sink, &mut waiter, &plan(2, 0), "loader-pub-01").await;
        assert!(matches!(
            result,
            Err(LoadgenError::AckChannelClosed {
                acked: 0,
                expected: 1
            })
        ));
    }
}
