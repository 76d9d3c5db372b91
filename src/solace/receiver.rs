//! Pull-style queue consumption on top of the push-style event loop.

use std::collections::HashMap;
use std::time::Duration;

use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::mqttbytes::v5::{Packet, Publish};
use rumqttc::v5::{AsyncClient, Event};
use tokio::sync::mpsc;

use super::{InboundMessage, Session};
use crate::error::LoadgenError;

/// A queue that hands out one message at a time and expects each to be
/// acknowledged once handled.
#[allow(async_fn_in_trait)]
pub trait QueueReceiver {
    /// Waits up to `timeout` for the next message. `Ok(None)` means
    /// nothing arrived in time.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::Connection`] when the session has ended.
    async fn receive(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, LoadgenError>;

    /// Settles `message` so the broker will not redeliver it.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::Client`] if the acknowledgement cannot be
    /// sent, or [`LoadgenError::InvalidArgument`] for an unknown message.
    async fn ack(&mut self, message: &InboundMessage) -> Result<(), LoadgenError>;
}

/// [`QueueReceiver`] over a persistent MQTT 5 session with manual acks.
#[derive(Debug)]
pub struct MqttQueueReceiver {
    client: AsyncClient,
    incoming: mpsc::UnboundedReceiver<Publish>,
    pending: HashMap<u64, Publish>,
    next_delivery: u64,
}

impl MqttQueueReceiver {
    /// Subscribes the session to `topic` at QoS 1 and starts routing
    /// incoming publishes to this receiver.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::Client`] if the subscription cannot be
    /// queued.
    pub async fn bind(session: &mut Session, topic: &str) -> Result<Self, LoadgenError> {
        let (tx, incoming) = mpsc::unbounded_channel();
        session.drive(move |event| {
            if let Event::Incoming(Packet::Publish(publish)) = event {
                let _ = tx.send(publish.clone());
            }
        });
        tracing::info!(topic, "binding queue subscription");
        session.client.subscribe(topic, QoS::AtLeastOnce).await?;
        Ok(Self {
            client: session.client.clone(),
            incoming,
            pending: HashMap::new(),
            next_delivery: 1,
        })
    }

    #[cfg(test)]
    fn from_parts(client: AsyncClient, incoming: mpsc::UnboundedReceiver<Publish>) -> Self {
        Self {
            client,
            incoming,
            pending: HashMap::new(),
            next_delivery: 1,
        }
    }

    /// Messages received but not yet acknowledged.
    #[must_use]
    pub fn unacked(&self) -> usize {
        self.pending.len()
    }
}

impl QueueReceiver for MqttQueueReceiver {
    async fn receive(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, LoadgenError> {
        match tokio::time::timeout(timeout, self.incoming.recv()).await {
            Err(_) => Ok(None),
            Ok(None) => Err(LoadgenError::Connection(
                "session ended while waiting for messages".to_string(),
            )),
            Ok(Some(publish)) => {
                let delivery_id = self.next_delivery;
                self.next_delivery = self.next_delivery.saturating_add(1);
                let message = InboundMessage::from_publish(delivery_id, &publish);
                self.pending.insert(delivery_id, publish);
                Ok(Some(message))
            }
        }
    }

    async fn ack(&mut self, message: &InboundMessage) -> Result<(), LoadgenError> {
        let Some(publish) = self.pending.remove(&message.delivery_id) else {
            return Err(LoadgenError::InvalidArgument(format!(
                "delivery {} is not awaiting acknowledgement",
                message.delivery_id
            )));
        };
        self.client.ack(&publish).await?;
        Ok(())
    }
}
