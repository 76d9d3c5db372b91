//! `solace-sub`: print what arrives on a topic or queue.

use std::time::Duration;

use rumqttc::v5::Event;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::mqttbytes::v5::Packet;
use tokio::sync::watch;

use super::{InboundMessage, SessionMode, SolaceSettings, connect_first};
use crate::config::EnvConfig;
use crate::error::LoadgenError;

/// Characters of payload shown per message.
pub const SNIPPET_CHARS: usize = 100;

/// Where to receive from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Direct topic subscription.
    Topic(String),
    /// Persistent queue fed by `topic`.
    Queue {
        /// Queue name, used as the session's client id.
        name: String,
        /// Subscription attracting messages to the queue.
        topic: String,
    },
}

impl Source {
    /// Session behaviour for this source.
    #[must_use]
    pub const fn mode(&self) -> SessionMode {
        match self {
            Self::Topic(_) => SessionMode::Direct,
            Self::Queue { .. } => SessionMode::Queue { manual_acks: false },
        }
    }

    /// Subscription topic and QoS.
    #[must_use]
    pub fn subscription(&self) -> (&str, QoS) {
        match self {
            Self::Topic(topic) => (topic.as_str(), QoS::AtMostOnce),
            Self::Queue { topic, .. } => (topic.as_str(), QoS::AtLeastOnce),
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Topic(topic) => write!(f, "topic {topic}"),
            Self::Queue { name, .. } => write!(f, "queue {name}"),
        }
    }
}

/// The line logged for one received message.
#[must_use]
pub fn describe(message: &InboundMessage) -> String {
    format!(
        "Received message: ID={}, Size={:.2} KB, Content={}",
        message.application_message_id.as_deref().unwrap_or("N/A"),
        message.size_kb(),
        message.snippet(SNIPPET_CHARS)
    )
}

/// Connects, subscribes and logs messages until Ctrl-C or `duration`.
///
/// Returns the number of messages received.
///
/// # Errors
///
/// Returns [`LoadgenError::Connection`] when no broker accepts the
/// session or the connection drops while listening, and
/// [`LoadgenError::Client`] if the subscription fails.
pub async fn run(
    settings: &SolaceSettings,
    source: &Source,
    duration: Duration,
    env: &EnvConfig,
) -> Result<u64, LoadgenError> {
    println!("Subscribing to: {source}");
    let mut session =
        connect_first(settings, env.request_queue_capacity, env.connect_timeout()).await?;

    let (count_tx, count_rx) = watch::channel(0_u64);
    let mut delivery = 0_u64;
    session.drive(move |event| {
        if let Event::Incoming(Packet::Publish(publish)) = event {
            delivery = delivery.saturating_add(1);
            let message = InboundMessage::from_publish(delivery, publish);
            tracing::info!("{}", describe(&message));
            count_tx.send_modify(|n| *n = n.saturating_add(1));
        }
    });

    let (topic, qos) = source.subscription();
    session.client.subscribe(topic, qos).await?;
    println!("Receiver started for {source}");
    println!("Running. Press Ctrl+C to stop.");

    let lost = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("Stopping receiver...");
            None
        }
        () = tokio::time::sleep(duration) => {
            tracing::info!(secs = duration.as_secs(), "duration elapsed");
            None
        }
        reason = session.lost() => Some(reason),
    };

    let received = *count_rx.borrow();
    if let Some(reason) = lost {
        tracing::error!(error = %reason, received, "connection lost");
        return Err(reason);
    }
    session.disconnect().await?;
    println!("Disconnected");
    tracing::info!(received, "subscriber finished");
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: Option<&str>, payload: &str) -> InboundMessage {
        InboundMessage {
            delivery_id: 1,
            topic: super::super::DEFAULT_TOPIC.to_string(),
            payload: payload.as_bytes().to_vec(),
            application_message_id: id.map(str::to_string),
            content_type: None,
        }
    }

    #[test]
    fn describe_shows_id_size_and_content() {
        let line = describe(&message(Some("loadtest-msg-0"), "hello"));
        assert_eq!(
            line,
            "Received message: ID=loadtest-msg-0, Size=0.00 KB, Content=hello"
        );
    }

    #[test]
    fn describe_without_id_uses_placeholder() {
        let payload = "y".repeat(2048);
        let line = describe(&message(None, &payload));
        assert!(line.starts_with("Received message: ID=N/A, Size=2.00 KB, Content="));
        assert!(line.ends_with("..."));
    }

    #[test]
    fn topic_source_is_direct_qos0() {
        let source = Source::Topic("a/b".to_string());
        assert_eq!(source.mode(), SessionMode::Direct);
        assert_eq!(source.subscription(), ("a/b", QoS::AtMostOnce));
        assert_eq!(source.to_string(), "topic a/b");
    }

    #[test]
    fn queue_source_is_persistent_qos1() {
        let source = Source::Queue {
            name: "q1".to_string(),
            topic: "a/b".to_string(),
        };
        assert_eq!(source.mode(), SessionMode::Queue { manual_acks: false });
        assert_eq!(source.subscription(), ("a/b", QoS::AtLeastOnce));
        assert_eq!(source.to_string(), "queue q1");
    }
}
