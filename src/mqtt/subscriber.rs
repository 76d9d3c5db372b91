//! `mqtt-sub`: subscribe to one topic and count what arrives.
//!
//! Stops after `--nummsgs` messages, when Enter is pressed, or on Ctrl-C,
//! then prints the totals.

use rumqttc::{Event, Packet, QoS};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use super::{MqttSettings, connect, disconnect, drive};
use crate::config::EnvConfig;
use crate::error::LoadgenError;

/// What to subscribe to and when to stop.
#[derive(Debug, Clone)]
pub struct SubscribePlan {
    /// Topic filter.
    pub topic: String,
    /// Subscription QoS.
    pub qos: QoS,
    /// Stop after this many messages. `None` waits for Enter or Ctrl-C.
    pub limit: Option<u64>,
    /// Suppress per-message logging.
    pub silent: bool,
}

/// Running totals for received messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    /// Messages received.
    pub messages: u64,
    /// Payload bytes received.
    pub bytes: u64,
}

impl ReceiveStats {
    /// Counts one message of `payload_len` bytes.
    pub fn record(&mut self, payload_len: usize) {
        self.messages = self.messages.saturating_add(1);
        self.bytes = self
            .bytes
            .saturating_add(u64::try_from(payload_len).unwrap_or(u64::MAX));
    }

    /// Mean payload size; zero when nothing was received.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_bytes(&self) -> f64 {
        if self.messages == 0 {
            return 0.0;
        }
        self.bytes as f64 / self.messages as f64
    }

    /// Returns `true` once `limit` (if any) has been reached.
    #[must_use]
    pub fn reached(&self, limit: Option<u64>) -> bool {
        limit.is_some_and(|n| self.messages >= n)
    }
}

/// Why the subscriber stopped listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The requested number of messages arrived.
    LimitReached,
    /// Enter was pressed.
    Enter,
    /// Ctrl-C was received.
    Interrupted,
    /// The broker connection dropped.
    ConnectionLost,
}

/// Applies one event loop event to the running totals.
pub fn on_event(event: &Event, stats: &watch::Sender<ReceiveStats>, silent: bool) {
    let Event::Incoming(Packet::Publish(publish)) = event else {
        return;
    };
    stats.send_modify(|s| s.record(publish.payload.len()));
    if !silent {
        tracing::info!(
            topic = %publish.topic,
            bytes = publish.payload.len(),
            received = stats.borrow().messages,
            payload = %String::from_utf8_lossy(&publish.payload),
            "received message"
        );
    }
}

/// Connects, subscribes and counts messages until a stop condition.
///
/// # Errors
///
/// Returns [`LoadgenError::Connection`] if the broker is unreachable and
/// [`LoadgenError::Client`] if the subscription cannot be queued.
pub async fn run(
    settings: &MqttSettings,
    plan: &SubscribePlan,
    env: &EnvConfig,
) -> Result<ReceiveStats, LoadgenError> {
    let (client, eventloop) =
        connect(settings, env.request_queue_capacity, env.connect_timeout()).await?;

    tracing::info!(client_id = %settings.client_id, topic = %plan.topic, qos = ?plan.qos, "subscribing");
    client.subscribe(&plan.topic, plan.qos).await?;

    let (stats_tx, mut stats_rx) = watch::channel(ReceiveStats::default());
    let silent = plan.silent;
    let mut driver = drive(eventloop, move |event| on_event(event, &stats_tx, silent));

    if plan.limit.is_none() {
        println!("Press Enter to stop listening");
    }

    let reason = tokio::select! {
        () = wait_for_limit(&mut stats_rx, plan.limit) => StopReason::LimitReached,
        () = wait_for_enter() => StopReason::Enter,
        _ = tokio::signal::ctrl_c() => StopReason::Interrupted,
        _ = &mut driver => StopReason::ConnectionLost,
    };
    let stats = *stats_rx.borrow();
    tracing::info!(?reason, received = stats.messages, "stopped listening");

    if reason != StopReason::ConnectionLost {
        disconnect(&client, driver).await?;
    }

    println!("Received {} message(s)", stats.messages);
    println!("Byte(s) received: {}", stats.bytes);
    println!("Avg byte(s)/message: {:.2}", stats.average_bytes());
    Ok(stats)
}

async fn wait_for_limit(stats: &mut watch::Receiver<ReceiveStats>, limit: Option<u64>) {
    if limit.is_none() || stats.wait_for(|s| s.reached(limit)).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Resolves when a line is read from stdin. Pends forever on EOF so a
/// detached run keeps listening.
async fn wait_for_enter() {
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    match stdin.read_line(&mut line).await {
        Ok(n) if n > 0 => {}
        _ => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use rumqttc::Publish;

    use super::*;

    #[test]
    fn average_of_nothing_is_zero() {
        let stats = ReceiveStats::default();
        assert!(stats.average_bytes().abs() < f64::EPSILON);
    }

    #[test]
    fn record_accumulates_counts_and_bytes() {
        let mut stats = ReceiveStats::default();
        stats.record(100);
        stats.record(300);
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.bytes, 400);
        assert!((stats.average_bytes() - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reached_respects_limit() {
        let mut stats = ReceiveStats::default();
        assert!(!stats.reached(None));
        assert!(!stats.reached(Some(1)));
        stats.record(1);
        assert!(stats.reached(Some(1)));
        assert!(!stats.reached(None));
    }

    #[test]
    fn publish_events_are_counted() {
        let (tx, rx) = watch::channel(ReceiveStats::default());
        let publish = Publish::new("test/in", QoS::AtLeastOnce, "hello");
        on_event(&Event::Incoming(Packet::Publish(publish)), &tx, true);
        on_event(&Event::Incoming(Packet::PingResp), &tx, true);
        let stats = *rx.borrow();
        assert_eq!(stats.messages, 1);
        assert_eq!(stats.bytes, 5);
    }

    #[tokio::test]
    async fn limit_wait_resolves_when_reached() {
        let (tx, mut rx) = watch::channel(ReceiveStats::default());
        let feeder = tokio::spawn(async move {
            for _ in 0..3 {
                tx.send_modify(|s| s.record(10));
                tokio::task::yield_now().await;
            }
            tx
        });
        wait_for_limit(&mut rx, Some(3)).await;
        assert_eq!(rx.borrow().messages, 3);
        let _ = feeder.await;
    }
}
