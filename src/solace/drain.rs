//! `solace-drain`: empty a queue into the archive for a bounded time.
//!
//! Each message is archived and then acknowledged. Failures are logged per
//! message and the drain moves on; a message whose ack failed is
//! redelivered by the broker on a later run.

use std::time::Duration;

use tokio::time::Instant;

use super::archive::{ArchiveSink, Batch, archive_object};
use super::receiver::{MqttQueueReceiver, QueueReceiver};
use super::{InboundMessage, SolaceSettings, connect_first};
use crate::config::EnvConfig;
use crate::error::LoadgenError;

/// Parameters of one drain run.
#[derive(Debug, Clone)]
pub struct DrainPlan {
    /// Queue (persistent session) to drain.
    pub queue: String,
    /// Topic subscription that feeds the queue.
    pub topic: String,
    /// Batch naming this run's archive prefix.
    pub batch: Batch,
    /// Stop receiving once this much time has passed.
    pub max_runtime: Duration,
    /// Longest single wait for a message.
    pub receive_timeout: Duration,
}

/// Totals for one drain run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Messages taken off the queue.
    pub received: u64,
    /// Messages both archived and acknowledged.
    pub processed: u64,
    /// Wall time spent draining.
    pub elapsed: Duration,
}

impl DrainReport {
    /// Runtime in minutes.
    #[must_use]
    pub fn minutes(&self) -> f64 {
        self.elapsed.as_secs_f64() / 60.0
    }
}

/// What [`drain`] hands back: the totals so far and, when the session
/// ended before `max_runtime`, the reason.
#[derive(Debug)]
pub struct DrainOutcome {
    /// Totals up to the point the drain stopped.
    pub report: DrainReport,
    /// Set when the session was lost mid-drain.
    pub interrupted: Option<LoadgenError>,
}

/// Connects to the first reachable broker, drains the queue into
/// `archive` and disconnects. The totals are logged however the drain
/// ends.
///
/// # Errors
///
/// Returns [`LoadgenError::Connection`] if no broker accepts the session or
/// the session drops mid-drain, and [`LoadgenError::Client`] if the
/// subscription cannot be set up.
pub async fn run<A: ArchiveSink>(
    settings: &SolaceSettings,
    plan: &DrainPlan,
    archive: &A,
    env: &EnvConfig,
) -> Result<DrainReport, LoadgenError> {
    let mut session =
        connect_first(settings, env.request_queue_capacity, env.connect_timeout()).await?;
    tracing::info!(queue = %plan.queue, topic = %plan.topic, "bound to persistent queue");
    let mut receiver = MqttQueueReceiver::bind(&mut session, &plan.topic).await?;

    let DrainOutcome {
        report,
        interrupted,
    } = drain(&mut receiver, archive, plan).await;
    if receiver.unacked() > 0 {
        tracing::warn!(unacked = receiver.unacked(), "messages left for redelivery");
    }
    tracing::info!(
        received = report.received,
        "Total messages consumed: {}. Runtime: {:.1} minutes",
        report.processed,
        report.minutes()
    );

    let disconnected = session.disconnect().await;
    if let Some(e) = interrupted {
        if let Err(close) = disconnected {
            tracing::debug!(error = %close, "disconnect after session loss");
        }
        return Err(e);
    }
    disconnected?;
    Ok(report)
}

/// Receives, archives and acknowledges until `plan.max_runtime` elapses.
///
/// Per-message failures and transient receive errors are logged and the
/// drain carries on. A [`LoadgenError::Connection`] from the receiver
/// means the session has ended: the drain stops there and reports what it
/// processed so far.
pub async fn drain<R, A>(receiver: &mut R, archive: &A, plan: &DrainPlan) -> DrainOutcome
where
    R: QueueReceiver,
    A: ArchiveSink,
{
    let started = Instant::now();
    let mut report = DrainReport::default();
    let mut interrupted = None;

    tracing::info!(
        max_runtime_secs = plan.max_runtime.as_secs(),
        batch_date = %plan.batch.date,
        batch_time = %plan.batch.timestamp,
        "draining queue"
    );

    loop {
        let remaining = plan.max_runtime.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            break;
        }
        let message = match receiver.receive(plan.receive_timeout.min(remaining)).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::debug!("no message within receive timeout");
                continue;
            }
            Err(e) if e.is_connection_failure() => {
                tracing::error!(error = %e, processed = report.processed, "session lost, stopping drain");
                interrupted = Some(e);
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "receive failed");
                continue;
            }
        };
        report.received = report.received.saturating_add(1);
        if handle(receiver, archive, &plan.batch, report.received, &message).await {
            report.processed = report.processed.saturating_add(1);
        }
    }

    report.elapsed = started.elapsed();
    DrainOutcome {
        report,
        interrupted,
    }
}

async fn handle<R, A>(
    receiver: &mut R,
    archive: &A,
    batch: &Batch,
    message_number: u64,
    message: &InboundMessage,
) -> bool
where
    R: QueueReceiver,
    A: ArchiveSink,
{
    let object = archive_object(batch, message_number, &message.payload);
    if let Err(e) = archive.put(&object).await {
        tracing::error!(message_number, key = %object.key, error = %e, "archive failed");
        return false;
    }
    if let Err(e) = receiver.ack(message).await {
        tracing::error!(message_number, error = %e, "ack failed");
        return false;
    }
    tracing::info!(message_number, key = %object.key, "message archived");
    true
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;

    use super::super::archive::ArchiveObject;
    use super::*;

    #[derive(Debug, Default)]
    struct ScriptedReceiver {
        queued: VecDeque<InboundMessage>,
        failing_acks: HashSet<u64>,
        acked: Vec<u64>,
        closed: bool,
        transient_failures: u32,
    }

    impl ScriptedReceiver {
        fn with_payloads(payloads: &[&str]) -> Self {
            let queued = payloads
                .iter()
                .zip(1..)
                .map(|(payload, id)| InboundMessage {
                    delivery_id: id,
                    topic: "solace/loadtest/topic".to_string(),
                    payload: payload.as_bytes().to_vec(),
                    application_message_id: None,
                    content_type: None,
                })
                .collect();
            Self {
                queued,
                ..Self::default()
            }
        }
    }

    impl QueueReceiver for ScriptedReceiver {
        async fn receive(
            &mut self,
            timeout: Duration,
        ) -> Result<Option<InboundMessage>, LoadgenError> {
            if self.transient_failures > 0 {
                self.transient_failures -= 1;
                return Err(LoadgenError::Client("receive hiccup".to_string()));
            }
            if let Some(message) = self.queued.pop_front() {
                return Ok(Some(message));
            }
            if self.closed {
                return Err(LoadgenError::Connection("closed".to_string()));
            }
            tokio::time::sleep(timeout).await;
            Ok(None)
        }

        async fn ack(&mut self, message: &InboundMessage) -> Result<(), LoadgenError> {
            if self.failing_acks.contains(&message.delivery_id) {
                return Err(LoadgenError::Client("ack rejected".to_string()));
            }
            self.acked.push(message.delivery_id);
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct MemoryArchive {
        objects: Mutex<Vec<ArchiveObject>>,
        reject_prefix: Option<&'static str>,
    }

    impl ArchiveSink for MemoryArchive {
        async fn put(&self, object: &ArchiveObject) -> Result<(), LoadgenError> {
            if self.reject_prefix.is_some_and(|p| object.key.starts_with(p)) {
                return Err(LoadgenError::Archive(std::io::Error::other("disk full")));
            }
            if let Ok(mut objects) = self.objects.lock() {
                objects.push(object.clone());
            }
            Ok(())
        }
    }

    impl MemoryArchive {
        fn keys(&self) -> Vec<String> {
            let Ok(objects) = self.objects.lock() else {
                panic!("poisoned");
            };
            objects.iter().map(|o| o.key.clone()).collect()
        }
    }

    const GOOD: &str = r#"{"RailTrackInspectionData": {
        "Headers": {"TransactionIdentity": {"MessageID": "A", "RecordID": "1"}},
        "Data": {"Survey and Localization Information": {"ok": true}}}}"#;

    fn plan(max_runtime_secs: u64) -> DrainPlan {
        let Ok(batch) = Batch::parse("2024/01/02/030405") else {
            panic!("batch");
        };
        DrainPlan {
            queue: "q".to_string(),
            topic: "solace/loadtest/topic".to_string(),
            batch,
            max_runtime: Duration::from_secs(max_runtime_secs),
            receive_timeout: Duration::from_millis(10_000),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn archives_and_acks_every_message() {
        let mut receiver = ScriptedReceiver::with_payloads(&[GOOD, "garbage"]);
        let archive = MemoryArchive::default();

        let DrainOutcome {
            report,
            interrupted: None,
        } = drain(&mut receiver, &archive, &plan(30)).await
        else {
            panic!("drain failed");
        };
        assert_eq!(report.received, 2);
        assert_eq!(report.processed, 2);
        assert_eq!(receiver.acked, vec![1, 2]);
        assert_eq!(
            archive.keys(),
            vec![
                "landing/20240102/incremental/030405/A_1.json".to_string(),
                "error/20240102/incremental/030405/2.json".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_max_runtime() {
        let mut receiver = ScriptedReceiver::default();
        let archive = MemoryArchive::default();

        let DrainOutcome {
            report,
            interrupted: None,
        } = drain(&mut receiver, &archive, &plan(30)).await
        else {
            panic!("drain failed");
        };
        assert_eq!(report.received, 0);
        assert!(report.elapsed >= Duration::from_secs(30));
        assert!(report.elapsed < Duration::from_secs(31));
        assert!((report.minutes() - 0.5).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn ack_failure_is_not_counted_but_drain_continues() {
        let mut receiver = ScriptedReceiver::with_payloads(&[GOOD, GOOD, GOOD]);
        receiver.failing_acks.insert(2);
        let archive = MemoryArchive::default();

        let DrainOutcome {
            report,
            interrupted: None,
        } = drain(&mut receiver, &archive, &plan(5)).await
        else {
            panic!("drain failed");
        };
        assert_eq!(report.received, 3);
        assert_eq!(report.processed, 2);
        assert_eq!(receiver.acked, vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn archive_failure_skips_ack() {
        let mut receiver = ScriptedReceiver::with_payloads(&["bad", GOOD]);
        let archive = MemoryArchive {
            reject_prefix: Some("error/"),
            ..MemoryArchive::default()
        };

        let DrainOutcome {
            report,
            interrupted: None,
        } = drain(&mut receiver, &archive, &plan(5)).await
        else {
            panic!("drain failed");
        };
        assert_eq!(report.received, 2);
        assert_eq!(report.processed, 1);
        assert_eq!(receiver.acked, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_session_keeps_totals_of_processed_messages() {
        let mut receiver = ScriptedReceiver::with_payloads(&[GOOD, GOOD]);
        receiver.closed = true;
        let archive = MemoryArchive::default();

        let outcome = drain(&mut receiver, &archive, &plan(30)).await;
        assert!(matches!(
            outcome.interrupted,
            Some(LoadgenError::Connection(_))
        ));
        assert_eq!(outcome.report.received, 2);
        assert_eq!(outcome.report.processed, 2);
        assert!(outcome.report.elapsed < Duration::from_secs(30));
        assert_eq!(receiver.acked, vec![1, 2]);
        assert_eq!(archive.keys().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_receive_errors_do_not_stop_the_drain() {
        let mut receiver = ScriptedReceiver::with_payloads(&[GOOD]);
        receiver.transient_failures = 3;
        let archive = MemoryArchive::default();

        let outcome = drain(&mut receiver, &archive, &plan(5)).await;
        assert!(outcome.interrupted.is_none());
        assert_eq!(outcome.report.processed, 1);
        assert!(outcome.report.elapsed >= Duration::from_secs(5));
    }
}
