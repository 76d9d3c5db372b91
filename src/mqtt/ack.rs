//! Publish completion tracking.
//!
//! The event loop task owns an [`AckTracker`] and bumps a counter each
//! time a publish completes: the packet was written (QoS 0), the PUBACK
//! arrived (QoS 1) or the PUBCOMP arrived (QoS 2). The publishing task
//! holds the matching [`AckWaiter`] and awaits the counter reaching the
//! number of messages it has sent.

use rumqttc::{Event, Outgoing, Packet, QoS};
use tokio::sync::watch;

use crate::error::LoadgenError;

/// Event-loop side of the acknowledgement counter.
#[derive(Debug)]
pub struct AckTracker {
    tx: watch::Sender<u64>,
    qos: QoS,
}

/// Publisher side of the acknowledgement counter.
#[derive(Debug, Clone)]
pub struct AckWaiter {
    rx: watch::Receiver<u64>,
}

/// Creates a linked tracker/waiter pair for publishes at `qos`.
#[must_use]
pub fn ack_channel(qos: QoS) -> (AckTracker, AckWaiter) {
    let (tx, rx) = watch::channel(0);
    (AckTracker { tx, qos }, AckWaiter { rx })
}

impl AckTracker {
    /// Records one completed publish.
    pub fn record(&self) {
        self.tx.send_modify(|acked| *acked = acked.saturating_add(1));
    }

    /// Returns `true` if `event` completes a publish at this tracker's QoS.
    #[must_use]
    pub fn completes_publish(&self, event: &Event) -> bool {
        match self.qos {
            QoS::AtMostOnce => matches!(event, Event::Outgoing(Outgoing::Publish(_))),
            QoS::AtLeastOnce => matches!(event, Event::Incoming(Packet::PubAck(_))),
            QoS::ExactlyOnce => matches!(event, Event::Incoming(Packet::PubComp(_))),
        }
    }

    /// Inspects an event loop event and records it if it completes a
    /// publish.
    pub fn observe(&self, event: &Event) {
        if self.completes_publish(event) {
            self.record();
        }
    }
}

impl AckWaiter {
    /// Publishes completed so far.
    #[must_use]
    pub fn acked(&self) -> u64 {
        *self.rx.borrow()
    }

    /// Waits until at least `target` publishes have completed.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::AckChannelClosed`] if the event loop task
    /// ends first.
    pub async fn wait_for(&mut self, target: u64) -> Result<(), LoadgenError> {
        if self.rx.wait_for(|acked| *acked >= target).await.is_ok() {
            return Ok(());
        }
        Err(LoadgenError::AckChannelClosed {
            acked: self.acked(),
            expected: target,
        })
    }
}
