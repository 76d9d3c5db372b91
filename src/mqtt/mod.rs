//! MQTT publisher and subscriber over `rumqttc` (MQTT v3.1.1).
//!
//! Connection handling, keep-alive and QoS handshakes are owned by the
//! `rumqttc` event loop. This module builds the client options, waits for
//! the CONNACK, and runs the event loop on a background task that hands
//! every event to a caller-supplied handler.

pub mod ack;
pub mod publisher;
pub mod subscriber;

use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::task::JoinHandle;

use crate::error::LoadgenError;

pub use ack::{AckTracker, AckWaiter, ack_channel};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Connection settings for one MQTT client.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    /// Broker host name or IP address.
    pub broker: String,
    /// Broker TCP port.
    pub port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Keep-alive interval.
    pub keepalive: Duration,
    /// Whether the broker should discard session state on connect.
    pub clean_session: bool,
    /// Optional username and password.
    pub credentials: Option<(String, String)>,
}

impl MqttSettings {
    /// Builds the `rumqttc` options for these settings.
    #[must_use]
    pub fn to_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.broker, self.port);
        options
            .set_keep_alive(self.keepalive)
            .set_clean_session(self.clean_session);
        if let Some((username, password)) = &self.credentials {
            options.set_credentials(username, password);
        }
        options
    }

    /// `host:port` for log lines.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.broker, self.port)
    }
}

/// Converts a numeric QoS level.
///
/// # Errors
///
/// Returns [`LoadgenError::InvalidArgument`] for values other than 0, 1, 2.
pub fn qos_from_u8(level: u8) -> Result<QoS, LoadgenError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(LoadgenError::InvalidArgument(format!(
            "qos must be 0, 1 or 2, got {other}"
        ))),
    }
}

/// Random client id of the form `<prefix>-<8 hex digits>`.
#[must_use]
pub fn random_client_id(prefix: &str) -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect();
    format!("{prefix}-{suffix}")
}

/// Creates the client and polls the event loop until the broker accepts
/// the connection.
///
/// # Errors
///
/// Returns [`LoadgenError::Connection`] if the broker refuses, the network
/// fails, or no CONNACK arrives within `timeout`.
pub async fn connect(
    settings: &MqttSettings,
    capacity: usize,
    timeout: Duration,
) -> Result<(AsyncClient, EventLoop), LoadgenError> {
    let (client, mut eventloop) = AsyncClient::new(settings.to_options(), capacity);

    tracing::info!(
        broker = %settings.address(),
        client_id = %settings.client_id,
        clean_session = settings.clean_session,
        "connecting"
    );

    let session_present = tokio::time::timeout(timeout, wait_for_connack(&mut eventloop))
        .await
        .map_err(|_| {
            LoadgenError::Connection(format!(
                "no CONNACK from {} within {}s",
                settings.address(),
                timeout.as_secs()
            ))
        })??;

    tracing::info!(broker = %settings.address(), session_present, "connected");
    Ok((client, eventloop))
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<bool, LoadgenError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(ack.session_present);
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

/// Runs the event loop on a background task, passing every event to
/// `on_event`.
///
/// The task ends cleanly once our DISCONNECT has been written, or with
/// [`LoadgenError::Connection`] when the connection drops.
pub fn drive<F>(mut eventloop: EventLoop, mut on_event: F) -> JoinHandle<Result<(), LoadgenError>>
where
    F: FnMut(&Event) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(event) => {
                    on_event(&event);
                    if matches!(event, Event::Outgoing(Outgoing::Disconnect)) {
                        tracing::debug!("disconnected");
                        return Ok(());
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "mqtt event loop stopped");
                    return Err(LoadgenError::Connection(e.to_string()));
                }
            }
        }
    })
}

/// Sends DISCONNECT and waits for the event loop task to finish. The task
/// is aborted if it has not stopped within a short grace period.
///
/// # Errors
///
/// Returns [`LoadgenError::Client`] if the request cannot be queued.
pub async fn disconnect(
    client: &AsyncClient,
    mut driver: JoinHandle<Result<(), LoadgenError>>,
) -> Result<(), LoadgenError> {
    let queued = client.disconnect().await;
    match tokio::time::timeout(SHUTDOWN_GRACE, &mut driver).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::debug!(error = %e, "event loop ended with error after disconnect"),
        Ok(Err(e)) => tracing::warn!(error = %e, "event loop task failed"),
        Err(_) => {
            tracing::warn!("event loop still running after disconnect, aborting");
            driver.abort();
        }
    }
    queued?;
    Ok(())
}
