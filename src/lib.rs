//! # broker-loadgen
//!
//! Load generators for integration testing against message brokers and
//! databases: an MQTT publisher and subscriber, a Solace PubSub+
//! publisher, subscriber and queue drain, and PostgreSQL insert and update
//! generators.
//!
//! ## Architecture
//!
//! ```text
//! CLI (cli/)
//!     │
//!     ├── mqtt-pub / mqtt-sub ──────────── mqtt/     (rumqttc, MQTT 3.1.1)
//!     ├── solace-pub / -sub / -drain ───── solace/   (rumqttc v5)
//!     │                                      └── archive (local directory)
//!     └── pg-insert / pg-update ─────────── postgres/ (sqlx)
//!
//! Shared: payload/ (message bodies), pacing (delays, throughput),
//!         config + telemetry (environment, tracing), error (exit codes)
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod mqtt;
pub mod pacing;
pub mod payload;
pub mod postgres;
pub mod solace;
pub mod telemetry;
