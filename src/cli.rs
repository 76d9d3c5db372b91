//! Command line interface.
//!
//! One subcommand per tool. Each args struct converts itself into the
//! settings and plan its tool runs with; conversion failures are
//! [`LoadgenError::InvalidArgument`] and exit with code 2.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::{delay_from_secs, parse_bool_flag};
use crate::error::LoadgenError;
use crate::mqtt::publisher::PublishPlan;
use crate::mqtt::subscriber::SubscribePlan;
use crate::mqtt::{MqttSettings, qos_from_u8, random_client_id};
use crate::pacing::Pace;
use crate::payload::MessageSpec;
use crate::postgres::insert::InsertPlan;
use crate::postgres::update::UpdatePlan;
use crate::postgres::{DEFAULT_UTC_OFFSET_HOURS, PgSettings, TableName, utc_offset};
use crate::solace::archive::Batch;
use crate::solace::drain::DrainPlan;
use crate::solace::publisher::{DEFAULT_TEXT_BODY, PayloadFormat, SolacePublishPlan};
use crate::solace::subscriber::Source;
use crate::solace::{DEFAULT_TOPIC, Endpoint, SessionMode, SolaceSettings};

/// Load generators for MQTT, Solace PubSub+ and PostgreSQL.
#[derive(Debug, Parser)]
#[command(name = "broker-loadgen", version, about)]
pub struct Cli {
    /// Tool to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available tools.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Publish messages to an MQTT broker.
    MqttPub(MqttPubArgs),
    /// Subscribe to an MQTT topic and count messages.
    MqttSub(MqttSubArgs),
    /// Publish text or JSON messages to a Solace broker.
    SolacePub(SolacePubArgs),
    /// Print messages from a Solace topic or queue.
    SolaceSub(SolaceSubArgs),
    /// Drain a Solace queue into the archive.
    SolaceDrain(SolaceDrainArgs),
    /// Insert numbered rows into a PostgreSQL table.
    PgInsert(PgInsertArgs),
    /// Repeatedly update the oldest rows of a PostgreSQL table.
    PgUpdate(PgUpdateArgs),
}

impl Command {
    /// Whether per-message logging is suppressed.
    #[must_use]
    pub const fn silent(&self) -> bool {
        match self {
            Self::MqttPub(args) => args.silent,
            Self::MqttSub(args) => args.silent,
            Self::PgInsert(args) => args.db.silent,
            Self::PgUpdate(args) => args.db.silent,
            Self::SolacePub(_) | Self::SolaceSub(_) | Self::SolaceDrain(_) => false,
        }
    }
}

/// MQTT connection flags shared by `mqtt-pub` and `mqtt-sub`.
#[derive(Debug, Clone, Args)]
pub struct MqttConnectionArgs {
    /// Broker host name or IP address.
    #[arg(long, default_value = "localhost")]
    pub broker: String,

    /// Broker port.
    #[arg(long, default_value_t = 1883)]
    pub port: u16,

    /// Client id; a random one is generated when omitted.
    #[arg(long = "clientid")]
    pub client_id: Option<String>,

    /// Quality of service level (0, 1 or 2).
    #[arg(long, default_value_t = 1)]
    pub qos: u8,

    /// Discard session state on connect.
    #[arg(long = "cleansession", default_value = "true", action = ArgAction::Set, value_parser = parse_bool_flag)]
    pub clean_session: bool,

    /// Keep-alive interval in seconds.
    #[arg(long, default_value_t = 1200)]
    pub keepalive: u64,

    /// Username for broker authentication.
    #[arg(long)]
    pub username: Option<String>,

    /// Password for broker authentication.
    #[arg(long)]
    pub password: Option<String>,

    /// Topic to publish to or subscribe to.
    #[arg(long, default_value = "test")]
    pub topic: String,
}

impl MqttConnectionArgs {
    /// Connection settings, generating a client id from `prefix` if none
    /// was given.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::InvalidArgument`] when only one of
    /// username and password is set.
    pub fn settings(&self, prefix: &str) -> Result<MqttSettings, LoadgenError> {
        let credentials = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            (None, None) => None,
            _ => {
                return Err(LoadgenError::InvalidArgument(
                    "--username and --password must be given together".to_string(),
                ));
            }
        };
        Ok(MqttSettings {
            broker: self.broker.clone(),
            port: self.port,
            client_id: self
                .client_id
                .clone()
                .unwrap_or_else(|| random_client_id(prefix)),
            keepalive: Duration::from_secs(self.keepalive),
            clean_session: self.clean_session,
            credentials,
        })
    }
}

/// `mqtt-pub` flags.
#[derive(Debug, Clone, Args)]
pub struct MqttPubArgs {
    /// Connection flags.
    #[command(flatten)]
    pub connection: MqttConnectionArgs,

    /// Number of messages to publish.
    #[arg(long = "nummsgs", default_value_t = 1)]
    pub count: u64,

    /// Delay before each publish, in seconds.
    #[arg(long, default_value_t = 0.0)]
    pub delay: f64,

    /// Message body. All digits means a random body of that length.
    #[arg(long)]
    pub message: Option<String>,

    /// Suppress per-message logging (0/1 or a boolean word).
    #[arg(long, default_value = "0", action = ArgAction::Set, value_parser = parse_bool_flag)]
    pub silent: bool,
}

impl MqttPubArgs {
    /// Settings and plan for the publisher.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::InvalidArgument`] for a bad QoS, delay or
    /// credential pair.
    pub fn into_parts(self) -> Result<(MqttSettings, PublishPlan), LoadgenError> {
        let settings = self.connection.settings("loadgen-pub")?;
        let plan = PublishPlan {
            topic: self.connection.topic,
            qos: qos_from_u8(self.connection.qos)?,
            count: self.count,
            pace: Pace::new(delay_from_secs(self.delay)?),
            message: MessageSpec::from_arg(self.message.as_deref()),
            silent: self.silent,
        };
        Ok((settings, plan))
    }
}

/// `mqtt-sub` flags.
#[derive(Debug, Clone, Args)]
pub struct MqttSubArgs {
    /// Connection flags.
    #[command(flatten)]
    pub connection: MqttConnectionArgs,

    /// Stop after this many messages; otherwise wait for Enter or Ctrl-C.
    #[arg(long = "nummsgs")]
    pub count: Option<u64>,

    /// Suppress per-message logging (0/1 or a boolean word).
    #[arg(long, default_value = "0", action = ArgAction::Set, value_parser = parse_bool_flag)]
    pub silent: bool,
}

impl MqttSubArgs {
    /// Settings and plan for the subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::InvalidArgument`] for a bad QoS or
    /// credential pair.
    pub fn into_parts(self) -> Result<(MqttSettings, SubscribePlan), LoadgenError> {
        let settings = self.connection.settings("loadgen-sub")?;
        let plan = SubscribePlan {
            topic: self.connection.topic,
            qos: qos_from_u8(self.connection.qos)?,
            limit: self.count,
            silent: self.silent,
        };
        Ok((settings, plan))
    }
}

/// Solace connection flags.
#[derive(Debug, Clone, Args)]
pub struct SolaceConnectionArgs {
    /// Broker URL. Repeat the flag, or comma-separate the variable, to
    /// list fail-over brokers in order.
    #[arg(
        long = "broker",
        env = "SOLACE_HOST",
        value_delimiter = ',',
        default_value = "tcp://localhost:1883"
    )]
    pub brokers: Vec<String>,

    /// Message VPN.
    #[arg(long, env = "SOLACE_VPN", default_value = "default")]
    pub vpn: String,

    /// Client username.
    #[arg(long, env = "SOLACE_USERNAME", default_value = "default")]
    pub username: String,

    /// Client password.
    #[arg(long, env = "SOLACE_PASSWORD", default_value = "default", hide_env_values = true)]
    pub password: String,

    /// Client name; generated when omitted.
    #[arg(long = "client-name")]
    pub client_name: Option<String>,
}

impl SolaceConnectionArgs {
    /// Settings for a session in `mode`. `client_name` overrides both the
    /// flag and the generated default.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::InvalidArgument`] for an unparseable broker
    /// URL.
    pub fn settings(
        &self,
        mode: SessionMode,
        client_name: Option<&str>,
    ) -> Result<SolaceSettings, LoadgenError> {
        let endpoints = self
            .brokers
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .map(Endpoint::parse)
            .collect::<Result<Vec<_>, _>>()?;
        let client_name = client_name
            .map(str::to_string)
            .or_else(|| self.client_name.clone())
            .unwrap_or_else(|| random_client_id("loadgen-solace"));
        Ok(SolaceSettings {
            endpoints,
            vpn: self.vpn.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            client_name,
            mode,
        })
    }
}

/// `solace-pub` flags.
#[derive(Debug, Clone, Args)]
pub struct SolacePubArgs {
    /// Connection flags.
    #[command(flatten)]
    pub connection: SolaceConnectionArgs,

    /// Payload format.
    #[arg(long, value_enum, default_value_t = PayloadFormat::Text)]
    pub format: PayloadFormat,

    /// Approximate JSON payload size in KB.
    #[arg(long, default_value_t = 1)]
    pub size: usize,

    /// Number of messages to publish.
    #[arg(long, default_value_t = 1000)]
    pub messages: u64,

    /// Destination topic.
    #[arg(long, default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// Delay after each message, in seconds.
    #[arg(long, default_value_t = 0.001)]
    pub delay: f64,

    /// Body for text messages.
    #[arg(long, default_value = DEFAULT_TEXT_BODY)]
    pub message: String,
}

impl SolacePubArgs {
    /// Settings and plan for the publisher.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::InvalidArgument`] for a bad broker URL or
    /// delay.
    pub fn into_parts(self) -> Result<(SolaceSettings, SolacePublishPlan), LoadgenError> {
        let settings = self.connection.settings(SessionMode::Direct, None)?;
        let plan = SolacePublishPlan {
            topic: self.topic,
            count: self.messages,
            pace: Pace::new(delay_from_secs(self.delay)?),
            format: self.format,
            text: self.message,
            size_kb: self.size,
        };
        Ok((settings, plan))
    }
}

/// `solace-sub` flags.
#[derive(Debug, Clone, Args)]
pub struct SolaceSubArgs {
    /// Connection flags.
    #[command(flatten)]
    pub connection: SolaceConnectionArgs,

    /// Topic to subscribe to (also the queue's subscription).
    #[arg(long, default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// Consume from this queue instead of the topic.
    #[arg(long)]
    pub queue: Option<String>,

    /// Seconds to run before stopping.
    #[arg(long, default_value_t = 3600)]
    pub duration: u64,
}

impl SolaceSubArgs {
    /// Settings, source and run time for the subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::InvalidArgument`] for a bad broker URL.
    pub fn into_parts(self) -> Result<(SolaceSettings, Source, Duration), LoadgenError> {
        let source = match self.queue {
            Some(name) => Source::Queue {
                name,
                topic: self.topic,
            },
            None => Source::Topic(self.topic),
        };
        let client_name = match &source {
            Source::Queue { name, .. } => Some(name.as_str()),
            Source::Topic(_) => None,
        };
        let settings = self.connection.settings(source.mode(), client_name)?;
        Ok((settings, source, Duration::from_secs(self.duration)))
    }
}

/// `solace-drain` flags.
#[derive(Debug, Clone, Args)]
pub struct SolaceDrainArgs {
    /// Connection flags.
    #[command(flatten)]
    pub connection: SolaceConnectionArgs,

    /// Queue to drain.
    #[arg(long, env = "SOLACE_QUEUE")]
    pub queue: String,

    /// Subscription that feeds the queue.
    #[arg(long, default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// Archive root directory.
    #[arg(long, env = "BUCKET_NAME", default_value = "archive")]
    pub bucket: PathBuf,

    /// Stop after this many seconds.
    #[arg(long = "max-runtime", env = "MAX_RUNTIME_SECONDS", default_value_t = 30)]
    pub max_runtime: u64,

    /// Longest wait for a single message, in milliseconds.
    #[arg(long = "receive-timeout-ms", default_value_t = 10_000)]
    pub receive_timeout_ms: u64,

    /// Batch string `YYYY/MM/DD/HHMMSS`; defaults to the local time.
    #[arg(long)]
    pub batch: Option<String>,
}

impl SolaceDrainArgs {
    /// Settings, plan and archive root for the drain.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::InvalidArgument`] for a bad broker URL,
    /// queue name, receive timeout or batch string.
    pub fn into_parts(self) -> Result<(SolaceSettings, DrainPlan, PathBuf), LoadgenError> {
        if self.queue.trim().is_empty() {
            return Err(LoadgenError::InvalidArgument(
                "--queue must not be empty".to_string(),
            ));
        }
        let settings = self.connection.settings(
            SessionMode::Queue { manual_acks: true },
            Some(self.queue.as_str()),
        )?;
        if self.receive_timeout_ms == 0 {
            return Err(LoadgenError::InvalidArgument(
                "--receive-timeout-ms must be greater than zero".to_string(),
            ));
        }
        let batch = match self.batch {
            Some(raw) => Batch::parse(&raw)?,
            None => Batch::parse(&Batch::current())?,
        };
        let plan = DrainPlan {
            queue: self.queue,
            topic: self.topic,
            batch,
            max_runtime: Duration::from_secs(self.max_runtime),
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
        };
        Ok((settings, plan, self.bucket))
    }
}

/// PostgreSQL flags shared by `pg-insert` and `pg-update`.
#[derive(Debug, Clone, Args)]
pub struct PgArgs {
    /// Server host.
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Server port.
    #[arg(long, default_value_t = 5432)]
    pub port: u16,

    /// Database name.
    #[arg(long)]
    pub database: String,

    /// Table name, `name` or `schema.name`.
    #[arg(long)]
    pub table: String,

    /// Login role.
    #[arg(long)]
    pub user: String,

    /// Login password.
    #[arg(long, default_value = "")]
    pub password: String,

    /// Delay after each insert or pass, in seconds.
    #[arg(long, default_value_t = 0.0)]
    pub delay: f64,

    /// Suppress per-statement logging (0/1 or a boolean word).
    #[arg(long, default_value = "0", action = ArgAction::Set, value_parser = parse_bool_flag)]
    pub silent: bool,

    /// Offset from UTC for generated timestamps, in hours.
    #[arg(long = "utc-offset-hours", default_value_t = DEFAULT_UTC_OFFSET_HOURS, allow_negative_numbers = true)]
    pub utc_offset_hours: i32,
}

impl PgArgs {
    /// Connection settings and validated table name.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::InvalidArgument`] for a bad table name or
    /// offset.
    pub fn connection(&self) -> Result<(PgSettings, TableName), LoadgenError> {
        let table = TableName::parse(&self.table)?;
        let settings = PgSettings {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            time_zone: utc_offset(self.utc_offset_hours)?,
        };
        Ok((settings, table))
    }
}

/// `pg-insert` flags.
#[derive(Debug, Clone, Args)]
pub struct PgInsertArgs {
    /// Connection and pacing flags.
    #[command(flatten)]
    pub db: PgArgs,

    /// Rows to insert.
    #[arg(long = "numrecords", default_value_t = 1)]
    pub count: u64,
}

impl PgInsertArgs {
    /// Plan for the insert run.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::InvalidArgument`] for a bad delay or offset.
    pub fn plan(&self) -> Result<InsertPlan, LoadgenError> {
        Ok(InsertPlan {
            count: self.count,
            pace: Pace::new(delay_from_secs(self.db.delay)?),
            silent: self.db.silent,
            offset: utc_offset(self.db.utc_offset_hours)?,
        })
    }
}

/// `pg-update` flags.
#[derive(Debug, Clone, Args)]
pub struct PgUpdateArgs {
    /// Connection and pacing flags.
    #[command(flatten)]
    pub db: PgArgs,

    /// Rows touched per pass.
    #[arg(long = "numrecords", default_value_t = 1)]
    pub rows_per_pass: u32,

    /// Number of passes.
    #[arg(long = "numupdates", default_value_t = 1)]
    pub passes: u64,
}

impl PgUpdateArgs {
    /// Plan for the update run.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::InvalidArgument`] for a bad delay or offset.
    pub fn plan(&self) -> Result<UpdatePlan, LoadgenError> {
        Ok(UpdatePlan {
            passes: self.passes,
            rows_per_pass: self.rows_per_pass,
            pace: Pace::new(delay_from_secs(self.db.delay)?),
            silent: self.db.silent,
            offset: utc_offset(self.db.utc_offset_hours)?,
        })
    }
}
