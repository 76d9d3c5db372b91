//! Database access for the generators.

use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use super::models::{NewRow, TableName, TestRow};
use super::session_time_zone;
use crate::error::LoadgenError;

/// The three statements the generators issue.
#[allow(async_fn_in_trait)]
pub trait TestDataStore {
    /// Inserts one row.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::Database`] on failure.
    async fn insert_row(&self, row: &NewRow) -> Result<(), LoadgenError>;

    /// Up to `limit` rows ordered by `updated`, then `id`, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::Database`] on failure.
    async fn least_recently_updated(&self, limit: u32) -> Result<Vec<TestRow>, LoadgenError>;

    /// Sets `updated` and `current_value` on row `id`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::Database`] on failure.
    async fn touch_row(
        &self,
        id: i64,
        updated: DateTime<FixedOffset>,
        current_value: i64,
    ) -> Result<(), LoadgenError>;
}

/// Connection parameters.
#[derive(Clone)]
pub struct PgSettings {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Login role.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Offset used for the session `TimeZone`, matching the offset of the
    /// generated timestamps.
    pub time_zone: FixedOffset,
}

impl std::fmt::Debug for PgSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("time_zone", &self.time_zone)
            .finish()
    }
}

impl PgSettings {
    /// Connect options, with the session `TimeZone` set to
    /// [`PgSettings::time_zone`].
    #[must_use]
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
            .options([("TimeZone", session_time_zone(self.time_zone))])
    }
}

/// SQL text for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statements {
    /// Parameterised insert.
    pub insert: String,
    /// Parameterised select of the oldest rows.
    pub select_oldest: String,
    /// Parameterised update of one row.
    pub touch: String,
}

impl Statements {
    /// Statements against `table`.
    #[must_use]
    pub fn for_table(table: &TableName) -> Self {
        Self {
            insert: format!(
                "INSERT INTO {table} (created, updated, initial_value, current_value) \
                 VALUES ($1, $2, $3, $4)"
            ),
            select_oldest: format!(
                "SELECT id::bigint, current_value::bigint FROM {table} \
                 ORDER BY updated, id ASC LIMIT $1"
            ),
            touch: format!("UPDATE {table} SET updated = $1, current_value = $2 WHERE id = $3"),
        }
    }
}

/// [`TestDataStore`] over a single-connection `sqlx` pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    statements: Statements,
}

impl PgStore {
    /// Opens one connection to the database.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::Database`] if the server cannot be reached
    /// within `timeout` or rejects the login.
    pub async fn connect(
        settings: &PgSettings,
        table: &TableName,
        timeout: Duration,
    ) -> Result<Self, LoadgenError> {
        tracing::info!(
            host = %settings.host,
            port = settings.port,
            database = %settings.database,
            user = %settings.user,
            %table,
            time_zone = %settings.time_zone,
            "connecting to postgres"
        );
        let options = settings.connect_options();
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(timeout)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool,
            statements: Statements::for_table(table),
        })
    }

    /// SQL in use.
    #[must_use]
    pub fn statements(&self) -> &Statements {
        &self.statements
    }

    /// Closes the connection.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("postgres connection closed");
    }
}

impl TestDataStore for PgStore {
    async fn insert_row(&self, row: &NewRow) -> Result<(), LoadgenError> {
        sqlx::query(&self.statements.insert)
            .bind(row.created)
            .bind(row.updated)
            .bind(row.initial_value)
            .bind(row.current_value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn least_recently_updated(&self, limit: u32) -> Result<Vec<TestRow>, LoadgenError> {
        let rows = sqlx::query_as::<_, (i64, i64)>(&self.statements.select_oldest)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, current_value)| TestRow { id, current_value })
            .collect())
    }

    async fn touch_row(
        &self,
        id: i64,
        updated: DateTime<FixedOffset>,
        current_value: i64,
    ) -> Result<(), LoadgenError> {
        sqlx::query(&self.statements.touch)
            .bind(updated)
            .bind(current_value)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
