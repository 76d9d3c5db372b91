//! `pg-insert`: append numbered rows at a fixed pace.

use chrono::FixedOffset;

use super::models::NewRow;
use super::now_in;
use super::store::TestDataStore;
use crate::error::LoadgenError;
use crate::pacing::Pace;

/// How many rows to insert and how fast.
#[derive(Debug, Clone)]
pub struct InsertPlan {
    /// Rows to insert.
    pub count: u64,
    /// Delay after each insert.
    pub pace: Pace,
    /// Suppress per-row logging.
    pub silent: bool,
    /// Offset for `created` and `updated`.
    pub offset: FixedOffset,
}

/// Inserts rows `1..=plan.count`, returning how many were written.
///
/// # Errors
///
/// Returns the first database error; rows already inserted stay.
pub async fn run<S: TestDataStore>(
    store: &S,
    statement: &str,
    plan: &InsertPlan,
) -> Result<u64, LoadgenError> {
    for i in 1..=plan.count {
        let value = i64::try_from(i)
            .map_err(|_| LoadgenError::InvalidArgument(format!("row number {i} exceeds i64")))?;
        let row = NewRow::numbered(value, now_in(plan.offset));
        if !plan.silent {
            tracing::info!(values = %serde_json::to_string(&row)?, "{statement}");
        }
        store.insert_row(&row).await?;
        plan.pace.wait().await;
    }
    tracing::info!(inserted = plan.count, "insert run complete");
    Ok(plan.count)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::{DateTime, FixedOffset};

    use super::super::models::TestRow;
    use super::*;

    #[derive(Debug, Default)]
    struct RecordingStore {
        rows: Mutex<Vec<NewRow>>,
    }

    impl TestDataStore for RecordingStore {
        async fn insert_row(&self, row: &NewRow) -> Result<(), LoadgenError> {
            if let Ok(mut rows) = self.rows.lock() {
                rows.push(row.clone());
            }
            Ok(())
        }

        async fn least_recently_updated(&self, _limit: u32) -> Result<Vec<TestRow>, LoadgenError> {
            Ok(Vec::new())
        }

        async fn touch_row(
            &self,
            _id: i64,
            _updated: DateTime<FixedOffset>,
            _current_value: i64,
        ) -> Result<(), LoadgenError> {
            Ok(())
        }
    }

    fn plan(count: u64, delay: Duration) -> InsertPlan {
        let Some(offset) = FixedOffset::east_opt(8 * 3600) else {
            panic!("offset");
        };
        InsertPlan {
            count,
            pace: Pace::new(delay),
            silent: false,
            offset,
        }
    }

    #[tokio::test]
    async fn inserts_numbered_rows() {
        let store = RecordingStore::default();
        let result = run(&store, "INSERT", &plan(3, Duration::ZERO)).await;
        assert!(matches!(result, Ok(3)));

        let Ok(rows) = store.rows.lock() else {
            panic!("poisoned");
        };
        let values: Vec<(i64, i64)> = rows
            .iter()
            .map(|r| (r.initial_value, r.current_value))
            .collect();
        assert_eq!(values, vec![(1, 1), (2, 2), (3, 3)]);
        assert!(rows.iter().all(|r| r.created == r.updated));
        assert!(rows.iter().all(|r| r.created.offset().local_minus_utc() == 8 * 3600));
    }

    #[tokio::test(start_paused = true)]
    async fn inserts_are_paced() {
        let store = RecordingStore::default();
        let started = tokio::time::Instant::now();
        let result = run(&store, "INSERT", &plan(4, Duration::from_millis(500))).await;
        assert!(result.is_ok());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2010));
    }
}
