//! `pg-update`: repeatedly bump the least recently updated rows.
//!
//! Each pass selects the `rows_per_pass` oldest rows by `updated, id` and
//! increments their `current_value` once, stamping `updated` with the
//! current time. A row is touched at most once per pass.

use chrono::FixedOffset;

use super::now_in;
use super::store::TestDataStore;
use crate::error::LoadgenError;
use crate::pacing::Pace;

/// How many passes to run and how many rows each pass touches.
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    /// Number of passes.
    pub passes: u64,
    /// Rows touched per pass.
    pub rows_per_pass: u32,
    /// Delay after each pass.
    pub pace: Pace,
    /// Suppress per-statement logging.
    pub silent: bool,
    /// Offset for `updated`.
    pub offset: FixedOffset,
}

/// Totals for an update run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Passes completed.
    pub passes: u64,
    /// Row updates issued across all passes.
    pub rows_touched: u64,
}

/// Runs every pass of `plan`.
///
/// # Errors
///
/// Returns the first database error.
pub async fn run<S: TestDataStore>(
    store: &S,
    select_statement: &str,
    plan: &UpdatePlan,
) -> Result<UpdateReport, LoadgenError> {
    let mut report = UpdateReport::default();
    for pass in 1..=plan.passes {
        if !plan.silent {
            tracing::info!(pass, limit = plan.rows_per_pass, "{select_statement}");
        }
        let rows = store.least_recently_updated(plan.rows_per_pass).await?;
        let now = now_in(plan.offset);
        for row in rows {
            let next = row.current_value.saturating_add(1);
            if !plan.silent {
                tracing::info!(id = row.id, current_value = next, updated = %now, "update row");
            }
            store.touch_row(row.id, now, next).await?;
            report.rows_touched = report.rows_touched.saturating_add(1);
        }
        report.passes = pass;
        plan.pace.wait().await;
    }
    tracing::info!(
        passes = report.passes,
        rows = report.rows_touched,
        "update run complete"
    );
    Ok(report)
}
