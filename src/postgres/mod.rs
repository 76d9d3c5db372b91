//! PostgreSQL test data generator.
//!
//! `pg-insert` appends rows to a test table and `pg-update` keeps touching
//! the least recently updated rows. Both talk to the database through the
//! [`TestDataStore`] trait; [`PgStore`] is the `sqlx` implementation.

pub mod insert;
pub mod models;
pub mod store;
pub mod update;

use chrono::{DateTime, FixedOffset, Utc};

use crate::error::LoadgenError;

pub use models::{NewRow, TableName, TestRow};
pub use store::{PgSettings, PgStore, TestDataStore};

/// Default offset for generated timestamps (Australia/Perth, UTC+8).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 8;

/// Builds the timestamp offset from whole hours.
///
/// # Errors
///
/// Returns [`LoadgenError::InvalidArgument`] outside -23..=23.
pub fn utc_offset(hours: i32) -> Result<FixedOffset, LoadgenError> {
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            LoadgenError::InvalidArgument(format!("utc offset {hours}h is out of range"))
        })
}

/// Server `TimeZone` equivalent to `offset`, in POSIX form.
///
/// POSIX offsets count hours west of Greenwich, so UTC+8 is `<+08>-08`.
/// Timestamps bound as `timestamptz` are then stored as wall-clock time in
/// `offset` when the column is a plain `timestamp`.
#[must_use]
pub fn session_time_zone(offset: FixedOffset) -> String {
    let east = offset.local_minus_utc();
    let (iso_sign, posix_sign) = if east < 0 { ('-', '+') } else { ('+', '-') };
    let minutes = east.unsigned_abs() / 60;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if minutes == 0 {
        format!("<{iso_sign}{hours:02}>{posix_sign}{hours:02}")
    } else {
        format!("<{iso_sign}{hours:02}{minutes:02}>{posix_sign}{hours:02}:{minutes:02}")
    }
}

/// Current time in `offset`.
#[must_use]
pub fn now_in(offset: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn perth_offset_is_eight_hours() {
        let Ok(offset) = utc_offset(DEFAULT_UTC_OFFSET_HOURS) else {
            panic!("offset");
        };
        assert_eq!(offset.local_minus_utc(), 8 * 3600);
        assert_eq!(now_in(offset).offset().local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn session_time_zone_inverts_sign_for_posix() {
        let zone = |hours| {
            let Ok(offset) = utc_offset(hours) else {
                panic!("offset {hours}");
            };
            session_time_zone(offset)
        };
        assert_eq!(zone(8), "<+08>-08");
        assert_eq!(zone(-3), "<-03>+03");
        assert_eq!(zone(0), "<+00>-00");
        let Some(india) = FixedOffset::east_opt(5 * 3600 + 30 * 60) else {
            panic!("offset");
        };
        assert_eq!(session_time_zone(india), "<+0530>-05:30");
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        assert!(matches!(utc_offset(30), Err(LoadgenError::InvalidArgument(_))));
        assert!(utc_offset(-5).is_ok());
    }
}
