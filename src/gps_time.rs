//! GPS week / time-of-week to UTC conversion.
//!
//! The GPS time scale starts at 1980-01-06T00:00:00Z. Stored timestamps
//! ignore leap seconds; callers that need the receiver's UTC offset pass it
//! explicitly.

use chrono::{DateTime, Duration, Utc};

/// Unix time of the GPS epoch, 1980-01-06T00:00:00Z.
pub const GPS_EPOCH_UNIX: i64 = 315_964_800;

pub const SECONDS_PER_WEEK: i64 = 7 * 24 * 3600;

// ---

pub fn gps_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(GPS_EPOCH_UNIX)
}

/// Convert a GPS week number and seconds into the week to an instant.
///
/// `leap_seconds` is added to the elapsed GPS time. Physically UTC lags GPS
/// time, so a true GPS to UTC conversion subtracts the offset; the addition
/// reproduces the reference value the archive tooling was checked against,
/// `(1811, 164196.732, 16)` giving 2014-09-22T21:36:52.732Z. Sub-millisecond
/// precision is dropped. Returns `None` when the instant is out of range.
pub fn weeks_seconds_to_utc(week: i64, seconds: f64, leap_seconds: i64) -> Option<DateTime<Utc>> {
    // ---
    if !seconds.is_finite() {
        return None;
    }
    let millis = (seconds * 1000.0).round() as i64;
    gps_epoch()
        .checked_add_signed(Duration::try_weeks(week)?)?
        .checked_add_signed(Duration::try_milliseconds(millis)?)?
        .checked_add_signed(Duration::try_seconds(leap_seconds)?)
}

/// Unix timestamp (whole seconds, leap seconds ignored) for one record.
///
/// Returns `None` when either input is absent, so a single `nan` week only
/// blanks that row's timestamp. A week or time of week too large for the
/// timestamp range blanks it the same way.
pub fn gps_timestamp(week: Option<i64>, time_of_week: Option<f64>) -> Option<i64> {
    // ---
    let week = week?;
    let tow = time_of_week.filter(|t| t.is_finite())?;
    week.checked_mul(SECONDS_PER_WEEK)?
        .checked_add(GPS_EPOCH_UNIX)?
        .checked_add(tow.floor() as i64)
}
