//! Date/time functions (§4.2 supplement, resolving the Open Question left
//! by `original_source/dbms/include/DB/Functions/FunctionsDateTime.h`):
//! `toHour`/`toMinute`/`toSecond`/`toDate`/`toStartOfDay`.
//!
//! The original resolves calendar fields through a process-global
//! `DateLUTSingleton` keyed by a timezone name baked in at server startup.
//! Per the Open Question's resolution, crucible instead threads an explicit
//! [`TimeZone`] through every call — callers that need "the session's
//! timezone" fetch one from their query context and pass it in, so the
//! functions here have no ambient global state at all.
//!
//! `Type::Date` is days since the Unix epoch (`UInt16`); `Type::DateTime`
//! is seconds since the Unix epoch (`UInt32`), both UTC-backed regardless
//! of the display timezone — exactly as the reference engine stores them.

use chrono::{DateTime, NaiveDate, NaiveTime, Offset, TimeZone as _, Timelike, Utc};
use chrono_tz::Tz;

use crucible_errors::{Code, Error, Result};

const SECONDS_PER_DAY: i64 = 86_400;

/// A resolved timezone handle, carried by the caller rather than looked up
/// from ambient global state. Construct with [`TimeZone::from_name`] (IANA
/// name, e.g. `"Europe/Berlin"`) or [`TimeZone::utc`].
#[derive(Debug, Clone, Copy)]
pub struct TimeZone(Tz);

impl TimeZone {
    pub fn utc() -> Self {
        TimeZone(Tz::UTC)
    }

    pub fn from_name(name: &str) -> Result<Self> {
        name.parse::<Tz>()
            .map(TimeZone)
            .map_err(|_| Error::user(Code::IllegalTypeOfArgument, format!("unknown timezone '{name}'")))
    }

    fn resolve(self, unix_seconds: i64) -> Result<DateTime<Tz>> {
        match self.0.timestamp_opt(unix_seconds, 0) {
            chrono::LocalResult::Single(dt) => Ok(dt),
            chrono::LocalResult::Ambiguous(dt, _) => Ok(dt),
            chrono::LocalResult::None => Err(Error::logic(
                Code::LogicalError,
                "timestamp has no representation in the given timezone",
            )),
        }
    }
}

/// `toHour(DateTime, tz)`: the local hour, `0..24`.
pub fn to_hour(unix_seconds: u32, tz: TimeZone) -> Result<u8> {
    Ok(tz.resolve(unix_seconds as i64)?.hour() as u8)
}

/// `toMinute(DateTime, tz)`: the local minute, `0..60`.
pub fn to_minute(unix_seconds: u32, tz: TimeZone) -> Result<u8> {
    Ok(tz.resolve(unix_seconds as i64)?.minute() as u8)
}

/// `toSecond(DateTime, tz)`: the local second, `0..60` (leap seconds are
/// folded into `60` by `chrono`, matching the reference behavior of
/// clamping rather than raising).
pub fn to_second(unix_seconds: u32, tz: TimeZone) -> Result<u8> {
    Ok(tz.resolve(unix_seconds as i64)?.second() as u8)
}

/// `toDate(DateTime, tz)`: days since the Unix epoch for the local
/// calendar date the timestamp falls on.
pub fn to_date(unix_seconds: u32, tz: TimeZone) -> Result<u16> {
    let local = tz.resolve(unix_seconds as i64)?;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid calendar date");
    let days = local.date_naive().signed_duration_since(epoch).num_days();
    u16::try_from(days)
        .map_err(|_| Error::user(Code::ArgumentOutOfBound, "date out of the representable u16 day range"))
}

/// `toStartOfDay(DateTime, tz)`: the Unix timestamp of local midnight on
/// the same calendar day, expressed back in UTC seconds.
pub fn to_start_of_day(unix_seconds: u32, tz: TimeZone) -> Result<u32> {
    let local = tz.resolve(unix_seconds as i64)?;
    let midnight = local
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(tz.0)
        .single()
        .ok_or_else(|| Error::logic(Code::LogicalError, "local midnight is not a single instant in this timezone"))?;
    let utc_seconds = midnight.with_timezone(&Utc).timestamp();
    u32::try_from(utc_seconds)
        .map_err(|_| Error::user(Code::ArgumentOutOfBound, "start-of-day timestamp before the Unix epoch"))
}

/// The fixed UTC offset, in seconds, a [`TimeZone`] applies at the given
/// instant (varies for zones with daylight-saving transitions).
pub fn utc_offset_seconds(unix_seconds: u32, tz: TimeZone) -> Result<i32> {
    Ok(tz.resolve(unix_seconds as i64)?.offset().fix().local_minus_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-15T13:45:30Z
    const SAMPLE: u32 = 1_710_510_330;

    #[test]
    fn utc_field_extraction() {
        let tz = TimeZone::utc();
        assert_eq!(to_hour(SAMPLE, tz).unwrap(), 13);
        assert_eq!(to_minute(SAMPLE, tz).unwrap(), 45);
        assert_eq!(to_second(SAMPLE, tz).unwrap(), 30);
    }

    #[test]
    fn to_date_counts_days_since_epoch() {
        let tz = TimeZone::utc();
        let days = to_date(SAMPLE, tz).unwrap();
        assert_eq!(days, (SAMPLE as i64 / SECONDS_PER_DAY) as u16);
    }

    #[test]
    fn to_start_of_day_is_idempotent_on_midnight() {
        let tz = TimeZone::utc();
        let start = to_start_of_day(SAMPLE, tz).unwrap();
        let start_again = to_start_of_day(start, tz).unwrap();
        assert_eq!(start, start_again);
        assert_eq!(start % SECONDS_PER_DAY as u32, 0);
    }

    #[test]
    fn non_utc_zone_shifts_the_local_hour() {
        let berlin = TimeZone::from_name("Europe/Berlin").unwrap();
        let utc_hour = to_hour(SAMPLE, TimeZone::utc()).unwrap();
        let berlin_hour = to_hour(SAMPLE, berlin).unwrap();
        assert_ne!(utc_hour, berlin_hour);
    }

    #[test]
    fn unknown_timezone_name_is_a_user_error() {
        assert!(TimeZone::from_name("Not/AZone").is_err());
    }
}
