use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};

use super::error::FilterError;
use crate::error::ApiError;

/// Key of the extended-JSON wrapper used for stored date-times
pub const DATE_KEY: &str = "$date";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    Start,
    End,
}

/// Stored form of a date-time: `{"$date": <epoch millis>}`
pub fn date_value(at: DateTime<Utc>) -> Value {
    json!({ DATE_KEY: at.timestamp_millis() })
}

/// Epoch millis of a stored date-time value
pub fn date_millis(value: &Value) -> Option<i64> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    obj.get(DATE_KEY)?.as_i64()
}

pub fn is_date(value: &Value) -> bool {
    date_millis(value).is_some()
}

/// Parse a request date. Empty means no bound; digits are a Unix timestamp
/// (only the first ten digits count); anything else must be `YYYY-MM-DD` in
/// local time, extended to 23:59:59 for an end bound.
pub fn parse_date(raw: &str, bound: DateBound) -> Result<Option<DateTime<Utc>>, FilterError> {
    if raw.is_empty() {
        return Ok(None);
    }

    if raw.chars().all(|c| c.is_ascii_digit()) {
        let seconds: String = raw.chars().take(10).collect();
        let seconds: i64 = seconds
            .parse()
            .map_err(|_| FilterError::InvalidDate(raw.to_string()))?;
        return Utc
            .timestamp_opt(seconds, 0)
            .single()
            .map(Some)
            .ok_or_else(|| FilterError::InvalidDate(raw.to_string()));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| FilterError::InvalidDate(format!("{}: {}", raw, e)))?;
    let mut naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| FilterError::InvalidDate(raw.to_string()))?;
    if bound == DateBound::End {
        naive += Duration::hours(23) + Duration::minutes(59) + Duration::seconds(59);
    }

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .ok_or_else(|| FilterError::InvalidDate(raw.to_string()))
}

/// Seconds between two epoch timestamps given either both in seconds
/// (10 digits) or both in milliseconds (13 digits)
pub fn time_difference(start_timestamp: i64, end_timestamp: i64) -> Result<f64, ApiError> {
    let scale = match start_timestamp.to_string().len() {
        13 => 1000.0,
        10 => 1.0,
        _ => {
            return Err(ApiError::bad_request("timestamp format is irregular")
                .with_prompt(start_timestamp.to_string()))
        }
    };
    let elapsed = end_timestamp.checked_sub(start_timestamp).ok_or_else(|| {
        ApiError::bad_request("timestamp difference out of range")
            .with_prompt(format!("{} - {}", end_timestamp, start_timestamp))
    })?;
    Ok(elapsed as f64 / scale)
}
