//! Calendar-date field encoding for the persisted blob.
//!
//! Dates are written as `YYYY-MM-DD`. Older blobs stored a full RFC 3339
//! timestamp in the same field, so reading also accepts that form and keeps
//! its UTC date.

use chrono::{DateTime, NaiveDate};
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a stored date, tolerating timestamp-shaped values.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc().date());
    }
    // Timestamps without an offset still start with the date.
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, DATE_FORMAT).ok())
}

pub fn serialize<S>(value: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.format(DATE_FORMAT).to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).ok_or_else(|| D::Error::custom(format!("invalid date: {raw}")))
}

/// Same encoding for optional fields.
pub mod option {
    use super::*;

    pub fn serialize<S>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => super::serialize(date, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse_date(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid date: {raw}"))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Wrapper {
        #[serde(with = "super")]
        day: NaiveDate,
    }

    #[test]
    fn writes_plain_date() {
        let w = Wrapper {
            day: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        };
        assert_eq!(serde_json::to_string(&w).unwrap(), r#"{"day":"2024-03-09"}"#);
    }

    #[test]
    fn accepts_rfc3339_timestamp() {
        let parsed: Wrapper =
            serde_json::from_str(r#"{"day":"2024-03-09T23:30:00.000Z"}"#).expect("timestamp");
        assert_eq!(parsed.day, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
    }

    #[test]
    fn offset_timestamp_uses_utc_date() {
        let d = parse_date("2024-03-10T01:00:00+02:00").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_date("yesterday").is_none());
        assert!(serde_json::from_str::<Wrapper>(r#"{"day":"nope"}"#).is_err());
    }
}
