//! Calendar-day partition key

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One calendar date worth of records, rendered as `YYYY-MM-DD`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayBucket(NaiveDate);

impl DayBucket {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Today's bucket in UTC
    pub fn today() -> Self {
        Self(chrono::Utc::now().date_naive())
    }
}

impl fmt::Display for DayBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl FromStr for DayBucket {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, DATE_FORMAT).map(Self)
    }
}

impl TryFrom<String> for DayBucket {
    type Error = chrono::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DayBucket> for String {
    fn from(value: DayBucket) -> Self {
        value.to_string()
    }
}

impl From<NaiveDate> for DayBucket {
    fn from(value: NaiveDate) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_iso_date() {
        let bucket = DayBucket::from_ymd(2023, 5, 1).unwrap();
        assert_eq!(bucket.to_string(), "2023-05-01");
    }

    #[test]
    fn test_parse() {
        let bucket: DayBucket = "2023-12-31".parse().unwrap();
        assert_eq!(bucket, DayBucket::from_ymd(2023, 12, 31).unwrap());
        assert!("2023-13-01".parse::<DayBucket>().is_err());
        assert!("yesterday".parse::<DayBucket>().is_err());
    }

    #[test]
    fn test_ordering_follows_calendar() {
        let a = DayBucket::from_ymd(2023, 1, 31).unwrap();
        let b = DayBucket::from_ymd(2023, 2, 1).unwrap();
        assert!(a < b);
    }
}
