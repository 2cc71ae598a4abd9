use crate::UrlError;
use chrono::{Local, NaiveDate};
use std::fmt;

/// A calendar day in the site's `YYYYMMDD` URL form
///
/// The key doubles as the URL path segment that dates articles and as the
/// identifier carried in the session completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(NaiveDate);

impl DayKey {
    /// Parses a `YYYYMMDD` day key
    ///
    /// # Examples
    ///
    /// ```
    /// use newsreel::url::DayKey;
    ///
    /// let day = DayKey::parse("20250305").unwrap();
    /// assert_eq!(day.to_string(), "20250305");
    /// assert!(DayKey::parse("2025-03-05").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(UrlError::InvalidDayKey(raw.to_string()));
        }

        NaiveDate::parse_from_str(raw, "%Y%m%d")
            .map(Self)
            .map_err(|_| UrlError::InvalidDayKey(raw.to_string()))
    }

    /// The current local calendar day
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The following calendar day (saturates at the end of chrono's range)
    pub fn succ(&self) -> Self {
        Self(self.0.succ_opt().unwrap_or(self.0))
    }

    /// Human-readable `DD.MM.YYYY` form used in log lines
    pub fn human(&self) -> String {
        self.0.format("%d.%m.%Y").to_string()
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y%m%d"))
    }
}
