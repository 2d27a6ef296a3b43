//! Temporal search range

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use super::{SearchError, SearchResult};

/// `(from, to)` bounds of a temporal constraint, as ISO-8601 date-times
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemporalRange {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl TemporalRange {
    pub fn new(from: Option<String>, to: Option<String>) -> SearchResult<Self> {
        let mut range = Self::default();
        if let Some(from) = from {
            range.set_from(from)?;
        }
        if let Some(to) = to {
            range.set_to(to)?;
        }
        Ok(range)
    }

    pub fn set_from(&mut self, value: impl Into<String>) -> SearchResult<()> {
        self.from = Some(validate_timestamp(value.into())?);
        Ok(())
    }

    pub fn set_to(&mut self, value: impl Into<String>) -> SearchResult<()> {
        self.to = Some(validate_timestamp(value.into())?);
        Ok(())
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// Render a date-time the way the search service expects it
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Accepts RFC 3339 date-times as given. Offset-less date-times, the basic
/// `YYYYMMDDThhmmssZ` form and bare dates are read as UTC and rendered with a
/// `Z` suffix.
fn validate_timestamp(value: String) -> SearchResult<String> {
    let trimmed = value.trim();
    if DateTime::parse_from_rfc3339(trimmed).is_ok() {
        return Ok(trimmed.to_string());
    }
    for layout in ["%Y-%m-%dT%H:%M:%S%.f", "%Y%m%dT%H%M%SZ"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, layout) {
            return Ok(format_timestamp(naive.and_utc()));
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(format_timestamp(midnight.and_utc()));
    }
    Err(SearchError::config(format!(
        "Invalid timestamp '{}': expected an ISO-8601 date-time such as 2000-01-01T00:00:00Z",
        value
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_accepts_iso_timestamps() {
        let range = TemporalRange::new(
            Some("2100-12-30T23:23:59Z".to_string()),
            Some("2200-01-01T00:00:00Z".to_string()),
        )
        .unwrap();
        assert_eq!(range.from.as_deref(), Some("2100-12-30T23:23:59Z"));
        assert!(!range.is_unbounded());
    }

    #[test]
    fn test_offsetless_timestamps_read_as_utc() {
        let range = TemporalRange::new(
            Some("2000-01-01T00:00:00".to_string()),
            Some("2005-12-31".to_string()),
        )
        .unwrap();
        assert_eq!(range.from.as_deref(), Some("2000-01-01T00:00:00Z"));
        assert_eq!(range.to.as_deref(), Some("2005-12-31T00:00:00Z"));

        let mut range = TemporalRange::default();
        range.set_to("20000101T123000Z").unwrap();
        assert_eq!(range.to.as_deref(), Some("2000-01-01T12:30:00Z"));
    }

    #[test]
    fn test_explicit_offset_kept() {
        let mut range = TemporalRange::default();
        range.set_from("2000-01-01T00:00:00+02:00").unwrap();
        assert_eq!(range.from.as_deref(), Some("2000-01-01T00:00:00+02:00"));
    }

    #[test]
    fn test_rejects_garbage() {
        let mut range = TemporalRange::default();
        assert!(range.set_to("next tuesday").unwrap_err().is_config());
        assert!(range.set_to("2000-13-01").unwrap_err().is_config());
        assert!(range.set_from("2000-01-01T25:00:00").unwrap_err().is_config());
        assert!(range.is_unbounded());
    }

    #[test]
    fn test_format_timestamp() {
        let dt = Utc.with_ymd_and_hms(1960, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_timestamp(dt), "1960-01-01T00:00:00Z");
    }
}
