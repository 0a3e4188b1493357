//! Show, show identity and published attribute types.

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;

/// One broadcast interval in a station guide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Show {
    /// Station name as configured.
    pub station: String,
    /// Show title.
    pub title: String,
    /// Episode title or number.
    pub episode: Option<String>,
    /// Local start time.
    pub start: NaiveDateTime,
    /// Duration in minutes, if the provider knows it.
    pub duration_minutes: Option<u32>,
    /// Genre / category.
    pub category: Option<String>,
    /// Long description, if the listing already carried one.
    pub description: Option<String>,
    /// Detail page URL.
    pub link: Option<String>,
    /// Provider specific key used for lazy description lookups.
    pub id: Option<String>,
}

impl Show {
    /// Creates a show with only the mandatory fields set.
    #[must_use]
    pub fn new(station: impl Into<String>, title: impl Into<String>, start: NaiveDateTime) -> Self {
        Self {
            station: station.into(),
            title: title.into(),
            episode: None,
            start,
            duration_minutes: None,
            category: None,
            description: None,
            link: None,
            id: None,
        }
    }

    /// Sets the duration in minutes.
    #[must_use]
    pub const fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    /// Elapsed fraction of the show at `now` (`0.5` = half way).
    ///
    /// `None` when the duration is unknown or zero, or when `now` is
    /// before the start.
    #[must_use]
    #[allow(clippy::as_conversions, clippy::cast_precision_loss)]
    pub fn duration_in_percent(&self, now: NaiveDateTime) -> Option<f64> {
        let minutes = self.duration_minutes.filter(|m| *m > 0)?;
        let elapsed = now.signed_duration_since(self.start);
        if elapsed < TimeDelta::zero() {
            return None;
        }
        Some(elapsed.num_seconds() as f64 / (f64::from(minutes) * 60.0))
    }

    /// Elapsed percentage at `now`, truncated to an integer.
    ///
    /// Falls back to `0` whenever [`Self::duration_in_percent`] is undefined.
    /// Not clamped: a show that overruns its slot reports more than 100.
    #[must_use]
    pub fn elapsed_percent(&self, now: NaiveDateTime) -> u32 {
        let Some(minutes) = self.duration_minutes.filter(|m| *m > 0) else {
            return 0;
        };
        let elapsed_secs = now.signed_duration_since(self.start).num_seconds();
        if elapsed_secs <= 0 {
            return 0;
        }
        let total_secs = i64::from(minutes).saturating_mul(60);
        let percent = elapsed_secs
            .saturating_mul(100)
            .checked_div(total_secs)
            .unwrap_or(0);
        u32::try_from(percent).unwrap_or(u32::MAX)
    }

    /// Start time as shown on the sensor (`HH:MM`).
    #[must_use]
    pub fn begin_time(&self) -> String {
        self.start.format("%H:%M").to_string()
    }
}

/// `(title, start)` pair used for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShowIdentity {
    /// Show title.
    pub title: String,
    /// Local start time.
    pub start: NaiveDateTime,
}

impl From<&Show> for ShowIdentity {
    fn from(show: &Show) -> Self {
        Self {
            title: show.title.clone(),
            start: show.start,
        }
    }
}

/// Full attribute set written to the sink when the current show changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShowAttributes {
    /// Station name.
    pub station: String,
    /// Current show title.
    pub title: String,
    /// Episode title, if any.
    pub episode: Option<String>,
    /// Start time (`HH:MM`).
    pub begin_time: String,
    /// Duration in minutes (`0` if unknown).
    pub duration: u32,
    /// Genre / category.
    pub genre: Option<String>,
    /// Title of the next show (empty if none).
    pub upcoming: String,
    /// Provider display name.
    pub data_provider: String,
    /// Markdown description.
    pub description: String,
    /// Detail page URL.
    pub link: String,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]

    use super::*;
    use crate::test_support::at;

    #[test]
    fn test_elapsed_percent_half_way() {
        // Arrange
        let show = Show::new("ZDF", "A", at(9, 0)).with_duration(60);

        // Act & Assert
        assert_eq!(show.elapsed_percent(at(9, 30)), 50);
        assert_eq!(show.duration_in_percent(at(9, 30)), Some(0.5));
    }

    #[test]
    fn test_elapsed_percent_unknown_duration() {
        // Arrange
        let show = Show::new("ZDF", "A", at(9, 0));

        // Act & Assert
        assert_eq!(show.elapsed_percent(at(9, 30)), 0);
        assert_eq!(show.duration_in_percent(at(9, 30)), None);
    }

    #[test]
    fn test_elapsed_percent_before_start() {
        // Arrange
        let show = Show::new("ZDF", "A", at(9, 0)).with_duration(60);

        // Act & Assert
        assert_eq!(show.elapsed_percent(at(8, 45)), 0);
        assert_eq!(show.duration_in_percent(at(8, 45)), None);
    }

    #[test]
    fn test_elapsed_percent_zero_duration() {
        // Arrange
        let show = Show::new("ZDF", "A", at(9, 0)).with_duration(0);

        // Act & Assert
        assert_eq!(show.elapsed_percent(at(9, 30)), 0);
    }

    #[test]
    fn test_elapsed_percent_overrun_is_not_clamped() {
        // Arrange
        let show = Show::new("ZDF", "A", at(9, 0)).with_duration(30);

        // Act & Assert
        assert_eq!(show.elapsed_percent(at(10, 0)), 200);
    }

    #[test]
    fn test_begin_time_format() {
        // Arrange
        let show = Show::new("ZDF", "A", at(6, 5));

        // Act & Assert
        assert_eq!(show.begin_time(), "06:05");
    }

    #[test]
    fn test_identity_ignores_other_fields() {
        // Arrange
        let mut a = Show::new("ZDF", "A", at(9, 0)).with_duration(60);
        let b = Show::new("ZDF", "A", at(9, 0)).with_duration(90);
        a.category = Some(String::from("News"));

        // Act & Assert
        assert_eq!(ShowIdentity::from(&a), ShowIdentity::from(&b));
    }
}
