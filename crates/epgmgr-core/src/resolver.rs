//! Current / upcoming show lookups over a guide snapshot.

use chrono::NaiveDateTime;

use crate::models::Show;

/// Returns the show on air at `now`.
///
/// Picks the latest start that is not after `now`. Among shows sharing
/// that start the first one in guide order wins.
#[must_use]
pub fn current_show(guide: &[Show], now: NaiveDateTime) -> Option<&Show> {
    guide
        .iter()
        .filter(|s| s.start <= now)
        .fold(None, |best: Option<&Show>, show| match best {
            Some(b) if b.start >= show.start => Some(b),
            _ => Some(show),
        })
}

/// Returns the next show starting strictly after `now`.
#[must_use]
pub fn upcoming_show(guide: &[Show], now: NaiveDateTime) -> Option<&Show> {
    guide
        .iter()
        .filter(|s| s.start > now)
        .min_by_key(|s| s.start)
}
