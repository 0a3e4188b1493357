//! Shared fixtures for unit tests.
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};

use crate::models::Show;
use crate::provider::GuideProvider;

/// 2024-03-01 at `hour:minute`.
pub fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// Show on station `ZDF` with a known duration.
pub fn show(title: &str, hour: u32, minute: u32, duration: u32) -> Show {
    Show::new("ZDF", title, at(hour, minute)).with_duration(duration)
}

/// Provider that replays pre-configured listing results in order.
///
/// Once the queue is drained the last successful listing is repeated.
pub struct MockProvider {
    results: Mutex<VecDeque<Result<Vec<Show>>>>,
    last: Mutex<Vec<Show>>,
    pub list_calls: AtomicU32,
    pub describe_calls: AtomicU32,
    pub fail_describe: bool,
    pub first_describe_delay: Option<Duration>,
}

impl MockProvider {
    pub fn new(results: Vec<Result<Vec<Show>>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            last: Mutex::new(Vec::new()),
            list_calls: AtomicU32::new(0),
            describe_calls: AtomicU32::new(0),
            fail_describe: false,
            first_describe_delay: None,
        }
    }

    pub fn with_guide(shows: Vec<Show>) -> Self {
        Self::new(vec![Ok(shows)])
    }

    pub fn failing_describe(mut self) -> Self {
        self.fail_describe = true;
        self
    }

    /// Makes the first description fetch hang for `delay`.
    pub const fn slow_first_describe(mut self, delay: Duration) -> Self {
        self.first_describe_delay = Some(delay);
        self
    }

    pub fn list_count(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl GuideProvider for MockProvider {
    fn name(&self) -> &str {
        "Mock EPG"
    }

    async fn list_shows(&self, _station: &str) -> Result<Vec<Show>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.results.lock().unwrap().pop_front();
        match next {
            Some(Ok(shows)) => {
                self.last.lock().unwrap().clone_from(&shows);
                Ok(shows)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }

    async fn list_stations(&self) -> Result<Vec<String>> {
        Ok(vec![String::from("ZDF")])
    }

    async fn describe_show(&self, show: &Show) -> Result<String> {
        let previous = self.describe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.first_describe_delay
            && previous == 0
        {
            tokio::time::sleep(delay).await;
        }
        if self.fail_describe {
            return Err(anyhow!("description unavailable"));
        }
        Ok(format!("**{}**", show.title))
    }

    fn link_for(&self, show: &Show) -> String {
        format!("https://example.invalid/{}", show.title)
    }
}
