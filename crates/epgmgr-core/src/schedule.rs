//! Refresh time parsing and per-station trigger scheduling.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime};
use regex::Regex;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use crate::error::EpgError;
use crate::provider::GuideProvider;
use crate::sink::SensorSink;
use crate::station::{StationGuide, StationHandle, Trigger, enqueue};

/// Poll interval used when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Refresh times used when a provider configures none.
pub const DEFAULT_REFRESH_TIMES: &[&str] = &["06:30"];

/// Pending triggers per station before new ones are dropped.
const TRIGGER_QUEUE_DEPTH: usize = 4;

/// Accepts `9:30`, `09:30`, `9:30:00` and `09:30:00`.
#[allow(clippy::expect_used)]
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-1]?[0-9]|2[0-3]):([0-5][0-9])(?::([0-5][0-9]))?$")
        .expect("failed to compile refresh time regex")
});

/// Validated daily refresh time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTime(NaiveTime);

impl RefreshTime {
    /// Parses an `H:MM[:SS]` string.
    ///
    /// Without seconds, `(station_index * 2) mod 60` is used so stations
    /// sharing the same time do not all refresh in the same second.
    ///
    /// # Errors
    ///
    /// Returns [`EpgError::InvalidScheduleTime`] if `raw` is not a valid
    /// 24-hour time with two-digit minutes.
    pub fn parse(raw: &str, station_index: usize) -> Result<Self, EpgError> {
        let invalid = || EpgError::InvalidScheduleTime(String::from(raw));
        let caps = TIME_RE.captures(raw.trim()).ok_or_else(invalid)?;

        let field = |i: usize| -> Option<u32> { caps.get(i)?.as_str().parse().ok() };
        let hour = field(1).ok_or_else(invalid)?;
        let minute = field(2).ok_or_else(invalid)?;
        let second = match caps.get(3) {
            Some(_) => field(3).ok_or_else(invalid)?,
            None => jitter_seconds(station_index),
        };

        NaiveTime::from_hms_opt(hour, minute, second)
            .map(Self)
            .ok_or_else(invalid)
    }

    /// Time of day.
    #[must_use]
    pub const fn time(self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for RefreshTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M:%S"))
    }
}

/// Seconds offset derived from the station index.
fn jitter_seconds(station_index: usize) -> u32 {
    let secs = station_index.wrapping_mul(2).checked_rem(60).unwrap_or(0);
    u32::try_from(secs).unwrap_or(0)
}

/// Parses every configured time, logging and skipping invalid ones.
#[must_use]
pub fn parse_refresh_times<S: AsRef<str>>(raws: &[S], station_index: usize) -> Vec<RefreshTime> {
    raws.iter()
        .filter_map(|raw| match RefreshTime::parse(raw.as_ref(), station_index) {
            Ok(time) => Some(time),
            Err(e) => {
                tracing::error!(error = %e, "Skipping guide refresh time");
                None
            }
        })
        .collect()
}

/// Next point strictly after `now` at which the wall clock shows `at`.
#[must_use]
pub fn next_occurrence(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        return today;
    }
    now.date().succ_opt().map_or(today, |d| d.and_time(at))
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Owns the daily refresh triggers and the poll trigger of one station.
#[derive(Debug, Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct ScheduleDriver {
    refresh_times: Vec<RefreshTime>,
    poll_interval: Duration,
    clock: fn() -> NaiveDateTime,
}

impl ScheduleDriver {
    /// Creates a driver with already validated refresh times.
    #[must_use]
    pub fn new(refresh_times: Vec<RefreshTime>, poll_interval: Duration) -> Self {
        Self {
            refresh_times,
            poll_interval: poll_interval.max(Duration::from_secs(1)),
            clock: local_now,
        }
    }

    /// Creates a driver from raw configured times.
    ///
    /// An empty list falls back to [`DEFAULT_REFRESH_TIMES`]. Invalid
    /// entries are logged and skipped.
    #[must_use]
    pub fn from_config<S: AsRef<str>>(
        raw_times: &[S],
        station_index: usize,
        poll_interval: Duration,
    ) -> Self {
        let times = if raw_times.is_empty() {
            parse_refresh_times(DEFAULT_REFRESH_TIMES, station_index)
        } else {
            parse_refresh_times(raw_times, station_index)
        };
        Self::new(times, poll_interval)
    }

    /// Replaces the wall clock (local time by default).
    #[must_use]
    pub const fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    /// Installed daily refresh times.
    #[must_use]
    pub fn refresh_times(&self) -> &[RefreshTime] {
        &self.refresh_times
    }

    /// Poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Starts the station.
    ///
    /// The worker performs one refresh right away and then handles queued
    /// triggers one at a time, so a refresh and a tick of the same station
    /// never overlap.
    pub fn spawn<P, S>(self, station: StationGuide<P, S>) -> StationHandle
    where
        P: GuideProvider + Send + Sync + 'static,
        S: SensorSink + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::channel(TRIGGER_QUEUE_DEPTH);
        let name = String::from(station.station());
        let entry = station.entry().clone();
        let guide = station.watch_guide();
        let clock = self.clock;

        let mut tasks = Vec::with_capacity(self.refresh_times.len().saturating_add(2));

        let span = tracing::info_span!("station", station = %name);
        tasks.push(tokio::spawn(
            async move {
                let mut station = station;
                station.handle(Trigger::Refresh, clock()).await;
                while let Some(trigger) = rx.recv().await {
                    station.handle(trigger, clock()).await;
                }
            }
            .instrument(span),
        ));

        for at in self.refresh_times {
            tracing::info!(station = %name, time = %at, "Guide refresh time installed");
            tasks.push(tokio::spawn(daily_trigger(
                tx.clone(),
                at,
                clock,
                name.clone(),
            )));
        }

        tasks.push(tokio::spawn(poll_trigger(
            tx.clone(),
            self.poll_interval,
            name.clone(),
        )));

        StationHandle::new(name, entry, tx, guide, tasks)
    }
}

/// Enqueues a refresh every day at `at`.
async fn daily_trigger(
    tx: mpsc::Sender<Trigger>,
    at: RefreshTime,
    clock: fn() -> NaiveDateTime,
    station: String,
) {
    let mut last_fired: Option<NaiveDateTime> = None;
    loop {
        let now = clock();
        let base = last_fired.map_or(now, |fired| fired.max(now));
        let next = next_occurrence(base, at.time());
        let wait = next
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        tracing::debug!(station, next = %next, "Guide refresh scheduled");

        tokio::time::sleep(wait).await;
        last_fired = Some(next);
        if !enqueue(&tx, Trigger::Refresh, &station).await {
            break;
        }
    }
}

/// Enqueues a tick every `period`, starting one period from now.
async fn poll_trigger(tx: mpsc::Sender<Trigger>, period: Duration, station: String) {
    let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if !enqueue(&tx, Trigger::Tick, &station).await {
            break;
        }
    }
}
