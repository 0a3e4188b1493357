//! Program guide engine for epgmgr.
//!
//! Keeps one in-memory guide per station, refreshes it from a
//! [`GuideProvider`] on fixed daily times and republishes the current
//! show to a [`SensorSink`] on every poll interval.

/// Error taxonomy.
pub mod error;
/// Guide snapshot storage.
pub mod guide_store;
/// Show and attribute models.
pub mod models;
/// Listing provider trait.
pub mod provider;
/// Current/next show attribute publication.
pub mod publish;
/// Guide refresh coordination.
pub mod refresh;
/// Time-based show resolution.
pub mod resolver;
/// Refresh time parsing and trigger scheduling.
pub mod schedule;
/// Presentation-state sink trait and helpers.
pub mod sink;
/// Per-station worker.
pub mod station;

#[cfg(test)]
mod test_support;

pub use error::EpgError;
pub use guide_store::{Guide, GuideStore};
pub use models::{Show, ShowAttributes, ShowIdentity};
pub use provider::{GuideProvider, LocalGuideProvider};
pub use publish::{PublishEngine, TickOutcome};
pub use refresh::RefreshCoordinator;
pub use resolver::{current_show, upcoming_show};
pub use schedule::{
    DEFAULT_POLL_INTERVAL, DEFAULT_REFRESH_TIMES, RefreshTime, ScheduleDriver, next_occurrence,
    parse_refresh_times,
};
pub use sink::{
    Availability, CreationOptions, DEFAULT_SENSOR_PREFIX, EntryId, LocalSensorSink, SensorSink,
    to_simple,
};
pub use station::{StationGuide, StationHandle, Trigger};
