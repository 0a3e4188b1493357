//! Presentation-state sink abstraction.
//!
//! A sink stores one named sensor entry per station: a primary value
//! (the elapsed percentage), an attribute set describing the current show
//! and an availability flag.

/// In-memory sink for tests and dry runs.
pub mod memory;
mod naming;

use std::fmt;

use anyhow::Result;

use crate::models::ShowAttributes;

pub use naming::{DEFAULT_SENSOR_PREFIX, to_simple};

/// Sensor entry id, e.g. `sensor.epg_hoerzu_das_erste`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(String);

impl EntryId {
    /// Entity domain all entries live in.
    pub const DOMAIN: &'static str = "sensor";

    /// Builds `sensor.<prefix>_<provider>_<station>` with each segment
    /// normalised by [`to_simple`].
    #[must_use]
    pub fn for_station(prefix: &str, provider: &str, station: &str) -> Self {
        Self(format!(
            "{}.{}_{}_{}",
            Self::DOMAIN,
            to_simple(prefix),
            to_simple(provider),
            to_simple(station)
        ))
    }

    /// Wraps an id reported by a sink verbatim.
    #[must_use]
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Common leading part of every entry created with `prefix`.
    #[must_use]
    pub fn prefix_pattern(prefix: &str) -> String {
        format!("{}.{}_", Self::DOMAIN, to_simple(prefix))
    }

    /// Raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entry availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Entry is live.
    Up,
    /// Entry is stale or the process is shutting down.
    Down,
}

impl Availability {
    /// Wire payload (`up` / `down`).
    #[must_use]
    pub const fn payload(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// Options used when an entry has to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationOptions {
    /// Keep the entry across sink restarts.
    pub persist: bool,
    /// Availability payload for [`Availability::Up`].
    pub payload_available: String,
    /// Availability payload for [`Availability::Down`].
    pub payload_not_available: String,
    /// Unit of the primary value.
    pub unit_of_measurement: Option<String>,
    /// Human readable entry name.
    pub friendly_name: Option<String>,
}

impl CreationOptions {
    /// Non persistent percentage sensor named after the station.
    #[must_use]
    pub fn percentage(friendly_name: impl Into<String>) -> Self {
        Self {
            persist: false,
            payload_available: String::from(Availability::Up.payload()),
            payload_not_available: String::from(Availability::Down.payload()),
            unit_of_measurement: Some(String::from("%")),
            friendly_name: Some(friendly_name.into()),
        }
    }
}

/// Presentation-state store the engine publishes to.
///
/// Every call returns an explicit `Result` so callers can act on write
/// failures directly. Uses `trait_variant::make` to generate a
/// `Send`-bound async trait.
#[allow(clippy::module_name_repetitions)]
#[trait_variant::make(SensorSink: Send)]
pub trait LocalSensorSink {
    /// Creates the entry unless it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be reached or rejects the entry.
    async fn ensure_exists(&self, entry: &EntryId, options: &CreationOptions) -> Result<()>;

    /// Replaces the attribute set of an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set_attributes(&self, entry: &EntryId, attributes: &ShowAttributes) -> Result<()>;

    /// Sets the primary value of an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set_value(&self, entry: &EntryId, value: &str) -> Result<()>;

    /// Marks an entry up or down.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set_availability(&self, entry: &EntryId, availability: Availability) -> Result<()>;

    /// Removes an entry. Removing a missing entry is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be reached.
    async fn remove(&self, entry: &EntryId) -> Result<()>;

    /// Current primary value, `None` if the entry does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be reached.
    async fn current_value(&self, entry: &EntryId) -> Result<Option<String>>;

    /// Lists entries whose id starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be reached.
    async fn list_entries(&self, prefix: &str) -> Result<Vec<EntryId>>;
}
