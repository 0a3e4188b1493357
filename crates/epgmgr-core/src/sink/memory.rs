//! `MemorySink` - process local sink that records every write.

use std::collections::{BTreeMap, HashSet};

use anyhow::{Result, bail};
use tokio::sync::Mutex;

use super::{Availability, CreationOptions, EntryId, SensorSink};
use crate::models::ShowAttributes;

/// One recorded sink call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOp {
    /// Entry was created.
    Create(EntryId),
    /// Attribute set was replaced.
    SetAttributes(EntryId),
    /// Primary value was written.
    SetValue(EntryId, String),
    /// Availability was written.
    SetAvailability(EntryId, Availability),
    /// Entry was removed (recorded even if it did not exist).
    Remove(EntryId),
}

/// Stored state of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    /// Options the entry was created with.
    pub options: CreationOptions,
    /// Primary value.
    pub value: Option<String>,
    /// Last attribute set.
    pub attributes: Option<ShowAttributes>,
    /// Last availability.
    pub availability: Option<Availability>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<EntryId, MemoryEntry>,
    ops: Vec<SinkOp>,
    failing: HashSet<&'static str>,
}

/// Sink keeping entries in memory.
///
/// Used by `--dry-run` and by tests, which can inspect the recorded
/// operations and inject failures per operation name.
#[derive(Debug, Default)]
#[allow(clippy::module_name_repetitions)]
pub struct MemorySink {
    inner: Mutex<Inner>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call of `operation` fail until [`Self::recover`].
    ///
    /// Operation names: `ensure_exists`, `set_attributes`, `set_value`,
    /// `set_availability`, `remove`.
    pub async fn fail(&self, operation: &'static str) {
        self.inner.lock().await.failing.insert(operation);
    }

    /// Clears all injected failures.
    pub async fn recover(&self) {
        self.inner.lock().await.failing.clear();
    }

    /// Recorded operations so far.
    pub async fn ops(&self) -> Vec<SinkOp> {
        self.inner.lock().await.ops.clone()
    }

    /// Forgets recorded operations.
    pub async fn clear_ops(&self) {
        self.inner.lock().await.ops.clear();
    }

    /// Stored state of an entry.
    pub async fn entry(&self, entry: &EntryId) -> Option<MemoryEntry> {
        self.inner.lock().await.entries.get(entry).cloned()
    }

    fn check(inner: &Inner, operation: &'static str, entry: &EntryId) -> Result<()> {
        if inner.failing.contains(operation) {
            bail!("{operation} rejected for {entry}");
        }
        Ok(())
    }
}

impl SensorSink for MemorySink {
    async fn ensure_exists(&self, entry: &EntryId, options: &CreationOptions) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::check(&inner, "ensure_exists", entry)?;
        if inner.entries.contains_key(entry) {
            return Ok(());
        }
        inner.entries.insert(
            entry.clone(),
            MemoryEntry {
                options: options.clone(),
                value: None,
                attributes: None,
                availability: None,
            },
        );
        inner.ops.push(SinkOp::Create(entry.clone()));
        tracing::debug!(%entry, "Sensor created");
        Ok(())
    }

    async fn set_attributes(&self, entry: &EntryId, attributes: &ShowAttributes) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::check(&inner, "set_attributes", entry)?;
        let Some(stored) = inner.entries.get_mut(entry) else {
            bail!("{entry} does not exist");
        };
        stored.attributes = Some(attributes.clone());
        inner.ops.push(SinkOp::SetAttributes(entry.clone()));
        tracing::info!(
            %entry,
            title = %attributes.title,
            begin_time = %attributes.begin_time,
            upcoming = %attributes.upcoming,
            "Sensor attributes updated"
        );
        Ok(())
    }

    async fn set_value(&self, entry: &EntryId, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::check(&inner, "set_value", entry)?;
        let Some(stored) = inner.entries.get_mut(entry) else {
            bail!("{entry} does not exist");
        };
        stored.value = Some(String::from(value));
        inner
            .ops
            .push(SinkOp::SetValue(entry.clone(), String::from(value)));
        tracing::debug!(%entry, value, "Sensor value updated");
        Ok(())
    }

    async fn set_availability(&self, entry: &EntryId, availability: Availability) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::check(&inner, "set_availability", entry)?;
        let Some(stored) = inner.entries.get_mut(entry) else {
            bail!("{entry} does not exist");
        };
        stored.availability = Some(availability);
        inner
            .ops
            .push(SinkOp::SetAvailability(entry.clone(), availability));
        Ok(())
    }

    async fn remove(&self, entry: &EntryId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::check(&inner, "remove", entry)?;
        inner.entries.remove(entry);
        inner.ops.push(SinkOp::Remove(entry.clone()));
        Ok(())
    }

    async fn current_value(&self, entry: &EntryId) -> Result<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.entries.get(entry).and_then(|e| e.value.clone()))
    }

    async fn list_entries(&self, prefix: &str) -> Result<Vec<EntryId>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .entries
            .keys()
            .filter(|id| id.as_str().starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn entry() -> EntryId {
        EntryId::for_station("epg", "Mock", "ZDF")
    }

    #[tokio::test]
    async fn test_ensure_exists_is_idempotent() {
        // Arrange
        let sink = MemorySink::new();
        let options = CreationOptions::percentage("ZDF");

        // Act
        sink.ensure_exists(&entry(), &options).await.unwrap();
        sink.ensure_exists(&entry(), &options).await.unwrap();

        // Assert
        assert_eq!(sink.ops().await, vec![SinkOp::Create(entry())]);
    }

    #[tokio::test]
    async fn test_write_to_missing_entry_fails() {
        // Arrange
        let sink = MemorySink::new();

        // Act
        let result = sink.set_value(&entry(), "10").await;

        // Assert
        assert!(result.is_err());
        assert!(sink.ops().await.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure_and_recover() {
        // Arrange
        let sink = MemorySink::new();
        sink.ensure_exists(&entry(), &CreationOptions::percentage("ZDF"))
            .await
            .unwrap();
        sink.fail("set_value").await;

        // Act
        let failed = sink.set_value(&entry(), "10").await;
        sink.recover().await;
        let recovered = sink.set_value(&entry(), "11").await;

        // Assert
        assert!(failed.is_err());
        assert!(recovered.is_ok());
        assert_eq!(
            sink.current_value(&entry()).await.unwrap().as_deref(),
            Some("11")
        );
    }

    #[tokio::test]
    async fn test_list_entries_by_prefix() {
        // Arrange
        let sink = MemorySink::new();
        let options = CreationOptions::percentage("x");
        let other = EntryId::for_station("other", "Mock", "ZDF");
        sink.ensure_exists(&entry(), &options).await.unwrap();
        sink.ensure_exists(&other, &options).await.unwrap();

        // Act
        let listed = sink
            .list_entries(&EntryId::prefix_pattern("epg"))
            .await
            .unwrap();

        // Assert
        assert_eq!(listed, vec![entry()]);
    }

    #[tokio::test]
    async fn test_remove_missing_entry_is_ok() {
        // Arrange
        let sink = MemorySink::new();

        // Act
        let result = sink.remove(&entry()).await;

        // Assert
        assert!(result.is_ok());
        assert!(sink.entry(&entry()).await.is_none());
    }
}
