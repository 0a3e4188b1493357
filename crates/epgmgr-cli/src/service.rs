//! Station startup, sensor cleanup and shutdown marking.

use std::sync::Arc;

use anyhow::{Context, Result};
use epgmgr_api::{AnyProvider, build_provider};
use epgmgr_core::{
    Availability, EntryId, GuideProvider, ScheduleDriver, SensorSink, StationGuide, StationHandle,
};
use futures::future::join_all;
use tracing::instrument;

use crate::config::AppConfig;

/// Builds every configured provider and starts one worker per station.
///
/// Providers are built before any station starts, so an unknown provider
/// kind aborts startup without leaving stations running. Stations are
/// numbered across all providers; the number feeds the refresh second
/// offset.
///
/// # Errors
///
/// Returns an error if a provider cannot be built.
#[instrument(skip_all)]
pub fn start_stations<S>(config: &AppConfig, sink: &Arc<S>) -> Result<Vec<StationHandle>>
where
    S: SensorSink + Send + Sync + 'static,
{
    let providers = config
        .providers
        .iter()
        .map(|settings| build_provider(settings).map(|p| (settings, Arc::new(p))))
        .collect::<Result<Vec<(_, Arc<AnyProvider>)>>>()?;

    let mut handles = Vec::new();
    let mut index: usize = 0;
    for (settings, provider) in providers {
        let refresh_times = config.refresh_times_for(settings);
        for station in &settings.stations {
            let guide = StationGuide::new(
                station.clone(),
                &config.sensor_prefix,
                Arc::clone(&provider),
                Arc::clone(sink),
            );
            tracing::info!(
                station,
                provider = provider.name(),
                entry = %guide.entry(),
                "Starting station"
            );
            let driver = ScheduleDriver::from_config(refresh_times, index, config.poll_interval());
            handles.push(driver.spawn(guide));
            index = index.saturating_add(1);
        }
    }

    if handles.is_empty() {
        tracing::warn!("No stations configured");
    }
    Ok(handles)
}

/// Removes every sink entry carrying `prefix`.
///
/// Returns the number of removed entries.
///
/// # Errors
///
/// Returns an error if the entries cannot be listed. Failed removals are
/// logged and skipped.
#[instrument(skip_all)]
pub async fn cleanup<S>(sink: &S, prefix: &str) -> Result<usize>
where
    S: SensorSink + Sync,
{
    let pattern = EntryId::prefix_pattern(prefix);
    let entries = sink
        .list_entries(&pattern)
        .await
        .context("failed to list sensors")?;

    let mut removed: usize = 0;
    for entry in &entries {
        match sink.remove(entry).await {
            Ok(()) => {
                tracing::info!(%entry, "Sensor removed");
                removed = removed.saturating_add(1);
            }
            Err(e) => tracing::warn!(%entry, error = format!("{e:#}"), "Failed to remove sensor"),
        }
    }

    tracing::info!(pattern, removed, "Sensor cleanup finished");
    Ok(removed)
}

/// Marks `entries` unavailable. Failures are logged.
#[instrument(skip_all)]
pub async fn mark_down<S>(sink: &S, entries: &[EntryId])
where
    S: SensorSink + Sync,
{
    let results = join_all(
        entries
            .iter()
            .map(|entry| sink.set_availability(entry, Availability::Down)),
    )
    .await;

    for (entry, result) in entries.iter().zip(results) {
        if let Err(e) = result {
            tracing::warn!(%entry, error = format!("{e:#}"), "Failed to mark sensor down");
        }
    }
}

/// Stops all stations and marks their sensors down.
pub async fn shutdown<S>(sink: &S, handles: Vec<StationHandle>)
where
    S: SensorSink + Sync,
{
    let entries: Vec<EntryId> = handles.iter().map(|h| h.entry().clone()).collect();
    for handle in handles {
        handle.shutdown();
    }
    mark_down(sink, &entries).await;
    tracing::info!(stations = entries.len(), "All stations stopped");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use epgmgr_api::ProviderSettings;
    use epgmgr_core::CreationOptions;
    use epgmgr_core::sink::memory::MemorySink;

    use super::*;

    fn file_provider(dir: &std::path::Path, stations: &[&str]) -> ProviderSettings {
        ProviderSettings {
            kind: String::from("json-file"),
            name: Some(String::from("Local")),
            stations: stations.iter().map(|s| String::from(*s)).collect(),
            dir: Some(dir.to_path_buf()),
            ..ProviderSettings::default()
        }
    }

    #[test]
    fn test_start_stations_rejects_unknown_kind() {
        // Arrange
        let config = AppConfig {
            providers: vec![ProviderSettings {
                kind: String::from("tvtoday"),
                stations: vec![String::from("ARD")],
                ..ProviderSettings::default()
            }],
            ..AppConfig::default()
        };
        let sink = Arc::new(MemorySink::new());

        // Act
        let result = start_stations(&config, &sink);

        // Assert
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("unknown EPG data provider 'tvtoday'")
        );
    }

    #[tokio::test]
    async fn test_start_stations_publishes_each_station() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        for station in ["ARD", "ZDF"] {
            std::fs::write(
                dir.path().join(format!("{station}.json")),
                r#"[{"title": "Dauerprogramm", "start": "2000-01-01T00:00:00"}]"#,
            )
            .unwrap();
        }
        let config = AppConfig {
            providers: vec![file_provider(dir.path(), &["ARD", "ZDF"])],
            ..AppConfig::default()
        };
        let sink = Arc::new(MemorySink::new());

        // Act
        let handles = start_stations(&config, &sink).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Assert
        assert_eq!(handles.len(), 2);
        let listed = sink.list_entries(&EntryId::prefix_pattern("epg")).await.unwrap();
        assert_eq!(listed.len(), 2);
        for handle in &handles {
            let stored = sink.entry(handle.entry()).await.unwrap();
            assert_eq!(stored.attributes.unwrap().title, "Dauerprogramm");
        }
        shutdown(&*sink, handles).await;
    }

    #[tokio::test]
    async fn test_cleanup_removes_prefixed_entries_only() {
        // Arrange
        let sink = MemorySink::new();
        let options = CreationOptions::percentage("x");
        let ours = EntryId::for_station("epg", "Local", "ARD");
        let foreign = EntryId::for_station("other", "Local", "ARD");
        sink.ensure_exists(&ours, &options).await.unwrap();
        sink.ensure_exists(&foreign, &options).await.unwrap();

        // Act
        let removed = cleanup(&sink, "epg").await.unwrap();

        // Assert
        assert_eq!(removed, 1);
        assert!(sink.entry(&ours).await.is_none());
        assert!(sink.entry(&foreign).await.is_some());
    }

    #[tokio::test]
    async fn test_mark_down_tolerates_missing_entries() {
        // Arrange
        let sink = MemorySink::new();
        let present = EntryId::for_station("epg", "Local", "ARD");
        let missing = EntryId::for_station("epg", "Local", "ZDF");
        sink.ensure_exists(&present, &CreationOptions::percentage("ARD"))
            .await
            .unwrap();

        // Act
        mark_down(&sink, &[present.clone(), missing]).await;

        // Assert
        assert_eq!(
            sink.entry(&present).await.unwrap().availability,
            Some(Availability::Down)
        );
    }
}
