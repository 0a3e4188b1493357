//! `PublishEngine` - pushes the current show of one station to the sink.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::instrument;

use crate::error::EpgError;
use crate::models::{Show, ShowAttributes, ShowIdentity};
use crate::provider::GuideProvider;
use crate::resolver::{current_show, upcoming_show};
use crate::sink::{Availability, CreationOptions, EntryId, SensorSink};

/// Result of one publish tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// Full attribute set written, then value and availability.
    Published {
        /// Elapsed percentage written as value.
        percent: u32,
    },
    /// Current show unchanged; only value and availability written.
    Heartbeat {
        /// Elapsed percentage written as value.
        percent: u32,
    },
    /// Guide has no show covering now; the entry was removed.
    NoCurrentShow,
    /// A sink write failed. The published identity stays unset if the
    /// failure hit the attribute write.
    Failed(EpgError),
}

/// Publishes current/upcoming shows of one station with change detection.
///
/// The full attribute set (including the lazily fetched description) is
/// only written when the `(title, start)` of the current show differs from
/// the last successful write. The elapsed percentage and availability are
/// written on every tick.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct PublishEngine<P, S> {
    provider: Arc<P>,
    sink: Arc<S>,
    station: String,
    entry: EntryId,
    published: Option<ShowIdentity>,
}

impl<P, S> PublishEngine<P, S>
where
    P: GuideProvider + Sync,
    S: SensorSink + Sync,
{
    /// Creates an engine writing to `entry`.
    #[must_use]
    pub fn new(provider: Arc<P>, sink: Arc<S>, station: impl Into<String>, entry: EntryId) -> Self {
        Self {
            provider,
            sink,
            station: station.into(),
            entry,
            published: None,
        }
    }

    /// Sink entry this engine writes to.
    #[must_use]
    pub const fn entry(&self) -> &EntryId {
        &self.entry
    }

    /// Identity of the last show successfully written.
    #[must_use]
    pub const fn published(&self) -> Option<&ShowIdentity> {
        self.published.as_ref()
    }

    /// Forgets the published identity so the next tick rewrites attributes.
    pub fn reset_published(&mut self) {
        self.published = None;
    }

    /// Resolves the show on air at `now` and updates the sink.
    #[instrument(skip_all, fields(station = %self.station))]
    pub async fn tick(&mut self, guide: &[Show], now: NaiveDateTime) -> TickOutcome {
        let current = current_show(guide, now);
        let upcoming = upcoming_show(guide, now);

        let options = CreationOptions::percentage(&self.station);
        if let Err(e) = self.sink.ensure_exists(&self.entry, &options).await {
            let err = self.sink_error("ensure_exists", e);
            tracing::error!(entry = %self.entry, error = %err, "Failed to create sensor");
            return TickOutcome::Failed(err);
        }

        let Some(current) = current else {
            tracing::error!(
                station = %self.station,
                provider = self.provider.name(),
                "Cannot find current TV show"
            );
            self.clear().await;
            return TickOutcome::NoCurrentShow;
        };

        let mut failure = None;
        let identity = ShowIdentity::from(current);
        let changed = self.published.as_ref() != Some(&identity);

        if changed {
            let attributes = self.build_attributes(current, upcoming).await;
            match self.sink.set_attributes(&self.entry, &attributes).await {
                Ok(()) => {
                    tracing::info!(
                        provider = self.provider.name(),
                        station = %self.station,
                        title = %current.title,
                        begin_time = %attributes.begin_time,
                        "TV show started"
                    );
                    self.published = Some(identity);
                }
                Err(e) => {
                    self.published = None;
                    let err = self.sink_error("set_attributes", e);
                    tracing::warn!(
                        entry = %self.entry,
                        error = %err,
                        "Setting sensor attributes failed, will retry on next tick"
                    );
                    failure = Some(err);
                }
            }
        }

        let percent = current.elapsed_percent(now);
        if let Err(e) = self.write_heartbeat(percent).await {
            tracing::warn!(entry = %self.entry, error = %e, "Sensor heartbeat failed");
            if failure.is_none() {
                failure = Some(e);
            }
        }

        tracing::debug!(
            provider = self.provider.name(),
            station = %self.station,
            title = %current.title,
            since = %current.begin_time(),
            upcoming = upcoming.map_or("-", |s| s.title.as_str()),
            progress = ?current.duration_in_percent(now),
            "Running"
        );

        match failure {
            Some(err) => TickOutcome::Failed(err),
            None if changed => TickOutcome::Published { percent },
            None => TickOutcome::Heartbeat { percent },
        }
    }

    /// Removes the sink entry, logging instead of failing.
    pub async fn clear(&self) {
        match self.sink.remove(&self.entry).await {
            Ok(()) => tracing::info!(entry = %self.entry, "Sensor removed"),
            Err(e) => {
                let err = self.sink_error("remove", e);
                tracing::warn!(entry = %self.entry, error = %err, "Removing sensor failed");
            }
        }
    }

    /// Marks the entry available and writes the elapsed percentage.
    async fn write_heartbeat(&self, percent: u32) -> Result<(), EpgError> {
        self.sink
            .set_availability(&self.entry, Availability::Up)
            .await
            .map_err(|e| self.sink_error("set_availability", e))?;
        self.sink
            .set_value(&self.entry, &percent.to_string())
            .await
            .map_err(|e| self.sink_error("set_value", e))
    }

    /// Builds the full attribute set, fetching the description.
    ///
    /// A failed description fetch publishes an empty description rather
    /// than holding back the rest of the attributes.
    async fn build_attributes(&self, current: &Show, upcoming: Option<&Show>) -> ShowAttributes {
        let description = match self.provider.describe_show(current).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    station = %self.station,
                    title = %current.title,
                    error = format!("{e:#}"),
                    "Failed to fetch show description"
                );
                String::new()
            }
        };

        ShowAttributes {
            station: self.station.clone(),
            title: current.title.clone(),
            episode: current.episode.clone(),
            begin_time: current.begin_time(),
            duration: current.duration_minutes.unwrap_or(0),
            genre: current.category.clone(),
            upcoming: upcoming.map(|s| s.title.clone()).unwrap_or_default(),
            data_provider: String::from(self.provider.name()),
            description,
            link: self.provider.link_for(current),
        }
    }

    fn sink_error(&self, operation: &'static str, source: anyhow::Error) -> EpgError {
        EpgError::SinkWrite {
            entry: self.entry.to_string(),
            operation,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use tracing::Level;
    use tracing_mock::{expect, subscriber};

    use super::*;
    use crate::sink::memory::{MemorySink, SinkOp};
    use crate::test_support::{MockProvider, at, show};

    fn engine(
        provider: MockProvider,
    ) -> (PublishEngine<MockProvider, MemorySink>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let entry = EntryId::for_station("epg", provider.name(), "ZDF");
        let engine = PublishEngine::new(Arc::new(provider), Arc::clone(&sink), "ZDF", entry);
        (engine, sink)
    }

    fn count_attribute_writes(ops: &[SinkOp]) -> usize {
        ops.iter()
            .filter(|op| matches!(op, SinkOp::SetAttributes(_)))
            .count()
    }

    fn count_value_writes(ops: &[SinkOp]) -> usize {
        ops.iter()
            .filter(|op| matches!(op, SinkOp::SetValue(..)))
            .count()
    }

    #[tokio::test]
    async fn test_tick_publishes_full_attributes() {
        // Arrange
        let guide = vec![show("A", 9, 0, 60), show("B", 10, 0, 60)];
        let (mut engine, sink) = engine(MockProvider::with_guide(vec![]));

        // Act
        let outcome = engine.tick(&guide, at(9, 30)).await;

        // Assert
        assert!(matches!(outcome, TickOutcome::Published { percent: 50 }));
        let stored = sink.entry(engine.entry()).await.unwrap();
        let attrs = stored.attributes.unwrap();
        assert_eq!(attrs.station, "ZDF");
        assert_eq!(attrs.title, "A");
        assert_eq!(attrs.begin_time, "09:00");
        assert_eq!(attrs.duration, 60);
        assert_eq!(attrs.upcoming, "B");
        assert_eq!(attrs.data_provider, "Mock EPG");
        assert_eq!(attrs.description, "**A**");
        assert_eq!(attrs.link, "https://example.invalid/A");
        assert_eq!(stored.value.as_deref(), Some("50"));
        assert_eq!(stored.availability, Some(Availability::Up));
        assert_eq!(stored.options.unit_of_measurement.as_deref(), Some("%"));
    }

    #[tokio::test]
    async fn test_unchanged_show_only_heartbeats() {
        // Arrange
        let guide = vec![show("A", 9, 0, 60), show("B", 10, 0, 60)];
        let (mut engine, sink) = engine(MockProvider::with_guide(vec![]));

        // Act
        engine.tick(&guide, at(9, 30)).await;
        let second = engine.tick(&guide, at(9, 45)).await;

        // Assert
        assert!(matches!(second, TickOutcome::Heartbeat { percent: 75 }));
        let ops = sink.ops().await;
        assert_eq!(count_attribute_writes(&ops), 1);
        assert_eq!(count_value_writes(&ops), 2);
        let availability_writes = ops
            .iter()
            .filter(|op| matches!(op, SinkOp::SetAvailability(_, Availability::Up)))
            .count();
        assert_eq!(availability_writes, 2);
    }

    #[tokio::test]
    async fn test_show_change_republishes() {
        // Arrange
        let guide = vec![show("A", 9, 0, 60), show("B", 10, 0, 60)];
        let (mut engine, sink) = engine(MockProvider::with_guide(vec![]));

        // Act
        engine.tick(&guide, at(9, 59)).await;
        let outcome = engine.tick(&guide, at(10, 1)).await;

        // Assert
        assert!(matches!(outcome, TickOutcome::Published { percent: 1 }));
        let attrs = sink.entry(engine.entry()).await.unwrap().attributes.unwrap();
        assert_eq!(attrs.title, "B");
        assert_eq!(attrs.upcoming, "");
        assert_eq!(count_attribute_writes(&sink.ops().await), 2);
    }

    #[tokio::test]
    async fn test_reset_published_forces_rewrite() {
        // Arrange
        let guide = vec![show("A", 9, 0, 60)];
        let (mut engine, sink) = engine(MockProvider::with_guide(vec![]));
        engine.tick(&guide, at(9, 10)).await;

        // Act
        engine.reset_published();
        let outcome = engine.tick(&guide, at(9, 20)).await;

        // Assert
        assert!(matches!(outcome, TickOutcome::Published { .. }));
        assert_eq!(count_attribute_writes(&sink.ops().await), 2);
    }

    #[tokio::test]
    async fn test_empty_guide_clears_entry() {
        // Arrange
        let (mut engine, sink) = engine(MockProvider::with_guide(vec![]));
        let (subscriber, handle) = subscriber::mock()
            .with_filter(|meta| *meta.level() == Level::ERROR)
            .event(
                expect::event()
                    .at_level(Level::ERROR)
                    .with_fields(expect::msg("Cannot find current TV show")),
            )
            .only()
            .run_with_handle();
        let guard = tracing::subscriber::set_default(subscriber);

        // Act
        let outcome = engine.tick(&[], at(9, 0)).await;
        drop(guard);

        // Assert
        handle.assert_finished();
        assert!(matches!(outcome, TickOutcome::NoCurrentShow));
        let ops = sink.ops().await;
        assert_eq!(count_attribute_writes(&ops), 0);
        assert_eq!(count_value_writes(&ops), 0);
        assert_eq!(ops.last(), Some(&SinkOp::Remove(engine.entry().clone())));
        assert!(sink.entry(engine.entry()).await.is_none());
    }

    #[tokio::test]
    async fn test_attribute_failure_retries_next_tick() {
        // Arrange
        let guide = vec![show("A", 9, 0, 60)];
        let (mut engine, sink) = engine(MockProvider::with_guide(vec![]));
        sink.fail("set_attributes").await;

        // Act
        let failed = engine.tick(&guide, at(9, 10)).await;
        sink.recover().await;
        let retried = engine.tick(&guide, at(9, 11)).await;

        // Assert
        assert!(matches!(
            failed,
            TickOutcome::Failed(EpgError::SinkWrite {
                operation: "set_attributes",
                ..
            })
        ));
        assert!(matches!(retried, TickOutcome::Published { .. }));
        assert_eq!(engine.published().unwrap().title, "A");
        // Heartbeat still ran on the failed tick
        assert_eq!(count_value_writes(&sink.ops().await), 2);
    }

    #[tokio::test]
    async fn test_create_failure_skips_tick() {
        // Arrange
        let guide = vec![show("A", 9, 0, 60)];
        let (mut engine, sink) = engine(MockProvider::with_guide(vec![]));
        sink.fail("ensure_exists").await;

        // Act
        let outcome = engine.tick(&guide, at(9, 10)).await;

        // Assert
        assert!(matches!(outcome, TickOutcome::Failed(_)));
        assert!(engine.published().is_none());
        assert!(sink.ops().await.is_empty());
    }

    #[tokio::test]
    async fn test_description_failure_publishes_empty_description() {
        // Arrange
        let guide = vec![show("A", 9, 0, 60)];
        let (mut engine, sink) = engine(MockProvider::with_guide(vec![]).failing_describe());

        // Act
        let outcome = engine.tick(&guide, at(9, 10)).await;

        // Assert
        assert!(matches!(outcome, TickOutcome::Published { .. }));
        let attrs = sink.entry(engine.entry()).await.unwrap().attributes.unwrap();
        assert_eq!(attrs.description, "");
    }

    #[tokio::test]
    async fn test_unknown_duration_publishes_zero() {
        // Arrange
        let guide = vec![Show::new("ZDF", "Live", at(9, 0))];
        let (mut engine, sink) = engine(MockProvider::with_guide(vec![]));

        // Act
        let outcome = engine.tick(&guide, at(9, 30)).await;

        // Assert
        assert!(matches!(outcome, TickOutcome::Published { percent: 0 }));
        let stored = sink.entry(engine.entry()).await.unwrap();
        assert_eq!(stored.attributes.unwrap().duration, 0);
        assert_eq!(stored.value.as_deref(), Some("0"));
    }
}
