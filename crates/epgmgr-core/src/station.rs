//! Per-station state and the handle of a running station.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::EpgError;
use crate::guide_store::{Guide, GuideStore};
use crate::provider::GuideProvider;
use crate::publish::{PublishEngine, TickOutcome};
use crate::refresh::RefreshCoordinator;
use crate::sink::{EntryId, SensorSink};

/// Work item of a station worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fetch a fresh guide, then publish.
    Refresh,
    /// Publish from the current guide.
    Tick,
}

/// Guide, refresh coordinator and publish engine of one station.
#[derive(Debug)]
pub struct StationGuide<P, S> {
    station: String,
    store: GuideStore,
    refresher: RefreshCoordinator<P>,
    engine: PublishEngine<P, S>,
}

impl<P, S> StationGuide<P, S>
where
    P: GuideProvider + Sync,
    S: SensorSink + Sync,
{
    /// Creates the station with an empty guide.
    ///
    /// The sink entry is derived from `sensor_prefix`, the provider name and
    /// the station name.
    pub fn new(
        station: impl Into<String>,
        sensor_prefix: &str,
        provider: Arc<P>,
        sink: Arc<S>,
    ) -> Self {
        let station = station.into();
        let entry = EntryId::for_station(sensor_prefix, provider.name(), &station);
        Self {
            store: GuideStore::new(),
            refresher: RefreshCoordinator::new(Arc::clone(&provider), station.clone()),
            engine: PublishEngine::new(provider, sink, station.clone(), entry),
            station,
        }
    }

    /// Station name.
    #[must_use]
    pub fn station(&self) -> &str {
        &self.station
    }

    /// Sink entry of the station.
    #[must_use]
    pub const fn entry(&self) -> &EntryId {
        self.engine.entry()
    }

    /// Current guide snapshot.
    #[must_use]
    pub fn guide(&self) -> Guide {
        self.store.snapshot()
    }

    /// Receiver notified on every guide swap.
    #[must_use]
    pub fn watch_guide(&self) -> watch::Receiver<Guide> {
        self.store.watch()
    }

    /// Fetches a fresh guide and publishes it.
    ///
    /// # Errors
    ///
    /// Returns [`EpgError::ProviderFetch`] if the provider fails; the
    /// previous guide is kept.
    pub async fn refresh(&mut self, now: NaiveDateTime) -> Result<TickOutcome, EpgError> {
        self.refresher
            .refresh(&self.store, &mut self.engine, now)
            .await
    }

    /// Publishes from the current guide.
    pub async fn tick(&mut self, now: NaiveDateTime) -> TickOutcome {
        let guide = self.store.snapshot();
        self.engine.tick(&guide, now).await
    }

    /// Runs one trigger. Failures are logged by the components and do not
    /// propagate.
    pub async fn handle(&mut self, trigger: Trigger, now: NaiveDateTime) {
        match trigger {
            Trigger::Refresh => {
                if let Err(e) = self.refresh(now).await {
                    tracing::debug!(
                        station = %self.station,
                        error = %e,
                        "Refresh trigger failed, keeping previous guide"
                    );
                }
            }
            Trigger::Tick => {
                self.tick(now).await;
            }
        }
    }
}

/// Enqueues `trigger`.
///
/// A refresh waits for a free slot; a tick is dropped while the queue is
/// full. Returns `false` once the worker is gone.
pub(crate) async fn enqueue(
    tx: &mpsc::Sender<Trigger>,
    trigger: Trigger,
    station: &str,
) -> bool {
    if trigger == Trigger::Refresh {
        return tx.send(trigger).await.is_ok();
    }
    match tx.try_send(trigger) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(trigger)) => {
            tracing::debug!(station, ?trigger, "Station busy, trigger dropped");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Running station spawned by a `ScheduleDriver`.
#[derive(Debug)]
pub struct StationHandle {
    station: String,
    entry: EntryId,
    sender: mpsc::Sender<Trigger>,
    guide: watch::Receiver<Guide>,
    tasks: Vec<JoinHandle<()>>,
}

impl StationHandle {
    pub(crate) const fn new(
        station: String,
        entry: EntryId,
        sender: mpsc::Sender<Trigger>,
        guide: watch::Receiver<Guide>,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            station,
            entry,
            sender,
            guide,
            tasks,
        }
    }

    /// Station name.
    #[must_use]
    pub fn station(&self) -> &str {
        &self.station
    }

    /// Sink entry of the station.
    #[must_use]
    pub const fn entry(&self) -> &EntryId {
        &self.entry
    }

    /// Current guide snapshot.
    #[must_use]
    pub fn guide(&self) -> Guide {
        self.guide.borrow().clone()
    }

    /// Enqueues a trigger. Returns `false` if the station has stopped.
    pub async fn trigger(&self, trigger: Trigger) -> bool {
        enqueue(&self.sender, trigger, &self.station).await
    }

    /// Stops the worker and all triggers of the station.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        tracing::debug!(station = %self.station, "Station stopped");
    }
}
