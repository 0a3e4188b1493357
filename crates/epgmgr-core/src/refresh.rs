//! `RefreshCoordinator` - replaces a station guide from its provider.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::instrument;

use crate::error::EpgError;
use crate::guide_store::GuideStore;
use crate::provider::GuideProvider;
use crate::publish::{PublishEngine, TickOutcome};
use crate::sink::SensorSink;

/// Fetches a fresh guide and republishes it.
#[derive(Debug)]
pub struct RefreshCoordinator<P> {
    provider: Arc<P>,
    station: String,
}

impl<P> RefreshCoordinator<P>
where
    P: GuideProvider + Sync,
{
    /// Creates a coordinator for `station`.
    #[must_use]
    pub fn new(provider: Arc<P>, station: impl Into<String>) -> Self {
        Self {
            provider,
            station: station.into(),
        }
    }

    /// Refreshes the guide of the station.
    ///
    /// On success the guide is swapped, the published identity is reset,
    /// the sink entry is removed and one tick runs immediately. On failure
    /// the previous guide stays in `store` untouched.
    ///
    /// # Errors
    ///
    /// Returns [`EpgError::ProviderFetch`] if the provider fails. The error
    /// is already logged.
    #[instrument(skip_all, fields(station = %self.station))]
    pub async fn refresh<S>(
        &self,
        store: &GuideStore,
        engine: &mut PublishEngine<P, S>,
        now: NaiveDateTime,
    ) -> Result<TickOutcome, EpgError>
    where
        S: SensorSink + Sync,
    {
        let shows = match self.provider.list_shows(&self.station).await {
            Ok(shows) => shows,
            Err(e) => {
                tracing::error!(
                    station = %self.station,
                    provider = self.provider.name(),
                    error = format!("{e:#}"),
                    "Error when trying to refresh guide"
                );
                return Err(EpgError::ProviderFetch {
                    provider: String::from(self.provider.name()),
                    station: self.station.clone(),
                    source: e.into(),
                });
            }
        };

        tracing::info!(
            station = %self.station,
            provider = self.provider.name(),
            shows = shows.len(),
            "Guide refreshed"
        );

        store.replace(shows);
        engine.reset_published();
        engine.clear().await;

        let guide = store.snapshot();
        Ok(engine.tick(&guide, now).await)
    }
}
