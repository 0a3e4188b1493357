//! `GuideProvider` trait definition.
#![allow(clippy::future_not_send)]

use anyhow::Result;

use crate::models::Show;

/// Source of raw show listings for stations.
///
/// Abstracts the listing source for mock substitution in tests.
/// Uses `trait_variant::make` to generate a `Send`-bound async trait,
/// which station workers require because they run on spawned tasks.
#[allow(clippy::module_name_repetitions)]
#[trait_variant::make(GuideProvider: Send)]
pub trait LocalGuideProvider {
    /// Stable display name, also used in sensor entry ids.
    fn name(&self) -> &str;

    /// Fetches the listings of one station.
    ///
    /// # Errors
    ///
    /// Returns an error on network or parse failure.
    async fn list_shows(&self, station: &str) -> Result<Vec<Show>>;

    /// Lists the stations the source can serve, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error on network or parse failure.
    async fn list_stations(&self) -> Result<Vec<String>>;

    /// Fetches the long description of a show as markdown.
    ///
    /// # Errors
    ///
    /// Returns an error on network or parse failure.
    async fn describe_show(&self, show: &Show) -> Result<String>;

    /// Detail page URL of a show (empty if unknown).
    fn link_for(&self, show: &Show) -> String;
}
