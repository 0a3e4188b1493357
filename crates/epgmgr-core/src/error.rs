//! `EpgError` - station scoped failure conditions.

/// Boxed source error carried by [`EpgError`] variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures raised while maintaining a station guide.
///
/// None of these are fatal to the process. Each one is logged where it
/// happens and the next scheduled trigger retries.
#[derive(Debug, thiserror::Error)]
pub enum EpgError {
    /// Listing or description fetch failed (network or parse error).
    #[error("failed to fetch guide for '{station}' [EPG: {provider}]")]
    ProviderFetch {
        /// Provider display name.
        provider: String,
        /// Station name as configured.
        station: String,
        /// Underlying provider error.
        #[source]
        source: BoxError,
    },

    /// Refresh time string did not match `H:MM[:SS]`.
    #[error("'{0}' is not a valid time")]
    InvalidScheduleTime(String),

    /// A sink create/attribute/value/remove call failed.
    #[error("sensor write '{operation}' failed for {entry}")]
    SinkWrite {
        /// Sink entry id.
        entry: String,
        /// Sink operation name.
        operation: &'static str,
        /// Underlying sink error.
        #[source]
        source: BoxError,
    },

    /// Provider kind is not present in the registry.
    #[error("unknown EPG data provider '{0}'")]
    UnknownProvider(String),
}
