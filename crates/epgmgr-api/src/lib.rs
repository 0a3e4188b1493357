//! Guide providers and sensor sinks for epgmgr.
//!
//! Provides the JSON feed and JSON file providers, the Home Assistant
//! sink and the registry that maps configured provider kinds to
//! constructors.

/// HTTP JSON feed provider.
pub mod feed;

/// Local JSON file provider.
pub mod file;

/// Home Assistant REST sink.
pub mod hass;

mod rate_limiter;

/// Provider registry.
pub mod registry;

/// JSON listing format.
pub mod wire;

pub use feed::{JsonFeedProvider, JsonFeedProviderBuilder};
pub use file::JsonFileProvider;
pub use hass::{HassSink, HassSinkBuilder};
pub use registry::{
    AnyProvider, DEFAULT_USER_AGENT, ProviderFactory, ProviderSettings, REGISTRY, build_provider,
    registered_kinds,
};
