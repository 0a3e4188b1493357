//! epgmgr - publishes the current TV show of configured stations as sensors.

/// Application configuration (TOML).
mod config;
/// Station lifecycle.
mod service;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use epgmgr_api::{AnyProvider, HassSink, build_provider, registered_kinds};
use epgmgr_core::sink::memory::MemorySink;
use epgmgr_core::{GuideProvider, SensorSink, current_show, upcoming_show};
use tracing::instrument;
use tracing_subscriber::filter::EnvFilter;
#[cfg(not(feature = "otel"))]
use tracing_subscriber::fmt;
#[cfg(feature = "otel")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "otel")]
use tracing_subscriber::util::SubscriberInitExt;
use url::Url;

use crate::config::{AppConfig, SinkConfig, resolve_config_path};
use crate::service::{cleanup, shutdown, start_stations};

/// CLI argument parser.
#[derive(Parser)]
#[command(about, version)]
struct Cli {
    /// Override config directory.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Start every configured station and publish until Ctrl-C.
    Run(RunArgs),
    /// Remove every sensor carrying the configured prefix.
    Cleanup,
    /// List registered provider kinds.
    Providers,
    /// List the stations a configured provider can serve.
    Stations(StationsArgs),
    /// Fetch a station guide once and show what is on now.
    Now(NowArgs),
}

/// Arguments for the `run` subcommand.
#[derive(clap::Args)]
struct RunArgs {
    /// Publish to an in-memory sink instead of Home Assistant.
    #[arg(long)]
    dry_run: bool,
}

/// Arguments for the `stations` subcommand.
#[derive(clap::Args)]
struct StationsArgs {
    /// Provider name or kind as configured.
    #[arg(long, required = true)]
    provider: String,
}

/// Arguments for the `now` subcommand.
#[derive(clap::Args)]
struct NowArgs {
    /// Provider name or kind as configured.
    #[arg(long, required = true)]
    provider: String,
    /// Station name.
    #[arg(long, required = true)]
    station: String,
}

/// Loads the config file for `dir`.
fn load_config(dir: Option<&PathBuf>) -> Result<AppConfig> {
    let config_path = resolve_config_path(dir).context("failed to resolve config path")?;
    tracing::debug!(path = %config_path.display(), "Loading config");
    AppConfig::load(&config_path).context("failed to load config")
}

/// Builds the Home Assistant sink from `[sink]`.
fn build_sink(sink: Option<&SinkConfig>) -> Result<HassSink> {
    let Some(sink) = sink else {
        bail!("no [sink] configured (use `run --dry-run` to publish in memory)");
    };
    let url = Url::parse(&sink.url).with_context(|| format!("invalid sink url '{}'", sink.url))?;
    HassSink::builder()
        .base_url(url)
        .token(sink.resolve_token()?)
        .build()
        .context("failed to build sink")
}

/// Runs cleanup and the stations against `sink` until Ctrl-C.
async fn serve<S>(config: &AppConfig, sink: Arc<S>) -> Result<()>
where
    S: SensorSink + Send + Sync + 'static,
{
    if config.cleanup_sensors_on_startup || config.only_cleanup_and_end {
        cleanup(&*sink, &config.sensor_prefix).await?;
    }
    if config.only_cleanup_and_end {
        tracing::info!("Cleanup finished, exiting");
        return Ok(());
    }

    let handles = start_stations(config, &sink)?;
    tracing::info!(stations = handles.len(), "epgmgr is running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    shutdown(&*sink, handles).await;
    Ok(())
}

/// Runs the `run` subcommand.
///
/// # Errors
///
/// Returns an error if the config, the sink or a provider is invalid.
#[instrument(skip_all)]
async fn run_serve(args: &RunArgs, dir: Option<&PathBuf>) -> Result<()> {
    let config = load_config(dir)?;
    if args.dry_run {
        tracing::info!("Dry run: publishing to memory");
        return serve(&config, Arc::new(MemorySink::new())).await;
    }
    let sink = build_sink(config.sink.as_ref())?;
    serve(&config, Arc::new(sink)).await
}

/// Runs the `cleanup` subcommand.
///
/// # Errors
///
/// Returns an error if the sink is not configured or cannot be listed.
#[instrument(skip_all)]
async fn run_cleanup(dir: Option<&PathBuf>) -> Result<()> {
    let config = load_config(dir)?;
    let sink = build_sink(config.sink.as_ref())?;
    cleanup(&sink, &config.sensor_prefix).await?;
    Ok(())
}

/// Runs the `providers` subcommand.
#[instrument(skip_all)]
fn run_providers() {
    for kind in registered_kinds() {
        tracing::info!("{kind}");
    }
}

/// Builds the configured provider matching `key`.
fn configured_provider(config: &AppConfig, key: &str) -> Result<AnyProvider> {
    let Some(settings) = config.find_provider(key) else {
        bail!("provider '{key}' is not configured");
    };
    build_provider(settings)
}

/// Runs the `stations` subcommand.
///
/// # Errors
///
/// Returns an error if the provider is not configured or the fetch fails.
#[instrument(skip_all)]
async fn run_stations(args: &StationsArgs, dir: Option<&PathBuf>) -> Result<()> {
    let config = load_config(dir)?;
    let provider = configured_provider(&config, &args.provider)?;
    let stations = provider
        .list_stations()
        .await
        .with_context(|| format!("failed to list stations of '{}'", provider.name()))?;

    tracing::info!("Stations of {} ({}):", provider.name(), stations.len());
    for station in &stations {
        tracing::info!("  {station}");
    }
    Ok(())
}

/// Runs the `now` subcommand.
///
/// # Errors
///
/// Returns an error if the provider is not configured or the fetch fails.
#[instrument(skip_all)]
async fn run_now(args: &NowArgs, dir: Option<&PathBuf>) -> Result<()> {
    let config = load_config(dir)?;
    let provider = configured_provider(&config, &args.provider)?;
    let shows = provider
        .list_shows(&args.station)
        .await
        .with_context(|| format!("failed to fetch guide for '{}'", args.station))?;

    let now = Local::now().naive_local();
    tracing::info!("Station: {} [EPG: {}]", args.station, provider.name());
    tracing::info!("Shows in guide: {}", shows.len());
    match current_show(&shows, now) {
        Some(show) => tracing::info!(
            "Now:  {} {} ({}%)",
            show.begin_time(),
            show.title,
            show.elapsed_percent(now)
        ),
        None => tracing::info!("Now:  -"),
    }
    match upcoming_show(&shows, now) {
        Some(show) => tracing::info!("Next: {} {}", show.begin_time(), show.title),
        None => tracing::info!("Next: -"),
    }
    Ok(())
}

/// Entry point.
///
/// # Errors
///
/// Returns an error if subcommand execution fails.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    #[cfg(not(feature = "otel"))]
    {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false)
            .init();
    }

    #[cfg(feature = "otel")]
    {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);

        let otel_layer = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .and_then(|_| {
                let exporter = opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .build()
                    .ok()?;

                let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                    .with_simple_exporter(exporter)
                    .build();

                let tracer = opentelemetry::trace::TracerProvider::tracer(
                    &tracer_provider,
                    env!("CARGO_PKG_NAME"),
                );
                opentelemetry::global::set_tracer_provider(tracer_provider);

                Some(tracing_opentelemetry::layer().with_tracer(tracer))
            });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .init();
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_serve(&args, cli.dir.as_ref()).await,
        Commands::Cleanup => run_cleanup(cli.dir.as_ref()).await,
        Commands::Providers => {
            run_providers();
            Ok(())
        }
        Commands::Stations(args) => run_stations(&args, cli.dir.as_ref()).await,
        Commands::Now(args) => run_now(&args, cli.dir.as_ref()).await,
    }
}
