//! Crossfade engine (segue-xfade) - simulated session runner
//!
//! Plays a synthetic playlist through two simulated pipelines, letting the
//! transition scheduler crossfade between consecutive tracks, and prints the
//! final scheduler status as JSON.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use segue_common::{EnvelopeCurve, MediaItem, SegueConfig, TransitionMode};
use segue_xfade::playback::pipeline::{MediaCatalog, SimulatedPipeline};
use segue_xfade::playback::{
    DualPipelineEngine, PipelineId, RuleTable, TransitionReason, TransitionScheduler,
};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for segue-xfade
#[derive(Parser, Debug)]
#[command(name = "segue-xfade")]
#[command(about = "Crossfade a simulated playlist with the dual-pipeline engine")]
#[command(version)]
struct Args {
    /// Configuration file (falls back to SEGUE_CONFIG, then the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of tracks in the synthetic playlist
    #[arg(short, long, default_value = "3")]
    tracks: usize,

    /// Length of each synthetic track in milliseconds
    #[arg(long, default_value = "20000")]
    track_ms: u64,

    /// Override the default crossfade duration (0 disables crossfading)
    #[arg(long)]
    crossfade_ms: Option<u64>,

    /// Override both fade curves (linear, equal_power, ease_in, ease_out, s_curve)
    #[arg(long)]
    curve: Option<EnvelopeCurve>,

    /// Playlist id used for rule lookup
    #[arg(short, long, default_value = "demo")]
    playlist: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = SegueConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &args);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        tracks = args.tracks,
        track_ms = args.track_ms,
        playlist = %args.playlist,
        "Starting simulated crossfade session"
    );
    info!(
        mode = %config.default_transition.mode,
        duration_ms = config.default_transition.duration_ms,
        curve_out = %config.default_transition.curve_out,
        curve_in = %config.default_transition.curve_in,
        rules = config.rules.len(),
        "Default transition"
    );

    let catalog = MediaCatalog::new();
    let items: Vec<MediaItem> = (1..=args.tracks)
        .map(|n| MediaItem::new(format!("track-{}", n), format!("sim://track-{}", n)))
        .collect();
    for item in &items {
        catalog.insert(item, args.track_ms);
    }

    // Handles indexed by PipelineId::index; the engine owns clones of the same pipelines
    let pipelines = [
        SimulatedPipeline::new("primary", catalog.clone()),
        SimulatedPipeline::new("secondary", catalog),
    ];
    let engine = Arc::new(DualPipelineEngine::new(
        pipelines[0].clone(),
        pipelines[1].clone(),
        config.timing,
    ));
    let resolver = Arc::new(RuleTable::from_config(&config));
    let mut scheduler = TransitionScheduler::spawn(Arc::clone(&engine), resolver, config.timing);
    scheduler.set_playlist(Some(args.playlist.clone()));

    let Some(first) = items.first().cloned() else {
        warn!("Empty playlist, nothing to play");
        scheduler.shutdown().await;
        return Ok(());
    };

    // Session start on the primary pipeline
    let mut session = pipelines[PipelineId::Primary.index()].clone();
    session.set_queue(&items);
    segue_xfade::playback::PlaybackPipeline::play(&mut session).context("Failed to start playback")?;
    let listener = scheduler.listener(PipelineId::Primary);
    listener.on_item_transitioned(Some(first), TransitionReason::PlaylistChanged);
    listener.on_is_playing_changed(true);

    run_session(&engine, &pipelines, &scheduler).await;

    scheduler.shutdown().await;
    let status = scheduler.status();
    println!(
        "{}",
        serde_json::to_string_pretty(&status).context("Failed to serialize scheduler status")?
    );

    info!("Session complete");
    Ok(())
}

/// Command-line overrides on top of the loaded configuration
fn apply_overrides(config: &mut SegueConfig, args: &Args) {
    if let Some(duration_ms) = args.crossfade_ms {
        config.default_transition.duration_ms = duration_ms;
        config.default_transition.mode = if duration_ms > 0 {
            TransitionMode::Crossfade
        } else {
            TransitionMode::None
        };
    }
    if let Some(curve) = args.curve {
        config.default_transition.curve_out = curve;
        config.default_transition.curve_in = curve;
    }
}

/// Act as the platform: advance the Master's queue at the end of each track
/// until the playlist runs out or Ctrl+C arrives
async fn run_session(
    engine: &DualPipelineEngine<SimulatedPipeline>,
    pipelines: &[SimulatedPipeline; 2],
    scheduler: &segue_xfade::playback::SchedulerHandle,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                match result {
                    Ok(()) => info!("Received Ctrl+C, shutting down"),
                    Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
                }
                return;
            }
            _ = ticker.tick() => {}
        }

        // The ramp owns the end of the outgoing track
        if engine.is_ramping() {
            continue;
        }

        let master = engine.master_id();
        let pipeline = &pipelines[master.index()];
        if !pipeline.is_finished() {
            continue;
        }

        let listener = scheduler.listener(master);
        match pipeline.advance() {
            Some(item) => {
                debug!(pipeline = pipeline.name(), item = %item, "Track ended, advancing");
                listener.on_item_transitioned(Some(item), TransitionReason::Auto);
            }
            None => {
                info!(pipeline = pipeline.name(), "Playlist finished");
                listener.on_is_playing_changed(false);
                return;
            }
        }
    }
}
