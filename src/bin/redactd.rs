//! redactd - live video redaction daemon
//!
//! This daemon:
//! 1. Loads the redaction config (file named by REDACT_CONFIG, then REDACT_* env)
//! 2. Resolves the configured detector strategies
//! 3. Opens a session and announces a synthetic camera track to it
//! 4. Pulls redacted frames from the track, logging pipeline health
//! 5. Closes the session on Ctrl-C or when the run time is up

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use stream_redact::{
    ConnectionState, DetectorRegistry, Frame, InboundTrack, RedactConfig, Session, SessionEvent,
    SyntheticConfig, SyntheticSource, TrackAdapter,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
const TRACK_ID: &str = "camera0";

#[derive(Parser, Debug)]
#[command(author, version, about = "Redact text and sensitive objects from a live video track")]
struct Args {
    /// Run time in seconds.
    #[arg(long, default_value_t = 10)]
    seconds: u64,
    /// Synthetic source frame rate.
    #[arg(long, default_value_t = 15)]
    fps: u32,
    #[arg(long, default_value_t = 640)]
    width: u32,
    #[arg(long, default_value_t = 480)]
    height: u32,
    /// Write the last redacted frame to this JPEG file on exit.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = RedactConfig::load()?;
    log::info!(
        "redactd starting: interval={}, blur={}, debug={}, objects={}",
        config.detection_interval,
        config.blur_strength,
        config.debug_mode,
        config.enable_object_detection
    );

    let registry = DetectorRegistry::with_builtin();
    let detectors = registry.select(&config)?;
    log::info!("detectors: {:?}", detectors);

    let (outbound_tx, mut outbound_rx) = mpsc::channel(4);
    let (session, events) = Session::new("redactd", config, detectors, outbound_tx)?;
    let session_task = tokio::spawn(session.run());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        let events = events.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
            let _ = events.try_send(SessionEvent::ConnectionStateChange(ConnectionState::Closed));
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let source = SyntheticSource::new(SyntheticConfig {
        width: args.width,
        height: args.height,
        target_fps: args.fps,
        max_frames: Some(args.seconds.saturating_mul(u64::from(args.fps))),
        ..SyntheticConfig::default()
    })?;
    for state in [ConnectionState::Connecting, ConnectionState::Connected] {
        send_event(&events, SessionEvent::ConnectionStateChange(state)).await?;
    }
    send_event(
        &events,
        SessionEvent::Track(InboundTrack::Video {
            id: TRACK_ID.to_string(),
            source: Box::new(source),
        }),
    )
    .await?;
    send_event(
        &events,
        SessionEvent::Track(InboundTrack::Audio {
            id: "mic0".to_string(),
        }),
    )
    .await?;

    let track = outbound_rx
        .recv()
        .await
        .ok_or_else(|| anyhow!("session ended before the video track was attached"))?;
    log::info!("redacted track {} ready", track.id);

    let last_frame = drive(track.adapter, &running).await;

    // The session may already have closed on Ctrl-C.
    let _ = events
        .send(SessionEvent::ConnectionStateChange(ConnectionState::Closed))
        .await;
    drop(events);
    let summary = session_task
        .await
        .map_err(|e| anyhow!("session task failed: {}", e))?;
    log::info!("session summary: {:?}", summary);

    if let Some(path) = &args.snapshot {
        match last_frame {
            Some(frame) => {
                frame
                    .image()
                    .save(path)
                    .with_context(|| format!("failed to write snapshot {}", path.display()))?;
                log::info!("snapshot written to {}", path.display());
            }
            None => log::warn!("no frame produced; snapshot skipped"),
        }
    }

    Ok(())
}

async fn send_event(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) -> Result<()> {
    events
        .send(event)
        .await
        .map_err(|_| anyhow!("session stopped accepting events"))
}

/// Pull frames until the source ends or shutdown is requested.
async fn drive(mut adapter: TrackAdapter, running: &AtomicBool) -> Option<Frame> {
    let mut last_frame = None;
    let mut last_health_log = Instant::now();

    while running.load(Ordering::SeqCst) {
        match adapter.recv().await {
            Ok(frame) => last_frame = Some(frame),
            Err(e) => {
                log::info!("track {} ended: {:#}", TRACK_ID, e);
                break;
            }
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            log_health(&adapter, last_frame.as_ref());
            last_health_log = Instant::now();
        }
    }

    log_health(&adapter, last_frame.as_ref());
    adapter.cleanup();
    last_frame
}

fn log_health(adapter: &TrackAdapter, last_frame: Option<&Frame>) {
    let frames = adapter.frame_count();
    let health = serde_json::json!({
        "track": TRACK_ID,
        "frames": frames,
        "media_seconds": last_frame.map(Frame::seconds),
        "result_staleness": adapter.cache().staleness(frames),
        "results_superseded": adapter.cache().superseded(),
        "scheduler": adapter.stats(),
    });
    log::info!("health: {}", health);
}
