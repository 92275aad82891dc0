use anyhow::{Context, bail};
use beam_vision::{
    BeamConfig, CameraPipeline, CaptureError, FrameReport, GrayFrame, PacketFormat, StereoFusion,
    run_primary, run_secondary,
};
use futures::stream::{self, BoxStream, StreamExt};
use log::info;
use std::env;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: stereo_tester <primary_frames_dir> <secondary_frames_dir> [config.json]");
        return Ok(());
    }
    let primary_dir = PathBuf::from(&args[1]);
    let secondary_dir = PathBuf::from(&args[2]);
    let config = match args.get(3) {
        Some(path) => BeamConfig::from_json_file(path)
            .with_context(|| format!("loading config from {path}"))?,
        None => BeamConfig::default(),
    };

    let primary_frames = list_frames(&primary_dir)?;
    let secondary_frames = list_frames(&secondary_dir)?;
    info!(
        "{} primary and {} secondary frames",
        primary_frames.len(),
        secondary_frames.len()
    );

    // --- 2. Node Wiring ---
    // The byte channel stands in for the serial link between the two boards.
    let format = PacketFormat::new(config.link.header);
    let (link_tx, link_rx) = mpsc::channel(config.link.channel_capacity);
    let (report_tx, mut report_rx) = mpsc::channel::<FrameReport>(16);

    let fusion = StereoFusion::from_config(&config);
    let rig = fusion.geometry().config();
    info!(
        "rig: baseline {} m, hfov {} deg, focal {:.1} px",
        rig.baseline_m,
        rig.hfov_deg,
        fusion.geometry().focal_px()
    );

    let secondary = tokio::spawn(run_secondary(
        CameraPipeline::from_config(&config),
        format,
        frame_stream(secondary_frames),
        link_tx,
    ));
    let primary = tokio::spawn(run_primary(
        CameraPipeline::from_config(&config),
        fusion,
        format,
        frame_stream(primary_frames),
        link_rx,
        report_tx,
    ));

    // --- 3. Report Loop ---
    let mut fps = FpsCounter::new(Instant::now());
    while let Some(report) = report_rx.recv().await {
        let current_fps = fps.tick(Instant::now());
        print_report(&report, current_fps);
    }

    let (secondary_count, primary_count) = futures::future::try_join(secondary, primary)
        .await
        .context("camera task panicked")?;
    println!("\nProcessing complete. primary: {primary_count} frames, secondary: {secondary_count} frames");
    Ok(())
}

/// Image files in `dir`, sorted by name so frame order follows the file names.
fn list_frames(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading frame directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();
    if paths.is_empty() {
        bail!("no frames found in {}", dir.display());
    }
    Ok(paths)
}

/// Decodes frames lazily on the blocking pool; an unreadable file becomes a
/// capture error and is skipped by the node.
fn frame_stream(paths: Vec<PathBuf>) -> BoxStream<'static, Result<GrayFrame, CaptureError>> {
    stream::iter(paths.into_iter().enumerate())
        .then(|(index, path)| async move {
            match tokio::task::spawn_blocking(move || load_frame(index as u64, &path)).await {
                Ok(frame) => frame,
                Err(err) => Err(CaptureError::new(format!("frame loader failed: {err}"))),
            }
        })
        .boxed()
}

fn load_frame(index: u64, path: &Path) -> Result<GrayFrame, CaptureError> {
    let gray = image::open(path)
        .map_err(|err| CaptureError::new(format!("{}: {err}", path.display())))?
        .to_luma8();
    let (width, height) = gray.dimensions();
    Ok(GrayFrame::new(index, width, height, gray.into_raw()))
}

/// Report rate, refreshed once per second.
struct FpsCounter {
    window_start: Instant,
    frames: u32,
    current: f32,
}

impl FpsCounter {
    const WINDOW: Duration = Duration::from_secs(1);

    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
            current: 0.0,
        }
    }

    fn tick(&mut self, now: Instant) -> f32 {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= Self::WINDOW {
            self.current = self.frames as f32 / elapsed.as_secs_f32();
            self.frames = 0;
            self.window_start = now;
        }
        self.current
    }
}

fn print_report(report: &FrameReport, fps: f32) {
    let result = &report.result;
    println!(
        "\n--- Frame #{} | FPS: {fps:.1} | Brightness: {} ---",
        report.frame_index, result.scene_brightness
    );

    if result.is_empty() {
        println!("  No blobs");
    } else {
        println!("  Blobs: {}", result.blob_count());
        for (i, blob) in result.blobs.iter().enumerate() {
            println!(
                "  [{i}] pos=({},{}) size={} avg={} class={} dx={} dy={}",
                blob.centroid.x,
                blob.centroid.y,
                blob.pixel_count,
                blob.avg_brightness(),
                blob.classification,
                blob.dx,
                blob.dy
            );
        }
    }

    match report.peer.as_ref().and_then(|peer| peer.largest().map(|b| (peer.count(), b))) {
        Some((count, largest)) => {
            println!("  Secondary: {count} blob(s), blob[0] cx={}", largest.centroid.x)
        }
        None => println!("  Secondary: no data"),
    }

    match report.distance {
        Some(distance) => println!("  Distance: {distance}"),
        None => println!("  Distance: N/A"),
    }
}
