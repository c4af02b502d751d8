//! Gaze Calibrator - Main Entry Point
//!
//! Opens the calibration window, or with `--headless` (or without the `gui`
//! feature) taps every point from the command line and reports what was saved.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context};
use gaze_calibrator::calibration::TAPS_PER_POINT;
use gaze_calibrator::{CalibrationWorker, CalibratorConfig, ControllerEvent, PointLabel};

/// How long the headless run waits for any single camera result
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(15);

fn spawn_worker(config: &CalibratorConfig) -> anyhow::Result<CalibrationWorker> {
    let camera = config.camera_session()?;
    let worker = CalibrationWorker::spawn(
        camera,
        Box::new(config.sink()),
        config.layout.clone(),
        config.window_width as f32,
        config.window_height as f32,
    )
    .context("failed to start calibration worker")?;
    Ok(worker)
}

/// Wait until a capture resolves one way or the other.
fn wait_for_capture(worker: &CalibrationWorker, label: PointLabel) -> anyhow::Result<()> {
    loop {
        match worker.next_event(CAPTURE_TIMEOUT) {
            Some(ControllerEvent::SessionFailed { error }) => bail!("camera unavailable: {}", error),
            Some(ControllerEvent::PhotoSaved { .. })
            | Some(ControllerEvent::CaptureFailed { .. })
            | Some(ControllerEvent::PersistFailed { .. }) => return Ok(()),
            Some(_) => continue,
            None => bail!("timed out waiting for the capture of {}", label),
        }
    }
}

fn run_headless(config: &CalibratorConfig) -> anyhow::Result<()> {
    let worker = spawn_worker(config)?;
    worker.start();

    for label in PointLabel::ALL {
        for _ in 0..TAPS_PER_POINT {
            worker.tap(label);
            wait_for_capture(&worker, label)?;
        }
    }

    loop {
        match worker.next_event(CAPTURE_TIMEOUT) {
            Some(ControllerEvent::CollectionComplete) => break,
            Some(_) => continue,
            None => bail!("collection did not complete"),
        }
    }
    worker.dismiss();
    drop(worker);

    let sink = config.sink();
    let captures = sink.list_captures().context("failed to list captured photos")?;
    let mut per_label: BTreeMap<&'static str, usize> = BTreeMap::new();
    for capture in &captures {
        *per_label.entry(capture.label.as_str()).or_default() += 1;
    }
    log::info!("Data collection complete: {} photo(s) in {}", captures.len(), sink.root().display());
    for (label, count) in per_label {
        log::info!("  {:<14} {}", label, count);
    }
    Ok(())
}

#[cfg(feature = "gui")]
fn run_gui(config: &CalibratorConfig) -> anyhow::Result<()> {
    let worker = spawn_worker(config)?;
    let app = gaze_calibrator::ui::CalibrationApp::new(worker);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.window_width as f32, config.window_height as f32])
            .with_title("Gaze Calibrator"),
        ..Default::default()
    };

    eframe::run_native(
        "Gaze Calibrator",
        native_options,
        Box::new(move |_cc| -> Box<dyn eframe::App> { Box::new(app) }),
    )
    .map_err(|e| anyhow::anyhow!("window error: {}", e))
}

#[cfg(not(feature = "gui"))]
fn run_gui(config: &CalibratorConfig) -> anyhow::Result<()> {
    log::info!("Built without the `gui` feature, running headless");
    run_headless(config)
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("Gaze Calibrator v{}", env!("CARGO_PKG_VERSION"));

    let config = CalibratorConfig::load(&CalibratorConfig::default_path())?;
    let headless = std::env::args().skip(1).any(|arg| arg == "--headless");

    if headless {
        run_headless(&config)
    } else {
        run_gui(&config)
    }
}
