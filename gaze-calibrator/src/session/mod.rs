//! Background coordination thread for a calibration session.
//!
//! The worker thread owns the [`CaptureController`]. Taps and other commands
//! from the presentation layer and capture results from the camera are
//! multiplexed onto that one thread, so point state is never touched
//! concurrently. Controller events flow back through a channel.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::calibration::{
    CalibrationLayout, CalibrationPoint, CaptureController, CaptureDelegate, ControllerEvent, PointLabel,
};
use crate::camera::{CameraSession, PreviewHandle};
use crate::storage::PersistenceSink;

/// Commands sent to the worker thread.
#[derive(Debug)]
enum WorkerCommand {
    /// Start the camera
    Start,
    /// Tap a point by label
    Tap(PointLabel),
    /// Tap whatever active point is under a screen position
    TapAt { x: f32, y: f32 },
    /// Capture without a point
    ManualCapture,
    /// Screen size changed
    Resize { width: f32, height: f32 },
    /// Stop the camera; keep handling in-flight captures
    Dismiss,
    /// Stop the worker thread
    Shutdown,
}

/// Handle to a running calibration session.
pub struct CalibrationWorker {
    command_tx: Sender<WorkerCommand>,
    event_rx: Receiver<ControllerEvent>,
    /// Copy of the points, refreshed after every change
    points: Arc<Mutex<Vec<CalibrationPoint>>>,
    layout: CalibrationLayout,
    preview: Option<PreviewHandle>,
    worker_handle: Option<JoinHandle<()>>,
}

impl CalibrationWorker {
    /// Build a controller for a screen of the given size and move it onto a
    /// new worker thread. The camera is not started until [`start`](Self::start).
    pub fn spawn(
        camera: Box<dyn CameraSession>,
        sink: Box<dyn PersistenceSink>,
        layout: CalibrationLayout,
        width: f32,
        height: f32,
    ) -> std::io::Result<Self> {
        let (command_tx, command_rx) = unbounded::<WorkerCommand>();
        let (event_tx, event_rx) = unbounded::<ControllerEvent>();

        let mut controller = CaptureController::new(camera, sink, event_tx);
        controller.initialize(layout.clone(), width, height);
        let preview = controller.preview();
        let points = Arc::new(Mutex::new(controller.points().to_vec()));
        let points_clone = Arc::clone(&points);

        let worker_handle = thread::Builder::new()
            .name("calibration".to_string())
            .spawn(move || Self::worker_loop(controller, command_rx, points_clone))?;

        Ok(Self {
            command_tx,
            event_rx,
            points,
            layout,
            preview,
            worker_handle: Some(worker_handle),
        })
    }

    fn worker_loop(
        mut controller: CaptureController,
        command_rx: Receiver<WorkerCommand>,
        points: Arc<Mutex<Vec<CalibrationPoint>>>,
    ) {
        log::info!("Calibration worker started");
        let completions = controller.completions();

        loop {
            select! {
                recv(command_rx) -> command => match command {
                    Ok(WorkerCommand::Start) => {
                        // Failures are reported through SessionFailed.
                        let _ = controller.start_session();
                    }
                    Ok(WorkerCommand::Tap(label)) => {
                        if let Err(e) = controller.on_point_tapped(label) {
                            log::warn!("Ignoring tap on {}: {}", label, e);
                        }
                    }
                    Ok(WorkerCommand::TapAt { x, y }) => {
                        let hit = controller
                            .layout()
                            .hit_test(controller.points(), x, y)
                            .map(|p| p.label);
                        match hit {
                            Some(label) => {
                                if let Err(e) = controller.on_point_tapped(label) {
                                    log::warn!("Ignoring tap on {}: {}", label, e);
                                }
                            }
                            None => log::debug!("Tap at ({:.0}, {:.0}) missed every point", x, y),
                        }
                    }
                    Ok(WorkerCommand::ManualCapture) => {
                        controller.request_capture();
                    }
                    Ok(WorkerCommand::Resize { width, height }) => controller.resize(width, height),
                    Ok(WorkerCommand::Dismiss) => controller.on_screen_dismissing(),
                    Ok(WorkerCommand::Shutdown) | Err(_) => break,
                },
                recv(completions) -> completion => {
                    if let Ok(completion) = completion {
                        controller.on_capture_completed(completion);
                    }
                }
            }

            *points.lock() = controller.points().to_vec();
        }

        // Stopping the camera abandons whatever it still holds; account for those too.
        controller.on_screen_dismissing();
        let drained = controller.pump();
        if drained > 0 {
            log::info!("Handled {} capture(s) during shutdown", drained);
        }
        *points.lock() = controller.points().to_vec();
        log::info!("Calibration worker stopped");
    }

    fn send(&self, command: WorkerCommand) {
        if let Err(e) = self.command_tx.send(command) {
            log::warn!("Calibration worker is gone, dropping {:?}", e.0);
        }
    }

    /// Start the camera session.
    pub fn start(&self) {
        self.send(WorkerCommand::Start);
    }

    pub fn tap(&self, label: PointLabel) {
        self.send(WorkerCommand::Tap(label));
    }

    /// Tap at a screen position; misses are ignored.
    pub fn tap_at(&self, x: f32, y: f32) {
        self.send(WorkerCommand::TapAt { x, y });
    }

    /// Capture a photo not tied to any point.
    pub fn manual_capture(&self) {
        self.send(WorkerCommand::ManualCapture);
    }

    pub fn resize(&self, width: f32, height: f32) {
        self.send(WorkerCommand::Resize { width, height });
    }

    /// Stop the camera. The worker keeps persisting captures already in flight.
    pub fn dismiss(&self) {
        self.send(WorkerCommand::Dismiss);
    }

    /// Poll for controller events (non-blocking).
    pub fn poll_events(&self) -> Vec<ControllerEvent> {
        self.event_rx.try_iter().collect()
    }

    /// Wait for the next controller event.
    pub fn next_event(&self, timeout: Duration) -> Option<ControllerEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Current point state, as of the last processed command or capture.
    pub fn points(&self) -> Vec<CalibrationPoint> {
        self.points.lock().clone()
    }

    pub fn layout(&self) -> &CalibrationLayout {
        &self.layout
    }

    pub fn preview(&self) -> Option<PreviewHandle> {
        self.preview.clone()
    }
}

impl Drop for CalibrationWorker {
    fn drop(&mut self) {
        let _ = self.command_tx.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CaptureFileName, TAPS_PER_POINT};
    use crate::camera::{CameraError, SimulatedCamera, SimulatedCameraConfig};
    use crate::storage::FsSink;

    const WAIT: Duration = Duration::from_secs(10);

    fn camera(config: SimulatedCameraConfig) -> Box<dyn CameraSession> {
        Box::new(SimulatedCamera::new(SimulatedCameraConfig {
            width: 32,
            height: 24,
            ..config
        }))
    }

    fn quick() -> SimulatedCameraConfig {
        SimulatedCameraConfig {
            latency_ms: 1,
            ..Default::default()
        }
    }

    fn wait_for<F>(worker: &CalibrationWorker, mut pred: F) -> Vec<ControllerEvent>
    where
        F: FnMut(&ControllerEvent) -> bool,
    {
        let mut seen = Vec::new();
        while let Some(event) = worker.next_event(WAIT) {
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
        panic!("timed out waiting for event, saw {:?}", seen);
    }

    #[test]
    fn test_full_collection_writes_27_photos() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FsSink::new(tmp.path());
        let worker = CalibrationWorker::spawn(
            camera(quick()),
            Box::new(sink.clone()),
            CalibrationLayout::default(),
            400.0,
            800.0,
        )
        .unwrap();

        worker.start();
        for label in PointLabel::ALL {
            for _ in 0..TAPS_PER_POINT {
                worker.tap(label);
            }
        }

        let events = wait_for(&worker, ControllerEvent::is_complete);
        let saved = events
            .iter()
            .filter(|e| matches!(e, ControllerEvent::PhotoSaved { .. }))
            .count();
        assert_eq!(saved, 27);
        assert!(worker.points().iter().all(|p| !p.active));

        let captures: Vec<CaptureFileName> = sink.list_captures().unwrap();
        assert_eq!(captures.len(), 27);
        for label in PointLabel::ALL {
            assert_eq!(captures.iter().filter(|c| c.label == label).count(), 3);
        }
    }

    #[test]
    fn test_unavailable_camera_reports_session_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let worker = CalibrationWorker::spawn(
            camera(SimulatedCameraConfig {
                unavailable: true,
                ..Default::default()
            }),
            Box::new(FsSink::new(tmp.path())),
            CalibrationLayout::default(),
            400.0,
            800.0,
        )
        .unwrap();

        worker.start();
        let events = wait_for(&worker, |e| matches!(e, ControllerEvent::SessionFailed { .. }));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_tap_at_position() {
        let tmp = tempfile::tempdir().unwrap();
        let worker = CalibrationWorker::spawn(
            camera(quick()),
            Box::new(FsSink::new(tmp.path())),
            CalibrationLayout::default(),
            400.0,
            800.0,
        )
        .unwrap();

        worker.start();
        worker.tap_at(10.0, 10.0);
        worker.tap_at(352.0, 698.0);

        let events = wait_for(&worker, |e| matches!(e, ControllerEvent::PhotoSaved { .. }));
        assert!(events.contains(&ControllerEvent::PointTapped {
            label: PointLabel::RightBottom,
            tap_count: 1,
        }));
        let right_bottom = worker
            .points()
            .into_iter()
            .find(|p| p.label == PointLabel::RightBottom)
            .unwrap();
        assert_eq!(right_bottom.tap_count, 1);
    }

    #[test]
    fn test_manual_capture_saves_unknown_photo() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FsSink::new(tmp.path());
        let worker = CalibrationWorker::spawn(
            camera(quick()),
            Box::new(sink.clone()),
            CalibrationLayout::default(),
            400.0,
            800.0,
        )
        .unwrap();

        worker.start();
        worker.manual_capture();

        let events = wait_for(&worker, |e| matches!(e, ControllerEvent::PhotoSaved { .. }));
        let Some(ControllerEvent::PhotoSaved { label, path, .. }) = events.last() else {
            panic!("expected a saved photo, saw {:?}", events);
        };
        assert_eq!(*label, PointLabel::Unknown);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("photo_unknown_") && name.ends_with(".jpg"), "{}", name);
        assert!(path.is_file());

        let captures = sink.list_captures().unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].label, PointLabel::Unknown);
        assert!(worker.points().iter().all(|p| p.tap_count == 0));
    }

    #[test]
    fn test_dismiss_with_captures_in_flight() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FsSink::new(tmp.path());
        let worker = CalibrationWorker::spawn(
            camera(SimulatedCameraConfig {
                latency_ms: 50,
                ..Default::default()
            }),
            Box::new(sink.clone()),
            CalibrationLayout::default(),
            400.0,
            800.0,
        )
        .unwrap();

        worker.start();
        for _ in 0..TAPS_PER_POINT {
            worker.tap(PointLabel::CenterCenter);
        }
        worker.dismiss();

        // A capture the camera already started is saved. Requests still queued
        // when it stops come back abandoned.
        let mut saved = 0;
        let mut failed = 0;
        let events = wait_for(&worker, |e| {
            match e {
                ControllerEvent::PhotoSaved { label, .. } => {
                    assert_eq!(*label, PointLabel::CenterCenter);
                    saved += 1;
                }
                ControllerEvent::CaptureFailed { label, error, .. } => {
                    assert_eq!(*label, PointLabel::CenterCenter);
                    assert!(
                        error == &CameraError::Abandoned.to_string()
                            || error == &CameraError::NotRunning.to_string(),
                        "unexpected failure: {}",
                        error
                    );
                    failed += 1;
                }
                ControllerEvent::PersistFailed { error, .. } => panic!("persist failed: {}", error),
                _ => {}
            }
            saved + failed == TAPS_PER_POINT as usize
        });
        assert!(events.contains(&ControllerEvent::SessionStopped));
        assert!(events.contains(&ControllerEvent::PointRemoved {
            label: PointLabel::CenterCenter
        }));
        assert_eq!(sink.list_captures().unwrap().len(), saved);

        drop(worker);
        assert_eq!(sink.list_captures().unwrap().len(), saved);
    }
}
