//! Calibration capture controller.
//!
//! Owns the nine calibration points, turns taps into capture requests and
//! persists the photos that come back. All state changes happen on whichever
//! thread owns the controller; camera results arrive through a channel and are
//! applied by [`CaptureController::pump`].

use std::collections::HashMap;
use std::path::PathBuf;

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::camera::{
    CameraError, CameraSession, CaptureCompletion, CaptureId, CaptureTicket, CapturedImage, PreviewHandle,
};
use crate::storage::{PersistError, PersistenceSink};

use super::events::ControllerEvent;
use super::filename::CaptureFileName;
use super::layout::CalibrationLayout;
use super::point::{CalibrationPoint, PointLabel, PointState, TAPS_PER_POINT};

/// Errors returned to the caller of a controller operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("no calibration point labelled {0}")]
    UnknownPoint(PointLabel),
    #[error("calibration point {0} has already been removed")]
    PointInactive(PointLabel),
    #[error("capture session has been stopped")]
    SessionStopped,
    #[error(transparent)]
    Camera(#[from] CameraError),
}

/// Receiver of capture results.
pub trait CaptureDelegate {
    /// Called exactly once per capture request.
    fn on_capture_completed(&mut self, completion: CaptureCompletion);
}

/// Coordinates taps, camera captures and photo persistence.
pub struct CaptureController {
    layout: CalibrationLayout,
    points: Vec<CalibrationPoint>,
    /// Point whose tap issued the most recent capture
    current: Option<PointLabel>,
    /// Outstanding captures and the point each was requested for
    pending: HashMap<CaptureId, Option<PointLabel>>,
    next_capture_id: u64,
    completion_tx: Sender<CaptureCompletion>,
    completion_rx: Receiver<CaptureCompletion>,
    events: Sender<ControllerEvent>,
    camera: Box<dyn CameraSession>,
    sink: Box<dyn PersistenceSink>,
    stopped: bool,
    complete_emitted: bool,
}

impl CaptureController {
    /// Create a controller. Points are empty until [`initialize`](Self::initialize).
    pub fn new(
        camera: Box<dyn CameraSession>,
        sink: Box<dyn PersistenceSink>,
        events: Sender<ControllerEvent>,
    ) -> Self {
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        Self {
            layout: CalibrationLayout::default(),
            points: Vec::new(),
            current: None,
            pending: HashMap::new(),
            next_capture_id: 1,
            completion_tx,
            completion_rx,
            events,
            camera,
            sink,
            stopped: false,
            complete_emitted: false,
        }
    }

    /// Place the nine points on a screen of the given size, all untapped.
    pub fn initialize(&mut self, layout: CalibrationLayout, width: f32, height: f32) {
        self.points = layout.points(width, height);
        self.layout = layout;
        self.current = None;
        self.complete_emitted = false;
        log::info!("Initialized {} calibration points on {}x{} screen", self.points.len(), width, height);
    }

    /// Move the points after the screen size changed.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.layout.relayout(&mut self.points, width, height);
    }

    /// Start the camera. Failure is reported to the presentation layer and
    /// returned; the controller stays usable for a retry.
    pub fn start_session(&mut self) -> Result<(), ControllerError> {
        if self.stopped {
            return Err(ControllerError::SessionStopped);
        }
        match self.camera.start() {
            Ok(()) => {
                log::info!("Camera session started");
                Ok(())
            }
            Err(e) => {
                log::error!("Camera unavailable: {}", e);
                self.emit(ControllerEvent::SessionFailed { error: e.to_string() });
                Err(e.into())
            }
        }
    }

    /// Handle a tap on an active point.
    ///
    /// Counts the tap, issues a capture, and removes the point on its third tap.
    /// Returns the point's state after the tap.
    pub fn on_point_tapped(&mut self, label: PointLabel) -> Result<PointState, ControllerError> {
        if self.stopped {
            return Err(ControllerError::SessionStopped);
        }
        let point = self
            .points
            .iter_mut()
            .find(|p| p.label == label)
            .ok_or(ControllerError::UnknownPoint(label))?;
        if !point.active {
            return Err(ControllerError::PointInactive(label));
        }

        let removed = point.register_tap();
        let tap_count = point.tap_count;
        let state = point.state();
        log::info!("Point {} tapped ({}/{})", label, tap_count, TAPS_PER_POINT);

        self.current = Some(label);
        self.emit(ControllerEvent::PointTapped { label, tap_count });

        if !self.pending.is_empty() {
            log::debug!("Tap on {} while {} capture(s) are in flight", label, self.pending.len());
        }
        self.request_capture();

        if removed {
            log::info!("Point {} removed, {} remaining", label, self.active_count());
            self.emit(ControllerEvent::PointRemoved { label });
        }
        self.check_complete();

        Ok(state)
    }

    /// Ask the camera for a photo, labelled with the current point.
    ///
    /// Returns immediately; the result is applied by [`pump`](Self::pump).
    pub fn request_capture(&mut self) -> CaptureId {
        let id = CaptureId(self.next_capture_id);
        self.next_capture_id += 1;

        self.pending.insert(id, self.current);
        self.emit(ControllerEvent::CaptureRequested { id, label: self.current });

        let ticket = CaptureTicket::new(id, self.completion_tx.clone());
        if self.stopped {
            ticket.complete(Err(CameraError::NotRunning));
        } else {
            self.camera.capture_photo(ticket);
        }
        id
    }

    /// Stop the camera. Safe to call repeatedly.
    ///
    /// Captures already in flight are still persisted when they arrive.
    pub fn on_screen_dismissing(&mut self) {
        if self.stopped {
            log::debug!("Capture session already stopped");
            return;
        }
        self.stopped = true;
        self.camera.stop();
        log::info!("Capture session stopped ({} capture(s) in flight)", self.pending.len());
        self.emit(ControllerEvent::SessionStopped);
    }

    /// Apply every capture result that has arrived. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.on_capture_completed(completion);
            handled += 1;
        }
        handled
    }

    /// Channel capture results arrive on, for use with `select!`.
    pub fn completions(&self) -> Receiver<CaptureCompletion> {
        self.completion_rx.clone()
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn point(&self, label: PointLabel) -> Option<&CalibrationPoint> {
        self.points.iter().find(|p| p.label == label)
    }

    pub fn layout(&self) -> &CalibrationLayout {
        &self.layout
    }

    /// Points still on screen
    pub fn active_count(&self) -> usize {
        self.points.iter().filter(|p| p.active).count()
    }

    pub fn current(&self) -> Option<PointLabel> {
        self.current
    }

    /// Captures requested but not yet completed
    pub fn pending_captures(&self) -> usize {
        self.pending.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Whether the collection-complete event has fired
    pub fn is_complete(&self) -> bool {
        self.complete_emitted
    }

    pub fn preview(&self) -> Option<PreviewHandle> {
        self.camera.preview()
    }

    fn persist(&self, label: PointLabel, image: &CapturedImage) -> Result<PathBuf, PersistError> {
        let dir = self.sink.capture_dir();
        self.sink.ensure_directory(&dir)?;

        let name = CaptureFileName::generate(label);
        log::info!("Saving photo as {}", name);
        let path = dir.join(name.to_string());
        self.sink.write_file(&path, &image.bytes)?;
        Ok(path)
    }

    fn check_complete(&mut self) {
        if self.complete_emitted || self.points.is_empty() || !self.pending.is_empty() {
            return;
        }
        if self.points.iter().all(|p| !p.active) {
            self.complete_emitted = true;
            log::info!("Data collection complete");
            self.emit(ControllerEvent::CollectionComplete);
        }
    }

    fn emit(&self, event: ControllerEvent) {
        if self.events.send(event).is_err() {
            log::debug!("No listener for controller events");
        }
    }
}

impl CaptureDelegate for CaptureController {
    fn on_capture_completed(&mut self, completion: CaptureCompletion) {
        let CaptureCompletion { id, result } = completion;
        let label = match self.pending.remove(&id) {
            Some(label) => label.unwrap_or(PointLabel::Unknown),
            None => {
                log::warn!("Capture {} was not requested by this controller", id);
                PointLabel::Unknown
            }
        };

        match result {
            Err(e) => {
                log::error!("Capture {} for {} failed: {}", id, label, e);
                self.emit(ControllerEvent::CaptureFailed {
                    id,
                    label,
                    error: e.to_string(),
                });
            }
            Ok(image) => match self.persist(label, &image) {
                Ok(path) => {
                    log::info!("Photo saved to: {}", path.display());
                    self.emit(ControllerEvent::PhotoSaved { id, label, path });
                }
                Err(e) => {
                    log::error!("Failed to save photo for {}: {}", label, e);
                    self.emit(ControllerEvent::PersistFailed {
                        id,
                        label,
                        error: e.to_string(),
                    });
                }
            },
        }

        self.check_complete();
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.on_screen_dismissing();
    }
}
