//! Events emitted by the capture controller to the presentation layer.

use std::path::PathBuf;

use crate::camera::CaptureId;

use super::point::PointLabel;

/// Something the presentation layer may react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// A point was tapped; `tap_count` includes this tap
    PointTapped { label: PointLabel, tap_count: u32 },
    /// A capture was handed to the camera
    CaptureRequested { id: CaptureId, label: Option<PointLabel> },
    /// A photo was written
    PhotoSaved { id: CaptureId, label: PointLabel, path: PathBuf },
    /// The camera reported an error instead of a photo
    CaptureFailed { id: CaptureId, label: PointLabel, error: String },
    /// The photo could not be written
    PersistFailed { id: CaptureId, label: PointLabel, error: String },
    /// A point reached its tap limit and left the screen
    PointRemoved { label: PointLabel },
    /// Every point is gone and no capture is outstanding
    CollectionComplete,
    /// The camera could not be started
    SessionFailed { error: String },
    /// The camera was stopped
    SessionStopped,
}

impl ControllerEvent {
    pub fn is_complete(&self) -> bool {
        matches!(self, ControllerEvent::CollectionComplete)
    }
}
