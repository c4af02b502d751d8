//! Calibration points and the tap-to-capture workflow.

mod controller;
mod events;
mod filename;
mod layout;
mod point;

pub use controller::{CaptureController, CaptureDelegate, ControllerError};
pub use events::ControllerEvent;
pub use filename::CaptureFileName;
pub use layout::CalibrationLayout;
pub use point::{CalibrationPoint, PointLabel, PointState, TAPS_PER_POINT};
