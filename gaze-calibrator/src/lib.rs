//! Gaze Calibrator - tap-to-capture calibration photo collection
//!
//! Shows a live camera preview with nine calibration points. Each tap on a
//! point captures a photo labelled with that point; a point disappears after
//! three taps, and collection is complete once all nine are gone. Photos are
//! stored as `images/cali/photo_<label>_<uuid>.jpg` under the storage root.

pub mod calibration;
pub mod camera;
pub mod config;
pub mod session;
pub mod storage;
#[cfg(feature = "gui")]
pub mod ui;

pub use calibration::{CaptureController, ControllerEvent, PointLabel};
pub use config::CalibratorConfig;
pub use session::CalibrationWorker;
