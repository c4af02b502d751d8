//! Camera session module
//!
//! Defines the contract between the capture controller and a camera: start and
//! stop a session, and capture still photos whose results come back later
//! through a [`CaptureTicket`]. Two implementations live here: a nokhwa-backed
//! device camera (feature `camera`) and a simulated camera that synthesises
//! frames on a background thread.

#[cfg(feature = "camera")]
mod native;
mod simulated;

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use thiserror::Error;

#[cfg(feature = "camera")]
pub use native::NativeCamera;
pub use simulated::{SimulatedCamera, SimulatedCameraConfig};

/// Errors reported by a camera session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("camera session is not running")]
    NotRunning,
    #[error("photo capture failed: {0}")]
    CaptureFailed(String),
    #[error("failed to encode photo: {0}")]
    Encode(String),
    #[error("capture request was dropped before it completed")]
    Abandoned,
}

/// Identifier of one capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaptureId(pub u64);

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Encoded still photo delivered by a camera
#[derive(Clone, Debug)]
pub struct CapturedImage {
    /// JPEG bytes
    pub bytes: Vec<u8>,
    /// Image width
    pub width: u32,
    /// Image height
    pub height: u32,
}

/// Result of one capture request, as delivered to the controller.
#[derive(Debug)]
pub struct CaptureCompletion {
    pub id: CaptureId,
    pub result: Result<CapturedImage, CameraError>,
}

/// One-shot completion handle for a capture request.
///
/// A camera completes the ticket exactly once, from any thread. A ticket that is
/// dropped without being completed reports [`CameraError::Abandoned`], so every
/// request produces exactly one [`CaptureCompletion`].
pub struct CaptureTicket {
    id: CaptureId,
    tx: Option<Sender<CaptureCompletion>>,
}

impl CaptureTicket {
    pub(crate) fn new(id: CaptureId, tx: Sender<CaptureCompletion>) -> Self {
        Self { id, tx: Some(tx) }
    }

    /// Request this ticket belongs to
    pub fn id(&self) -> CaptureId {
        self.id
    }

    /// Deliver the capture result.
    pub fn complete(mut self, result: Result<CapturedImage, CameraError>) {
        self.send(result);
    }

    fn send(&mut self, result: Result<CapturedImage, CameraError>) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        if tx.send(CaptureCompletion { id: self.id, result }).is_err() {
            log::debug!("Capture {} completed after its receiver went away", self.id);
        }
    }
}

impl Drop for CaptureTicket {
    fn drop(&mut self) {
        if self.tx.is_some() {
            log::warn!("Capture {} dropped without a result", self.id);
            self.send(Err(CameraError::Abandoned));
        }
    }
}

impl fmt::Debug for CaptureTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureTicket")
            .field("id", &self.id)
            .field("pending", &self.tx.is_some())
            .finish()
    }
}

/// Live preview frame (RGBA)
#[derive(Clone, Debug)]
pub struct PreviewFrame {
    /// RGBA pixel data
    pub rgba: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame number
    pub frame_number: u64,
}

/// Shared slot holding the most recent preview frame.
///
/// The camera thread publishes into it; the presentation layer reads from it.
#[derive(Clone, Default)]
pub struct PreviewHandle {
    slot: Arc<Mutex<Option<Arc<PreviewFrame>>>>,
}

impl PreviewHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest frame
    pub fn publish(&self, frame: PreviewFrame) {
        *self.slot.lock() = Some(Arc::new(frame));
    }

    /// Get the latest frame, if any
    pub fn latest(&self) -> Option<Arc<PreviewFrame>> {
        self.slot.lock().clone()
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }
}

/// A camera session the controller can drive.
pub trait CameraSession: Send {
    /// Open the device and start streaming.
    fn start(&mut self) -> Result<(), CameraError>;

    /// Stop streaming. Safe to call when never started or already stopped.
    fn stop(&mut self);

    /// Whether the session is streaming
    fn is_running(&self) -> bool;

    /// Capture a still photo. Returns immediately; the result is delivered
    /// through the ticket.
    fn capture_photo(&mut self, ticket: CaptureTicket);

    /// Live preview frames, when the camera provides them
    fn preview(&self) -> Option<PreviewHandle> {
        None
    }
}

/// Encode RGBA pixels as a JPEG photo.
pub fn encode_jpeg(
    rgba: Vec<u8>,
    width: u32,
    height: u32,
    quality: u8,
) -> Result<CapturedImage, CameraError> {
    let image = image::RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
        CameraError::Encode(format!("pixel buffer does not match {}x{}", width, height))
    })?;
    let rgb = image::DynamicImage::ImageRgba8(image).to_rgb8();

    let mut bytes = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| CameraError::Encode(e.to_string()))?;

    Ok(CapturedImage {
        bytes,
        width,
        height,
    })
}
