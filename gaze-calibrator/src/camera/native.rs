//! Device camera backed by nokhwa.
//!
//! The device is opened and read on a background thread. Every decoded frame is
//! published to the preview slot; capture requests encode the most recent frame.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

use super::{encode_jpeg, CameraError, CameraSession, CaptureTicket, PreviewFrame, PreviewHandle};

/// How long `start` waits for the device to open
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

enum CameraCommand {
    Capture(CaptureTicket),
}

/// Camera session on a local capture device
pub struct NativeCamera {
    camera_index: u32,
    jpeg_quality: u8,
    preview: PreviewHandle,
    running: Arc<AtomicBool>,
    command_tx: Option<Sender<CameraCommand>>,
    thread_handle: Option<JoinHandle<()>>,
    frame_count: Arc<AtomicU64>,
}

impl NativeCamera {
    /// Create a session for the given device index (0 for default).
    pub fn new(camera_index: u32, jpeg_quality: u8) -> Self {
        Self {
            camera_index,
            jpeg_quality,
            preview: PreviewHandle::new(),
            running: Arc::new(AtomicBool::new(false)),
            command_tx: None,
            thread_handle: None,
            frame_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Frames read since the session started
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    fn open(index: u32) -> Result<Camera, CameraError> {
        let index = CameraIndex::Index(index);

        let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution);
        let mut camera = match Camera::new(index.clone(), requested) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Failed to open camera with highest resolution: {:?}", e);
                let fallback = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::HighestResolution(
                    Resolution::new(640, 480),
                ));
                Camera::new(index, fallback).map_err(|e| CameraError::DeviceUnavailable(e.to_string()))?
            }
        };

        camera
            .open_stream()
            .map_err(|e| CameraError::DeviceUnavailable(format!("failed to open stream: {}", e)))?;

        log::info!(
            "Camera opened: {} ({}x{})",
            camera.info().human_name(),
            camera.resolution().width(),
            camera.resolution().height()
        );
        Ok(camera)
    }

    fn capture_thread(
        camera_index: u32,
        jpeg_quality: u8,
        ready_tx: Sender<Result<(), CameraError>>,
        command_rx: Receiver<CameraCommand>,
        preview: PreviewHandle,
        running: Arc<AtomicBool>,
        frame_count: Arc<AtomicU64>,
    ) {
        log::info!("Starting camera capture thread (camera {})", camera_index);

        let mut camera = match Self::open(camera_index) {
            Ok(mut c) => {
                if ready_tx.send(Ok(())).is_err() {
                    log::warn!("Camera {} opened after start gave up, closing it", camera_index);
                    let _ = c.stop_stream();
                    return;
                }
                c
            }
            Err(e) => {
                log::error!("{}", e);
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        while running.load(Ordering::Acquire) {
            match camera.frame() {
                Ok(frame) => match frame.decode_image::<RgbAFormat>() {
                    Ok(image) => {
                        let frame_number = frame_count.fetch_add(1, Ordering::Relaxed);
                        preview.publish(PreviewFrame {
                            rgba: image.into_raw(),
                            width: frame.resolution().width(),
                            height: frame.resolution().height(),
                            frame_number,
                        });
                    }
                    Err(e) => log::warn!("Failed to decode frame: {:?}", e),
                },
                Err(e) => {
                    log::warn!("Failed to capture frame: {:?}", e);
                    std::thread::sleep(Duration::from_millis(10));
                }
            }

            while let Ok(CameraCommand::Capture(ticket)) = command_rx.try_recv() {
                log::debug!("Capturing photo for request {}", ticket.id());
                let result = match preview.latest() {
                    Some(frame) => encode_jpeg(frame.rgba.clone(), frame.width, frame.height, jpeg_quality),
                    None => Err(CameraError::CaptureFailed("no frame available yet".to_string())),
                };
                ticket.complete(result);
            }
        }

        if let Err(e) = camera.stop_stream() {
            log::warn!("Failed to stop camera stream: {:?}", e);
        }
        preview.clear();
        log::info!("Camera capture thread stopped");
    }
}

impl CameraSession for NativeCamera {
    fn start(&mut self) -> Result<(), CameraError> {
        if self.is_running() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        self.running.store(true, Ordering::Release);

        let camera_index = self.camera_index;
        let jpeg_quality = self.jpeg_quality;
        let preview = self.preview.clone();
        let running = self.running.clone();
        let frame_count = self.frame_count.clone();

        let handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                Self::capture_thread(
                    camera_index,
                    jpeg_quality,
                    ready_tx,
                    command_rx,
                    preview,
                    running,
                    frame_count,
                );
            })
            .map_err(|e| CameraError::DeviceUnavailable(format!("failed to spawn capture thread: {}", e)))?;
        self.thread_handle = Some(handle);

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => {
                self.command_tx = Some(command_tx);
                Ok(())
            }
            Ok(Err(e)) => {
                self.stop();
                Err(e)
            }
            Err(_) => {
                // The thread may still be blocked opening the device. Detach it;
                // it closes the device once it finds nobody waiting.
                self.running.store(false, Ordering::Release);
                self.thread_handle = None;
                Err(CameraError::DeviceUnavailable("timed out opening camera".to_string()))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.command_tx = None;
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            log::info!("Camera stopped after {} frame(s)", self.frame_count());
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && self.command_tx.is_some()
    }

    fn capture_photo(&mut self, ticket: CaptureTicket) {
        let Some(tx) = &self.command_tx else {
            ticket.complete(Err(CameraError::NotRunning));
            return;
        };
        // A closed channel drops the ticket, which reports it as abandoned.
        let _ = tx.send(CameraCommand::Capture(ticket));
    }

    fn preview(&self) -> Option<PreviewHandle> {
        Some(self.preview.clone())
    }
}

impl Drop for NativeCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_missing_device_fails_within_open_timeout() {
        let mut camera = NativeCamera::new(9999, 90);
        let started = Instant::now();
        assert!(matches!(camera.start(), Err(CameraError::DeviceUnavailable(_))));
        assert!(started.elapsed() < OPEN_TIMEOUT + Duration::from_secs(1));
        assert!(!camera.is_running());
        assert_eq!(camera.frame_count(), 0);
    }
}
