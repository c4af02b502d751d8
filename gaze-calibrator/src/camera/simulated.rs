//! Simulated camera.
//!
//! Synthesises a moving test pattern on a background thread so the whole
//! capture flow can run without a device. Captures can be delayed and made to
//! fail on a schedule.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};

use super::{encode_jpeg, CameraError, CameraSession, CaptureTicket, PreviewFrame, PreviewHandle};

/// Settings for the simulated camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedCameraConfig {
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Delay between a capture request and its result, in milliseconds
    pub latency_ms: u64,
    /// Every n-th capture fails
    pub fail_every: Option<u32>,
    /// Refuse to start, as if no device were present
    pub unavailable: bool,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for SimulatedCameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            latency_ms: 30,
            fail_every: None,
            unavailable: false,
            jpeg_quality: 100,
        }
    }
}

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Camera session producing synthetic frames
pub struct SimulatedCamera {
    config: SimulatedCameraConfig,
    preview: PreviewHandle,
    running: Arc<AtomicBool>,
    command_tx: Option<Sender<CaptureTicket>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SimulatedCamera {
    pub fn new(config: SimulatedCameraConfig) -> Self {
        Self {
            config,
            preview: PreviewHandle::new(),
            running: Arc::new(AtomicBool::new(false)),
            command_tx: None,
            thread_handle: None,
        }
    }

    /// Render the test pattern for a frame number
    fn render(width: u32, height: u32, frame_number: u64) -> Vec<u8> {
        let bar = (frame_number * 4 % width.max(1) as u64) as u32;
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let r = (x * 255 / width.max(1)) as u8;
                let g = (y * 255 / height.max(1)) as u8;
                let b = if x.abs_diff(bar) < 8 { 255 } else { 64 };
                rgba.extend_from_slice(&[r, g, b, 255]);
            }
        }
        rgba
    }

    fn capture_thread(
        config: SimulatedCameraConfig,
        command_rx: Receiver<CaptureTicket>,
        preview: PreviewHandle,
        running: Arc<AtomicBool>,
    ) {
        log::info!("Simulated camera started ({}x{})", config.width, config.height);

        let mut frame_number: u64 = 0;
        let mut captures: u32 = 0;

        while running.load(Ordering::Acquire) {
            preview.publish(PreviewFrame {
                rgba: Self::render(config.width, config.height, frame_number),
                width: config.width,
                height: config.height,
                frame_number,
            });
            frame_number += 1;

            match command_rx.recv_timeout(FRAME_INTERVAL) {
                Ok(ticket) => {
                    captures += 1;
                    log::debug!("Simulated capture {} for request {}", captures, ticket.id());
                    std::thread::sleep(Duration::from_millis(config.latency_ms));

                    let fail = config.fail_every.is_some_and(|n| n > 0 && captures % n == 0);
                    let result = if fail {
                        Err(CameraError::CaptureFailed(format!("simulated failure on capture {}", captures)))
                    } else {
                        match preview.latest() {
                            Some(frame) => {
                                encode_jpeg(frame.rgba.clone(), frame.width, frame.height, config.jpeg_quality)
                            }
                            None => Err(CameraError::CaptureFailed("no frame available yet".to_string())),
                        }
                    };
                    ticket.complete(result);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        preview.clear();
        log::info!("Simulated camera stopped");
    }
}

impl CameraSession for SimulatedCamera {
    fn start(&mut self) -> Result<(), CameraError> {
        if self.config.unavailable {
            return Err(CameraError::DeviceUnavailable("simulated camera marked unavailable".to_string()));
        }
        if self.is_running() {
            return Ok(());
        }

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        self.running.store(true, Ordering::Release);

        let config = self.config.clone();
        let preview = self.preview.clone();
        let running = self.running.clone();
        let handle = std::thread::Builder::new()
            .name("simulated-camera".to_string())
            .spawn(move || Self::capture_thread(config, command_rx, preview, running))
            .map_err(|e| CameraError::DeviceUnavailable(format!("failed to spawn camera thread: {}", e)))?;

        self.command_tx = Some(command_tx);
        self.thread_handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.command_tx = None;
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    fn is_running(&self) -> bool {
        self.command_tx.is_some()
    }

    fn capture_photo(&mut self, ticket: CaptureTicket) {
        let Some(tx) = &self.command_tx else {
            ticket.complete(Err(CameraError::NotRunning));
            return;
        };
        let _ = tx.send(ticket);
    }

    fn preview(&self) -> Option<PreviewHandle> {
        Some(self.preview.clone())
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CaptureId;

    fn fast_config() -> SimulatedCameraConfig {
        SimulatedCameraConfig {
            width: 32,
            height: 24,
            latency_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_capture_produces_jpeg() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut camera = SimulatedCamera::new(fast_config());
        camera.start().unwrap();
        camera.capture_photo(CaptureTicket::new(CaptureId(1), tx));

        let completion = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let photo = completion.result.unwrap();
        assert_eq!((photo.width, photo.height), (32, 24));
        assert_eq!(&photo.bytes[..2], &[0xFF, 0xD8]);
        camera.stop();
    }

    #[test]
    fn test_fail_every() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut camera = SimulatedCamera::new(SimulatedCameraConfig {
            fail_every: Some(2),
            ..fast_config()
        });
        camera.start().unwrap();
        for id in 1..=4 {
            camera.capture_photo(CaptureTicket::new(CaptureId(id), tx.clone()));
        }

        let outcomes: Vec<bool> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap().result.is_ok())
            .collect();
        assert_eq!(outcomes, vec![true, false, true, false]);
    }

    #[test]
    fn test_unavailable_device() {
        let mut camera = SimulatedCamera::new(SimulatedCameraConfig {
            unavailable: true,
            ..fast_config()
        });
        assert!(matches!(camera.start(), Err(CameraError::DeviceUnavailable(_))));
        assert!(!camera.is_running());
    }

    #[test]
    fn test_capture_when_stopped() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut camera = SimulatedCamera::new(fast_config());
        camera.stop();
        camera.stop();
        camera.capture_photo(CaptureTicket::new(CaptureId(9), tx));
        assert_eq!(rx.try_recv().unwrap().result.unwrap_err(), CameraError::NotRunning);
    }

    #[test]
    fn test_preview_frames_published() {
        let mut camera = SimulatedCamera::new(fast_config());
        let preview = camera.preview().unwrap();
        camera.start().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while preview.latest().is_none() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let frame = preview.latest().unwrap();
        assert_eq!(frame.rgba.len(), 32 * 24 * 4);
        camera.stop();
        assert!(preview.latest().is_none());
    }

    #[test]
    fn test_preview_advances_during_captures() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut camera = SimulatedCamera::new(fast_config());
        let preview = camera.preview().unwrap();
        camera.start().unwrap();
        for id in 1..=5 {
            camera.capture_photo(CaptureTicket::new(CaptureId(id), tx.clone()));
        }
        for _ in 0..5 {
            assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap().result.is_ok());
        }

        // One frame is published before each capture is taken.
        assert!(preview.latest().unwrap().frame_number >= 4);
        camera.stop();
    }
}
