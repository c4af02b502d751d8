//! Configuration and serialization module.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calibration::CalibrationLayout;
use crate::camera::{CameraSession, SimulatedCamera, SimulatedCameraConfig};
use crate::storage::FsSink;

/// Environment variable pointing at an alternative config file.
pub const CONFIG_ENV: &str = "GAZE_CALIBRATOR_CONFIG";

/// Errors raised while loading or applying configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config for {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Unsupported(String),
}

/// Which camera backs the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CameraBackend {
    /// Local capture device
    Native {
        /// Device index (0 for default)
        index: u32,
        /// JPEG quality (1-100)
        jpeg_quality: u8,
    },
    /// Synthetic frames, no device needed
    Simulated(SimulatedCameraConfig),
}

impl Default for CameraBackend {
    fn default() -> Self {
        if cfg!(feature = "camera") {
            CameraBackend::Native {
                index: 0,
                jpeg_quality: 100,
            }
        } else {
            CameraBackend::Simulated(SimulatedCameraConfig::default())
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibratorConfig {
    /// Root of the photo store; the platform data directory when unset.
    pub storage_root: Option<PathBuf>,
    pub camera: CameraBackend,
    pub layout: CalibrationLayout,
    /// Window width
    pub window_width: u32,
    /// Window height
    pub window_height: u32,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            storage_root: None,
            camera: CameraBackend::default(),
            layout: CalibrationLayout::default(),
            window_width: 1280,
            window_height: 720,
        }
    }
}

impl CalibratorConfig {
    /// Config file location: `$GAZE_CALIBRATOR_CONFIG`, else
    /// `<config dir>/gaze-calibrator/config.json`.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gaze-calibrator")
            .join("config.json")
    }

    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save as pretty-printed JSON, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(io_err)
    }

    /// Photo store for this configuration
    pub fn sink(&self) -> FsSink {
        match &self.storage_root {
            Some(root) => FsSink::new(root),
            None => FsSink::in_app_data(),
        }
    }

    /// Camera session for this configuration
    pub fn camera_session(&self) -> Result<Box<dyn CameraSession>, ConfigError> {
        match &self.camera {
            CameraBackend::Simulated(config) => Ok(Box::new(SimulatedCamera::new(config.clone()))),
            #[cfg(feature = "camera")]
            CameraBackend::Native { index, jpeg_quality } => {
                Ok(Box::new(crate::camera::NativeCamera::new(*index, *jpeg_quality)))
            }
            #[cfg(not(feature = "camera"))]
            CameraBackend::Native { .. } => Err(ConfigError::Unsupported(
                "native camera support is not compiled in (enable the `camera` feature)".to_string(),
            )),
        }
    }
}
