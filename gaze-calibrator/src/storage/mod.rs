//! Persistence of captured photos.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::calibration::CaptureFileName;

/// Subdirectory of the storage root that receives calibration photos.
pub const CAPTURE_SUBDIR: &str = "images/cali";

/// Errors raised while persisting a photo.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Filesystem boundary for captured photos.
pub trait PersistenceSink: Send {
    /// Directory photos are written to
    fn capture_dir(&self) -> PathBuf;

    /// Create the directory if it does not exist yet.
    fn ensure_directory(&self, path: &Path) -> Result<(), PersistError>;

    /// Write the file, replacing any previous contents.
    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), PersistError>;
}

/// Sink writing to `<root>/images/cali/`
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Sink rooted at the per-user application data directory, falling back
    /// to the working directory when the platform has none.
    pub fn in_app_data() -> Self {
        let root = dirs::data_dir()
            .map(|d| d.join("gaze-calibrator"))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Photos already stored in the capture directory, sorted by label.
    ///
    /// Files whose names are not capture names are skipped.
    pub fn list_captures(&self) -> std::io::Result<Vec<CaptureFileName>> {
        let dir = self.capture_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut captures = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            match name.to_str().map(str::parse::<CaptureFileName>) {
                Some(Ok(capture)) => captures.push(capture),
                _ => log::debug!("Skipping non-capture file {:?}", name),
            }
        }
        captures.sort_by(|a, b| a.label.as_str().cmp(b.label.as_str()).then(a.id.cmp(&b.id)));
        Ok(captures)
    }
}

impl PersistenceSink for FsSink {
    fn capture_dir(&self) -> PathBuf {
        self.root.join(CAPTURE_SUBDIR)
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), PersistError> {
        if path.is_dir() {
            return Ok(());
        }
        std::fs::create_dir_all(path).map_err(|source| PersistError::CreateDir {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Created directory: {}", path.display());
        Ok(())
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
        std::fs::write(path, bytes).map_err(|source| PersistError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::PointLabel;

    #[test]
    fn test_capture_dir_layout() {
        let sink = FsSink::new("/data/app");
        assert_eq!(sink.capture_dir(), PathBuf::from("/data/app/images/cali"));
    }

    #[test]
    fn test_ensure_directory_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FsSink::new(tmp.path());
        let dir = sink.capture_dir();

        sink.ensure_directory(&dir).unwrap();
        sink.ensure_directory(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_write_and_list_captures() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FsSink::new(tmp.path());
        let dir = sink.capture_dir();
        sink.ensure_directory(&dir).unwrap();

        let first = CaptureFileName::generate(PointLabel::RightTop);
        let second = CaptureFileName::generate(PointLabel::LeftTop);
        sink.write_file(&dir.join(first.to_string()), b"one").unwrap();
        sink.write_file(&dir.join(second.to_string()), b"two").unwrap();
        sink.write_file(&dir.join("notes.txt"), b"ignored").unwrap();

        let listed = sink.list_captures().unwrap();
        assert_eq!(listed, vec![second, first]);
        assert_eq!(std::fs::read(dir.join(second.to_string())).unwrap(), b"two");
    }

    #[test]
    fn test_list_captures_without_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FsSink::new(tmp.path().join("missing"));
        assert!(sink.list_captures().unwrap().is_empty());
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FsSink::new(tmp.path());
        let err = sink
            .write_file(&sink.capture_dir().join("photo.jpg"), b"x")
            .unwrap_err();
        assert!(matches!(err, PersistError::Write { .. }));
    }
}
