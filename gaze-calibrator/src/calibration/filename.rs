//! Capture file naming: `photo_<label>_<uuid>.jpg`.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use super::point::PointLabel;

const PREFIX: &str = "photo_";
const EXTENSION: &str = ".jpg";

/// Name of a stored calibration photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureFileName {
    pub label: PointLabel,
    pub id: Uuid,
}

impl CaptureFileName {
    /// New name for the label with a fresh random id.
    pub fn generate(label: PointLabel) -> Self {
        Self {
            label,
            id: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for CaptureFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Uuid::encode_buffer();
        let id = self.id.as_hyphenated().encode_upper(&mut buf);
        write!(f, "{}{}_{}{}", PREFIX, self.label, id, EXTENSION)
    }
}

impl FromStr for CaptureFileName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stem = s
            .strip_prefix(PREFIX)
            .and_then(|rest| rest.strip_suffix(EXTENSION))
            .ok_or_else(|| format!("not a capture file name: {}", s))?;
        // Labels contain underscores, the id never does.
        let (label, id) = stem
            .rsplit_once('_')
            .ok_or_else(|| format!("missing id in capture file name: {}", s))?;

        Ok(Self {
            label: label.parse()?,
            id: Uuid::parse_str(id).map_err(|e| format!("bad id in {}: {}", s, e))?,
        })
    }
}
