//! Calibration points and their labels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Taps after which a point is removed.
pub const TAPS_PER_POINT: u32 = 3;

/// Label of a calibration point, used in capture file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointLabel {
    LeftTop,
    LeftMiddle,
    LeftBottom,
    RightTop,
    RightMiddle,
    RightBottom,
    CenterTop,
    CenterBottom,
    CenterCenter,
    /// Placeholder for a capture with no originating point
    Unknown,
}

impl PointLabel {
    /// The nine on-screen points, in display order.
    pub const ALL: [PointLabel; 9] = [
        PointLabel::LeftTop,
        PointLabel::LeftMiddle,
        PointLabel::LeftBottom,
        PointLabel::RightTop,
        PointLabel::RightMiddle,
        PointLabel::RightBottom,
        PointLabel::CenterTop,
        PointLabel::CenterBottom,
        PointLabel::CenterCenter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PointLabel::LeftTop => "left_top",
            PointLabel::LeftMiddle => "left_middle",
            PointLabel::LeftBottom => "left_bottom",
            PointLabel::RightTop => "right_top",
            PointLabel::RightMiddle => "right_middle",
            PointLabel::RightBottom => "right_bottom",
            PointLabel::CenterTop => "center_top",
            PointLabel::CenterBottom => "center_bottom",
            PointLabel::CenterCenter => "center_center",
            PointLabel::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PointLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PointLabel::ALL
            .iter()
            .chain(std::iter::once(&PointLabel::Unknown))
            .find(|label| label.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown calibration point label: {}", s))
    }
}

/// Progress of a single point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointState {
    Untapped,
    /// Tapped this many times, still on screen
    Tapped(u32),
    Removed,
}

/// One on-screen calibration target
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationPoint {
    pub label: PointLabel,
    /// Screen position of the point's center
    pub position: (f32, f32),
    pub tap_count: u32,
    pub active: bool,
}

impl CalibrationPoint {
    pub fn new(label: PointLabel, position: (f32, f32)) -> Self {
        Self {
            label,
            position,
            tap_count: 0,
            active: true,
        }
    }

    /// Count a tap. Returns true when this tap removed the point.
    pub fn register_tap(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.tap_count += 1;
        if self.tap_count >= TAPS_PER_POINT {
            self.active = false;
            return true;
        }
        false
    }

    pub fn state(&self) -> PointState {
        match (self.active, self.tap_count) {
            (false, _) => PointState::Removed,
            (true, 0) => PointState::Untapped,
            (true, n) => PointState::Tapped(n),
        }
    }
}
