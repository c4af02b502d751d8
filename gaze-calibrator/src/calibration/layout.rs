//! Screen placement of the nine calibration points.

use serde::{Deserialize, Serialize};

use super::point::{CalibrationPoint, PointLabel};

/// Placement rules for the calibration grid.
///
/// Columns sit `inset_x` from the left and right edges and at the horizontal
/// center; rows sit `inset_y` from the top and bottom edges and at the vertical
/// center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationLayout {
    /// Horizontal distance of the outer columns from the screen edge
    pub inset_x: f32,
    /// Vertical distance of the outer rows from the screen edge
    pub inset_y: f32,
    /// Radius of a drawn point, also its hit radius
    pub point_radius: f32,
}

impl Default for CalibrationLayout {
    fn default() -> Self {
        Self {
            inset_x: 50.0,
            inset_y: 100.0,
            point_radius: 20.0,
        }
    }
}

impl CalibrationLayout {
    /// Center of a point on a screen of the given size.
    ///
    /// `Unknown` has no place on screen and resolves to the screen center.
    pub fn position(&self, label: PointLabel, width: f32, height: f32) -> (f32, f32) {
        let left = self.inset_x;
        let right = width - self.inset_x;
        let center_x = width / 2.0;
        let top = self.inset_y;
        let bottom = height - self.inset_y;
        let middle = height / 2.0;

        match label {
            PointLabel::LeftTop => (left, top),
            PointLabel::LeftMiddle => (left, middle),
            PointLabel::LeftBottom => (left, bottom),
            PointLabel::RightTop => (right, top),
            PointLabel::RightMiddle => (right, middle),
            PointLabel::RightBottom => (right, bottom),
            PointLabel::CenterTop => (center_x, top),
            PointLabel::CenterBottom => (center_x, bottom),
            PointLabel::CenterCenter | PointLabel::Unknown => (center_x, middle),
        }
    }

    /// Fresh set of nine points for a screen of the given size.
    pub fn points(&self, width: f32, height: f32) -> Vec<CalibrationPoint> {
        PointLabel::ALL
            .iter()
            .map(|&label| CalibrationPoint::new(label, self.position(label, width, height)))
            .collect()
    }

    /// Move existing points to a new screen size, keeping their progress.
    pub fn relayout(&self, points: &mut [CalibrationPoint], width: f32, height: f32) {
        for point in points {
            point.position = self.position(point.label, width, height);
        }
    }

    /// Active point under a screen position
    pub fn hit_test<'a>(&self, points: &'a [CalibrationPoint], x: f32, y: f32) -> Option<&'a CalibrationPoint> {
        let radius_sq = self.point_radius * self.point_radius;
        points
            .iter()
            .filter(|p| p.active)
            .find(|p| {
                let dx = p.position.0 - x;
                let dy = p.position.1 - y;
                dx * dx + dy * dy <= radius_sq
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_positions() {
        let layout = CalibrationLayout::default();
        let points = layout.points(400.0, 800.0);
        assert_eq!(points.len(), 9);

        let at = |label: PointLabel| points.iter().find(|p| p.label == label).unwrap().position;
        assert_eq!(at(PointLabel::LeftTop), (50.0, 100.0));
        assert_eq!(at(PointLabel::LeftMiddle), (50.0, 400.0));
        assert_eq!(at(PointLabel::RightBottom), (350.0, 700.0));
        assert_eq!(at(PointLabel::CenterTop), (200.0, 100.0));
        assert_eq!(at(PointLabel::CenterCenter), (200.0, 400.0));
        assert!(points.iter().all(|p| p.active && p.tap_count == 0));
    }

    #[test]
    fn test_hit_test_skips_removed_points() {
        let layout = CalibrationLayout::default();
        let mut points = layout.points(400.0, 800.0);

        let hit = layout.hit_test(&points, 55.0, 95.0).unwrap();
        assert_eq!(hit.label, PointLabel::LeftTop);
        assert!(layout.hit_test(&points, 120.0, 250.0).is_none());

        points[0].active = false;
        assert!(layout.hit_test(&points, 55.0, 95.0).is_none());
    }

    #[test]
    fn test_relayout_keeps_progress() {
        let layout = CalibrationLayout::default();
        let mut points = layout.points(400.0, 800.0);
        points[3].tap_count = 2;

        layout.relayout(&mut points, 1000.0, 600.0);
        assert_eq!(points[3].position, (950.0, 100.0));
        assert_eq!(points[3].tap_count, 2);
    }
}
