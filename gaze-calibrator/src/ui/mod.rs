//! Calibration screen: camera preview with nine tap targets.

use egui::{Color32, Pos2, Rect, Vec2};

use crate::calibration::ControllerEvent;
use crate::session::CalibrationWorker;

const DOT_COLOR: Color32 = Color32::WHITE;

/// UV rectangle that fills `target` with a `frame`-sized image, cropping the
/// overflowing axis equally on both sides.
pub fn aspect_fill_uv(frame: Vec2, target: Vec2) -> Rect {
    if frame.x <= 0.0 || frame.y <= 0.0 || target.x <= 0.0 || target.y <= 0.0 {
        return Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
    }
    let scale = (target.x / frame.x).max(target.y / frame.y);
    let visible_u = (target.x / scale) / frame.x;
    let visible_v = (target.y / scale) / frame.y;
    let u0 = (1.0 - visible_u) / 2.0;
    let v0 = (1.0 - visible_v) / 2.0;
    Rect::from_min_max(Pos2::new(u0, v0), Pos2::new(u0 + visible_u, v0 + visible_v))
}

/// eframe application hosting a calibration session
pub struct CalibrationApp {
    worker: CalibrationWorker,
    preview_texture: Option<egui::TextureHandle>,
    last_frame_number: Option<u64>,
    screen_size: Vec2,
    /// Collection finished, show the completion dialog
    complete: bool,
    /// Last problem worth showing on screen
    status: Option<String>,
}

impl CalibrationApp {
    /// Wrap a worker; starts its camera session.
    pub fn new(worker: CalibrationWorker) -> Self {
        worker.start();
        Self {
            worker,
            preview_texture: None,
            last_frame_number: None,
            screen_size: Vec2::ZERO,
            complete: false,
            status: None,
        }
    }

    fn handle_events(&mut self) {
        for event in self.worker.poll_events() {
            match event {
                ControllerEvent::CollectionComplete => self.complete = true,
                ControllerEvent::SessionFailed { error } => {
                    self.status = Some(format!("Camera unavailable: {}", error));
                }
                ControllerEvent::PersistFailed { label, error, .. } => {
                    self.status = Some(format!("Could not save photo for {}: {}", label, error));
                }
                ControllerEvent::PhotoSaved { .. } => self.status = None,
                _ => {}
            }
        }
    }

    fn update_preview(&mut self, ctx: &egui::Context) {
        let Some(frame) = self.worker.preview().and_then(|p| p.latest()) else {
            return;
        };
        if self.last_frame_number == Some(frame.frame_number) {
            return;
        }
        self.last_frame_number = Some(frame.frame_number);

        let image = egui::ColorImage::from_rgba_unmultiplied(
            [frame.width as usize, frame.height as usize],
            &frame.rgba,
        );
        match &mut self.preview_texture {
            Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
            None => {
                self.preview_texture = Some(ctx.load_texture("camera-preview", image, egui::TextureOptions::LINEAR));
            }
        }
    }

    fn show_complete_dialog(&mut self, ctx: &egui::Context) {
        egui::Window::new("Done")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label("Data collection complete");
                if ui.button("OK").clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });
    }
}

impl eframe::App for CalibrationApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_events();
        self.update_preview(ctx);

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| {
                let rect = ui.max_rect();
                if rect.size() != self.screen_size {
                    self.screen_size = rect.size();
                    self.worker.resize(rect.width(), rect.height());
                }

                let painter = ui.painter();
                if let (Some(texture), Some(frame)) = (&self.preview_texture, self.worker.preview().and_then(|p| p.latest())) {
                    let uv = aspect_fill_uv(Vec2::new(frame.width as f32, frame.height as f32), rect.size());
                    painter.image(texture.id(), rect, uv, Color32::WHITE);
                }

                let response = ui.interact(rect, ui.id().with("calibration-surface"), egui::Sense::click());
                if response.clicked() && !self.complete {
                    if let Some(pos) = response.interact_pointer_pos() {
                        let local = pos - rect.min;
                        self.worker.tap_at(local.x, local.y);
                    }
                }

                let radius = self.worker.layout().point_radius;
                for point in self.worker.points().iter().filter(|p| p.active) {
                    let center = rect.min + Vec2::new(point.position.0, point.position.1);
                    painter.circle_filled(center, radius, DOT_COLOR);
                }

                if let Some(status) = &self.status {
                    painter.text(
                        rect.center_bottom() - Vec2::new(0.0, 24.0),
                        egui::Align2::CENTER_CENTER,
                        status,
                        egui::FontId::proportional(16.0),
                        Color32::LIGHT_RED,
                    );
                }
            });

        if self.complete {
            self.show_complete_dialog(ctx);
        }

        ctx.request_repaint();
    }
}

impl Drop for CalibrationApp {
    fn drop(&mut self) {
        self.worker.dismiss();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Rect, b: Rect) -> bool {
        (a.min - b.min).length() < 1e-5 && (a.max - b.max).length() < 1e-5
    }

    #[test]
    fn test_aspect_fill_matching_aspect() {
        let uv = aspect_fill_uv(Vec2::new(640.0, 480.0), Vec2::new(1280.0, 960.0));
        assert!(approx(uv, Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0))));
    }

    #[test]
    fn test_aspect_fill_crops_sides_of_wide_frame() {
        // Wide camera frame on a tall screen keeps the middle quarter of the width.
        let uv = aspect_fill_uv(Vec2::new(800.0, 400.0), Vec2::new(200.0, 400.0));
        assert!(approx(uv, Rect::from_min_max(Pos2::new(0.375, 0.0), Pos2::new(0.625, 1.0))));
    }

    #[test]
    fn test_aspect_fill_degenerate_sizes() {
        let uv = aspect_fill_uv(Vec2::ZERO, Vec2::new(100.0, 100.0));
        assert!(approx(uv, Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0))));
    }
}
