//! Zoom and pan transform between grid content space and screen space

use serde::{Deserialize, Serialize};

use super::Rect;
use crate::constants::zoom;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub zoom: f32,
    pub pan_x: f32,
    pub pan_y: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: zoom::DEFAULT,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

impl Viewport {
    pub fn set_zoom(&mut self, value: f32) {
        self.zoom = value.clamp(zoom::MIN, zoom::MAX);
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom + zoom::STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom - zoom::STEP);
    }

    /// Zoom by `steps` while keeping the content under `(screen_x, screen_y)` fixed
    pub fn zoom_at(&mut self, screen_x: f32, screen_y: f32, steps: f32) {
        let (content_x, content_y) = self.to_content(screen_x, screen_y);
        self.set_zoom(self.zoom + steps * zoom::STEP);
        self.pan_x = screen_x - content_x * self.zoom;
        self.pan_y = screen_y - content_y * self.zoom;
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Largest zoom at which `content_width x content_height` fits the screen
    pub fn fit_to(&mut self, content_width: f32, content_height: f32, screen_width: f32, screen_height: f32) {
        if content_width <= 0.0 || content_height <= 0.0 {
            self.reset();
            return;
        }
        let scale = (screen_width / content_width).min(screen_height / content_height);
        self.set_zoom(scale.min(zoom::DEFAULT));
        self.pan_x = (screen_width - content_width * self.zoom) / 2.0;
        self.pan_y = 0.0;
    }

    pub fn to_screen(&self, rect: Rect) -> Rect {
        Rect {
            x: rect.x * self.zoom + self.pan_x,
            y: rect.y * self.zoom + self.pan_y,
            width: rect.width * self.zoom,
            height: rect.height * self.zoom,
        }
    }

    pub fn to_content(&self, screen_x: f32, screen_y: f32) -> (f32, f32) {
        ((screen_x - self.pan_x) / self.zoom, (screen_y - self.pan_y) / self.zoom)
    }
}
