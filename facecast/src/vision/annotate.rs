use super::Detection;
use crate::framework::pixels::Pixels;

pub const MAGENTA: [u8; 4] = [255, 0, 255, 255];
pub const BLUE: [u8; 4] = [0, 0, 255, 255];
pub const RED: [u8; 4] = [255, 0, 0, 255];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnotateStyle {
    pub face_color: [u8; 4],
    /// First and second detected eye.
    pub eye_colors: [[u8; 4]; 2],
    pub eye_radius: f32,
    pub thickness: f32,
}

impl Default for AnnotateStyle {
    fn default() -> Self {
        Self {
            face_color: MAGENTA,
            eye_colors: [BLUE, RED],
            eye_radius: 20.0,
            thickness: 4.0,
        }
    }
}

/// Outlines the face and both eyes. Incomplete detections draw nothing.
pub fn annotate(
    frame: &mut Pixels,
    detection: &Detection,
    style: &AnnotateStyle,
) -> bool {
    if !detection.is_valid() {
        return false;
    }
    let Some(face) = detection.face else {
        return false;
    };

    let axes = [face.width as f32 / 2.0, face.height as f32 / 2.0];
    draw_ellipse(frame, face.center(), axes, style.face_color, style.thickness);

    for (eye, color) in detection.eyes.iter().zip(style.eye_colors) {
        draw_circle(
            frame,
            eye.center(),
            style.eye_radius,
            color,
            style.thickness,
        );
    }
    true
}

pub fn draw_circle(
    frame: &mut Pixels,
    center: [f32; 2],
    radius: f32,
    color: [u8; 4],
    thickness: f32,
) {
    draw_ellipse(frame, center, [radius, radius], color, thickness);
}

/// Axis-aligned ellipse outline `thickness` pixels wide, centred on the
/// ideal curve. Pixels outside the frame are skipped.
pub fn draw_ellipse(
    frame: &mut Pixels,
    center: [f32; 2],
    axes: [f32; 2],
    color: [u8; 4],
    thickness: f32,
) {
    let [a, b] = axes;
    if a <= 0.0 || b <= 0.0 || frame.width() == 0 || frame.height() == 0 {
        return;
    }

    let half = (thickness / 2.0).max(0.5);
    let max_x = frame.width() as f32 - 1.0;
    let max_y = frame.height() as f32 - 1.0;
    let x0 = (center[0] - a - half).floor().clamp(0.0, max_x) as u32;
    let x1 = (center[0] + a + half).ceil().clamp(0.0, max_x) as u32;
    let y0 = (center[1] - b - half).floor().clamp(0.0, max_y) as u32;
    let y1 = (center[1] + b + half).ceil().clamp(0.0, max_y) as u32;

    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 - center[0];
            let dy = y as f32 - center[1];
            if distance_to_ellipse(dx, dy, a, b) <= half {
                frame.set_pixel(x, y, color);
            }
        }
    }
}

/// First-order distance estimate: |f| / |grad f| for the implicit curve
/// f = (x/a)^2 + (y/b)^2 - 1.
fn distance_to_ellipse(dx: f32, dy: f32, a: f32, b: f32) -> f32 {
    let f = (dx / a).powi(2) + (dy / b).powi(2) - 1.0;
    let gx = 2.0 * dx / (a * a);
    let gy = 2.0 * dy / (b * b);
    let gradient = (gx * gx + gy * gy).sqrt();

    if gradient <= f32::EPSILON {
        return f32::INFINITY;
    }
    f.abs() / gradient
}
