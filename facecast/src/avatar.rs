use std::path::{Path, PathBuf};

use glam::{Mat4, Vec2, Vec3};
use log::{info, warn};

use crate::error::SetupError;
use crate::framework::pixels::{self, Pixels};
use crate::render::texture::TextureSource;
use crate::render::{Gpu, Sprite, TextureId};
use crate::scene::Rect;

/// The animated character drawn over the camera feed.
pub trait Avatar {
    /// Advances animation by `dt` seconds.
    fn update(&mut self, dt: f32);

    fn draw(
        &mut self,
        gpu: &mut Gpu,
        viewport: Rect,
        projection: &Projection,
    );

    /// Width of the model canvas in model units, where the canvas height is
    /// one unit.
    fn canvas_width(&self) -> f32 {
        1.0
    }

    /// Points the avatar at a face position normalised to 0..1, top-left
    /// origin.
    fn look_at(&mut self, _x: f32, _y: f32) {}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub matrix: Mat4,
    /// Wide models in tall viewports are fitted to a model width of 2 so
    /// they span the viewport horizontally. Otherwise height fills it.
    pub fit_width: bool,
}

/// Maps square model units onto a `width` x `height` viewport.
pub fn projection(canvas_width: f32, width: f32, height: f32) -> Projection {
    if width <= 0.0 || height <= 0.0 {
        return Projection {
            matrix: Mat4::IDENTITY,
            fit_width: false,
        };
    }

    if canvas_width > 1.0 && width < height {
        Projection {
            matrix: Mat4::from_scale(Vec3::new(1.0, width / height, 1.0)),
            fit_width: true,
        }
    } else {
        Projection {
            matrix: Mat4::from_scale(Vec3::new(height / width, 1.0, 1.0)),
            fit_width: false,
        }
    }
}

/// Exponential ease toward a target point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Follow {
    position: Vec2,
    target: Vec2,
    /// Larger settles faster.
    rate: f32,
    /// How far from the centre the avatar may travel, in model units.
    reach: f32,
}

impl Follow {
    pub fn new(rate: f32, reach: f32) -> Self {
        Self {
            position: Vec2::ZERO,
            target: Vec2::ZERO,
            rate,
            reach,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    /// `x` and `y` are normalised frame coordinates with y pointing down.
    pub fn look_at(&mut self, x: f32, y: f32) {
        let x = x.clamp(0.0, 1.0) * 2.0 - 1.0;
        let y = 1.0 - y.clamp(0.0, 1.0) * 2.0;
        self.target = Vec2::new(x, y) * self.reach;
    }

    pub fn update(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let t = 1.0 - (-self.rate * dt).exp();
        self.position = self.position.lerp(self.target, t);
    }
}

impl Default for Follow {
    fn default() -> Self {
        Self::new(4.0, 0.25)
    }
}

const PLACEHOLDER_KEY: &str = "facecast-avatar-placeholder";

/// A PNG drawn as a textured quad that eases toward the tracked face.
pub struct SpriteAvatar {
    path: PathBuf,
    texture: TextureId,
    aspect: f32,
    scale: f32,
    sprite: Sprite,
    follow: Follow,
}

impl SpriteAvatar {
    /// Loads `path` through the texture manager. A missing or broken image
    /// is logged and replaced by a transparent placeholder.
    pub fn new(gpu: &Gpu, path: &Path) -> Result<Self, SetupError> {
        let key = path.to_string_lossy();
        let textures = gpu.textures();

        let texture = match textures.create_or_get(&key, || {
            pixels::load_png(path).map(TextureSource::Pixels)
        }) {
            Ok(id) => id,
            Err(err) => {
                warn!("Using a blank avatar: {}", err);
                textures
                    .create_or_get(PLACEHOLDER_KEY, || {
                        Ok(TextureSource::Pixels(Pixels::new(1, 1)))
                    })
                    .map_err(|err| {
                        SetupError::new(format!(
                            "cannot create avatar placeholder: {}",
                            err
                        ))
                    })?
            }
        };

        let aspect = textures
            .info(texture)
            .map(|info| info.width as f32 / info.height as f32)
            .unwrap_or(1.0);

        info!("Avatar {} (aspect {:.2})", path.display(), aspect);

        Ok(Self {
            path: path.to_path_buf(),
            texture,
            aspect,
            scale: 0.8,
            sprite: gpu.create_sprite("facecast-avatar"),
            follow: Follow::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn model_matrix(&self, fit_width: bool) -> Mat4 {
        let half = if fit_width {
            Vec2::new(1.0, 1.0 / self.aspect)
        } else {
            Vec2::new(self.aspect, 1.0)
        } * self.scale;

        Mat4::from_translation(self.follow.position().extend(0.0))
            * Mat4::from_scale(half.extend(1.0))
    }
}

impl Avatar for SpriteAvatar {
    fn update(&mut self, dt: f32) {
        self.follow.update(dt);
    }

    fn draw(
        &mut self,
        gpu: &mut Gpu,
        viewport: Rect,
        projection: &Projection,
    ) {
        let transform =
            projection.matrix * self.model_matrix(projection.fit_width);
        gpu.draw_sprite(
            &self.sprite,
            self.texture,
            viewport,
            transform,
            [1.0; 4],
        );
    }

    fn canvas_width(&self) -> f32 {
        self.aspect
    }

    fn look_at(&mut self, x: f32, y: f32) {
        self.follow.look_at(x, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale(x: f32, y: f32) -> Mat4 {
        Mat4::from_scale(Vec3::new(x, y, 1.0))
    }

    #[test]
    fn wide_window_squeezes_x() {
        let p = projection(1.0, 800.0, 400.0);
        assert!(!p.fit_width);
        assert_eq!(p.matrix, scale(0.5, 1.0));
    }

    #[test]
    fn wide_model_in_tall_window_fits_width() {
        let p = projection(2.0, 400.0, 800.0);
        assert!(p.fit_width);
        assert_eq!(p.matrix, scale(1.0, 0.5));
    }

    #[test]
    fn narrow_model_in_tall_window_fits_height() {
        let p = projection(1.0, 400.0, 800.0);
        assert!(!p.fit_width);
        assert_eq!(p.matrix, scale(2.0, 1.0));
    }

    #[test]
    fn degenerate_viewport_is_identity() {
        assert_eq!(projection(1.0, 0.0, 600.0).matrix, Mat4::IDENTITY);
    }

    #[test]
    fn follow_eases_toward_target_without_overshoot() {
        let mut follow = Follow::new(4.0, 0.5);
        follow.look_at(1.0, 0.0);
        assert_eq!(follow.target(), Vec2::new(0.5, 0.5));

        let mut last = 0.0;
        for _ in 0..60 {
            follow.update(1.0 / 60.0);
            let x = follow.position().x;
            assert!(x > last && x <= 0.5);
            last = x;
        }
        assert!(follow.position().distance(follow.target()) < 0.02);
    }

    #[test]
    fn follow_centre_maps_to_origin_and_clamps() {
        let mut follow = Follow::new(4.0, 0.25);
        follow.look_at(0.5, 0.5);
        assert_eq!(follow.target(), Vec2::ZERO);

        follow.look_at(-3.0, 7.0);
        assert_eq!(follow.target(), Vec2::new(-0.25, -0.25));
    }

    #[test]
    fn zero_delta_keeps_position() {
        let mut follow = Follow::default();
        follow.look_at(1.0, 1.0);
        follow.update(0.0);
        assert_eq!(follow.position(), Vec2::ZERO);
    }
}
