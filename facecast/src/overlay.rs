//! The two concrete layers: the camera feed and the avatar above it.

use glam::Mat4;
use log::{debug, warn};

use crate::avatar::{self, Avatar};
use crate::error::{SetupError, TextureError};
use crate::framework::pixels::Pixels;
use crate::render::texture::{TextureBackend, TextureManager};
use crate::render::{Gpu, Sprite, TextureId};
use crate::scene::{DrawArgs, Drawable, Layout, Node, NodeHandle, SceneGraph};
use crate::vision::Tracking;

/// Payload the vision task posts into overlay nodes.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeUpdate {
    Frame(Pixels),
    Tracking(Tracking),
}

/// Copies `frame` into the texture behind `id`. Frames whose size differs
/// from the allocation are dropped; the previous contents stay on screen.
pub fn upload_frame<B: TextureBackend>(
    textures: &TextureManager<B>,
    id: TextureId,
    frame: &Pixels,
) -> bool {
    let [width, height] = frame.size();
    match textures.update_region(id, frame.data(), width, height) {
        Ok(()) => true,
        Err(err @ TextureError::DimensionMismatch { .. }) => {
            warn!("Dropping camera frame: {}", err);
            false
        }
        Err(err) => {
            warn!("Camera texture unavailable: {}", err);
            false
        }
    }
}

/// The camera feed, letterboxed to its own aspect ratio.
pub struct BackgroundNode {
    texture: TextureId,
    sprite: Sprite,
    frames: u64,
}

impl BackgroundNode {
    /// Sizes the texture after `first` and uploads it right away.
    pub fn new(gpu: &Gpu, first: &Pixels) -> Result<Self, SetupError> {
        let texture = gpu
            .textures()
            .create_blank(first.width(), first.height())
            .map_err(|err| {
                SetupError::new(format!(
                    "cannot allocate {}x{} frame texture: {}",
                    first.width(),
                    first.height(),
                    err
                ))
            })?;
        upload_frame(gpu.textures(), texture, first);

        Ok(Self {
            texture,
            sprite: gpu.create_sprite("facecast-background"),
            frames: 1,
        })
    }

    pub fn layout(first: &Pixels) -> Layout {
        Layout::Aspect {
            ratio: first.aspect(),
        }
    }
}

impl Drawable<Gpu, NodeUpdate> for BackgroundNode {
    fn upload(&mut self, gpu: &mut Gpu, pending: Option<NodeUpdate>) {
        match pending {
            Some(NodeUpdate::Frame(frame)) => {
                if upload_frame(gpu.textures(), self.texture, &frame) {
                    self.frames += 1;
                    if self.frames % 240 == 0 {
                        debug!("Uploaded {} camera frames", self.frames);
                    }
                }
            }
            Some(other) => debug!("Background ignores {:?}", other),
            None => {}
        }
    }

    fn draw(&mut self, gpu: &mut Gpu, args: &DrawArgs) {
        gpu.draw_sprite(
            &self.sprite,
            self.texture,
            args.viewport,
            Mat4::IDENTITY,
            [1.0; 4],
        );
    }
}

pub struct AvatarNode {
    avatar: Box<dyn Avatar>,
}

impl AvatarNode {
    pub fn new(avatar: Box<dyn Avatar>) -> Self {
        Self { avatar }
    }
}

impl Drawable<Gpu, NodeUpdate> for AvatarNode {
    fn upload(&mut self, _gpu: &mut Gpu, pending: Option<NodeUpdate>) {
        if let Some(NodeUpdate::Tracking(tracking)) = pending {
            if let Some([x, y]) = tracking.face_position() {
                self.avatar.look_at(x, y);
            }
        }
    }

    fn draw(&mut self, gpu: &mut Gpu, args: &DrawArgs) {
        let projection = avatar::projection(
            self.avatar.canvas_width(),
            args.viewport.width,
            args.viewport.height,
        );
        self.avatar.update(args.delta_seconds);
        self.avatar.draw(gpu, args.viewport, &projection);
    }
}

/// The assembled overlay and the handles the vision task posts through.
pub struct Overlay {
    pub graph: SceneGraph<Gpu, NodeUpdate>,
    pub background: NodeHandle<NodeUpdate>,
    pub avatar: NodeHandle<NodeUpdate>,
}

/// Background first, avatar second, so the avatar paints over the feed.
pub fn build_overlay(
    gpu: &Gpu,
    first_frame: &Pixels,
    avatar: Box<dyn Avatar>,
) -> Result<Overlay, SetupError> {
    let mut graph = SceneGraph::new(gpu.size());
    let root = graph.root();

    let background_node =
        Node::new("background", BackgroundNode::new(gpu, first_frame)?)
            .with_layout(BackgroundNode::layout(first_frame));
    let avatar_node = Node::new("avatar", AvatarNode::new(avatar));
    let background = background_node.handle();
    let avatar = avatar_node.handle();

    for node in [background_node, avatar_node] {
        graph.add_child(root, node).map_err(|err| {
            SetupError::new(format!("cannot assemble overlay: {}", err))
        })?;
    }

    Ok(Overlay {
        graph,
        background,
        avatar,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct Writes(AtomicUsize);

    impl TextureBackend for Writes {
        type Texture = ();

        fn allocate(
            &self,
            _: &str,
            _: u32,
            _: u32,
            _: Option<&[u8]>,
        ) -> Self::Texture {
        }

        fn write(&self, _: &(), _: u32, _: u32, _: &[u8]) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn matching_frames_are_written() {
        let textures = TextureManager::new(Writes::default());
        let id = textures.create_blank(4, 2).expect("blank");

        assert!(upload_frame(&textures, id, &Pixels::new(4, 2)));
        assert_eq!(textures.backend().0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resized_frames_are_dropped() {
        let textures = TextureManager::new(Writes::default());
        let id = textures.create_blank(4, 2).expect("blank");

        assert!(!upload_frame(&textures, id, &Pixels::new(2, 4)));
        assert_eq!(textures.backend().0.load(Ordering::SeqCst), 0);
        let info = textures.info(id).expect("info");
        assert_eq!([info.width, info.height], [4, 2]);
    }

    #[test]
    fn released_texture_is_not_written() {
        let textures = TextureManager::new(Writes::default());
        let id = textures.create_blank(1, 1).expect("blank");
        textures.release_all();

        assert!(!upload_frame(&textures, id, &Pixels::new(1, 1)));
    }

    #[test]
    fn background_keeps_the_frame_aspect() {
        let layout = BackgroundNode::layout(&Pixels::new(640, 480));
        assert!(matches!(
            layout,
            Layout::Aspect { ratio } if (ratio - 4.0 / 3.0).abs() < 1e-6
        ));
    }
}
