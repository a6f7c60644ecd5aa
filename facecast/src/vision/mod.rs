//! Capture, detection and annotation. Everything here runs on the vision
//! task thread; results reach the GPU thread only through node handles.

pub mod annotate;
pub mod cascade;
pub mod prepare;
pub mod sources;

use log::{debug, info, warn};

use crate::framework::pixels::Pixels;
use crate::overlay::NodeUpdate;
use crate::runtime::events::{EventSink, UserEvent};
use crate::runtime::scheduler::TaskBody;
use crate::scene::NodeHandle;

use self::annotate::AnnotateStyle;
use self::prepare::{BlurSettings, LumaImage};
use self::sources::FrameSource;

/// Pixel rectangle in frame coordinates.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> [f32; 2] {
        [
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        ]
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Detection {
    pub face: Option<Region>,
    /// Eye regions in frame coordinates, at most two.
    pub eyes: Vec<Region>,
}

impl Detection {
    /// A face only counts once both eyes were found inside it.
    pub fn is_valid(&self) -> bool {
        self.face.is_some() && self.eyes.len() >= 2
    }
}

/// What the avatar needs from one vision tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Tracking {
    pub detection: Detection,
    pub frame_size: [u32; 2],
}

impl Tracking {
    /// Face centre normalised to 0..1 in both axes, top-left origin.
    pub fn face_position(&self) -> Option<[f32; 2]> {
        let [width, height] = self.frame_size;
        if !self.detection.is_valid() || width == 0 || height == 0 {
            return None;
        }
        let [x, y] = self.detection.face?.center();
        Some([x / width as f32, y / height as f32])
    }
}

pub trait Detector: Send + 'static {
    fn detect(&mut self, image: &LumaImage) -> Detection;
}

impl<F> Detector for F
where
    F: FnMut(&LumaImage) -> Detection + Send + 'static,
{
    fn detect(&mut self, image: &LumaImage) -> Detection {
        self(image)
    }
}

/// Never finds a face.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&mut self, _image: &LumaImage) -> Detection {
        Detection::default()
    }
}

#[derive(Clone, Debug, Default)]
pub struct PipelineState {
    pub frame: Option<Pixels>,
    pub detection: Detection,
    pub frames_read: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisionSettings {
    pub blur: BlurSettings,
    pub annotate: bool,
    pub style: AnnotateStyle,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            blur: BlurSettings::default(),
            annotate: true,
            style: AnnotateStyle::default(),
        }
    }
}

/// The vision tick: capture, detect, annotate, hand off.
pub struct VisionTask<S: EventSink> {
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
    settings: VisionSettings,
    state: PipelineState,
    background: NodeHandle<NodeUpdate>,
    avatar: NodeHandle<NodeUpdate>,
    sink: S,
}

impl<S: EventSink> VisionTask<S> {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        settings: VisionSettings,
        background: NodeHandle<NodeUpdate>,
        avatar: NodeHandle<NodeUpdate>,
        sink: S,
    ) -> Self {
        Self {
            source,
            detector,
            settings,
            state: PipelineState::default(),
            background,
            avatar,
            sink,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }
}

impl<S: EventSink> TaskBody for VisionTask<S> {
    fn setup(&mut self) -> Result<(), String> {
        info!("Vision reading from {}", self.source.describe());
        Ok(())
    }

    fn tick(&mut self) -> bool {
        let Some(mut frame) = self.source.read() else {
            info!(
                "End of stream from {} after {} frames",
                self.source.describe(),
                self.state.frames_read
            );
            return false;
        };
        self.state.frames_read += 1;

        let image = prepare::prepare(&frame, &self.settings.blur);
        let detection = self.detector.detect(&image);

        if self.settings.annotate {
            annotate::annotate(&mut frame, &detection, &self.settings.style);
        }
        if detection.is_valid() {
            debug!("Face at {:?}", detection.face);
        }

        let tracking = Tracking {
            detection: detection.clone(),
            frame_size: frame.size(),
        };

        if self.background.post(NodeUpdate::Frame(frame.clone())).is_some() {
            debug!("Dropped an unconsumed frame");
        }
        self.avatar.post(NodeUpdate::Tracking(tracking));

        self.state.frame = Some(frame);
        self.state.detection = detection;

        let ids = vec![self.background.id(), self.avatar.id()];
        if !self.sink.post(UserEvent::FrameReady(ids)) {
            warn!("Event loop closed, stopping vision");
            return false;
        }
        true
    }

    fn cleanup(&mut self) {
        info!("Vision stopped after {} frames", self.state.frames_read);
    }
}
