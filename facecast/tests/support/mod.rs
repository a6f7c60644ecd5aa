#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use facecast::prelude::*;

pub fn gpu_tests_enabled() -> bool {
    std::env::var("FACECAST_RUN_GPU_TESTS")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// In-memory frames handed out in order, then end of stream.
pub struct FrameQueue {
    frames: VecDeque<Pixels>,
}

impl FrameQueue {
    pub fn new(frames: impl IntoIterator<Item = Pixels>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    /// `count` solid frames whose red channel is the frame index.
    pub fn numbered(count: u8, width: u32, height: u32) -> Self {
        Self::new(
            (0..count)
                .map(|i| Pixels::filled(width, height, [i, 0, 0, 255])),
        )
    }
}

impl FrameSource for FrameQueue {
    fn read(&mut self) -> Option<Pixels> {
        self.frames.pop_front()
    }

    fn describe(&self) -> String {
        format!("{} queued frames", self.frames.len())
    }
}

/// Stands in for the GPU context and records what the loop asked of it.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    pub resizes: Vec<[u32; 2]>,
    pub presents: usize,
    pub released: bool,
    pub uploads: Vec<(String, NodeUpdate)>,
    pub draws: Vec<(String, Rect)>,
}

impl RecordingPresenter {
    pub fn uploads_for(&self, label: &str) -> Vec<&NodeUpdate> {
        self.uploads
            .iter()
            .filter(|(name, _)| name == label)
            .map(|(_, update)| update)
            .collect()
    }

    pub fn last_draw(&self, label: &str) -> Option<Rect> {
        self.draws
            .iter()
            .rev()
            .find(|(name, _)| name == label)
            .map(|(_, rect)| *rect)
    }
}

impl Presenter for RecordingPresenter {
    fn resize(&mut self, size: [u32; 2]) {
        self.resizes.push(size);
    }

    fn begin_frame(&mut self) -> bool {
        true
    }

    fn present(&mut self) {
        self.presents += 1;
    }

    fn release_resources(&mut self) {
        self.released = true;
    }
}

/// Drawable that logs its uploads and viewports into the presenter.
pub struct Recorder(pub &'static str);

impl Drawable<RecordingPresenter, NodeUpdate> for Recorder {
    fn upload(
        &mut self,
        ctx: &mut RecordingPresenter,
        pending: Option<NodeUpdate>,
    ) {
        if let Some(update) = pending {
            ctx.uploads.push((self.0.to_string(), update));
        }
    }

    fn draw(&mut self, ctx: &mut RecordingPresenter, args: &DrawArgs) {
        ctx.draws.push((self.0.to_string(), args.viewport));
    }
}

pub fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    done()
}
