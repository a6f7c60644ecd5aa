use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use log::info;
use serde::Deserialize;

use crate::error::SetupError;
use crate::vision::VisionSettings;
use crate::vision::prepare::{BlurSettings, MAX_BLUR_SIZE};

#[derive(Parser, Debug, Default)]
#[command(name = "facecast")]
#[command(about = "Live camera overlay with an animated avatar")]
pub struct Args {
    /// YAML file with defaults for any of the options below
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Camera index (default: 0)
    #[arg(long)]
    pub cam: Option<u32>,

    /// Play a directory of PNG frames instead of a camera
    #[arg(long)]
    pub frames: Option<PathBuf>,

    /// Restart the frame directory when it runs out
    #[arg(long)]
    pub loop_frames: bool,

    /// Gaussian kernel size (default: 5)
    #[arg(long)]
    pub gs: Option<u32>,

    /// Gaussian standard deviation (default: 1.6)
    #[arg(long)]
    pub gd: Option<f32>,

    /// Haar cascade XML for faces. Needs --eyes-cascade as well
    #[arg(long)]
    pub face_cascade: Option<PathBuf>,

    /// Haar cascade XML for eyes. Needs --face-cascade as well
    #[arg(long)]
    pub eyes_cascade: Option<PathBuf>,

    /// Avatar image (default: assets/avatar.png)
    #[arg(long)]
    pub avatar: Option<PathBuf>,

    /// Do not draw detected face and eyes into the feed
    #[arg(long)]
    pub no_annotate: bool,

    /// Vision tick interval (default: 250)
    #[arg(long)]
    pub vision_interval_ms: Option<u64>,

    /// Refresh interval (default: 16)
    #[arg(long)]
    pub render_interval_ms: Option<u64>,

    /// Window title
    #[arg(long)]
    pub title: Option<String>,
}

/// Resolved settings. YAML keys match the long flag names.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub cam: u32,
    pub frames: Option<PathBuf>,
    pub loop_frames: bool,
    pub gs: u32,
    pub gd: f32,
    pub face_cascade: Option<PathBuf>,
    pub eyes_cascade: Option<PathBuf>,
    pub avatar: PathBuf,
    pub no_annotate: bool,
    pub vision_interval_ms: u64,
    pub render_interval_ms: u64,
    pub title: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cam: 0,
            frames: None,
            loop_frames: false,
            gs: 5,
            gd: 1.6,
            face_cascade: None,
            eyes_cascade: None,
            avatar: PathBuf::from("assets/avatar.png"),
            no_annotate: false,
            vision_interval_ms: 250,
            render_interval_ms: 16,
            title: "facecast".to_string(),
        }
    }
}

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    Frames { dir: PathBuf, looping: bool },
    Camera(u32),
}

impl Config {
    /// Loads `--config` when given, then lets explicit flags win.
    pub fn resolve(args: Args) -> Result<Self, SetupError> {
        let mut config = match args.config.as_deref() {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(args);
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, SetupError> {
        let text = fs::read_to_string(path).map_err(|err| {
            SetupError::new(format!(
                "cannot read config '{}': {}",
                path.display(),
                err
            ))
        })?;
        let config = Self::from_yaml(&text).map_err(|err| {
            SetupError::new(format!(
                "invalid config '{}': {}",
                path.display(),
                err
            ))
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yml::from_str(text)
    }

    fn apply(&mut self, args: Args) {
        if let Some(cam) = args.cam {
            self.cam = cam;
            // An explicit camera beats frames from the config file.
            if args.frames.is_none() {
                self.frames = None;
            }
        }
        if args.frames.is_some() {
            self.frames = args.frames;
        }
        self.loop_frames |= args.loop_frames;
        self.no_annotate |= args.no_annotate;
        if let Some(gs) = args.gs {
            self.gs = gs;
        }
        if let Some(gd) = args.gd {
            self.gd = gd;
        }
        if args.face_cascade.is_some() {
            self.face_cascade = args.face_cascade;
        }
        if args.eyes_cascade.is_some() {
            self.eyes_cascade = args.eyes_cascade;
        }
        if let Some(avatar) = args.avatar {
            self.avatar = avatar;
        }
        if let Some(ms) = args.vision_interval_ms {
            self.vision_interval_ms = ms;
        }
        if let Some(ms) = args.render_interval_ms {
            self.render_interval_ms = ms;
        }
        if let Some(title) = args.title {
            self.title = title;
        }
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        if self.vision_interval_ms == 0 {
            return Err(SetupError::new("vision_interval_ms must be above 0"));
        }
        if self.render_interval_ms == 0 {
            return Err(SetupError::new("render_interval_ms must be above 0"));
        }
        if self.gs > MAX_BLUR_SIZE {
            return Err(SetupError::new(format!(
                "gs must be at most {}, got {}",
                MAX_BLUR_SIZE, self.gs
            )));
        }
        if !self.gd.is_finite() || self.gd < 0.0 {
            return Err(SetupError::new(format!(
                "gd must be a non-negative number, got {}",
                self.gd
            )));
        }
        if self.face_cascade.is_some() != self.eyes_cascade.is_some() {
            return Err(SetupError::new(
                "face_cascade and eyes_cascade must be given together",
            ));
        }
        Ok(())
    }

    /// Face and eye cascade paths, when face tracking is configured.
    pub fn cascades(&self) -> Option<(&Path, &Path)> {
        Some((self.face_cascade.as_deref()?, self.eyes_cascade.as_deref()?))
    }

    pub fn source(&self) -> Result<SourceSpec, SetupError> {
        if let Some(dir) = &self.frames {
            return Ok(SourceSpec::Frames {
                dir: dir.clone(),
                looping: self.loop_frames,
            });
        }

        if cfg!(feature = "camera") {
            Ok(SourceSpec::Camera(self.cam))
        } else {
            Err(SetupError::new(format!(
                "camera {} unavailable: built without the `camera` feature, \
                 pass --frames <dir> instead",
                self.cam
            )))
        }
    }

    pub fn vision_settings(&self) -> VisionSettings {
        VisionSettings {
            blur: BlurSettings {
                size: self.gs,
                sigma: self.gd,
            },
            annotate: !self.no_annotate,
            ..VisionSettings::default()
        }
    }

    pub fn vision_interval(&self) -> Duration {
        Duration::from_millis(self.vision_interval_ms)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }
}
