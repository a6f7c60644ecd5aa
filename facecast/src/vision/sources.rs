use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::SetupError;
use crate::framework::pixels::{self, Pixels};

/// Blocking frame capture. `None` means the stream has ended.
pub trait FrameSource: Send + 'static {
    fn read(&mut self) -> Option<Pixels>;

    fn describe(&self) -> String {
        "frame source".to_string()
    }
}

/// A directory of PNG frames played back in file name order.
#[derive(Debug)]
pub struct ImageSequence {
    dir: PathBuf,
    frames: Vec<PathBuf>,
    position: usize,
    looping: bool,
}

impl ImageSequence {
    pub fn open(dir: &Path, looping: bool) -> Result<Self, SetupError> {
        let entries = fs::read_dir(dir).map_err(|err| {
            SetupError::new(format!(
                "cannot open frame directory '{}': {}",
                dir.display(),
                err
            ))
        })?;

        let mut frames = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| is_png(path))
            .collect::<Vec<_>>();
        frames.sort();

        if frames.is_empty() {
            return Err(SetupError::new(format!(
                "no .png frames found in '{}'",
                dir.display()
            )));
        }

        info!("Loaded {} frames from {}", frames.len(), dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            frames,
            position: 0,
            looping,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ImageSequence {
    fn read(&mut self) -> Option<Pixels> {
        if self.position >= self.frames.len() {
            if !self.looping {
                return None;
            }
            debug!("Rewinding {}", self.dir.display());
            self.position = 0;
        }

        let path = &self.frames[self.position];
        self.position += 1;

        match pixels::load_png(path) {
            Ok(frame) => Some(frame),
            Err(err) => {
                warn!("Ending frame sequence: {}", err);
                None
            }
        }
    }

    fn describe(&self) -> String {
        format!("frames in {}", self.dir.display())
    }
}

fn is_png(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

#[cfg(feature = "camera")]
pub use camera::CameraSource;

#[cfg(feature = "camera")]
mod camera {
    use log::{info, warn};
    use nokhwa::Camera;
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};

    use super::FrameSource;
    use crate::error::SetupError;
    use crate::framework::pixels::Pixels;

    /// Native camera stream decoded to RGB.
    pub struct CameraSource {
        index: u32,
        camera: Camera,
    }

    impl CameraSource {
        pub fn open(index: u32) -> Result<Self, SetupError> {
            let format = RequestedFormat::new::<RgbFormat>(
                RequestedFormatType::AbsoluteHighestFrameRate,
            );
            let mut camera = Camera::new(CameraIndex::Index(index), format)
                .map_err(|err| {
                    SetupError::new(format!(
                        "cannot open camera {}: {}",
                        index, err
                    ))
                })?;

            camera.open_stream().map_err(|err| {
                SetupError::new(format!(
                    "cannot start camera {} stream: {}",
                    index, err
                ))
            })?;

            info!(
                "Opened camera {} ({}) at {}",
                index,
                camera.info().human_name(),
                camera.resolution()
            );

            Ok(Self { index, camera })
        }
    }

    impl FrameSource for CameraSource {
        fn read(&mut self) -> Option<Pixels> {
            let decoded = match self.camera.frame() {
                Ok(buffer) => buffer.decode_image::<RgbFormat>(),
                Err(err) => {
                    warn!("Camera {} capture failed: {}", self.index, err);
                    return None;
                }
            };

            match decoded {
                Ok(image) => {
                    let (width, height) = (image.width(), image.height());
                    match Pixels::from_rgb(width, height, image.as_raw()) {
                        Ok(frame) => Some(frame),
                        Err(err) => {
                            warn!("Camera {} frame: {}", self.index, err);
                            None
                        }
                    }
                }
                Err(err) => {
                    warn!("Camera {} decode failed: {}", self.index, err);
                    None
                }
            }
        }

        fn describe(&self) -> String {
            format!("camera {}", self.index)
        }
    }

    impl Drop for CameraSource {
        fn drop(&mut self) {
            if let Err(err) = self.camera.stop_stream() {
                warn!("Camera {} did not stop cleanly: {}", self.index, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::BufWriter;

    use super::*;

    fn write_png(path: &Path, value: u8) {
        let file = File::create(path).expect("create png");
        let mut encoder = png::Encoder::new(BufWriter::new(file), 2, 2);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().expect("png header");
        writer.write_image_data(&[value; 4]).expect("png data");
    }

    #[test]
    fn plays_frames_in_name_order_then_ends() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_png(&dir.path().join("frame_002.png"), 20);
        write_png(&dir.path().join("frame_001.png"), 10);
        fs::write(dir.path().join("notes.txt"), "skip me").expect("write");

        let mut frames = ImageSequence::open(dir.path(), false).expect("open");
        assert_eq!(frames.len(), 2);

        let first = frames.read().expect("first");
        assert_eq!(first.pixel(0, 0), Some([10, 10, 10, 255]));
        let second = frames.read().expect("second");
        assert_eq!(second.pixel(0, 0), Some([20, 20, 20, 255]));
        assert!(frames.read().is_none());
        assert!(frames.read().is_none());
    }

    #[test]
    fn looping_rewinds_to_first_frame() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_png(&dir.path().join("a.png"), 1);
        write_png(&dir.path().join("b.PNG"), 2);

        let mut frames = ImageSequence::open(dir.path(), true).expect("open");
        let values = (0..5)
            .map(|_| frames.read().and_then(|f| f.pixel(0, 0)).map(|p| p[0]))
            .collect::<Vec<_>>();

        assert_eq!(values, [Some(1), Some(2), Some(1), Some(2), Some(1)]);
    }

    #[test]
    fn undecodable_frame_ends_the_stream() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_png(&dir.path().join("0.png"), 5);
        fs::write(dir.path().join("1.png"), b"not a png").expect("write");

        let mut frames = ImageSequence::open(dir.path(), true).expect("open");
        assert!(frames.read().is_some());
        assert!(frames.read().is_none());
    }

    #[test]
    fn missing_or_empty_directory_is_a_setup_error() {
        let dir = tempfile::tempdir().expect("tempdir");

        let err = ImageSequence::open(dir.path(), false).expect_err("empty");
        assert!(err.to_string().contains("no .png frames"));

        let missing = dir.path().join("missing");
        let err = ImageSequence::open(&missing, false).expect_err("missing");
        assert!(err.to_string().contains("cannot open frame directory"));
    }
}
