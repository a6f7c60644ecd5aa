use super::Region;
use crate::framework::pixels::Pixels;

/// Single-channel 8-bit image, rows top to bottom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LumaImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl LumaImage {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, String> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(format!(
                "expected {} bytes for {}x{} luma, got {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.data[y as usize * self.width as usize + x as usize])
    }

    /// The part of the image inside `region`, clipped to the image.
    pub fn crop(&self, region: &Region) -> LumaImage {
        let x0 = region.x.min(self.width);
        let y0 = region.y.min(self.height);
        let x1 = region.x.saturating_add(region.width).min(self.width);
        let y1 = region.y.saturating_add(region.height).min(self.height);
        let stride = self.width as usize;

        let mut data =
            Vec::with_capacity((x1 - x0) as usize * (y1 - y0) as usize);
        for y in y0..y1 {
            let row = y as usize * stride;
            let (start, end) = (row + x0 as usize, row + x1 as usize);
            data.extend_from_slice(&self.data[start..end]);
        }

        LumaImage {
            width: x1 - x0,
            height: y1 - y0,
            data,
        }
    }

    /// Bilinear resample with pixel centres aligned.
    pub fn resize(&self, width: u32, height: u32) -> LumaImage {
        if self.width == 0 || self.height == 0 || width == 0 || height == 0 {
            return LumaImage {
                width,
                height,
                data: vec![0; width as usize * height as usize],
            };
        }

        let sample = |scale: f32, out: u32, len: u32| {
            let src = ((out as f32 + 0.5) * scale - 0.5).max(0.0);
            let i0 = (src.floor() as u32).min(len - 1);
            let i1 = (i0 + 1).min(len - 1);
            (i0 as usize, i1 as usize, src - i0 as f32)
        };
        let scale_x = self.width as f32 / width as f32;
        let scale_y = self.height as f32 / height as f32;
        let stride = self.width as usize;
        let at = |row: usize, col: usize| self.data[row * stride + col] as f32;

        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            let (y0, y1, fy) = sample(scale_y, y, self.height);
            for x in 0..width {
                let (x0, x1, fx) = sample(scale_x, x, self.width);
                let top = at(y0, x0) + (at(y0, x1) - at(y0, x0)) * fx;
                let bottom = at(y1, x0) + (at(y1, x1) - at(y1, x0)) * fx;
                let value = top + (bottom - top) * fy;
                data.push(value.round().clamp(0.0, 255.0) as u8);
            }
        }

        LumaImage {
            width,
            height,
            data,
        }
    }
}

/// Widest gaussian kernel the blur will build.
pub const MAX_BLUR_SIZE: u32 = 31;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlurSettings {
    /// Kernel width in pixels. Even sizes are rounded up and anything above
    /// `MAX_BLUR_SIZE` is capped; 0 and 1 disable the blur.
    pub size: u32,
    pub sigma: f32,
}

impl Default for BlurSettings {
    fn default() -> Self {
        Self {
            size: 5,
            sigma: 1.6,
        }
    }
}

/// Grayscale, equalise, blur: the input every detector sees.
pub fn prepare(frame: &Pixels, blur: &BlurSettings) -> LumaImage {
    let mut image = to_grayscale(frame);
    equalize_histogram(&mut image);
    gaussian_blur(&mut image, blur);
    image
}

/// ITU-R BT.601 luma, rounded.
pub fn to_grayscale(frame: &Pixels) -> LumaImage {
    let data = frame
        .data()
        .chunks_exact(Pixels::BYTES_PER_PIXEL)
        .map(|px| {
            let [r, g, b] = [px[0] as u32, px[1] as u32, px[2] as u32];
            ((299 * r + 587 * g + 114 * b + 500) / 1000) as u8
        })
        .collect();

    LumaImage {
        width: frame.width(),
        height: frame.height(),
        data,
    }
}

/// Spreads the cumulative histogram over 0..=255. The darkest level present
/// maps to 0; a single-level image is left unchanged.
pub fn equalize_histogram(image: &mut LumaImage) {
    let total = image.data.len();
    if total == 0 {
        return;
    }

    let mut histogram = [0usize; 256];
    for &value in &image.data {
        histogram[value as usize] += 1;
    }

    let Some(first) = histogram.iter().position(|&count| count > 0) else {
        return;
    };
    let remaining = total - histogram[first];
    if remaining == 0 {
        return;
    }

    let scale = 255.0 / remaining as f32;
    let mut lut = [0u8; 256];
    let mut sum = 0usize;
    for level in first + 1..256 {
        sum += histogram[level];
        lut[level] = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }

    for value in &mut image.data {
        *value = lut[*value as usize];
    }
}

pub fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    let size = size.min(MAX_BLUR_SIZE);
    let size = if size % 2 == 0 { size + 1 } else { size };
    let radius = (size / 2) as i32;
    // Non-positive sigma derives one from the kernel size.
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };

    let mut kernel = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect::<Vec<_>>();
    let sum: f32 = kernel.iter().sum();
    for weight in &mut kernel {
        *weight /= sum;
    }
    kernel
}

/// Separable gaussian blur with mirrored borders.
pub fn gaussian_blur(image: &mut LumaImage, settings: &BlurSettings) {
    if settings.size <= 1 || image.width == 0 || image.height == 0 {
        return;
    }

    let kernel = gaussian_kernel(settings.size, settings.sigma);
    let radius = (kernel.len() / 2) as i64;
    let width = image.width as usize;
    let height = image.height as usize;

    let mut horizontal = vec![0f32; width * height];
    for y in 0..height {
        let row = &image.data[y * width..(y + 1) * width];
        for x in 0..width {
            horizontal[y * width + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    let sx = reflect(x as i64 + k as i64 - radius, width);
                    weight * row[sx] as f32
                })
                .sum();
        }
    }

    for y in 0..height {
        for x in 0..width {
            let value: f32 = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    let sy = reflect(y as i64 + k as i64 - radius, height);
                    weight * horizontal[sy * width + x]
                })
                .sum();
            image.data[y * width + x] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Mirrors an out-of-range index back inside `0..len` without repeating
/// the edge sample.
fn reflect(index: i64, len: usize) -> usize {
    let len = len as i64;
    if len == 1 {
        return 0;
    }

    let period = 2 * (len - 1);
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    i as usize
}
