use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Tightly packed RGBA8 pixel data, rows top to bottom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pixels {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Pixels {
    pub const BYTES_PER_PIXEL: usize = 4;

    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * Self::BYTES_PER_PIXEL;
        Self {
            width,
            height,
            data: vec![0; len],
        }
    }

    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut pixels = Self::new(width, height);
        for px in pixels.data.chunks_exact_mut(Self::BYTES_PER_PIXEL) {
            px.copy_from_slice(&rgba);
        }
        pixels
    }

    pub fn from_rgba(
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> Result<Self, String> {
        let expected =
            width as usize * height as usize * Self::BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(format!(
                "expected {} bytes for {}x{} RGBA, got {}",
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

    pub fn from_rgb(
        width: u32,
        height: u32,
        rgb: &[u8],
    ) -> Result<Self, String> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(format!(
                "expected {} bytes for {}x{} RGB, got {}",
                expected,
                width,
                height,
                rgb.len()
            ));
        }

        let mut data = Vec::with_capacity(expected / 3 * 4);
        for px in rgb.chunks_exact(3) {
            data.extend_from_slice(&[px[0], px[1], px[2], 255]);
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

    pub fn size(&self) -> [u32; 2] {
        [self.width, self.height]
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.index(x, y);
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.index(x, y);
        self.data[i..i + Self::BYTES_PER_PIXEL].copy_from_slice(&rgba);
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * Self::BYTES_PER_PIXEL
    }
}

pub fn load_png(path: &Path) -> Result<Pixels, String> {
    let file = File::open(path).map_err(|err| {
        format!("failed to open '{}': {}", path.display(), err)
    })?;

    decode_png(BufReader::new(file)).map_err(|err| {
        format!("failed to decode '{}': {}", path.display(), err)
    })
}

/// Decodes any 8/16-bit PNG colour type into RGBA8.
pub fn decode_png<R: std::io::BufRead + std::io::Seek>(
    reader: R,
) -> Result<Pixels, String> {
    let mut decoder = png::Decoder::new(reader);
    decoder.set_transformations(
        png::Transformations::EXPAND | png::Transformations::STRIP_16,
    );

    let mut reader = decoder.read_info().map_err(|err| err.to_string())?;
    let buffer_size = reader
        .output_buffer_size()
        .ok_or_else(|| "png output buffer size overflows".to_string())?;
    let mut buf = vec![0; buffer_size];
    let info = reader.next_frame(&mut buf).map_err(|err| err.to_string())?;
    let bytes = &buf[..info.buffer_size()];

    let (width, height) = (info.width, info.height);
    let pixel_count = width as usize * height as usize;
    let mut data = Vec::with_capacity(pixel_count * Pixels::BYTES_PER_PIXEL);

    match info.color_type {
        png::ColorType::Rgba => data.extend_from_slice(bytes),
        png::ColorType::Rgb => {
            for px in bytes.chunks_exact(3) {
                data.extend_from_slice(&[px[0], px[1], px[2], 255]);
            }
        }
        png::ColorType::GrayscaleAlpha => {
            for px in bytes.chunks_exact(2) {
                data.extend_from_slice(&[px[0], px[0], px[0], px[1]]);
            }
        }
        png::ColorType::Grayscale => {
            for &v in bytes {
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        png::ColorType::Indexed => {
            return Err("indexed png was not expanded".to_string());
        }
    }

    Pixels::from_rgba(width, height, data)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn encode(
        width: u32,
        height: u32,
        color: png::ColorType,
        data: &[u8],
    ) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(color);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().expect("png header");
            writer.write_image_data(data).expect("png data");
        }
        out
    }

    #[test]
    fn decodes_rgb_png_into_opaque_rgba() {
        let bytes =
            encode(2, 1, png::ColorType::Rgb, &[10, 20, 30, 40, 50, 60]);
        let pixels = decode_png(Cursor::new(bytes)).expect("decode");

        assert_eq!(pixels.size(), [2, 1]);
        assert_eq!(pixels.pixel(0, 0), Some([10, 20, 30, 255]));
        assert_eq!(pixels.pixel(1, 0), Some([40, 50, 60, 255]));
    }

    #[test]
    fn decodes_grayscale_alpha_png() {
        let bytes = encode(1, 1, png::ColorType::GrayscaleAlpha, &[7, 128]);
        let pixels = decode_png(Cursor::new(bytes)).expect("decode");

        assert_eq!(pixels.pixel(0, 0), Some([7, 7, 7, 128]));
    }

    #[test]
    fn rejects_buffers_with_wrong_length() {
        let err = Pixels::from_rgba(2, 2, vec![0; 15]).expect_err("short");
        assert!(err.contains("expected 16 bytes"));

        let err = Pixels::from_rgb(1, 1, &[0; 4]).expect_err("long");
        assert!(err.contains("expected 3 bytes"));
    }

    #[test]
    fn set_pixel_ignores_out_of_bounds() {
        let mut pixels = Pixels::new(2, 2);
        pixels.set_pixel(5, 5, [1, 2, 3, 4]);
        pixels.set_pixel(1, 1, [1, 2, 3, 4]);

        assert_eq!(pixels.pixel(1, 1), Some([1, 2, 3, 4]));
        assert_eq!(pixels.pixel(2, 0), None);
    }
}
