use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::ArrayView2;

use crate::config::{Interpolation, Mirror, OutputConfig};
use crate::math::matrix::MatrixHelper;
use crate::prelude::{StageError, StageResult};

/// Viridis anchors at evenly spaced positions in `[0, 1]`.
const VIRIDIS: [[u8; 3]; 9] = [
    [68, 1, 84],
    [71, 44, 122],
    [59, 81, 139],
    [44, 113, 142],
    [33, 144, 141],
    [39, 173, 129],
    [92, 200, 99],
    [170, 220, 50],
    [253, 231, 37],
];

const BORDER_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Maps an 8-bit intensity onto the viridis palette.
pub fn viridis(level: u8) -> Rgb<u8> {
    let segments = (VIRIDIS.len() - 1) as f32;
    let position = level as f32 / 255.0 * segments;
    let index = (position.floor() as usize).min(VIRIDIS.len() - 2);
    let t = position - index as f32;
    let (lo, hi) = (VIRIDIS[index], VIRIDIS[index + 1]);
    let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
    Rgb([mix(lo[0], hi[0]), mix(lo[1], hi[1]), mix(lo[2], hi[2])])
}

/// Turns an enhanced `[0, 1]` map into an encoded JPEG.
#[derive(Debug, Clone)]
pub struct FrameRenderer {
    mirror: Mirror,
    size: Option<u32>,
    filter: FilterType,
    border_px: u32,
    jpeg_quality: u8,
}

impl FrameRenderer {
    pub fn new(config: &OutputConfig) -> Self {
        let filter = match config.interpolation {
            Interpolation::Nearest => FilterType::Nearest,
            Interpolation::Linear => FilterType::Triangle,
            Interpolation::Cubic => FilterType::CatmullRom,
            Interpolation::Lanczos => FilterType::Lanczos3,
        };
        Self {
            mirror: config.mirror,
            size: config.size,
            filter,
            border_px: config.border_px,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// Color-maps, mirrors, rescales and frames the map, without encoding.
    pub fn raster(&self, map: ArrayView2<f32>) -> StageResult<RgbImage> {
        let (rows, cols) = map.dim();
        if rows == 0 || cols == 0 {
            return Err(StageError::Render("empty map".into()));
        }
        let levels = MatrixHelper::to_u8(map);
        let mut image = RgbImage::from_fn(cols as u32, rows as u32, |x, y| {
            viridis(levels[[y as usize, x as usize]])
        });

        match self.mirror {
            Mirror::None => {}
            Mirror::Vertical => imageops::flip_vertical_in_place(&mut image),
            Mirror::Horizontal => imageops::flip_horizontal_in_place(&mut image),
            Mirror::Both => imageops::rotate180_in_place(&mut image),
        }

        if let Some(size) = self.size {
            image = imageops::resize(&image, size, size, self.filter);
        }

        if self.border_px > 0 {
            let pad = self.border_px;
            let mut framed =
                RgbImage::from_pixel(image.width() + 2 * pad, image.height() + 2 * pad, BORDER_COLOR);
            imageops::replace(&mut framed, &image, pad as i64, pad as i64);
            image = framed;
        }
        Ok(image)
    }

    pub fn render(&self, map: ArrayView2<f32>) -> StageResult<Vec<u8>> {
        self.encode(&self.raster(map)?)
    }

    pub fn encode(&self, image: &RgbImage) -> StageResult<Vec<u8>> {
        let mut encoded = Vec::with_capacity((image.width() * image.height()) as usize / 4);
        JpegEncoder::new_with_quality(&mut encoded, self.jpeg_quality)
            .encode_image(image)
            .map_err(|err| StageError::Render(err.to_string()))?;
        Ok(encoded)
    }
}
