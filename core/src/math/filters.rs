use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::{gaussian_blur_f32, median_filter};
use ndarray::{Array2, ArrayView2};

use crate::math::matrix::MatrixHelper;

type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Bridges `[0, 1]` maps to imageproc's filters. Images are `cols` wide and
/// `rows` high, so pixel `(x, y)` is taxel `[y, x]`.
pub struct FilterHelper;

impl FilterHelper {
    /// Median over a `kernel x kernel` window, computed on the 8-bit
    /// quantized map. Output levels are multiples of `1 / 255`.
    pub fn median(input: ArrayView2<f32>, kernel: usize) -> Array2<f32> {
        let (rows, cols) = input.dim();
        if rows == 0 || cols == 0 || kernel < 2 {
            return input.to_owned();
        }
        let levels = MatrixHelper::to_u8(input);
        let gray = GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
            Luma([levels[[y as usize, x as usize]]])
        });
        let radius = (kernel / 2) as u32;
        let filtered = median_filter(&gray, radius, radius);
        Array2::from_shape_fn((rows, cols), |(r, c)| {
            filtered.get_pixel(c as u32, r as u32)[0] as f32 / 255.0
        })
    }

    /// Gaussian blur with clamp-to-edge borders. Non-positive `sigma` is a no-op.
    pub fn gaussian(input: ArrayView2<f32>, sigma: f32) -> Array2<f32> {
        let (rows, cols) = input.dim();
        if rows == 0 || cols == 0 || sigma.is_nan() || sigma <= 0.0 {
            return input.to_owned();
        }
        let image = FloatImage::from_fn(cols as u32, rows as u32, |x, y| {
            Luma([input[[y as usize, x as usize]]])
        });
        let blurred = gaussian_blur_f32(&image, sigma);
        Array2::from_shape_fn((rows, cols), |(r, c)| {
            blurred.get_pixel(c as u32, r as u32)[0]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn median_removes_isolated_spike() {
        let mut input = Array2::<f32>::zeros((5, 5));
        input[[2, 2]] = 1.0;
        let output = FilterHelper::median(input.view(), 3);
        assert!(output.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn median_quantizes_to_eight_bit_levels() {
        let full = array![[1.0, 1.0], [1.0, 1.0]];
        assert_eq!(FilterHelper::median(full.view(), 3), full);

        let half = Array2::<f32>::from_elem((3, 3), 0.5);
        let output = FilterHelper::median(half.view(), 3);
        assert!(output.iter().all(|&v| v == 127.0 / 255.0));
    }

    #[test]
    fn median_keeps_rows_and_columns_apart() {
        let mut input = Array2::<f32>::zeros((3, 5));
        input.column_mut(4).fill(1.0);
        input.column_mut(3).fill(1.0);
        let output = FilterHelper::median(input.view(), 3);
        assert_eq!(output.dim(), (3, 5));
        assert!(output.column(0).iter().all(|&v| v == 0.0));
        assert!(output.column(4).iter().all(|&v| v == 1.0));
    }

    #[test]
    fn gaussian_preserves_mass_and_constant_maps() {
        let mut input = Array2::<f32>::zeros((9, 9));
        input[[4, 4]] = 1.0;
        let blurred = FilterHelper::gaussian(input.view(), 0.8);
        assert!((blurred.sum() - 1.0).abs() < 1e-4);
        assert!(blurred[[4, 4]] < 1.0);
        assert!(blurred[[4, 5]] > 0.0);
        assert!((blurred[[4, 5]] - blurred[[5, 4]]).abs() < 1e-6);

        let flat = Array2::<f32>::from_elem((3, 4), 0.25);
        let smoothed = FilterHelper::gaussian(flat.view(), 1.5);
        assert!(smoothed.iter().all(|v| (v - 0.25).abs() < 1e-5));
    }

    #[test]
    fn gaussian_ignores_non_positive_sigma() {
        let input = array![[0.0, 1.0], [0.5, 0.25]];
        assert_eq!(FilterHelper::gaussian(input.view(), 0.0), input);
    }
}
