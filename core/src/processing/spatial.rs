use ndarray::{Array2, ArrayView2, Zip};

use crate::config::EnhancementConfig;
use crate::math::filters::FilterHelper;
use crate::math::matrix::MatrixHelper;

/// Blur used by the unsharp mask when Gaussian smoothing is disabled.
const UNSHARP_FALLBACK_SIGMA: f32 = 0.8;
const MIN_SIGMA: f32 = 0.001;

/// Visualization-only clean-up: median, then Gaussian, then unsharp mask.
/// Stateless; the filtered map it reads is never modified.
#[derive(Debug, Clone)]
pub struct SpatialEnhancer {
    median_kernel: Option<usize>,
    gaussian_sigma: Option<f32>,
    unsharp_amount: Option<f32>,
}

impl SpatialEnhancer {
    pub fn new(config: &EnhancementConfig) -> Self {
        Self {
            median_kernel: config.median_kernel.filter(|k| k % 2 == 1 && *k > 1),
            gaussian_sigma: config.gaussian_sigma.filter(|s| *s > 0.0),
            unsharp_amount: config.unsharp_amount.filter(|a| *a > 0.0),
        }
    }

    pub fn enhance(&self, input: ArrayView2<f32>) -> Array2<f32> {
        let mut image = MatrixHelper::clip(input, 0.0, 1.0);

        if let Some(kernel) = self.median_kernel {
            image = FilterHelper::median(image.view(), kernel);
        }
        if let Some(sigma) = self.gaussian_sigma {
            image = FilterHelper::gaussian(image.view(), sigma);
        }
        if let Some(amount) = self.unsharp_amount {
            let sigma = self
                .gaussian_sigma
                .map_or(UNSHARP_FALLBACK_SIGMA, |s| s.max(MIN_SIGMA));
            let blurred = FilterHelper::gaussian(image.view(), sigma);
            Zip::from(&mut image)
                .and(&blurred)
                .for_each(|px, &blur| *px = (*px + amount * (*px - blur)).clamp(0.0, 1.0));
        }
        image
    }
}
