use ndarray::{Array2, ArrayView2};

pub struct MatrixHelper;

impl MatrixHelper {
    /// Clamps every element into `[lo, hi]`.
    pub fn clip(map: ArrayView2<f32>, lo: f32, hi: f32) -> Array2<f32> {
        map.mapv(|v| v.clamp(lo, hi))
    }

    /// Quantizes a unit-range map to bytes, truncating like an integer cast.
    pub fn to_u8(map: ArrayView2<f32>) -> Array2<u8> {
        map.mapv(|v| (v.clamp(0.0, 1.0) * 255.0) as u8)
    }
}
