use ndarray::{Array2, Axis};

pub struct StatsHelper;

impl StatsHelper {
    /// Median that averages the two middle values for even lengths.
    /// Sorts `values` in place; returns 0 for an empty slice.
    pub fn median(values: &mut [f32]) -> f32 {
        if values.is_empty() {
            return 0.0;
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let mid = values.len() / 2;
        if values.len() % 2 == 1 {
            values[mid]
        } else {
            (values[mid - 1] + values[mid]) / 2.0
        }
    }

    /// Element-wise median across a stack of equally shaped maps.
    pub fn median_stack(maps: &[Array2<f32>]) -> Option<Array2<f32>> {
        let first = maps.first()?;
        let dim = first.dim();
        if maps.iter().any(|map| map.dim() != dim) {
            return None;
        }
        let views: Vec<_> = maps.iter().map(|map| map.view().insert_axis(Axis(0))).collect();
        let stack = ndarray::concatenate(Axis(0), &views).ok()?;
        let mut scratch = Vec::with_capacity(maps.len());
        let medians = stack.map_axis(Axis(0), |lane| {
            scratch.clear();
            scratch.extend(lane.iter().copied());
            Self::median(&mut scratch)
        });
        Some(medians)
    }

    /// Largest value, or 0 for an empty map.
    pub fn peak(map: &Array2<f32>) -> f32 {
        map.iter().copied().fold(0.0_f32, f32::max)
    }

    pub fn mean(map: &Array2<f32>) -> f32 {
        if map.is_empty() {
            return 0.0;
        }
        map.sum() / map.len() as f32
    }
}
