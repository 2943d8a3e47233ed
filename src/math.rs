use crate::my_types::*;

/// Median of a sample, averaging the two middle values for even lengths.
/// NaNs sort last.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.)
    } else {
        Some(sorted[mid])
    }
}

/// Component-wise mean of a set of vectors
pub fn mean(points: impl IntoIterator<Item = Vector2d>) -> Option<Vector2d> {
    let mut sum = Vector2d::zeros();
    let mut count = 0;
    for p in points {
        sum += p;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
