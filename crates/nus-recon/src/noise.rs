//! Robust noise floor estimation.

/// Number of range-narrowing passes.
pub const NOISE_PASSES: usize = 5;

/// Root mean square of `values`, 0 for an empty slice.
pub fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

/// Estimate the noise level of `values`.
///
/// Starts from the full range and repeatedly keeps only values within
/// three standard deviations of zero, so strong signals drop out of the
/// estimate after the first passes.
pub fn estimate_noise(values: &[f64]) -> f64 {
    let mut limit = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let mut level = 0.0;
    let mut kept: Vec<f64> = Vec::with_capacity(values.len());
    for _ in 0..NOISE_PASSES {
        kept.clear();
        kept.extend(values.iter().copied().filter(|v| v.abs() <= limit));
        if kept.is_empty() {
            break;
        }
        level = rms(&kept);
        limit = 3.0 * level;
    }
    level
}
