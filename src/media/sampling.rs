/// Picks `target` frame indices spread evenly over `total` frames.
///
/// With enough frames this is `linspace(0, total - 1, target)` truncated toward zero,
/// evaluated in f32 from both ends so the last index is exactly `total - 1`.
/// Short clips use every frame once and then repeat the last one.
pub fn sample_frame_indices(total: usize, target: usize) -> Vec<usize> {
    if total == 0 || target == 0 {
        return Vec::new();
    }

    if total < target {
        return (0..target).map(|i| i.min(total - 1)).collect();
    }

    if target == 1 {
        return vec![0];
    }

    let start = 0.0f32;
    let end = (total - 1) as f32;
    let step = (end - start) / (target - 1) as f32;
    let halfway = target / 2;

    (0..target)
        .map(|i| {
            let value = if i < halfway {
                start + step * i as f32
            } else {
                end - step * (target - 1 - i) as f32
            };
            // Truncation toward zero; values are never negative.
            value as usize
        })
        .collect()
}
