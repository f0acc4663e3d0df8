//! Vector math kernels for reconciling guidance deltas
//!
//! All kernels treat tensors as flat vectors: shapes are preserved but no
//! axis carries special meaning. Reductions accumulate in `f64`.

use ndarray::{ArrayD, Zip};

/// Noise-prediction tensor
pub type Tensor = ArrayD<f32>;

/// Component of `vector` orthogonal to `normal`
///
/// Returns `None` when `normal` is the zero vector, where no projection
/// exists; callers fall back to `vector` unchanged.
#[must_use]
pub fn perpendicular_component(normal: &Tensor, vector: &Tensor) -> Option<Tensor> {
    if normal.iter().all(|&x| x == 0.0) {
        return None;
    }

    let dot: f64 = Zip::from(normal)
        .and(vector)
        .fold(0.0, |acc, &n, &v| acc + f64::from(n) * f64::from(v));
    let norm_sq: f64 = normal.iter().map(|&n| f64::from(n).powi(2)).sum();

    #[allow(clippy::cast_possible_truncation)]
    let scale = (dot / norm_sq) as f32;
    Some(vector - &(normal * scale))
}

/// Softmax over the flattened absolute values, reshaped to the input
#[must_use]
pub fn salience(vector: &Tensor) -> Tensor {
    let max = vector
        .iter()
        .fold(f32::NEG_INFINITY, |max, &x| max.max(x.abs()));
    let exp = vector.mapv(|x| (x.abs() - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Blend `vectors` into the regions where each is the most salient
///
/// Per element, the contributor (index 0 = `normal`) with the largest
/// salience wins; ties go to the lowest index. Where `vectors[i]` wins the
/// result is `weight_i * (vector_i - normal)`, elsewhere zero.
#[must_use]
pub fn salient_blend(normal: &Tensor, vectors: &[(Tensor, f32)]) -> Tensor {
    let mut result = Tensor::zeros(normal.raw_dim());
    if vectors.is_empty() {
        return result;
    }

    let mut best = salience(normal);
    let mut winner = ArrayD::<usize>::zeros(normal.raw_dim());
    for (i, (vector, _)) in vectors.iter().enumerate() {
        let map = salience(vector);
        Zip::from(&mut best)
            .and(&mut winner)
            .and(&map)
            .for_each(|best, winner, &score| {
                if score > *best {
                    *best = score;
                    *winner = i + 1;
                }
            });
    }

    for (i, (vector, weight)) in vectors.iter().enumerate() {
        let mask = i + 1;
        Zip::from(&mut result)
            .and(&winner)
            .and(vector)
            .and(normal)
            .for_each(|out, &won, &v, &n| {
                if won == mask {
                    *out += weight * (v - n);
                }
            });
    }

    result
}

/// Keep only elements whose magnitude reaches the `1 - ratio` quantile
///
/// The quantile uses linear interpolation between order statistics.
/// Elements strictly below it are zeroed, the rest pass unchanged.
#[must_use]
pub fn filter_abs_top_k(vector: &Tensor, ratio: f64) -> Tensor {
    let threshold = match abs_quantile(vector, 1.0 - ratio.clamp(0.0, 1.0)) {
        Some(threshold) => threshold,
        None => return vector.clone(),
    };

    vector.mapv(|x| if f64::from(x.abs()) >= threshold { x } else { 0.0 })
}

fn abs_quantile(vector: &Tensor, q: f64) -> Option<f64> {
    let mut magnitudes: Vec<f64> = vector.iter().map(|x| f64::from(x.abs())).collect();
    if magnitudes.is_empty() {
        return None;
    }
    magnitudes.sort_unstable_by(f64::total_cmp);

    #[allow(clippy::cast_precision_loss)]
    let position = q * (magnitudes.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = position.floor() as usize;
    let upper = (lower + 1).min(magnitudes.len() - 1);
    let fraction = position - position.floor();

    Some(magnitudes[lower] + (magnitudes[upper] - magnitudes[lower]) * fraction)
}

/// Pull `cfg_cond`'s mean and spread toward `reference`
///
/// `rescale = 0` returns `cfg_cond` untouched; `rescale = 1` matches the
/// reference mean and (unbiased) standard deviation exactly. A constant
/// `cfg_cond` only has its mean moved.
#[must_use]
pub fn cfg_rescale(cfg_cond: &Tensor, reference: &Tensor, rescale: f32) -> Tensor {
    if rescale == 0.0 {
        return cfg_cond.clone();
    }

    let r = f64::from(rescale);
    let (cfg_mean, cfg_std) = mean_std(cfg_cond);
    let (ref_mean, ref_std) = mean_std(reference);

    let scaled_mean = (1.0 - r) * cfg_mean + r * ref_mean;
    let factor = if cfg_std > 0.0 {
        r * (ref_std / cfg_std - 1.0) + 1.0
    } else {
        1.0
    };

    #[allow(clippy::cast_possible_truncation)]
    cfg_cond.mapv(|x| (scaled_mean + (f64::from(x) - cfg_mean) * factor) as f32)
}

/// Mean and unbiased standard deviation
#[must_use]
pub fn mean_std(tensor: &Tensor) -> (f64, f64) {
    let wide = tensor.mapv(f64::from);
    let Some(mean) = wide.mean() else {
        return (0.0, 0.0);
    };
    let ddof = if wide.len() > 1 { 1.0 } else { 0.0 };
    (mean, wide.std(ddof))
}
