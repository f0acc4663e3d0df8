//! Backend seam
//!
//! Provides [`DenoiserBackend`], the host's native combination of per-condition
//! predictions, and [`WeightedSumBackend`], a reference implementation of it.

use crate::kernels::Tensor;

/// `(row in x_out, weight)` of one condition
pub type CondIndex = (usize, f32);

/// Host combination of conditioned and unconditioned predictions
///
/// `x_out` holds every condition row followed by `batch_size` unconditioned
/// rows, one per batch item. `batch_cond_indices[i]` lists the conditions of
/// item `i`. The result holds one guided prediction per batch item.
pub trait DenoiserBackend {
    /// Combine predictions the way the host does without composition
    fn combine_denoised(
        &self,
        x_out: &[Tensor],
        batch_cond_indices: &[Vec<CondIndex>],
        batch_size: usize,
        cond_scale: f32,
    ) -> Vec<Tensor>;
}

impl<F> DenoiserBackend for F
where
    F: Fn(&[Tensor], &[Vec<CondIndex>], usize, f32) -> Vec<Tensor>,
{
    fn combine_denoised(
        &self,
        x_out: &[Tensor],
        batch_cond_indices: &[Vec<CondIndex>],
        batch_size: usize,
        cond_scale: f32,
    ) -> Vec<Tensor> {
        self(x_out, batch_cond_indices, batch_size, cond_scale)
    }
}

/// Classifier-free guidance as a plain weighted sum
///
/// `denoised[i] = uncond[i] + Σ weight * cond_scale * (x_out[row] - uncond[i])`.
/// Rows outside `x_out` or shaped unlike the item's uncond row are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedSumBackend;

impl DenoiserBackend for WeightedSumBackend {
    fn combine_denoised(
        &self,
        x_out: &[Tensor],
        batch_cond_indices: &[Vec<CondIndex>],
        batch_size: usize,
        cond_scale: f32,
    ) -> Vec<Tensor> {
        let uncond_start = x_out.len().saturating_sub(batch_size);
        let uncond = &x_out[uncond_start..];

        uncond
            .iter()
            .enumerate()
            .map(|(i, uncond)| {
                let mut denoised = uncond.clone();
                let conds = batch_cond_indices.get(i).map_or(&[][..], Vec::as_slice);
                for &(row, weight) in conds {
                    let cond = x_out.get(row).filter(|c| c.shape() == uncond.shape());
                    if let Some(cond) = cond {
                        denoised.scaled_add(weight * cond_scale, &(cond - uncond));
                    }
                }
                denoised
            })
            .collect()
    }
}
