//! Testing utilities for the neutral prompt workspace
//!
//! Shared tensor helpers, synthetic backend batches and tree fixtures.

#![allow(missing_docs)]

use ndarray::{ArrayD, IxDyn};
use nprompt_expr::{ConciliationStrategy, PromptExpr};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub type Tensor = ArrayD<f32>;

pub fn tensor(values: &[f32]) -> Tensor {
    ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).unwrap()
}

pub fn tensor_shaped(shape: &[usize], values: Vec<f32>) -> Tensor {
    ArrayD::from_shape_vec(IxDyn(shape), values).unwrap()
}

pub fn random_tensor(rng: &mut StdRng, shape: &[usize]) -> Tensor {
    let len: usize = shape.iter().product();
    let values = (0..len).map(|_| rng.random_range(-1.0..1.0)).collect();
    tensor_shaped(shape, values)
}

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Backend inputs for one step: every leaf row in pre-order per item, then
/// one unconditioned row per item
#[derive(Debug, Clone)]
pub struct SyntheticBatch {
    pub x_out: Vec<Tensor>,
    pub batch_cond_indices: Vec<Vec<(usize, f32)>>,
    pub batch_size: usize,
}

impl SyntheticBatch {
    pub fn uncond(&self, item: usize) -> &Tensor {
        &self.x_out[self.x_out.len() - self.batch_size + item]
    }

    /// Rows of one item's leaves, in pre-order
    pub fn cond_rows(&self, item: usize) -> Vec<&Tensor> {
        self.batch_cond_indices[item]
            .iter()
            .map(|&(row, _)| &self.x_out[row])
            .collect()
    }
}

/// Random predictions laid out the way the host lays them out for `exprs`
pub fn synthetic_batch(exprs: &[PromptExpr], shape: &[usize], seed: u64) -> SyntheticBatch {
    let mut rng = seeded_rng(seed);
    let mut x_out = Vec::new();
    let mut batch_cond_indices = Vec::with_capacity(exprs.len());

    for expr in exprs {
        let mut cond_indices = Vec::new();
        for leaf in expr.leaves() {
            cond_indices.push((x_out.len(), leaf.weight));
            x_out.push(random_tensor(&mut rng, shape));
        }
        batch_cond_indices.push(cond_indices);
    }
    for _ in exprs {
        x_out.push(random_tensor(&mut rng, shape));
    }

    SyntheticBatch {
        x_out,
        batch_cond_indices,
        batch_size: exprs.len(),
    }
}

/// `uncond + Σ weight * (x - uncond)` over one item's leaves
pub fn weighted_sum(batch: &SyntheticBatch, item: usize, cond_scale: f32) -> Tensor {
    let uncond = batch.uncond(item);
    let mut out = uncond.clone();
    for &(row, weight) in &batch.batch_cond_indices[item] {
        out.scaled_add(weight * cond_scale, &(&batch.x_out[row] - uncond));
    }
    out
}

/// `base` plus one reconciled single-leaf child
pub fn reconciled_expr(strategy: ConciliationStrategy, child_weight: f32) -> PromptExpr {
    PromptExpr::composite(
        1.0,
        None,
        vec![
            PromptExpr::leaf("base", 1.0),
            PromptExpr::composite(child_weight, Some(strategy), vec![PromptExpr::leaf("edit", 1.0)]),
        ],
    )
}

pub fn assert_close(actual: &Tensor, expected: &Tensor, tolerance: f32) {
    assert_eq!(actual.shape(), expected.shape(), "shape mismatch");
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "element {i}: {a} != {e} (tolerance {tolerance})"
        );
    }
}
