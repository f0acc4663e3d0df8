//! Delta passes over a prompt tree
//!
//! Two mutually recursive passes walk one batch item's tree:
//! - [`DeltaComposer::cond_delta`]: weighted sum of the plain children's
//!   deltas
//! - [`DeltaComposer::aux_cond_delta`]: contribution of the reconciled
//!   children, each folded in against the plain delta of its parent
//!
//! Both passes visit children in the same order and advance the leaf index by
//! each child's flat size, so leaf `n` in pre-order always reads condition `n`.

use crate::backend::CondIndex;
use crate::diagnostics::Diagnostics;
use crate::error::{CompositionError, Result};
use crate::kernels::{filter_abs_top_k, perpendicular_component, salient_blend, Tensor};
use nprompt_expr::{CompositePrompt, ConciliationStrategy, LeafPrompt, PromptExpr};

/// Default fraction of elements kept by semantic guidance
pub const DEFAULT_TOP_K_RATIO: f64 = 0.05;

/// Per-item delta evaluation
#[derive(Debug)]
pub struct DeltaComposer<'a> {
    x_out: &'a [Tensor],
    uncond: &'a Tensor,
    cond_indices: &'a [CondIndex],
    diagnostics: &'a mut Diagnostics,
    top_k_ratio: f64,
    step: usize,
}

impl<'a> DeltaComposer<'a> {
    /// Create composer for one batch item
    ///
    /// `cond_indices` lists this item's conditions in tree pre-order and
    /// `uncond` is this item's unconditioned prediction.
    #[must_use]
    pub fn new(
        x_out: &'a [Tensor],
        uncond: &'a Tensor,
        cond_indices: &'a [CondIndex],
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        Self {
            x_out,
            uncond,
            cond_indices,
            diagnostics,
            top_k_ratio: DEFAULT_TOP_K_RATIO,
            step: 0,
        }
    }

    /// With semantic guidance ratio
    #[inline]
    #[must_use]
    pub fn with_top_k_ratio(mut self, ratio: f64) -> Self {
        self.top_k_ratio = ratio;
        self
    }

    /// At sampling step
    #[inline]
    #[must_use]
    pub fn at_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    /// Plain and auxiliary delta of the whole tree
    ///
    /// # Errors
    /// Returns [`CompositionError`] when the tree's leaves do not line up with
    /// the item's conditions or rows of `x_out`.
    pub fn compose(&mut self, expr: &PromptExpr) -> Result<(Tensor, Tensor)> {
        tracing::trace!(
            target: "neutral_prompt",
            leaves = expr.flat_size(),
            step = self.step,
            "composing deltas"
        );
        let cond_delta = self.cond_delta(expr, 0)?;
        let aux_cond_delta = self.aux_cond_delta(expr, &cond_delta, 0)?;
        Ok((cond_delta, aux_cond_delta))
    }

    /// Plain delta of `expr`, whose first leaf is condition `index`
    ///
    /// # Errors
    /// See [`DeltaComposer::compose`].
    pub fn cond_delta(&mut self, expr: &PromptExpr, index: usize) -> Result<Tensor> {
        match expr {
            PromptExpr::Leaf(leaf) => self.leaf_delta(leaf, index),
            PromptExpr::Composite(composite) => self.composite_cond_delta(composite, index),
        }
    }

    /// Reconciled delta of `expr` against its plain delta `cond_delta`
    ///
    /// # Errors
    /// See [`DeltaComposer::compose`].
    pub fn aux_cond_delta(
        &mut self,
        expr: &PromptExpr,
        cond_delta: &Tensor,
        index: usize,
    ) -> Result<Tensor> {
        match expr {
            PromptExpr::Leaf(_) => Ok(self.zeros()),
            PromptExpr::Composite(composite) => {
                self.composite_aux_cond_delta(composite, cond_delta, index)
            }
        }
    }

    fn leaf_delta(&mut self, leaf: &LeafPrompt, index: usize) -> Result<Tensor> {
        let &(row, weight) =
            self.cond_indices
                .get(index)
                .ok_or(CompositionError::CondIndexOutOfRange {
                    index,
                    len: self.cond_indices.len(),
                })?;

        if !weights_match(leaf.weight, weight) {
            self.diagnostics.weight_mismatch(index, leaf.weight, weight);
        }

        let cond = self.x_out.get(row).ok_or(CompositionError::RowOutOfRange {
            row,
            len: self.x_out.len(),
        })?;
        if cond.shape() != self.uncond.shape() {
            return Err(CompositionError::shape_mismatch(
                self.uncond.shape(),
                cond.shape(),
            ));
        }

        Ok(cond - self.uncond)
    }

    fn composite_cond_delta(
        &mut self,
        composite: &CompositePrompt,
        mut index: usize,
    ) -> Result<Tensor> {
        let mut cond_delta = self.zeros();

        for child in &composite.children {
            if child.conciliation().is_none() {
                let child_delta = self.full_delta(child, index)?;
                cond_delta.scaled_add(child.weight(), &child_delta);
            }
            index += child.flat_size();
        }

        Ok(cond_delta)
    }

    fn composite_aux_cond_delta(
        &mut self,
        composite: &CompositePrompt,
        cond_delta: &Tensor,
        mut index: usize,
    ) -> Result<Tensor> {
        let mut aux_cond_delta = self.zeros();
        let mut salient = Vec::new();

        for child in &composite.children {
            if let Some(strategy) = child.conciliation() {
                let child_delta = self.full_delta(child, index)?;
                let weight = child.weight();

                match strategy {
                    ConciliationStrategy::Perpendicular => {
                        let perp = match perpendicular_component(cond_delta, &child_delta) {
                            Some(perp) => perp,
                            None => {
                                self.diagnostics.projection_not_found(self.step);
                                child_delta
                            }
                        };
                        aux_cond_delta.scaled_add(weight, &perp);
                    }
                    ConciliationStrategy::SalienceMask => salient.push((child_delta, weight)),
                    ConciliationStrategy::SemanticGuidance => {
                        let sparse = filter_abs_top_k(&child_delta, self.top_k_ratio);
                        aux_cond_delta.scaled_add(weight, &sparse);
                    }
                }
            }
            index += child.flat_size();
        }

        if !salient.is_empty() {
            aux_cond_delta += &salient_blend(cond_delta, &salient);
        }

        Ok(aux_cond_delta)
    }

    /// Plain plus reconciled delta of a child
    fn full_delta(&mut self, child: &PromptExpr, index: usize) -> Result<Tensor> {
        let mut delta = self.cond_delta(child, index)?;
        let aux = self.aux_cond_delta(child, &delta, index)?;
        delta += &aux;
        Ok(delta)
    }

    fn zeros(&self) -> Tensor {
        Tensor::zeros(self.uncond.raw_dim())
    }
}

/// Weights written as `text :w` come back bit-identical from the host's
/// parser, but hosts that reformat them may lose the last digit.
fn weights_match(expected: f32, actual: f32) -> bool {
    (expected - actual).abs() <= 1e-6 * expected.abs().max(1.0)
}
