//! Request context
//!
//! Everything one generation request needs across its sampling steps: the
//! configuration, one prompt tree per batch item, the active rescale factor
//! and the diagnostics raised so far. A context is built when the request
//! starts and dropped when the next one begins, so nothing leaks between
//! requests.

use crate::backend::{CondIndex, DenoiserBackend};
use crate::config::{check_unit, NeutralPromptConfig};
use crate::delta::DeltaComposer;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{CompositionError, ConfigError, Result};
use crate::gather::gather_plain_conds;
use crate::kernels::{cfg_rescale, Tensor};
use nprompt_expr::{parse_root, PromptExpr};

/// State of one generation request
#[derive(Debug, Clone)]
pub struct RequestContext {
    config: NeutralPromptConfig,
    prompt_exprs: Vec<PromptExpr>,
    cfg_rescale: f32,
    cfg_rescale_override: Option<f32>,
    diagnostics: Diagnostics,
}

impl RequestContext {
    /// Create context for a new request
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn new(config: NeutralPromptConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    pub(crate) fn from_validated(config: NeutralPromptConfig) -> Self {
        Self {
            cfg_rescale: config.cfg_rescale,
            cfg_rescale_override: None,
            diagnostics: Diagnostics::new(config.verbose),
            prompt_exprs: Vec::new(),
            config,
        }
    }

    /// Parse the batch prompts and return what the host should encode
    ///
    /// Each returned prompt lists every leaf of its tree as `text :weight`
    /// joined by ` AND `, so the host builds one condition per leaf in tree
    /// pre-order. When composition is disabled prompts pass through untouched.
    pub fn prepare<S: AsRef<str>>(&mut self, prompts: &[S]) -> Vec<String> {
        if !self.config.enabled {
            self.prompt_exprs.clear();
            return prompts.iter().map(|p| p.as_ref().to_string()).collect();
        }

        self.prompt_exprs = prompts.iter().map(|p| parse_root(p.as_ref())).collect();
        tracing::debug!(
            target: "neutral_prompt",
            prompts = self.prompt_exprs.len(),
            leaves = self.prompt_exprs.iter().map(PromptExpr::flat_size).sum::<usize>(),
            "parsed prompt trees"
        );

        self.prompt_exprs.iter().map(PromptExpr::to_host_prompt).collect()
    }

    /// Use pre-built trees instead of parsing prompt text
    ///
    /// Returns the host prompts for the trees, as [`RequestContext::prepare`].
    pub fn prepare_exprs(&mut self, exprs: Vec<PromptExpr>) -> Vec<String> {
        self.prompt_exprs = exprs;
        self.prompt_exprs.iter().map(PromptExpr::to_host_prompt).collect()
    }

    /// Combine one sampling step's predictions
    ///
    /// `x_out` holds each batch item's leaf predictions, then `batch_size`
    /// unconditioned rows. Passes straight through to `backend` when
    /// composition is disabled. If the trees do not match the inputs, the
    /// step falls back to `backend` and a diagnostic is recorded.
    pub fn combine_denoised<B: DenoiserBackend + ?Sized>(
        &mut self,
        backend: &B,
        x_out: &[Tensor],
        batch_cond_indices: &[Vec<CondIndex>],
        batch_size: usize,
        cond_scale: f32,
        step: usize,
    ) -> Vec<Tensor> {
        if !self.config.enabled {
            return backend.combine_denoised(x_out, batch_cond_indices, batch_size, cond_scale);
        }

        if let Some(rescale) = self.cfg_rescale_override.take() {
            self.cfg_rescale = rescale;
        }

        match self.try_combine(backend, x_out, batch_cond_indices, batch_size, cond_scale, step) {
            Ok(denoised) => denoised,
            Err(e) => {
                self.diagnostics.fallback(e);
                backend.combine_denoised(x_out, batch_cond_indices, batch_size, cond_scale)
            }
        }
    }

    fn try_combine<B: DenoiserBackend + ?Sized>(
        &mut self,
        backend: &B,
        x_out: &[Tensor],
        batch_cond_indices: &[Vec<CondIndex>],
        batch_size: usize,
        cond_scale: f32,
        step: usize,
    ) -> Result<Vec<Tensor>> {
        self.check_inputs(x_out, batch_cond_indices, batch_size)?;
        let uncond = &x_out[x_out.len() - batch_size..];

        let mut denoised =
            self.webui_denoised(backend, x_out, batch_cond_indices, uncond, cond_scale)?;

        let items = self.prompt_exprs.iter().zip(batch_cond_indices).zip(uncond);
        for (((expr, cond_indices), uncond), out) in items.zip(denoised.iter_mut()) {
            let (cond_delta, aux_cond_delta) =
                DeltaComposer::new(x_out, uncond, cond_indices, &mut self.diagnostics)
                    .with_top_k_ratio(f64::from(self.config.top_k_ratio))
                    .at_step(step)
                    .compose(expr)?;

            out.scaled_add(cond_scale, &aux_cond_delta);
            let reference = uncond + &cond_delta + &aux_cond_delta;
            *out = cfg_rescale(out, &reference, self.cfg_rescale);
        }

        Ok(denoised)
    }

    /// Backend combination restricted to the plain leaves of every tree
    fn webui_denoised<B: DenoiserBackend + ?Sized>(
        &self,
        backend: &B,
        x_out: &[Tensor],
        batch_cond_indices: &[Vec<CondIndex>],
        uncond: &[Tensor],
        cond_scale: f32,
    ) -> Result<Vec<Tensor>> {
        let mut rows: Vec<Tensor> = Vec::new();
        let mut sliced_indices = Vec::with_capacity(batch_cond_indices.len());

        for (expr, cond_indices) in self.prompt_exprs.iter().zip(batch_cond_indices) {
            let gathered = gather_plain_conds(expr, x_out, cond_indices, 0, rows.len())?;
            rows.extend(gathered.rows.into_iter().cloned());
            // items without plain leaves keep an empty list so positions stay aligned
            sliced_indices.push(gathered.cond_indices);
        }
        rows.extend(uncond.iter().cloned());

        let denoised = backend.combine_denoised(&rows, &sliced_indices, uncond.len(), cond_scale);
        if denoised.len() != uncond.len() {
            return Err(CompositionError::BackendOutput {
                expected: uncond.len(),
                actual: denoised.len(),
            });
        }
        if let Some(bad) = denoised.iter().find(|d| d.shape() != uncond[0].shape()) {
            return Err(CompositionError::shape_mismatch(uncond[0].shape(), bad.shape()));
        }

        Ok(denoised)
    }

    fn check_inputs(
        &self,
        x_out: &[Tensor],
        batch_cond_indices: &[Vec<CondIndex>],
        batch_size: usize,
    ) -> Result<()> {
        let trees = self.prompt_exprs.len();
        if trees != batch_size || batch_cond_indices.len() != batch_size || batch_size == 0 {
            return Err(CompositionError::BatchMismatch {
                trees,
                items: batch_cond_indices.len().max(batch_size),
            });
        }
        if x_out.len() < batch_size {
            return Err(CompositionError::RowOutOfRange {
                row: batch_size - 1,
                len: x_out.len(),
            });
        }

        for (batch_index, (expr, cond_indices)) in
            self.prompt_exprs.iter().zip(batch_cond_indices).enumerate()
        {
            let expected = expr.flat_size();
            if expected != cond_indices.len() {
                return Err(CompositionError::LeafCountMismatch {
                    batch_index,
                    expected,
                    actual: cond_indices.len(),
                });
            }
        }

        let shape = x_out[0].shape();
        if let Some(bad) = x_out.iter().find(|row| row.shape() != shape) {
            return Err(CompositionError::shape_mismatch(shape, bad.shape()));
        }

        Ok(())
    }

    /// Replace the rescale factor from the next combination on
    ///
    /// # Errors
    /// Returns [`ConfigError::OutOfRange`] outside `[0, 1]`.
    pub fn set_cfg_rescale_override(&mut self, rescale: f32) -> std::result::Result<(), ConfigError> {
        check_unit("cfg_rescale", rescale)?;
        self.cfg_rescale_override = Some(rescale);
        Ok(())
    }

    /// Carry an override that was validated when it was set
    pub(crate) fn carry_cfg_rescale_override(&mut self, rescale: Option<f32>) {
        self.cfg_rescale_override = rescale;
    }

    /// Carry sampler diagnostics raised before this request started
    pub(crate) fn carry_sampler_records(&mut self, previous: &RequestContext) {
        self.diagnostics.carry_sampler_records(&previous.diagnostics);
    }

    /// Pending rescale override, if any
    #[inline]
    #[must_use]
    pub fn cfg_rescale_override(&self) -> Option<f32> {
        self.cfg_rescale_override
    }

    /// Active rescale factor
    #[inline]
    #[must_use]
    pub fn cfg_rescale(&self) -> f32 {
        self.cfg_rescale
    }

    /// Whether the host sampler can be patched
    ///
    /// Samplers without a combination hook are left alone; if composition is
    /// enabled this is reported, since composed prompts will then be combined
    /// as a flat `AND`.
    pub fn supports_sampler(&mut self, sampler: &str, has_combine_hook: bool) -> bool {
        if !has_combine_hook && self.config.enabled {
            self.diagnostics.report(
                DiagnosticKind::UnsupportedSampler,
                format!("sampler '{sampler}' has no combination hook and will not be patched"),
            );
        }
        has_combine_hook
    }

    /// Parsed trees, one per batch item
    #[inline]
    #[must_use]
    pub fn prompt_exprs(&self) -> &[PromptExpr] {
        &self.prompt_exprs
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &NeutralPromptConfig {
        &self.config
    }

    /// Diagnostics raised so far
    #[inline]
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}
