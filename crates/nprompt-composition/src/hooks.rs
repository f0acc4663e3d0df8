//! Shared hook adapter
//!
//! Hosts call the prompt hook and the combination hook from different places
//! but through one handle. [`NeutralPromptHooks`] owns the backend and keeps
//! the current [`RequestContext`] behind a lock, replacing it wholesale at
//! the start of every request.

use crate::backend::{CondIndex, DenoiserBackend};
use crate::config::NeutralPromptConfig;
use crate::context::RequestContext;
use crate::diagnostics::Diagnostics;
use crate::error::ConfigError;
use crate::kernels::Tensor;
use parking_lot::Mutex;

/// Prompt and combination hooks over a backend
#[derive(Debug)]
pub struct NeutralPromptHooks<B> {
    backend: B,
    config: NeutralPromptConfig,
    context: Mutex<RequestContext>,
}

impl<B: DenoiserBackend> NeutralPromptHooks<B> {
    /// Create hooks with validated configuration
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn new(backend: B, config: NeutralPromptConfig) -> Result<Self, ConfigError> {
        let context = RequestContext::new(config.clone())?;
        Ok(Self {
            backend,
            config,
            context: Mutex::new(context),
        })
    }

    /// Start a request: parse prompts and return what the host should encode
    ///
    /// Uses the configuration the hooks were built with. A rescale override
    /// set before the request, and any sampler diagnostics, are carried into it.
    pub fn prepare<S: AsRef<str>>(&self, prompts: &[S]) -> Vec<String> {
        self.start_request(RequestContext::from_validated(self.config.clone()), prompts)
    }

    /// Start a request with its own configuration
    ///
    /// Lets a host switch composition on or off, or change the rescale
    /// factor, for a single request without rebuilding the hooks. Later
    /// calls to [`NeutralPromptHooks::prepare`] go back to the hooks'
    /// configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `config` fails validation; the current
    /// request is left untouched.
    pub fn prepare_with<S: AsRef<str>>(
        &self,
        config: NeutralPromptConfig,
        prompts: &[S],
    ) -> Result<Vec<String>, ConfigError> {
        let next = RequestContext::new(config)?;
        Ok(self.start_request(next, prompts))
    }

    fn start_request<S: AsRef<str>>(
        &self,
        mut next: RequestContext,
        prompts: &[S],
    ) -> Vec<String> {
        let host_prompts = next.prepare(prompts);

        let mut context = self.context.lock();
        next.carry_cfg_rescale_override(context.cfg_rescale_override());
        next.carry_sampler_records(&context);
        *context = next;
        host_prompts
    }

    /// Combination hook for one sampling step
    pub fn combine(
        &self,
        x_out: &[Tensor],
        batch_cond_indices: &[Vec<CondIndex>],
        batch_size: usize,
        cond_scale: f32,
        step: usize,
    ) -> Vec<Tensor> {
        self.context.lock().combine_denoised(
            &self.backend,
            x_out,
            batch_cond_indices,
            batch_size,
            cond_scale,
            step,
        )
    }

    /// Override the rescale factor from the next combination on
    ///
    /// # Errors
    /// Returns [`ConfigError::OutOfRange`] outside `[0, 1]`.
    pub fn set_cfg_rescale_override(&self, rescale: f32) -> Result<(), ConfigError> {
        self.context.lock().set_cfg_rescale_override(rescale)
    }

    /// Whether a sampler can be patched; see [`RequestContext::supports_sampler`]
    pub fn supports_sampler(&self, sampler: &str, has_combine_hook: bool) -> bool {
        self.context.lock().supports_sampler(sampler, has_combine_hook)
    }

    /// Snapshot of the current request's diagnostics
    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        self.context.lock().diagnostics().clone()
    }

    /// The wrapped backend
    #[inline]
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }
}
