//! Neutral Prompt Composition
//!
//! Guidance-delta composition over prompt expression trees.
//!
//! # Core Concepts
//!
//! - [`DenoiserBackend`]: the host's native combination of per-condition
//!   predictions
//! - [`RequestContext`]: trees, rescale factor and diagnostics of one request
//! - [`NeutralPromptHooks`]: shared adapter exposing `prepare` and `combine`
//! - [`DeltaComposer`]: plain and reconciled delta passes over one tree
//! - [`kernels`]: projection, salience blend, top-k filter, rescale
//!
//! # Example
//!
//! ```rust
//! use ndarray::arr1;
//! use nprompt_composition::{NeutralPromptConfig, NeutralPromptHooks, WeightedSumBackend};
//!
//! let hooks = NeutralPromptHooks::new(WeightedSumBackend, NeutralPromptConfig::new())?;
//! let host_prompts = hooks.prepare(&["a cat AND_PERP a dog:0.5"]);
//! assert_eq!(host_prompts, vec!["a cat :1 AND a dog :0.5"]);
//!
//! // two leaf predictions, then the unconditioned one
//! let x_out = vec![
//!     arr1(&[1.0_f32, 0.0]).into_dyn(),
//!     arr1(&[1.0_f32, 1.0]).into_dyn(),
//!     arr1(&[0.0_f32, 0.0]).into_dyn(),
//! ];
//! let denoised = hooks.combine(&x_out, &[vec![(0, 1.0), (1, 0.5)]], 1, 2.0, 0);
//! assert_eq!(denoised, vec![arr1(&[2.0_f32, 1.0]).into_dyn()]);
//! # Ok::<(), nprompt_composition::ConfigError>(())
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod backend;
mod config;
mod context;
mod delta;
mod diagnostics;
mod error;
mod gather;
mod hooks;
pub mod kernels;

// Re-exports
pub use backend::{CondIndex, DenoiserBackend, WeightedSumBackend};
pub use config::NeutralPromptConfig;
pub use context::RequestContext;
pub use delta::{DeltaComposer, DEFAULT_TOP_K_RATIO};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::{CompositionError, ConfigError};
pub use gather::{gather_plain_conds, GatheredConds};
pub use hooks::NeutralPromptHooks;
pub use kernels::Tensor;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
