//! Neutral Prompt Expressions
//!
//! Parses composition prompts into expression trees.
//!
//! # Core Concepts
//!
//! - [`PromptExpr`]: Tree of [`LeafPrompt`]s and [`CompositePrompt`]s
//! - [`ConciliationStrategy`]: How a reconciled subtree folds into its parent
//! - [`parse_root`]: Text → tree, never fails
//! - [`tokenize`]: Text → [`Token`] stream
//!
//! # Example
//!
//! ```rust
//! use nprompt_expr::{parse_root, ConciliationStrategy};
//!
//! let expr = parse_root("a cat:2 AND_PERP [sunset AND ocean:0.5]");
//! assert_eq!(expr.flat_size(), 3);
//! assert_eq!(
//!     expr.children()[1].conciliation(),
//!     Some(ConciliationStrategy::Perpendicular)
//! );
//! assert_eq!(expr.to_host_prompt(), "a cat :2 AND sunset :1 AND ocean :0.5");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod error;
mod expr;
mod lexer;
mod parser;
mod render;

// Re-exports
pub use error::ExprError;
pub use expr::{CompositePrompt, ConciliationStrategy, LeafPrompt, PromptExpr};
pub use lexer::{tokenize, PromptKeyword, Token};
pub use parser::{parse_root, parse_weight_literal};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
