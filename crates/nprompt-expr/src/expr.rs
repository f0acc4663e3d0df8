//! Prompt expression tree
//!
//! Provides [`PromptExpr`], the tree of leaf prompts and composite groups that
//! drives guidance composition.

use crate::lexer::PromptKeyword;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Node of a prompt expression tree
///
/// Every node carries a signed weight applied when its delta is folded into
/// the parent. Leaves map one-to-one, in pre-order, onto backend conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptExpr {
    /// Independently encoded prompt text
    Leaf(LeafPrompt),

    /// Group of sub-expressions under one weight and reconciliation policy
    Composite(CompositePrompt),
}

impl PromptExpr {
    /// Create a leaf node
    #[inline]
    #[must_use]
    pub fn leaf(text: impl Into<String>, weight: f32) -> Self {
        Self::Leaf(LeafPrompt::new(text, weight))
    }

    /// Create a composite node
    #[inline]
    #[must_use]
    pub fn composite(
        weight: f32,
        conciliation: Option<ConciliationStrategy>,
        children: Vec<PromptExpr>,
    ) -> Self {
        Self::Composite(CompositePrompt {
            weight,
            children,
            conciliation,
        })
    }

    /// Weight applied when folding this node into its parent
    #[inline]
    #[must_use]
    pub fn weight(&self) -> f32 {
        match self {
            Self::Leaf(leaf) => leaf.weight,
            Self::Composite(composite) => composite.weight,
        }
    }

    /// Reconciliation strategy (always `None` for leaves)
    #[inline]
    #[must_use]
    pub fn conciliation(&self) -> Option<ConciliationStrategy> {
        match self {
            Self::Leaf(_) => None,
            Self::Composite(composite) => composite.conciliation,
        }
    }

    /// Children in evaluation order (empty for leaves)
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[PromptExpr] {
        match self {
            Self::Leaf(_) => &[],
            Self::Composite(composite) => &composite.children,
        }
    }

    /// Borrow as composite
    #[inline]
    #[must_use]
    pub fn as_composite(&self) -> Option<&CompositePrompt> {
        match self {
            Self::Leaf(_) => None,
            Self::Composite(composite) => Some(composite),
        }
    }

    /// Borrow as leaf
    #[inline]
    #[must_use]
    pub fn as_leaf(&self) -> Option<&LeafPrompt> {
        match self {
            Self::Leaf(leaf) => Some(leaf),
            Self::Composite(_) => None,
        }
    }

    /// Number of backend conditions this subtree flattens to
    #[must_use]
    pub fn flat_size(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Composite(composite) => composite.flat_size(),
        }
    }

    /// Leaves in pre-order
    #[must_use]
    pub fn leaves(&self) -> Vec<&LeafPrompt> {
        let mut out = Vec::with_capacity(self.flat_size());
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a LeafPrompt>) {
        match self {
            Self::Leaf(leaf) => out.push(leaf),
            Self::Composite(composite) => {
                for child in &composite.children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Maximum nesting depth (a lone leaf has depth 1)
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Composite(composite) => {
                1 + composite
                    .children
                    .iter()
                    .map(PromptExpr::depth)
                    .max()
                    .unwrap_or(0)
            }
        }
    }
}

impl From<LeafPrompt> for PromptExpr {
    fn from(leaf: LeafPrompt) -> Self {
        Self::Leaf(leaf)
    }
}

impl From<CompositePrompt> for PromptExpr {
    fn from(composite: CompositePrompt) -> Self {
        Self::Composite(composite)
    }
}

/// Prompt text encoded and denoised on its own by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafPrompt {
    /// Signed weight
    pub weight: f32,

    /// Prompt text handed to the backend
    pub text: String,
}

impl LeafPrompt {
    /// Create new leaf
    #[inline]
    #[must_use]
    pub fn new(text: impl Into<String>, weight: f32) -> Self {
        Self {
            weight,
            text: text.into(),
        }
    }
}

/// Ordered group of sub-expressions
///
/// A `conciliation` of `None` means plain `AND`: child deltas are summed
/// into the parent. Any other value reconciles the whole subtree against the
/// parent's combined plain delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositePrompt {
    /// Signed weight
    pub weight: f32,

    /// Children; order fixes backend index assignment
    pub children: Vec<PromptExpr>,

    /// Reconciliation policy against sibling deltas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conciliation: Option<ConciliationStrategy>,
}

impl CompositePrompt {
    /// Create empty plain composite
    #[inline]
    #[must_use]
    pub fn new(weight: f32) -> Self {
        Self {
            weight,
            children: Vec::new(),
            conciliation: None,
        }
    }

    /// Implicit root: weight `1.0`, plain `AND`
    #[inline]
    #[must_use]
    pub fn root(children: Vec<PromptExpr>) -> Self {
        Self {
            weight: 1.0,
            children,
            conciliation: None,
        }
    }

    /// Set reconciliation strategy
    #[inline]
    #[must_use]
    pub fn with_conciliation(mut self, strategy: ConciliationStrategy) -> Self {
        self.conciliation = Some(strategy);
        self
    }

    /// Append a child
    #[inline]
    #[must_use]
    pub fn with_child(mut self, child: impl Into<PromptExpr>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Sum of children's flat sizes
    #[must_use]
    pub fn flat_size(&self) -> usize {
        self.children.iter().map(PromptExpr::flat_size).sum()
    }

    /// Whether this group is reconciled rather than summed
    #[inline]
    #[must_use]
    pub fn is_reconciled(&self) -> bool {
        self.conciliation.is_some()
    }
}

/// How a reconciled subtree is folded into its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConciliationStrategy {
    /// Keep only the component orthogonal to the parent's plain delta
    Perpendicular,

    /// Replace the parent delta where this subtree is the most salient
    SalienceMask,

    /// Keep only the largest-magnitude elements
    SemanticGuidance,
}

impl ConciliationStrategy {
    /// All strategies
    pub const ALL: [Self; 3] = [
        Self::Perpendicular,
        Self::SalienceMask,
        Self::SemanticGuidance,
    ];

    /// Stable name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Perpendicular => "perpendicular",
            Self::SalienceMask => "salience_mask",
            Self::SemanticGuidance => "semantic_guidance",
        }
    }

    /// Prompt keyword that selects this strategy, if any
    #[inline]
    #[must_use]
    pub fn keyword(&self) -> Option<PromptKeyword> {
        match self {
            Self::Perpendicular => Some(PromptKeyword::AndPerp),
            Self::SalienceMask | Self::SemanticGuidance => None,
        }
    }
}

impl Display for ConciliationStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConciliationStrategy {
    type Err = crate::ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name() == s)
            .ok_or_else(|| crate::ExprError::UnknownStrategy(s.to_string()))
    }
}
