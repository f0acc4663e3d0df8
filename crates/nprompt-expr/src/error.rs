//! Error types for prompt expressions

/// Errors from keyword/strategy lookup and tree rendering
///
/// Parsing itself never fails; these only arise from explicit conversions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    /// Keyword not part of the grammar
    #[error("unknown prompt keyword: '{0}'")]
    UnknownKeyword(String),

    /// Strategy name not recognised
    #[error("unknown conciliation strategy: '{0}'")]
    UnknownStrategy(String),

    /// Tree has no equivalent prompt text
    #[error("tree cannot be rendered as prompt text: {0}")]
    Unrepresentable(String),
}

impl ExprError {
    /// Create unrepresentable error
    #[inline]
    #[must_use]
    pub fn unrepresentable(reason: impl Into<String>) -> Self {
        Self::Unrepresentable(reason.into())
    }
}
