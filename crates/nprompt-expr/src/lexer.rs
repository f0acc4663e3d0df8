//! Prompt tokenizer
//!
//! Splits prompt text on `[`, `]`, `:` and the whole-word keywords `AND` and
//! `AND_PERP`. Whitespace runs collapse to one space; whitespace-only
//! fragments are dropped, other text fragments keep their inner spacing.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

static DELIMITER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[|\]|:|\bAND_PERP\b|\bAND\b").expect("delimiter pattern is valid")
});

/// Composition keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKeyword {
    /// Plain weighted sum
    And,

    /// Perpendicular reconciliation
    AndPerp,
}

impl PromptKeyword {
    /// Surface syntax
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::AndPerp => "AND_PERP",
        }
    }
}

impl Display for PromptKeyword {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptKeyword {
    type Err = crate::ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AND" => Ok(Self::And),
            "AND_PERP" => Ok(Self::AndPerp),
            other => Err(crate::ExprError::UnknownKeyword(other.to_string())),
        }
    }
}

/// Lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `[`
    OpenBracket,

    /// `]`
    CloseBracket,

    /// `:`
    Colon,

    /// `AND` / `AND_PERP`
    Keyword(PromptKeyword),

    /// Anything else, spacing preserved
    Text(String),
}

impl Token {
    /// Source text of this token
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::OpenBracket => "[",
            Self::CloseBracket => "]",
            Self::Colon => ":",
            Self::Keyword(keyword) => keyword.as_str(),
            Self::Text(text) => text,
        }
    }

    fn from_delimiter(delimiter: &str) -> Self {
        match delimiter {
            "[" => Self::OpenBracket,
            "]" => Self::CloseBracket,
            ":" => Self::Colon,
            other => other
                .parse()
                .map_or_else(|_| Self::Text(other.to_string()), Self::Keyword),
        }
    }
}

/// Tokenize prompt text
#[must_use]
pub fn tokenize(prompt: &str) -> Vec<Token> {
    let collapsed = prompt.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut tokens = Vec::new();
    let mut last = 0;
    for found in DELIMITER.find_iter(&collapsed) {
        push_text(&mut tokens, &collapsed[last..found.start()]);
        tokens.push(Token::from_delimiter(found.as_str()));
        last = found.end();
    }
    push_text(&mut tokens, &collapsed[last..]);

    tokens
}

fn push_text(tokens: &mut Vec<Token>, fragment: &str) {
    if !fragment.trim().is_empty() {
        tokens.push(Token::Text(fragment.to_string()));
    }
}
