//! Recursive-descent prompt parser
//!
//! ```text
//! root     := prompts
//! prompts  := prompt (keyword prompt)*
//! prompt   := ('[' prompts ']' weight?) | text weight?
//! keyword  := 'AND' | 'AND_PERP'
//! weight   := ':' FLOAT
//! ```
//!
//! The parser never fails. Unbalanced brackets and stray weights degrade to
//! plain text so a malformed prompt still produces a usable tree.

use crate::expr::{CompositePrompt, ConciliationStrategy, PromptExpr};
use crate::lexer::{tokenize, PromptKeyword, Token};

/// Parse prompt text into a tree rooted at an implicit plain composite
#[must_use]
pub fn parse_root(prompt: &str) -> PromptExpr {
    let mut parser = Parser::new(tokenize(prompt));
    let children = parser.parse_prompts();
    CompositePrompt::root(children).into()
}

/// Parse a weight literal the way prompt weights are written (`2`, `.5`, `-1e-1`)
#[must_use]
pub fn parse_weight_literal(literal: &str) -> Option<f32> {
    literal.trim().parse::<f32>().ok()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn parse_prompts(&mut self) -> Vec<PromptExpr> {
        let mut prompts = vec![self.parse_prompt(PromptKeyword::And)];

        while let Some(token) = self.peek() {
            let keyword = match token {
                Token::CloseBracket => break,
                Token::Keyword(keyword) => {
                    let keyword = *keyword;
                    self.pos += 1;
                    keyword
                }
                // text after a group's closing bracket joins as plain AND
                _ => PromptKeyword::And,
            };
            prompts.push(self.parse_prompt(keyword));
        }

        prompts
    }

    fn parse_prompt(&mut self, keyword: PromptKeyword) -> PromptExpr {
        match keyword {
            PromptKeyword::And => {
                if self.opens_group() {
                    self.parse_group(None)
                } else {
                    let (text, weight) = self.parse_prompt_text();
                    PromptExpr::leaf(text, weight)
                }
            }
            PromptKeyword::AndPerp => {
                if matches!(self.peek(), Some(Token::OpenBracket)) {
                    self.parse_group(Some(ConciliationStrategy::Perpendicular))
                } else {
                    let (text, weight) = self.parse_prompt_text();
                    PromptExpr::composite(
                        1.0,
                        Some(ConciliationStrategy::Perpendicular),
                        vec![PromptExpr::leaf(text, weight)],
                    )
                }
            }
        }
    }

    /// A `[` in plain position opens a group only if a keyword sits directly
    /// inside it; otherwise the brackets are host prompt syntax.
    fn opens_group(&self) -> bool {
        if !matches!(self.peek(), Some(Token::OpenBracket)) {
            return false;
        }

        let mut depth = 0usize;
        for token in &self.tokens[self.pos..] {
            match token {
                Token::OpenBracket => depth += 1,
                Token::CloseBracket => {
                    depth -= 1;
                    if depth == 0 {
                        return false;
                    }
                }
                Token::Keyword(_) if depth == 1 => return true,
                _ => {}
            }
        }

        false
    }

    fn parse_group(&mut self, conciliation: Option<ConciliationStrategy>) -> PromptExpr {
        // opening bracket
        self.pos += 1;
        let children = self.parse_prompts();
        if matches!(self.peek(), Some(Token::CloseBracket)) {
            self.pos += 1;
        }
        let weight = self.parse_group_weight();
        PromptExpr::composite(weight, conciliation, children)
    }

    fn parse_group_weight(&mut self) -> f32 {
        if !matches!(self.peek(), Some(Token::Colon)) {
            return 1.0;
        }

        match self.peek_at(1) {
            Some(Token::Text(literal)) => match parse_weight_literal(literal) {
                Some(weight) => {
                    self.pos += 2;
                    weight
                }
                None => 1.0,
            },
            _ => 1.0,
        }
    }

    fn parse_prompt_text(&mut self) -> (String, f32) {
        let mut text = String::new();
        let mut depth = 0usize;
        let mut weight = 1.0;

        while let Some(token) = self.tokens.get(self.pos) {
            match token {
                Token::CloseBracket if depth == 0 => break,
                Token::CloseBracket => depth -= 1,
                Token::OpenBracket => depth += 1,
                Token::Colon => {
                    if let Some(parsed) = self.trailing_weight(depth) {
                        weight = parsed;
                        self.pos += 2;
                        break;
                    }
                }
                Token::Keyword(_) => break,
                Token::Text(_) => {}
            }

            text.push_str(token.as_str());
            self.pos += 1;
        }

        (text.trim().to_string(), weight)
    }

    /// Weight following the `:` at the cursor, if the token after it closes the scope
    fn trailing_weight(&self, depth: usize) -> Option<f32> {
        let Some(Token::Text(literal)) = self.peek_at(1) else {
            return None;
        };
        let weight = parse_weight_literal(literal)?;

        let closes_scope = match self.peek_at(2) {
            None | Some(Token::Keyword(_)) => true,
            Some(Token::CloseBracket) => depth == 0,
            Some(_) => false,
        };

        closes_scope.then_some(weight)
    }
}
