//! Rendering trees back to prompt text
//!
//! Two forms are produced:
//! - [`PromptExpr::to_prompt`]: composition syntax that parses back to an
//!   equal tree
//! - [`PromptExpr::to_host_prompt`]: every leaf as `text :weight` joined by
//!   ` AND `, so the backend builds one condition per leaf in pre-order

use crate::error::ExprError;
use crate::expr::{CompositePrompt, ConciliationStrategy, LeafPrompt, PromptExpr};
use crate::lexer::PromptKeyword;
use crate::parser::parse_root;
use std::fmt::Write;

impl PromptExpr {
    /// Render in composition syntax
    ///
    /// A composite node is rendered as its children; the root's own weight
    /// and strategy have no surface form and are ignored.
    ///
    /// The rendered text is parsed back before it is returned, so `Ok`
    /// always carries text that yields an equal tree.
    ///
    /// # Errors
    /// Returns [`ExprError::Unrepresentable`] for subtrees the grammar cannot
    /// express: strategies without a keyword, groups too small to be
    /// recognised as groups, reconciled first children, and leaf text whose
    /// brackets or colons would be read as structure.
    pub fn to_prompt(&self) -> Result<String, ExprError> {
        let (rendered, children) = match self {
            Self::Leaf(leaf) => (render_leaf(leaf), std::slice::from_ref(self)),
            Self::Composite(composite) => (
                render_sequence(&composite.children)?,
                composite.children.as_slice(),
            ),
        };

        if parse_root(&rendered).children() != children {
            return Err(ExprError::unrepresentable(format!(
                "{rendered:?} parses back to a different tree"
            )));
        }
        Ok(rendered)
    }

    /// Render every leaf for the backend's own `AND` parser
    #[must_use]
    pub fn to_host_prompt(&self) -> String {
        self.leaves()
            .iter()
            .map(|leaf| format!("{} :{}", leaf.text, leaf.weight))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

fn render_sequence(children: &[PromptExpr]) -> Result<String, ExprError> {
    let mut out = String::new();

    for (i, child) in children.iter().enumerate() {
        let keyword = match child.conciliation() {
            None => PromptKeyword::And,
            Some(strategy) => strategy
                .keyword()
                .ok_or_else(|| ExprError::unrepresentable(format!("no keyword for {strategy}")))?,
        };

        if i == 0 {
            if keyword != PromptKeyword::And {
                return Err(ExprError::unrepresentable(
                    "first child of a group must be plain",
                ));
            }
        } else {
            let _ = write!(out, " {keyword} ");
        }

        match child {
            PromptExpr::Leaf(leaf) => out.push_str(&render_leaf(leaf)),
            PromptExpr::Composite(composite) => out.push_str(&render_composite(composite)?),
        }
    }

    Ok(out)
}

fn render_composite(composite: &CompositePrompt) -> Result<String, ExprError> {
    // `AND_PERP text:w` shorthand; a leading `[` would open a group instead
    if composite.conciliation == Some(ConciliationStrategy::Perpendicular)
        && composite.weight == 1.0
    {
        if let [PromptExpr::Leaf(leaf)] = composite.children.as_slice() {
            if !leaf.text.trim_start().starts_with('[') {
                return Ok(render_leaf(leaf));
            }
        }
    }

    if composite.children.is_empty() {
        return Err(ExprError::unrepresentable("empty group"));
    }
    if composite.conciliation.is_none() && composite.children.len() < 2 {
        return Err(ExprError::unrepresentable(
            "plain group needs at least two children",
        ));
    }

    let mut out = format!("[{}]", render_sequence(&composite.children)?);
    if composite.weight != 1.0 {
        let _ = write!(out, ":{}", composite.weight);
    }
    Ok(out)
}

fn render_leaf(leaf: &LeafPrompt) -> String {
    if leaf.weight == 1.0 && !leaf.text.contains(':') {
        leaf.text.clone()
    } else {
        format!("{} :{}", leaf.text, leaf.weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn render_plain_leaves() {
        let expr = parse_root("a AND b:2");
        assert_eq!(expr.to_prompt().unwrap(), "a AND b :2");
    }

    #[test]
    fn render_perp_shorthand() {
        let expr = parse_root("a AND_PERP b:0.5");
        assert_eq!(expr.to_prompt().unwrap(), "a AND_PERP b :0.5");
    }

    #[test]
    fn render_perp_group() {
        let expr = parse_root("a:2 AND_PERP [b AND c:3]:-1");
        assert_eq!(expr.to_prompt().unwrap(), "a :2 AND_PERP [b AND c :3]:-1");
    }

    #[test]
    fn render_reparses_to_equal_tree() {
        for prompt in [
            "a",
            "a AND_PERP b",
            "a:2 AND_PERP [b AND c:3]",
            "[a AND b]:2 AND c",
            "style: watercolor AND [cat:dog:0.5] portrait",
            "AND_PERP x",
            "x AND_PERP [y AND_PERP [z AND w:-0.25]:1.5]",
            "a AND_PERP [[cat:dog]:2]",
            "a AND_PERP [[cat] portrait]",
        ] {
            let expr = parse_root(prompt);
            let rendered = expr.to_prompt().unwrap();
            assert_eq!(parse_root(&rendered), expr, "prompt: {prompt}");
        }
    }

    #[test]
    fn bracketed_perp_leaf_keeps_its_group() {
        let expr = parse_root("a AND_PERP [[cat:dog]:2]");
        assert_eq!(expr.to_prompt().unwrap(), "a AND_PERP [[cat:dog] :2]");
    }

    #[test]
    fn unbalanced_leaf_text_is_unrepresentable() {
        // the perpendicular leaf is the lone text `[`
        let expr = parse_root("AND_PERP[[");
        assert_eq!(expr.children()[1].leaves()[0].text, "[");
        assert!(matches!(
            expr.to_prompt(),
            Err(ExprError::Unrepresentable(_))
        ));
    }

    #[test]
    fn salience_has_no_surface_syntax() {
        let expr = PromptExpr::composite(
            1.0,
            None,
            vec![
                PromptExpr::leaf("a", 1.0),
                PromptExpr::composite(
                    1.0,
                    Some(ConciliationStrategy::SalienceMask),
                    vec![PromptExpr::leaf("b", 1.0)],
                ),
            ],
        );
        assert!(matches!(
            expr.to_prompt(),
            Err(ExprError::Unrepresentable(_))
        ));
    }

    #[test]
    fn single_child_plain_group_is_unrepresentable() {
        let expr = PromptExpr::composite(
            1.0,
            None,
            vec![
                PromptExpr::leaf("a", 1.0),
                PromptExpr::composite(1.0, None, vec![PromptExpr::leaf("b", 1.0)]),
            ],
        );
        assert!(expr.to_prompt().is_err());
    }

    #[test]
    fn host_prompt_lists_every_leaf() {
        let expr = parse_root("a:2 AND_PERP [b AND c:3]");
        assert_eq!(expr.to_host_prompt(), "a :2 AND b :1 AND c :3");
    }
}
