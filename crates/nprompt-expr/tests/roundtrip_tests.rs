use nprompt_expr::{parse_root, CompositePrompt, ConciliationStrategy, PromptExpr};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn weight() -> impl Strategy<Value = f32> {
    (-8i32..8).prop_map(|quarter| quarter as f32 * 0.25)
}

fn leaf() -> BoxedStrategy<PromptExpr> {
    ("[a-z]{1,6}( [a-z]{1,6})?", weight())
        .prop_map(|(text, weight)| PromptExpr::leaf(text, weight))
        .boxed()
}

fn sequence(depth: u32, min_len: usize) -> BoxedStrategy<Vec<PromptExpr>> {
    let rest_min = min_len.saturating_sub(1);
    (
        plain_node(depth),
        proptest::collection::vec(any_node(depth), rest_min..rest_min + 3),
    )
        .prop_map(|(first, mut rest)| {
            rest.insert(0, first);
            rest
        })
        .boxed()
}

fn plain_node(depth: u32) -> BoxedStrategy<PromptExpr> {
    if depth == 0 {
        return leaf();
    }
    prop_oneof![
        3 => leaf(),
        1 => (sequence(depth - 1, 2), weight())
            .prop_map(|(children, weight)| PromptExpr::composite(weight, None, children)),
    ]
    .boxed()
}

fn perp_node(depth: u32) -> BoxedStrategy<PromptExpr> {
    let shorthand = leaf().prop_map(|leaf| {
        PromptExpr::composite(1.0, Some(ConciliationStrategy::Perpendicular), vec![leaf])
    });
    if depth == 0 {
        return shorthand.boxed();
    }
    prop_oneof![
        shorthand,
        (sequence(depth - 1, 1), weight()).prop_map(|(children, weight)| {
            PromptExpr::composite(weight, Some(ConciliationStrategy::Perpendicular), children)
        }),
    ]
    .boxed()
}

fn any_node(depth: u32) -> BoxedStrategy<PromptExpr> {
    prop_oneof![plain_node(depth), perp_node(depth)].boxed()
}

fn tree() -> impl Strategy<Value = PromptExpr> {
    sequence(3, 1).prop_map(|children| CompositePrompt::root(children).into())
}

proptest! {
    #[test]
    fn prop_rendered_prompt_reparses_to_same_tree(expr in tree()) {
        let rendered = expr.to_prompt().unwrap();
        prop_assert_eq!(parse_root(&rendered), expr);
    }

    #[test]
    fn prop_flat_size_matches_leaf_count(expr in tree()) {
        prop_assert_eq!(expr.flat_size(), expr.leaves().len());
        prop_assert_eq!(expr.to_host_prompt().split(" AND ").count(), expr.flat_size());
    }

    #[test]
    fn prop_parsed_prompt_renders_faithfully(
        prompt in "([a-c \\[\\]:0-9.]{0,6}( AND | AND_PERP )?){1,6}"
    ) {
        let expr = parse_root(&prompt);
        if let Ok(rendered) = expr.to_prompt() {
            prop_assert_eq!(parse_root(&rendered), expr, "rendered: {}", rendered);
        }
    }

    #[test]
    fn prop_parser_never_panics(prompt in "[a-c \\[\\]:0-9.ANDPERP_]{0,40}") {
        let expr = parse_root(&prompt);
        prop_assert!(expr.flat_size() >= 1);
    }
}

#[test]
fn weighted_leaf_and_perpendicular_group() {
    let expr = parse_root("a:2 AND_PERP [b AND c:3]");
    let children = expr.children();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0], PromptExpr::leaf("a", 2.0));

    let nested = children[1].as_composite().unwrap();
    assert_eq!(nested.weight, 1.0);
    assert_eq!(
        nested.children,
        vec![PromptExpr::leaf("b", 1.0), PromptExpr::leaf("c", 3.0)]
    );
}

#[test]
fn bracketed_text_after_and_perp_renders_as_group() {
    for prompt in ["a AND_PERP [[cat:dog]:2]", "AND_PERP [[x]] AND y"] {
        let expr = parse_root(prompt);
        let rendered = expr.to_prompt().unwrap();
        assert_eq!(parse_root(&rendered), expr, "prompt: {prompt}");
    }
}

#[test]
fn host_prompt_preserves_pre_order() {
    let expr = parse_root("a AND_PERP [b AND_PERP [c AND d]] AND e");
    assert_eq!(
        expr.to_host_prompt(),
        "a :1 AND b :1 AND c :1 AND d :1 AND e :1"
    );
}
