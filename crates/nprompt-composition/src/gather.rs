//! Plain-condition gathering
//!
//! Before the delta passes run, the backend's own combination is evaluated on
//! the plain leaves alone. This pass selects those leaves (every leaf with no
//! reconciled composite on its path) and renumbers them into a compacted
//! `x_out`.

use crate::backend::CondIndex;
use crate::error::{CompositionError, Result};
use crate::kernels::Tensor;
use nprompt_expr::PromptExpr;

/// Plain leaves of one tree
#[derive(Debug, Clone, Default)]
pub struct GatheredConds<'a> {
    /// Selected prediction rows, in pre-order
    pub rows: Vec<&'a Tensor>,

    /// `(compacted row, weight)` per selected row
    pub cond_indices: Vec<CondIndex>,
}

/// Gather the plain leaves of `expr`
///
/// `index_in` is the position of `expr`'s first leaf in `cond_indices` and
/// `index_out` the compacted row its first gathered leaf will occupy.
/// Reconciled subtrees are skipped but still advance `index_in`.
///
/// # Errors
/// Returns [`CompositionError`] when a leaf has no condition or its condition
/// points past `x_out`.
pub fn gather_plain_conds<'a>(
    expr: &PromptExpr,
    x_out: &'a [Tensor],
    cond_indices: &[CondIndex],
    index_in: usize,
    index_out: usize,
) -> Result<GatheredConds<'a>> {
    match expr {
        PromptExpr::Leaf(_) => {
            let &(row, weight) =
                cond_indices
                    .get(index_in)
                    .ok_or(CompositionError::CondIndexOutOfRange {
                        index: index_in,
                        len: cond_indices.len(),
                    })?;
            let tensor = x_out.get(row).ok_or(CompositionError::RowOutOfRange {
                row,
                len: x_out.len(),
            })?;

            Ok(GatheredConds {
                rows: vec![tensor],
                cond_indices: vec![(index_out, weight)],
            })
        }
        PromptExpr::Composite(composite) => {
            let mut gathered = GatheredConds::default();
            let mut index_in = index_in;

            for child in &composite.children {
                if child.conciliation().is_none() {
                    let offset = index_out + gathered.rows.len();
                    let child_conds = gather_plain_conds(child, x_out, cond_indices, index_in, offset)?;
                    gathered.rows.extend(child_conds.rows);
                    gathered.cond_indices.extend(child_conds.cond_indices);
                }
                index_in += child.flat_size();
            }

            Ok(gathered)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;
    use nprompt_expr::parse_root;

    fn t(value: f32) -> Tensor {
        arr1(&[value]).into_dyn()
    }

    #[test]
    fn gathers_all_plain_leaves() {
        let expr = parse_root("a AND b:0.5");
        let x_out = vec![t(0.0), t(1.0), t(9.0)];
        let conds = vec![(0, 1.0), (1, 0.5)];

        let gathered = gather_plain_conds(&expr, &x_out, &conds, 0, 0).unwrap();
        assert_eq!(gathered.rows, vec![&x_out[0], &x_out[1]]);
        assert_eq!(gathered.cond_indices, vec![(0, 1.0), (1, 0.5)]);
    }

    #[test]
    fn skips_reconciled_subtrees() {
        let expr = parse_root("a AND_PERP [b AND c] AND d:2");
        let x_out = vec![t(0.0), t(1.0), t(2.0), t(3.0)];
        let conds = vec![(0, 1.0), (1, 1.0), (2, 1.0), (3, 2.0)];

        let gathered = gather_plain_conds(&expr, &x_out, &conds, 0, 5).unwrap();
        assert_eq!(gathered.rows, vec![&x_out[0], &x_out[3]]);
        assert_eq!(gathered.cond_indices, vec![(5, 1.0), (6, 2.0)]);
    }

    #[test]
    fn nested_plain_groups_are_flattened() {
        let expr = parse_root("[a AND b] AND_PERP c AND d");
        let x_out = vec![t(0.0), t(1.0), t(2.0), t(3.0)];
        let conds = vec![(0, 1.0), (1, 1.0), (2, 1.0), (3, 1.0)];

        let gathered = gather_plain_conds(&expr, &x_out, &conds, 0, 0).unwrap();
        assert_eq!(gathered.rows, vec![&x_out[0], &x_out[1], &x_out[3]]);
        assert_eq!(gathered.cond_indices, vec![(0, 1.0), (1, 1.0), (2, 1.0)]);
    }

    #[test]
    fn bad_row_is_error() {
        let expr = parse_root("a");
        let x_out = vec![t(0.0)];
        let err = gather_plain_conds(&expr, &x_out, &[(4, 1.0)], 0, 0).unwrap_err();
        assert_eq!(err, CompositionError::RowOutOfRange { row: 4, len: 1 });
    }
}
