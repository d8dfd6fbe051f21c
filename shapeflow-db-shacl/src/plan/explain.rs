//! Plan rendering for logs
//!
//! ```text
//! Unique
//!   Union
//!     TargetChain (Delta <http://x/Person>)
//!     PathDelta (<http://x/knows>)
//! ```
//!
//! Nodes that change scope are marked with `[scope]`.

use super::PlanNode;
use std::fmt::Write;

/// Indented tree of `node` and its children
pub fn explain(node: &dyn PlanNode) -> String {
    let mut out = String::new();
    write_node(node, 0, &mut out);
    out
}

fn write_node(node: &dyn PlanNode, depth: usize, out: &mut String) {
    let _ = write!(out, "{:indent$}{}", "", node.name(), indent = depth * 2);
    if let Some(detail) = node.detail() {
        let _ = write!(out, " ({})", detail);
    }
    if node.shifts_scope() {
        out.push_str(" [scope]");
    }
    out.push('\n');
    for child in node.children() {
        write_node(child, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::test_support::*;
    use crate::plan::{ShiftToNodeShape, UnionNode, ValuesNode};

    #[test]
    fn test_indented_tree_marks_scope_changes() {
        let plan = ShiftToNodeShape::new(Box::new(UnionNode::new(vec![
            Box::new(ValuesNode::new(vec![node(&["a"])])),
            Box::new(ValuesNode::new(vec![])),
        ])));
        let text = explain(&plan);
        assert_eq!(
            text,
            "ShiftToNodeShape [scope]\n  Union\n    Values (1 tuples)\n    Values (0 tuples)\n"
        );
    }
}
