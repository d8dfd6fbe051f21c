//! Per-tuple reshaping nodes
//!
//! Each node maps every input tuple to exactly one output tuple. The scope
//! shifting nodes report it through [`PlanNode::shifts_scope`].

use super::{Batch, BoxedPlanNode, NodeState, PlanNode};
use crate::connections::ConnectionsGroup;
use crate::constraint::SourceConstraintComponent;
use crate::error::Result;
use crate::tuple::{ResultDetail, ValidationTuple};
use async_trait::async_trait;
use shapeflow_db_core::Term;
use std::sync::Arc;

type MapFn = Arc<dyn Fn(ValidationTuple) -> ValidationTuple + Send + Sync>;

struct MapNode {
    input: BoxedPlanNode,
    map: MapFn,
    state: NodeState,
}

impl MapNode {
    fn new(input: BoxedPlanNode, map: MapFn) -> Self {
        Self {
            input,
            map,
            state: NodeState::Created,
        }
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.state.check_open()?;
        self.input.open(ctx).await?;
        self.state = NodeState::Open;
        Ok(())
    }

    async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        if !self.state.check_next()? {
            return Ok(None);
        }
        match self.input.next_batch(ctx).await? {
            Some(batch) => Ok(Some(batch.into_iter().map(|t| (self.map)(t)).collect())),
            None => {
                self.state = NodeState::Exhausted;
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        self.input.close();
        self.state = NodeState::Closed;
    }
}

macro_rules! reshape_node {
    ($(#[$doc:meta])* $name:ident, $shifts:expr, $map:expr) => {
        $(#[$doc])*
        pub struct $name(MapNode);

        impl $name {
            pub fn new(input: BoxedPlanNode) -> Self {
                Self(MapNode::new(input, Arc::new($map)))
            }
        }

        #[async_trait]
        impl PlanNode for $name {
            fn name(&self) -> &'static str {
                stringify!($name)
            }

            fn shifts_scope(&self) -> bool {
                $shifts
            }

            fn children(&self) -> Vec<&dyn PlanNode> {
                vec![self.0.input.as_ref()]
            }

            async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
                self.0.open(ctx).await
            }

            async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
                self.0.next_batch(ctx).await
            }

            fn close(&mut self) {
                self.0.close()
            }
        }
    };
}

reshape_node!(
    /// Node-scope `[t0 .. tn, v]` becomes property-scope with value `v`
    ShiftToPropertyShape,
    true,
    |t: ValidationTuple| t.shift_to_property_shape()
);
reshape_node!(
    /// Property-scope tuples become node-scope, dropping the value
    ShiftToNodeShape,
    true,
    |t: ValidationTuple| t.shift_to_node_shape()
);
reshape_node!(
    /// Drop the value, keeping scope
    TrimToTarget,
    false,
    |t: ValidationTuple| t.trim_to_target()
);
reshape_node!(
    /// The value becomes the focus node of a node-scope tuple
    ValueAsFocus,
    true,
    |t: ValidationTuple| t.value_as_focus()
);
reshape_node!(
    /// The whole chain becomes a target chain without value
    ChainAsTarget,
    true,
    |t: ValidationTuple| t.chain_as_target()
);

/// Node-scope tuples of the first `len` chain nodes
///
/// Maps results of nested shapes back onto the chains of an enclosing one.
pub struct Truncate {
    inner: MapNode,
    len: usize,
}

impl Truncate {
    pub fn new(input: BoxedPlanNode, len: usize) -> Self {
        let map: MapFn = Arc::new(move |t: ValidationTuple| t.truncate(len));
        Self {
            inner: MapNode::new(input, map),
            len,
        }
    }
}

#[async_trait]
impl PlanNode for Truncate {
    fn name(&self) -> &'static str {
        "Truncate"
    }

    fn shifts_scope(&self) -> bool {
        true
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        vec![self.inner.input.as_ref()]
    }

    fn detail(&self) -> Option<String> {
        Some(format!("{} nodes", self.len))
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.inner.open(ctx).await
    }

    async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        self.inner.next_batch(ctx).await
    }

    fn close(&mut self) {
        self.inner.close()
    }
}

/// Records which shape and component produced each tuple
pub struct Annotate {
    inner: MapNode,
    label: String,
}

impl Annotate {
    pub fn new(input: BoxedPlanNode, shape: Term, component: SourceConstraintComponent) -> Self {
        let label = format!("{} {}", shape, component.iri());
        let map: MapFn = Arc::new(move |t: ValidationTuple| {
            let detail = ResultDetail {
                focus_node: t.active_target().clone(),
                value: t.value().cloned(),
                shape: shape.clone(),
                component,
            };
            t.with_detail(detail)
        });
        Self {
            inner: MapNode::new(input, map),
            label,
        }
    }
}

#[async_trait]
impl PlanNode for Annotate {
    fn name(&self) -> &'static str {
        "Annotate"
    }

    fn children(&self) -> Vec<&dyn PlanNode> {
        vec![self.inner.input.as_ref()]
    }

    fn detail(&self) -> Option<String> {
        Some(self.label.clone())
    }

    async fn open(&mut self, ctx: &ConnectionsGroup) -> Result<()> {
        self.inner.open(ctx).await
    }

    async fn next_batch(&mut self, ctx: &ConnectionsGroup) -> Result<Option<Batch>> {
        self.inner.next_batch(ctx).await
    }

    fn close(&mut self) {
        self.inner.close()
    }
}
