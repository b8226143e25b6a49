//! Tree rewriting passes applied between parsing and evaluation
//!
//! An [`Optimizer`] takes ownership of a tree and returns it with strategies
//! replaced on some nodes. Every pass only touches nodes that are still on
//! [`Strategy::Default`], so a later pass never discards an earlier one's work.

use crate::context::{Context, Var};
use crate::node::{Interpret, Node, NodeKind, Strategy};
use crate::runtime::Runtime;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// A tree rewriting pass
pub trait Optimizer: Send + Sync {
    /// Rewrite `node`; `ctx` is the context the tree will be evaluated against
    fn optimize(&self, ctx: &dyn Context, runtime: &Runtime, node: Node) -> Node;

    /// Identity of the pass for artifact caching; `None` when the pass binds
    /// live objects and its output must never be shared
    fn cache_key(&self) -> Option<String> {
        None
    }
}

/// Apply `optimizers` left to right
pub fn apply(
    mut node: Node,
    ctx: &dyn Context,
    runtime: &Runtime,
    optimizers: &[&dyn Optimizer],
) -> Node {
    for (i, optimizer) in optimizers.iter().enumerate() {
        node = optimizer.optimize(ctx, runtime, node);
        debug!(pass = i, key = ?optimizer.cache_key(), "Applied optimizer");
    }
    node
}

/// Precompute literals, and optionally stable call subtrees, into constants
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantFolding {
    calls: bool,
}

impl ConstantFolding {
    /// Fold literal nodes only
    pub fn new() -> Self {
        Self::default()
    }

    /// Also fold calls whose function and arguments are all stable
    pub fn with_calls() -> Self {
        Self { calls: true }
    }

    fn fold(&self, ctx: &dyn Context, runtime: &Runtime, node: &mut Node) {
        if !node.is_default() {
            return;
        }
        match node.kind() {
            NodeKind::Literal(value) => {
                let value = value.clone();
                node.set_strategy(Strategy::Constant(value));
            }
            NodeKind::Call(_) if self.calls && node.is_stable() => {
                match node.eval(ctx, runtime) {
                    Ok(value) => {
                        trace!(function = node.text(), %value, "Folded call");
                        node.set_strategy(Strategy::Constant(value));
                    }
                    // Left as is so the error surfaces when evaluated
                    Err(err) => {
                        trace!(function = node.text(), error = %err, "Call not folded");
                        self.fold_children(ctx, runtime, node);
                    }
                }
            }
            NodeKind::Call(_) => self.fold_children(ctx, runtime, node),
            NodeKind::Variable(_) => {}
        }
    }

    fn fold_children(&self, ctx: &dyn Context, runtime: &Runtime, node: &mut Node) {
        for child in node.children_mut() {
            self.fold(ctx, runtime, child);
        }
    }
}

impl Optimizer for ConstantFolding {
    fn optimize(&self, ctx: &dyn Context, runtime: &Runtime, mut node: Node) -> Node {
        self.fold(ctx, runtime, &mut node);
        node
    }

    fn cache_key(&self) -> Option<String> {
        Some(if self.calls { "fold+calls".to_string() } else { "fold".to_string() })
    }
}

/// Bind variable references directly to [`Var`] cells
///
/// Names are looked up in the explicit map first, then in the context. Names
/// bound in neither keep their default lookup.
#[derive(Debug, Clone, Default)]
pub struct VarShortcut {
    vars: Arc<HashMap<String, Arc<Var>>>,
}

impl VarShortcut {
    pub fn new(vars: HashMap<String, Arc<Var>>) -> Self {
        Self { vars: Arc::new(vars) }
    }

    /// Build from a list of cells, later cells winning on duplicate names
    pub fn from_vars(vars: &[Arc<Var>]) -> Self {
        Self::new(vars.iter().map(|var| (var.name().to_string(), Arc::clone(var))).collect())
    }
}

impl Optimizer for VarShortcut {
    fn optimize(&self, ctx: &dyn Context, _runtime: &Runtime, mut node: Node) -> Node {
        let mut bound = 0usize;
        node.walk_mut(&mut |n| {
            if !n.is_default() {
                return;
            }
            let NodeKind::Variable(name) = n.kind() else {
                return;
            };
            let var = self.vars.get(name).cloned().or_else(|| ctx.get_var(name));
            if let Some(var) = var {
                n.set_strategy(Strategy::Var(var));
                bound += 1;
            }
        });
        trace!(bound, "Bound variable references");
        node
    }
}

/// Attach custom interpreters to nodes whose text matches
#[derive(Clone, Default)]
pub struct InterpreterInjection {
    interpreters: HashMap<String, Arc<dyn Interpret>>,
}

impl std::fmt::Debug for InterpreterInjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterInjection")
            .field("texts", &self.interpreters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl InterpreterInjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `interpreter` for every default node whose text is `text`
    #[must_use]
    pub fn with(mut self, text: impl Into<String>, interpreter: Arc<dyn Interpret>) -> Self {
        self.interpreters.insert(text.into(), interpreter);
        self
    }
}

impl Optimizer for InterpreterInjection {
    fn optimize(&self, _ctx: &dyn Context, _runtime: &Runtime, mut node: Node) -> Node {
        node.walk_mut(&mut |n| {
            if !n.is_default() {
                return;
            }
            if let Some(interpreter) = self.interpreters.get(n.text()) {
                n.set_strategy(Strategy::Custom(Arc::clone(interpreter)));
            }
        });
        node
    }
}
