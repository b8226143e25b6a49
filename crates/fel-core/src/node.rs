//! Abstract syntax tree evaluated by the interpreter and the compiler
//!
//! A [`Node`] carries one [`Strategy`] that decides both how the interpreter
//! computes its value and what the compiler builds for it. Optimizers replace
//! the strategy of nodes that are still on [`Strategy::Default`] and leave
//! customised nodes alone.

use crate::context::{Context, Var};
use crate::error::{FelError, FelResult};
use crate::function::{Arguments, Function, arity_error};
use crate::runtime::Runtime;
use fel_types::Value;
use std::fmt;
use std::sync::Arc;

/// Custom evaluation attached to a node by an optimizer
pub trait Interpret: Send + Sync {
    fn interpret(&self, ctx: &dyn Context, node: &Node, runtime: &Runtime) -> FelResult<Value>;
}

impl<F> Interpret for F
where
    F: Fn(&dyn Context, &Node, &Runtime) -> FelResult<Value> + Send + Sync,
{
    fn interpret(&self, ctx: &dyn Context, node: &Node, runtime: &Runtime) -> FelResult<Value> {
        self(ctx, node, runtime)
    }
}

/// How a node produces its value
#[derive(Clone, Default)]
pub enum Strategy {
    /// The node's own logic for its kind
    #[default]
    Default,
    /// A value computed ahead of time
    Constant(Value),
    /// The current value of a bound variable cell
    Var(Arc<Var>),
    /// An injected interpreter
    Custom(Arc<dyn Interpret>),
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Default => "default",
            Strategy::Constant(_) => "constant",
            Strategy::Var(_) => "var",
            Strategy::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Default => write!(f, "Default"),
            Strategy::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Strategy::Var(var) => f.debug_tuple("Var").field(&var.name()).finish(),
            Strategy::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Function target of a call node
#[derive(Clone)]
pub enum Callee {
    Resolved(Arc<dyn Function>),
    /// Not registered when the tree was built; fails when evaluated
    Unresolved(String),
}

impl Callee {
    pub fn name(&self) -> &str {
        match self {
            Callee::Resolved(function) => function.name(),
            Callee::Unresolved(name) => name,
        }
    }
}

impl fmt::Debug for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callee::Resolved(function) => f.debug_tuple("Resolved").field(&function.name()).finish(),
            Callee::Unresolved(name) => f.debug_tuple("Unresolved").field(name).finish(),
        }
    }
}

/// Node variants
#[derive(Debug, Clone)]
pub enum NodeKind {
    Literal(Value),
    Variable(String),
    Call(Callee),
}

/// An element of the expression tree
#[derive(Debug, Clone)]
pub struct Node {
    text: String,
    kind: NodeKind,
    children: Vec<Node>,
    /// Character offset in the source text
    position: usize,
    strategy: Strategy,
}

impl Node {
    pub fn literal(text: impl Into<String>, value: Value, position: usize) -> Self {
        Self::new(text.into(), NodeKind::Literal(value), Vec::new(), position)
    }

    pub fn variable(name: impl Into<String>, position: usize) -> Self {
        let name = name.into();
        Self::new(name.clone(), NodeKind::Variable(name), Vec::new(), position)
    }

    pub fn call(callee: Callee, children: Vec<Node>, position: usize) -> Self {
        Self::new(callee.name().to_string(), NodeKind::Call(callee), children, position)
    }

    fn new(text: String, kind: NodeKind, children: Vec<Node>, position: usize) -> Self {
        Self { text, kind, children, position, strategy: Strategy::Default }
    }

    /// Source token: literal text, variable name or function name
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Node] {
        &mut self.children
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    /// `true` while no optimizer has customised this node
    pub fn is_default(&self) -> bool {
        matches!(self.strategy, Strategy::Default)
    }

    /// `true` if evaluation always yields the same value
    pub fn is_stable(&self) -> bool {
        match &self.strategy {
            Strategy::Constant(_) => true,
            Strategy::Var(_) | Strategy::Custom(_) => false,
            Strategy::Default => match &self.kind {
                NodeKind::Literal(_) => true,
                NodeKind::Variable(_) => false,
                NodeKind::Call(Callee::Resolved(function)) => {
                    function.is_stable() && self.children.iter().all(Node::is_stable)
                }
                NodeKind::Call(Callee::Unresolved(_)) => false,
            },
        }
    }

    /// Height of the tree rooted here
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(Node::depth).max().unwrap_or(0)
    }

    /// Evaluate through the current strategy
    pub fn eval(&self, ctx: &dyn Context, runtime: &Runtime) -> FelResult<Value> {
        match &self.strategy {
            Strategy::Default => self.eval_default(ctx, runtime),
            Strategy::Constant(value) => Ok(value.clone()),
            Strategy::Var(var) => Ok(var.get()),
            Strategy::Custom(interpreter) => interpreter.interpret(ctx, self, runtime),
        }
    }

    /// Evaluate with the node's own logic, ignoring any custom strategy
    pub fn eval_default(&self, ctx: &dyn Context, runtime: &Runtime) -> FelResult<Value> {
        match &self.kind {
            NodeKind::Literal(value) => Ok(value.clone()),
            NodeKind::Variable(name) => Ok(ctx.get(name)),
            NodeKind::Call(Callee::Resolved(function)) => {
                if !function.arity().accepts(self.children.len()) {
                    return Err(arity_error(function.as_ref(), self.children.len()));
                }
                function.call(&NodeArgs { nodes: &self.children, ctx, runtime })
            }
            NodeKind::Call(Callee::Unresolved(name)) => {
                Err(FelError::eval(name, "function not found"))
            }
        }
    }

    /// Visit every node, parents before children
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Mutable pre-order traversal
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut Node)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let kind = match &self.kind {
            NodeKind::Literal(value) => format!("literal {}", value.type_name()),
            NodeKind::Variable(_) => "variable".to_string(),
            NodeKind::Call(Callee::Resolved(_)) => "call".to_string(),
            NodeKind::Call(Callee::Unresolved(_)) => "call unresolved".to_string(),
        };
        write!(f, "{:indent$}{} [{kind}]", "", self.text)?;
        if !self.is_default() {
            write!(f, " <{}>", self.strategy.label())?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.fmt_tree(f, indent + 2)?;
        }
        Ok(())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

/// Interpreter arguments: child nodes evaluated on demand
struct NodeArgs<'a> {
    nodes: &'a [Node],
    ctx: &'a dyn Context,
    runtime: &'a Runtime,
}

impl Arguments for NodeArgs<'_> {
    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn eval(&self, index: usize) -> FelResult<Value> {
        match self.nodes.get(index) {
            Some(node) => node.eval(self.ctx, self.runtime),
            None => Err(FelError::eval("argument", format!("no argument at index {index}"))),
        }
    }

    fn runtime(&self) -> &Runtime {
        self.runtime
    }
}
