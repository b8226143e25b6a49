//! Closure compiler
//!
//! [`Compiler::compile`] turns an optimized [`Node`] tree into a tree of
//! closures with every function resolved and every bound variable captured,
//! so executing the artifact does no name dispatch and no matching on node
//! kinds. Alongside the closures it renders a textual source body from each
//! function's [`Function::emit`](crate::function::Function::emit); values that
//! have no literal form are stored in the artifact's own [`ValueTable`] and
//! referenced as `$n`.
//!
//! Both the closures and the source are derived from each node's single
//! [`Strategy`], so they can never disagree with the interpreter.

use crate::context::{Context, Var};
use crate::error::{FelError, FelResult};
use crate::function::Arguments;
use crate::node::{Callee, Node, NodeKind, Strategy};
use crate::runtime::Runtime;
use fel_types::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Executable body of a compiled node
pub type CompiledFn = Arc<dyn Fn(&dyn Context, &Runtime) -> FelResult<Value> + Send + Sync>;

/// Entry of an artifact's value table
#[derive(Debug, Clone)]
pub enum Slot {
    /// Bound variable, read on every execution
    Var(Arc<Var>),
    /// Value with no literal form
    Constant(Value),
    /// Injected interpreter for the node with this text
    Interpreter(String),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Var(var) => write!(f, "var {}", var.name()),
            Slot::Constant(value) => write!(f, "{} {}", value.type_name(), value.to_literal()),
            Slot::Interpreter(text) => write!(f, "interpreter for `{text}`"),
        }
    }
}

/// Values referenced by generated source, scoped to one build
#[derive(Debug, Clone, Default)]
pub struct ValueTable {
    slots: Vec<Slot>,
}

impl ValueTable {
    /// Store `slot` and return its identifier
    fn push(&mut self, slot: Slot) -> String {
        self.slots.push(slot);
        format!("${}", self.slots.len() - 1)
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A compiled expression, executable against any compatible context
///
/// Artifacts are immutable and can be shared between threads.
pub struct CompiledExpression {
    text: String,
    source: String,
    slots: ValueTable,
    root: CompiledFn,
    runtime: Runtime,
}

impl fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("text", &self.text)
            .field("source", &self.source)
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl CompiledExpression {
    /// Expression text the artifact was built from
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Emitted source body
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn slots(&self) -> &ValueTable {
        &self.slots
    }

    /// Execute against `ctx`
    pub fn eval(&self, ctx: &dyn Context) -> FelResult<Value> {
        (self.root)(ctx, &self.runtime)
    }
}

/// Node source and body produced for one subtree
struct Emitted {
    source: String,
    run: CompiledFn,
}

/// Builds [`CompiledExpression`]s
#[derive(Debug, Clone, Copy)]
pub struct Compiler {
    max_depth: usize,
}

impl Compiler {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Compile `node`, the tree parsed from `text`
    pub fn compile(&self, text: &str, node: &Node, runtime: Runtime) -> FelResult<CompiledExpression> {
        let depth = node.depth();
        if depth > self.max_depth {
            return Err(FelError::compile(
                text,
                format!("tree depth {depth} exceeds the limit of {}", self.max_depth),
            ));
        }

        let mut slots = ValueTable::default();
        let emitted = self.emit(text, node, &mut slots).inspect_err(|err| {
            warn!(expression = text, error = %err, "Compilation failed");
        })?;
        debug!(expression = text, source = %emitted.source, slots = slots.len(), "Compiled expression");

        Ok(CompiledExpression {
            text: text.to_string(),
            source: emitted.source,
            slots,
            root: emitted.run,
            runtime,
        })
    }

    fn emit(&self, text: &str, node: &Node, slots: &mut ValueTable) -> FelResult<Emitted> {
        match node.strategy() {
            Strategy::Constant(value) => Ok(Self::constant(value.clone(), slots)),
            Strategy::Var(var) => {
                let id = slots.push(Slot::Var(Arc::clone(var)));
                let var = Arc::clone(var);
                Ok(Emitted {
                    source: format!("{id}.get()"),
                    run: Arc::new(move |_: &dyn Context, _: &Runtime| Ok(var.get())),
                })
            }
            Strategy::Custom(interpreter) => {
                let id = slots.push(Slot::Interpreter(node.text().to_string()));
                let interpreter = Arc::clone(interpreter);
                let node = node.clone();
                Ok(Emitted {
                    source: format!("{id}.interpret()"),
                    run: Arc::new(move |ctx: &dyn Context, runtime: &Runtime| {
                        interpreter.interpret(ctx, &node, runtime)
                    }),
                })
            }
            Strategy::Default => self.emit_default(text, node, slots),
        }
    }

    fn emit_default(&self, text: &str, node: &Node, slots: &mut ValueTable) -> FelResult<Emitted> {
        match node.kind() {
            NodeKind::Literal(value) => Ok(Self::constant(value.clone(), slots)),
            NodeKind::Variable(name) => {
                let name = name.clone();
                Ok(Emitted {
                    source: format!("ctx.get({name:?})"),
                    run: Arc::new(move |ctx: &dyn Context, _: &Runtime| Ok(ctx.get(&name))),
                })
            }
            NodeKind::Call(callee) => {
                let children = node
                    .children()
                    .iter()
                    .map(|child| self.emit(text, child, slots))
                    .collect::<FelResult<Vec<_>>>()?;
                let sources: Vec<String> = children.iter().map(|c| c.source.clone()).collect();
                let args: Arc<[CompiledFn]> = children.into_iter().map(|c| c.run).collect();

                match callee {
                    Callee::Resolved(function) => {
                        if !function.arity().accepts(args.len()) {
                            return Err(FelError::compile(
                                text,
                                format!(
                                    "`{}` expects {} arguments, got {} (offset {})",
                                    function.name(),
                                    function.arity(),
                                    args.len(),
                                    node.position()
                                ),
                            ));
                        }
                        let source = function.emit(&sources);
                        let function = Arc::clone(function);
                        Ok(Emitted {
                            source,
                            run: Arc::new(move |ctx: &dyn Context, runtime: &Runtime| {
                                function.call(&CompiledArgs { args: &args, ctx, runtime })
                            }),
                        })
                    }
                    Callee::Unresolved(name) => {
                        let source = format!("{name}({})", sources.join(", "));
                        let name = name.clone();
                        Ok(Emitted {
                            source,
                            run: Arc::new(move |_: &dyn Context, _: &Runtime| {
                                Err(FelError::eval(&name, "function not found"))
                            }),
                        })
                    }
                }
            }
        }
    }

    /// Scalars are emitted inline; anything else goes to the value table
    fn constant(value: Value, slots: &mut ValueTable) -> Emitted {
        let source = match &value {
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => {
                value.to_literal()
            }
            _ => slots.push(Slot::Constant(value.clone())),
        };
        Emitted { source, run: Arc::new(move |_: &dyn Context, _: &Runtime| Ok(value.clone())) }
    }
}

/// Arguments backed by compiled child bodies
struct CompiledArgs<'a> {
    args: &'a [CompiledFn],
    ctx: &'a dyn Context,
    runtime: &'a Runtime,
}

impl Arguments for CompiledArgs<'_> {
    fn len(&self) -> usize {
        self.args.len()
    }

    fn eval(&self, index: usize) -> FelResult<Value> {
        match self.args.get(index) {
            Some(run) => run(self.ctx, self.runtime),
            None => Err(FelError::eval("argument", format!("no argument at index {index}"))),
        }
    }

    fn runtime(&self) -> &Runtime {
        self.runtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::AstBuilder;
    use crate::config::NumericMode;
    use crate::context::MapContext;
    use crate::function::{FunctionRegistry, default_registry};
    use crate::grammar::parse;
    use crate::optimizer::{ConstantFolding, InterpreterInjection, Optimizer, VarShortcut};
    use fel_types::BigInt;

    fn node(text: &str) -> Node {
        let registry = default_registry();
        AstBuilder::new(&registry, NumericMode::Double).build(&parse(text, 64).unwrap()).unwrap()
    }

    fn compile(text: &str) -> FelResult<CompiledExpression> {
        Compiler::new(64).compile(text, &node(text), Runtime::default())
    }

    #[test]
    fn test_compiled_reads_context_per_call() {
        let compiled = compile("x + 1").unwrap();
        assert_eq!(compiled.source(), "(ctx.get(\"x\") + 1)");

        let mut ctx = MapContext::from_pairs([("x", 41)]);
        assert_eq!(compiled.eval(&ctx).unwrap(), Value::Int(42));
        ctx.set("x", Value::Int(9));
        assert_eq!(compiled.eval(&ctx).unwrap(), Value::Int(10));
    }

    #[test]
    fn test_bound_vars_go_to_value_table() {
        let ctx = MapContext::new();
        let x = Var::shared("x", 1);
        let tree = VarShortcut::from_vars(&[Arc::clone(&x)]).optimize(&ctx, &Runtime::default(), node("x + 1"));
        let compiled = Compiler::new(64).compile("x + 1", &tree, Runtime::default()).unwrap();

        assert_eq!(compiled.source(), "($0.get() + 1)");
        assert!(matches!(compiled.slots().get(0), Some(Slot::Var(_))));
        x.set(41);
        assert_eq!(compiled.eval(&ctx).unwrap(), Value::Int(42));
    }

    #[test]
    fn test_injected_interpreter_matches_tree() {
        let rt = Runtime::default();
        let scaled = |ctx: &dyn Context, _: &Node, _: &Runtime| -> FelResult<Value> {
            match ctx.get("y") {
                Value::Int(y) => Ok(Value::Int(y * 10)),
                other => Ok(other),
            }
        };
        let injection = InterpreterInjection::new().with("y", Arc::new(scaled));
        let tree = injection.optimize(&MapContext::new(), &rt, node("x + y"));
        let compiled = Compiler::new(64).compile("x + y", &tree, rt.clone()).unwrap();

        assert_eq!(compiled.source(), "(ctx.get(\"x\") + $0.interpret())");
        assert!(matches!(compiled.slots().get(0), Some(Slot::Interpreter(text)) if text == "y"));
        for (x, y) in [(1, 2), (-5, 0), (7, 30)] {
            let ctx = MapContext::from_pairs([("x", x), ("y", y)]);
            assert_eq!(compiled.eval(&ctx).unwrap(), tree.eval(&ctx, &rt).unwrap());
            assert_eq!(compiled.eval(&ctx).unwrap(), Value::Int(x + y * 10));
        }
    }

    #[test]
    fn test_folded_calls_emit_constants() {
        let ctx = MapContext::new();
        let tree = ConstantFolding::with_calls().optimize(&ctx, &Runtime::default(), node("2 * 3 + y"));
        let compiled = Compiler::new(64).compile("2 * 3 + y", &tree, Runtime::default()).unwrap();
        assert_eq!(compiled.source(), "(6 + ctx.get(\"y\"))");
    }

    #[test]
    fn test_big_constants_use_slots() {
        let registry = FunctionRegistry::with_builtins(NumericMode::Big, 10);
        let text = "100000000000000000001 + 1";
        let tree = AstBuilder::new(&registry, NumericMode::Big).build(&parse(text, 64).unwrap()).unwrap();
        let compiled = Compiler::new(64).compile(text, &tree, Runtime::default()).unwrap();

        assert_eq!(compiled.source(), "($0 + 1)");
        let expected: BigInt = "100000000000000000002".parse().unwrap();
        assert_eq!(compiled.eval(&MapContext::new()).unwrap(), Value::BigInt(expected));
    }

    #[test]
    fn test_arity_mismatch_is_compile_error() {
        let err = compile("abs(1, 2)").unwrap_err();
        assert_eq!(err.category(), "compile");
    }

    #[test]
    fn test_depth_limit() {
        let err = Compiler::new(2).compile("1 + (2 + 3)", &node("1 + (2 + 3)"), Runtime::default()).unwrap_err();
        assert_eq!(err.category(), "compile");
    }

    #[test]
    fn test_unresolved_fails_when_executed() {
        let compiled = compile("later(1)").unwrap();
        assert_eq!(compiled.source(), "later(1)");
        let err = compiled.eval(&MapContext::new()).unwrap_err();
        assert_eq!(err, FelError::eval("later", "function not found"));
    }

    #[test]
    fn test_short_circuit_survives_compilation() {
        let compiled = compile("true || later()").unwrap();
        assert_eq!(compiled.eval(&MapContext::new()).unwrap(), Value::Bool(true));
    }
}
