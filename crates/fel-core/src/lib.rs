#![allow(missing_docs)]
//! Core of the FEL expression engine.
//!
//! Expression text is parsed into a [`Node`] tree, optionally rewritten by
//! [`Optimizer`] passes, and then either interpreted directly or compiled into
//! a cached [`CompiledExpression`]. Both paths resolve operators through the
//! same [`FunctionRegistry`] and produce the same results.
//!
//! ```
//! use fel_core::FelEngine;
//! use fel_types::Value;
//!
//! let engine = FelEngine::new();
//! assert_eq!(engine.eval("1 + 2 * 3").unwrap(), Value::Int(7));
//! ```

/// Parse tree to evaluable nodes
pub mod builder;
/// Compiled artifact cache
pub mod cache;
/// Closure compiler
pub mod compiler;
/// Engine configuration
pub mod config;
/// Variable storage and fast variable handles
pub mod context;
/// Engine facade
pub mod engine;
/// Error taxonomy
pub mod error;
/// Functions and operators callable from expressions
pub mod function;
/// Lexer and parser
pub mod grammar;
/// Host types reachable through `$('Type')`
pub mod host;
/// Abstract syntax tree
pub mod node;
/// Tree rewriting passes
pub mod optimizer;
/// Services available to functions at evaluation time
pub mod runtime;
/// Allow/deny policy for reflective calls
pub mod security;

pub use compiler::CompiledExpression;
pub use config::{EngineConfig, NumericMode};
pub use context::{ArrayContext, Context, ContextChain, MapContext, Var};
pub use engine::FelEngine;
pub use error::{FelError, FelResult};
pub use function::{Arguments, Arity, Function, FunctionRegistry};
pub use node::{Interpret, Node, Strategy};
pub use optimizer::{ConstantFolding, InterpreterInjection, Optimizer, VarShortcut};
pub use security::SecurityManager;
