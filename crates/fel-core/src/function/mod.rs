//! Functions and operators callable from expressions
//!
//! Every operator is an ordinary [`Function`] registered under its symbol, so
//! `1 + 2` resolves `+` in the [`FunctionRegistry`] exactly like `max(1, 2)`
//! resolves `max`. Functions receive their arguments unevaluated through
//! [`Arguments`], which lets `&&`, `||`, `?:` and `coalesce` skip operands.

mod builtins;
mod numeric;
mod operators;

pub(crate) use builtins::abs;
pub use numeric::{compare, divide_decimal, equals, round_half_up};

use crate::config::{DEFAULT_DECIMAL_PRECISION, NumericMode};
use crate::error::{FelError, FelResult};
use crate::runtime::Runtime;
use fel_types::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Number of arguments a function accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::Any => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Lazily evaluated call arguments
pub trait Arguments {
    /// Number of arguments at the call site
    fn len(&self) -> usize;

    /// Evaluate the argument at `index`
    fn eval(&self, index: usize) -> FelResult<Value>;

    /// Services for reflective calls
    fn runtime(&self) -> &Runtime;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluate every argument in order
    fn eval_all(&self) -> FelResult<Vec<Value>> {
        (0..self.len()).map(|i| self.eval(i)).collect()
    }
}

/// A named operation callable from expression text
pub trait Function: Send + Sync {
    /// Name the function is registered under
    fn name(&self) -> &str;

    /// Invoke the function
    fn call(&self, args: &dyn Arguments) -> FelResult<Value>;

    fn arity(&self) -> Arity {
        Arity::Any
    }

    /// `true` if stable arguments always produce the same result
    fn is_stable(&self) -> bool {
        true
    }

    /// Render a call given the rendered arguments
    fn emit(&self, args: &[String]) -> String {
        format!("{}({})", self.name(), args.join(", "))
    }
}

/// Error for a call site whose argument count the function rejects
pub fn arity_error(function: &dyn Function, count: usize) -> FelError {
    FelError::eval(
        function.name(),
        format!("expects {} arguments, got {count}", function.arity()),
    )
}

/// Registry mapping names to functions
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry").field("functions", &self.names()).finish()
    }
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the operator set for `mode` plus the standard functions
    pub fn with_builtins(mode: NumericMode, decimal_precision: u32) -> Self {
        let mut registry = Self::new();
        operators::install(&mut registry, mode, decimal_precision);
        builtins::install(&mut registry);
        registry
    }

    /// Register a function, returning the one it replaced
    pub fn register(&mut self, function: Arc<dyn Function>) -> Option<Arc<dyn Function>> {
        self.functions.insert(function.name().to_string(), function)
    }

    /// Look up a function by name
    pub fn get_fun(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Registry for the default double-precision engine
pub fn default_registry() -> FunctionRegistry {
    FunctionRegistry::with_builtins(NumericMode::Double, DEFAULT_DECIMAL_PRECISION)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Eagerly evaluated arguments for calling functions directly
    pub struct ValueArgs {
        pub values: Vec<Value>,
        pub runtime: Runtime,
    }

    impl ValueArgs {
        pub fn new(values: Vec<Value>) -> Self {
            Self { values, runtime: Runtime::default() }
        }
    }

    impl Arguments for ValueArgs {
        fn len(&self) -> usize {
            self.values.len()
        }

        fn eval(&self, index: usize) -> FelResult<Value> {
            self.values
                .get(index)
                .cloned()
                .ok_or_else(|| FelError::eval("test", format!("missing argument {index}")))
        }

        fn runtime(&self) -> &Runtime {
            &self.runtime
        }
    }

    pub fn call(registry: &FunctionRegistry, name: &str, values: Vec<Value>) -> FelResult<Value> {
        let function = registry.get_fun(name).unwrap();
        function.call(&ValueArgs::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::call;
    use super::*;

    #[test]
    fn test_arity_accepts() {
        assert!(Arity::Exact(2).accepts(2));
        assert!(!Arity::Exact(2).accepts(1));
        assert!(Arity::AtLeast(1).accepts(5));
        assert!(Arity::Range(1, 2).accepts(2));
        assert!(!Arity::Range(1, 2).accepts(3));
        assert!(Arity::Any.accepts(0));
    }

    #[test]
    fn test_builtin_registry_contains_operators() {
        let registry = default_registry();
        for name in ["+", "-", "*", "/", "%", "<", "<=", ">", ">=", "==", "!=", "&&", "||"] {
            assert!(registry.contains(name), "missing operator {name}");
        }
        for name in ["!", "neg", "?:", ".", ".()", "[]", "$", "abs", "now"] {
            assert!(registry.contains(name), "missing function {name}");
        }
    }

    #[test]
    fn test_register_overrides() {
        struct Answer;
        impl Function for Answer {
            fn name(&self) -> &str {
                "+"
            }
            fn call(&self, _args: &dyn Arguments) -> FelResult<Value> {
                Ok(Value::Int(42))
            }
        }

        let mut registry = default_registry();
        assert!(registry.register(Arc::new(Answer)).is_some());
        assert_eq!(call(&registry, "+", vec![Value::Int(1), Value::Int(1)]).unwrap(), Value::Int(42));
    }
}
