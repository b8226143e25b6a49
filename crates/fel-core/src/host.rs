//! Host types reachable from expressions by name
//!
//! `$('Math').min(1, 2)` looks up the host type `Math` and invokes its `min`
//! method. Method calls on strings, lists and maps dispatch to the `String`,
//! `List` and `Map` host types with the receiver as first argument. Every
//! dispatch is gated by the [`SecurityManager`](crate::security::SecurityManager)
//! in [`Runtime::invoke`](crate::runtime::Runtime::invoke).

use crate::config::NumericMode;
use crate::error::{FelError, FelResult};
use crate::function;
use fel_types::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A type whose methods can be invoked by name
pub trait HostType: Send + Sync {
    /// Qualified type name used in security targets
    fn name(&self) -> &str;

    /// Method names, listed when an unknown method is called
    fn methods(&self) -> &'static [&'static str];

    /// Invoke `method`; receivers are passed as the first argument
    fn invoke(&self, method: &str, args: &[Value]) -> FelResult<Value>;
}

/// Registered host types, keyed by name
#[derive(Clone, Default)]
pub struct HostRegistry {
    types: HashMap<String, Arc<dyn HostType>>,
}

impl fmt::Debug for HostRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.types.keys().collect();
        names.sort();
        f.debug_struct("HostRegistry").field("types", &names).finish()
    }
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in host types
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MathHost));
        registry.register(Arc::new(StringHost));
        registry.register(Arc::new(ListHost));
        registry.register(Arc::new(MapHost));

        // Sensitive primitives, denied by the default security policy
        registry.register(Arc::new(SystemHost));
        registry.register(Arc::new(FileHost));
        registry.register(Arc::new(ProcessHost));
        registry
    }

    /// Register or replace a host type
    pub fn register(&mut self, host: Arc<dyn HostType>) {
        self.types.insert(host.name().to_string(), host);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn HostType>> {
        self.types.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }
}

/// Host type that receives method calls on a value
pub fn receiver_type(value: &Value) -> Option<&str> {
    match value {
        Value::Str(_) => Some("String"),
        Value::List(_) => Some("List"),
        Value::Map(_) => Some("Map"),
        Value::Host(name) => Some(name),
        _ => None,
    }
}

fn target(host: &str, method: &str) -> String {
    format!("{host}.{method}")
}

fn expect_args(host: &str, method: &str, args: &[Value], count: usize) -> FelResult<()> {
    if args.len() == count {
        Ok(())
    } else {
        Err(FelError::eval(
            &target(host, method),
            format!("expects {count} arguments, got {}", args.len()),
        ))
    }
}

fn no_such_method(host: &dyn HostType, method: &str) -> FelError {
    FelError::eval(
        &target(host.name(), method),
        format!("no such method; available: {}", host.methods().join(", ")),
    )
}

fn number(host: &str, method: &str, value: &Value) -> FelResult<f64> {
    value.as_f64().ok_or_else(|| {
        FelError::eval_with_operands(&target(host, method), &[value], "expected a number")
    })
}

fn string<'a>(host: &str, method: &str, value: &'a Value) -> FelResult<&'a str> {
    value.as_str().ok_or_else(|| {
        FelError::eval_with_operands(&target(host, method), &[value], "expected a string")
    })
}

fn index(host: &str, method: &str, value: &Value) -> FelResult<usize> {
    value
        .as_i64()
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| {
            FelError::eval_with_operands(&target(host, method), &[value], "expected an index")
        })
}

struct MathHost;

impl HostType for MathHost {
    fn name(&self) -> &str {
        "Math"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["min", "max", "abs", "pow", "sqrt", "floor", "ceil", "round"]
    }

    fn invoke(&self, method: &str, args: &[Value]) -> FelResult<Value> {
        match method {
            "min" | "max" => {
                let (first, rest) = args
                    .split_first()
                    .ok_or_else(|| FelError::eval(&target("Math", method), "expects arguments"))?;
                let wanted = if method == "min" { Ordering::Less } else { Ordering::Greater };
                let name = target("Math", method);
                let mut best = first;
                for arg in rest {
                    number("Math", method, arg)?;
                    if function::compare(NumericMode::Big, &name, arg, best)? == wanted {
                        best = arg;
                    }
                }
                number("Math", method, best)?;
                Ok(best.clone())
            }
            "abs" => {
                expect_args("Math", method, args, 1)?;
                function::abs(&target("Math", method), &args[0])
            }
            "pow" => {
                expect_args("Math", method, args, 2)?;
                let base = number("Math", method, &args[0])?;
                let exp = number("Math", method, &args[1])?;
                Ok(Value::Float(base.powf(exp)))
            }
            "sqrt" | "floor" | "ceil" | "round" => {
                expect_args("Math", method, args, 1)?;
                let n = number("Math", method, &args[0])?;
                Ok(Value::Float(match method {
                    "sqrt" => n.sqrt(),
                    "floor" => n.floor(),
                    "ceil" => n.ceil(),
                    _ => n.round(),
                }))
            }
            _ => Err(no_such_method(self, method)),
        }
    }
}

struct StringHost;

impl HostType for StringHost {
    fn name(&self) -> &str {
        "String"
    }

    fn methods(&self) -> &'static [&'static str] {
        &[
            "len", "upper", "lower", "trim", "contains", "starts_with", "ends_with", "equals",
            "substring", "index_of",
        ]
    }

    fn invoke(&self, method: &str, args: &[Value]) -> FelResult<Value> {
        let receiver = args.first().ok_or_else(|| no_such_method(self, method))?;
        let s = string("String", method, receiver)?;
        match method {
            "len" => {
                expect_args("String", method, args, 1)?;
                Ok(Value::Int(s.chars().count() as i64))
            }
            "upper" => Ok(Value::str(s.to_uppercase())),
            "lower" => Ok(Value::str(s.to_lowercase())),
            "trim" => Ok(Value::str(s.trim())),
            "contains" | "starts_with" | "ends_with" => {
                expect_args("String", method, args, 2)?;
                let needle = string("String", method, &args[1])?;
                Ok(Value::Bool(match method {
                    "contains" => s.contains(needle),
                    "starts_with" => s.starts_with(needle),
                    _ => s.ends_with(needle),
                }))
            }
            "equals" => {
                expect_args("String", method, args, 2)?;
                Ok(Value::Bool(args[1].as_str() == Some(s)))
            }
            "substring" => {
                let chars: Vec<char> = s.chars().collect();
                let start = args.get(1).map(|v| index("String", method, v)).transpose()?.unwrap_or(0);
                let end = args
                    .get(2)
                    .map(|v| index("String", method, v))
                    .transpose()?
                    .unwrap_or(chars.len());
                if start > end || end > chars.len() {
                    return Err(FelError::eval(
                        &target("String", method),
                        format!("range {start}..{end} out of bounds for length {}", chars.len()),
                    ));
                }
                Ok(Value::str(chars[start..end].iter().collect::<String>()))
            }
            "index_of" => {
                expect_args("String", method, args, 2)?;
                let needle = string("String", method, &args[1])?;
                Ok(Value::Int(
                    s.find(needle).map_or(-1, |byte| s[..byte].chars().count() as i64),
                ))
            }
            _ => Err(no_such_method(self, method)),
        }
    }
}

struct ListHost;

impl HostType for ListHost {
    fn name(&self) -> &str {
        "List"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["len", "is_empty", "get", "contains", "first", "last"]
    }

    fn invoke(&self, method: &str, args: &[Value]) -> FelResult<Value> {
        let Some(Value::List(items)) = args.first() else {
            return Err(no_such_method(self, method));
        };
        match method {
            "len" => Ok(Value::Int(items.len() as i64)),
            "is_empty" => Ok(Value::Bool(items.is_empty())),
            "get" => {
                expect_args("List", method, args, 2)?;
                let i = index("List", method, &args[1])?;
                Ok(items.get(i).cloned().unwrap_or(Value::Null))
            }
            "contains" => {
                expect_args("List", method, args, 2)?;
                Ok(Value::Bool(items.contains(&args[1])))
            }
            "first" => Ok(items.first().cloned().unwrap_or(Value::Null)),
            "last" => Ok(items.last().cloned().unwrap_or(Value::Null)),
            _ => Err(no_such_method(self, method)),
        }
    }
}

struct MapHost;

impl HostType for MapHost {
    fn name(&self) -> &str {
        "Map"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["len", "get", "contains_key", "keys"]
    }

    fn invoke(&self, method: &str, args: &[Value]) -> FelResult<Value> {
        let Some(Value::Map(entries)) = args.first() else {
            return Err(no_such_method(self, method));
        };
        match method {
            "len" => Ok(Value::Int(entries.len() as i64)),
            "get" => {
                expect_args("Map", method, args, 2)?;
                let key = string("Map", method, &args[1])?;
                Ok(entries.get(key).cloned().unwrap_or(Value::Null))
            }
            "contains_key" => {
                expect_args("Map", method, args, 2)?;
                let key = string("Map", method, &args[1])?;
                Ok(Value::Bool(entries.contains_key(key)))
            }
            "keys" => {
                let mut keys: Vec<_> = entries.keys().collect();
                keys.sort();
                Ok(Value::list(keys.into_iter().map(Value::str).collect()))
            }
            _ => Err(no_such_method(self, method)),
        }
    }
}

struct SystemHost;

impl HostType for SystemHost {
    fn name(&self) -> &str {
        "System"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["getenv", "millis"]
    }

    fn invoke(&self, method: &str, args: &[Value]) -> FelResult<Value> {
        match method {
            "getenv" => {
                expect_args("System", method, args, 1)?;
                let key = string("System", method, &args[0])?;
                Ok(std::env::var(key).map_or(Value::Null, Value::from))
            }
            "millis" => Ok(Value::Int(chrono::Utc::now().timestamp_millis())),
            _ => Err(no_such_method(self, method)),
        }
    }
}

struct FileHost;

impl HostType for FileHost {
    fn name(&self) -> &str {
        "File"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["exists", "read"]
    }

    fn invoke(&self, method: &str, args: &[Value]) -> FelResult<Value> {
        expect_args("File", method, args, 1)?;
        let path = string("File", method, &args[0])?;
        match method {
            "exists" => Ok(Value::Bool(std::path::Path::new(path).exists())),
            "read" => std::fs::read_to_string(path)
                .map(Value::from)
                .map_err(|e| FelError::eval(&target("File", method), e.to_string())),
            _ => Err(no_such_method(self, method)),
        }
    }
}

struct ProcessHost;

impl HostType for ProcessHost {
    fn name(&self) -> &str {
        "Process"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["id"]
    }

    fn invoke(&self, method: &str, _args: &[Value]) -> FelResult<Value> {
        match method {
            "id" => Ok(Value::Int(i64::from(std::process::id()))),
            _ => Err(no_such_method(self, method)),
        }
    }
}
