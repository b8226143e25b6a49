//! Standard functions and the access operators `$`, `.`, `.()` and `[]`

use super::numeric::{compare, decimal_to_integral, round_half_up};
use super::{Arguments, Arity, Function, FunctionRegistry};
use crate::config::NumericMode;
use crate::error::{FelError, FelResult};
use fel_types::Value;
use num_traits::Signed;
use std::cmp::Ordering;
use std::sync::Arc;

pub(super) fn install(registry: &mut FunctionRegistry) {
    // Mathematical functions
    registry.register(Arc::new(Unary { name: "abs", apply: abs }));
    registry.register(Arc::new(Unary { name: "floor", apply: |n, v| to_integral(n, v, false) }));
    registry.register(Arc::new(Unary { name: "ceil", apply: |n, v| to_integral(n, v, true) }));
    registry.register(Arc::new(Unary { name: "sqrt", apply: |n, v| Ok(Value::Float(number(n, v)?.sqrt())) }));
    registry.register(Arc::new(Extremum { name: "min", wanted: Ordering::Less }));
    registry.register(Arc::new(Extremum { name: "max", wanted: Ordering::Greater }));
    registry.register(Arc::new(Round));
    registry.register(Arc::new(Power));

    // String functions
    registry.register(Arc::new(Unary { name: "len", apply: length }));
    registry.register(Arc::new(Unary { name: "upper", apply: |n, v| map_str(n, v, str::to_uppercase) }));
    registry.register(Arc::new(Unary { name: "lower", apply: |n, v| map_str(n, v, str::to_lowercase) }));
    registry.register(Arc::new(Unary { name: "trim", apply: |n, v| map_str(n, v, |s| s.trim().to_string()) }));

    // Utility functions
    registry.register(Arc::new(Coalesce));
    registry.register(Arc::new(Now));

    // Access
    registry.register(Arc::new(HostRef));
    registry.register(Arc::new(Property));
    registry.register(Arc::new(MethodCall));
    registry.register(Arc::new(Index));
}

fn number(name: &str, value: &Value) -> FelResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| FelError::eval_with_operands(name, &[value], "expected a number"))
}

fn map_str(name: &str, value: &Value, f: fn(&str) -> String) -> FelResult<Value> {
    match value {
        Value::Str(s) => Ok(Value::from(f(s))),
        Value::Null => Ok(Value::Null),
        other => Err(FelError::eval_with_operands(name, &[other], "expected a string")),
    }
}

pub(crate) fn abs(name: &str, value: &Value) -> FelResult<Value> {
    match value {
        Value::Int(i) => Ok(i.checked_abs().map_or_else(|| Value::BigInt(i.abs_diff(0).into()), Value::Int)),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::BigInt(b) => Ok(Value::BigInt(b.abs())),
        Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
        other => Err(FelError::eval_with_operands(name, &[other], "expected a number")),
    }
}

fn to_integral(name: &str, value: &Value, ceil: bool) -> FelResult<Value> {
    match value {
        Value::Int(_) | Value::BigInt(_) => Ok(value.clone()),
        Value::Float(f) => Ok(Value::Float(if ceil { f.ceil() } else { f.floor() })),
        Value::Decimal(d) => Ok(Value::Decimal(decimal_to_integral(d, ceil))),
        other => Err(FelError::eval_with_operands(name, &[other], "expected a number")),
    }
}

fn length(name: &str, value: &Value) -> FelResult<Value> {
    let len = match value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(entries) => entries.len(),
        Value::Null => 0,
        other => {
            return Err(FelError::eval_with_operands(name, &[other], "has no length"));
        }
    };
    Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
}

/// Single-argument function backed by a plain function pointer
struct Unary {
    name: &'static str,
    apply: fn(&str, &Value) -> FelResult<Value>,
}

impl Function for Unary {
    fn name(&self) -> &str {
        self.name
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        (self.apply)(self.name, &args.eval(0)?)
    }

    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }
}

/// `min` and `max`, returning the winning argument unchanged
struct Extremum {
    name: &'static str,
    wanted: Ordering,
}

impl Function for Extremum {
    fn name(&self) -> &str {
        self.name
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        let mut best = args.eval(0)?;
        for i in 1..args.len() {
            let candidate = args.eval(i)?;
            // Exact ordering so that big values are not rounded through doubles
            if compare(NumericMode::Big, self.name, &candidate, &best)? == self.wanted {
                best = candidate;
            }
        }
        Ok(best)
    }

    fn arity(&self) -> Arity {
        Arity::AtLeast(1)
    }
}

/// `round(x)` or `round(x, digits)`, halves away from zero
struct Round;

impl Function for Round {
    fn name(&self) -> &str {
        "round"
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        let value = args.eval(0)?;
        let digits = if args.len() > 1 {
            let raw = args.eval(1)?;
            raw.as_i64().ok_or_else(|| {
                FelError::eval_with_operands("round", &[&raw], "digits must be an integer")
            })?
        } else {
            0
        };

        match &value {
            Value::Int(_) | Value::BigInt(_) if digits >= 0 => Ok(value.clone()),
            Value::Decimal(d) => Ok(Value::Decimal(round_half_up(d, digits))),
            _ => {
                let n = number("round", &value)?;
                let exp = i32::try_from(digits)
                    .map_err(|_| FelError::eval("round", format!("digits {digits} out of range")))?;
                let factor = 10f64.powi(exp);
                if factor == 0.0 {
                    return Ok(Value::Float(0.0));
                }
                let scaled = n * factor;
                // Past f64 resolution the value is already as precise as it gets
                if !scaled.is_finite() {
                    return Ok(Value::Float(n));
                }
                Ok(Value::Float(scaled.round() / factor))
            }
        }
    }

    fn arity(&self) -> Arity {
        Arity::Range(1, 2)
    }
}

struct Power;

impl Function for Power {
    fn name(&self) -> &str {
        "pow"
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        let base = args.eval(0)?;
        let exp = args.eval(1)?;
        if let (Value::Int(b), Value::Int(e)) = (&base, &exp) {
            if let Some(result) = u32::try_from(*e).ok().and_then(|e| b.checked_pow(e)) {
                return Ok(Value::Int(result));
            }
        }
        Ok(Value::Float(number("pow", &base)?.powf(number("pow", &exp)?)))
    }

    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }
}

/// First non-null argument; later arguments are not evaluated
struct Coalesce;

impl Function for Coalesce {
    fn name(&self) -> &str {
        "coalesce"
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        for i in 0..args.len() {
            let value = args.eval(i)?;
            if !value.is_null() {
                return Ok(value);
            }
        }
        Ok(Value::Null)
    }

    fn arity(&self) -> Arity {
        Arity::AtLeast(1)
    }
}

/// Current time in epoch milliseconds
struct Now;

impl Function for Now {
    fn name(&self) -> &str {
        "now"
    }

    fn call(&self, _args: &dyn Arguments) -> FelResult<Value> {
        Ok(Value::Int(chrono::Utc::now().timestamp_millis()))
    }

    fn arity(&self) -> Arity {
        Arity::Exact(0)
    }

    fn is_stable(&self) -> bool {
        false
    }
}

fn name_arg(function: &str, args: &dyn Arguments, index: usize) -> FelResult<String> {
    match args.eval(index)? {
        Value::Str(s) => Ok(s.to_string()),
        other => Err(FelError::eval_with_operands(function, &[&other], "expected a name")),
    }
}

/// Strip the quotes an emitted string literal carries
fn bare(rendered: &str) -> &str {
    rendered
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(rendered)
}

/// `$('Type')`: handle to a registered host type
struct HostRef;

impl Function for HostRef {
    fn name(&self) -> &str {
        "$"
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        let name = name_arg("$", args, 0)?;
        args.runtime().host_handle(&name)
    }

    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }

    fn emit(&self, args: &[String]) -> String {
        format!("$({})", args.join(", "))
    }
}

/// `a.b`: map key lookup, otherwise a zero-argument method call
struct Property;

impl Function for Property {
    fn name(&self) -> &str {
        "."
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        let receiver = args.eval(0)?;
        let name = name_arg(".", args, 1)?;
        match &receiver {
            Value::Null => Ok(Value::Null),
            Value::Map(entries) => Ok(entries.get(&name).cloned().unwrap_or(Value::Null)),
            _ => args.runtime().invoke_method(&receiver, &name, &[]),
        }
    }

    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }

    fn is_stable(&self) -> bool {
        false
    }

    fn emit(&self, args: &[String]) -> String {
        match args {
            [receiver, name] => format!("{receiver}.{}", bare(name)),
            _ => format!(".({})", args.join(", ")),
        }
    }
}

/// `a.m(x, ...)`: method dispatch by name
struct MethodCall;

impl Function for MethodCall {
    fn name(&self) -> &str {
        ".()"
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        let receiver = args.eval(0)?;
        let method = name_arg(".()", args, 1)?;
        if receiver.is_null() {
            return Ok(Value::Null);
        }
        let rest = (2..args.len()).map(|i| args.eval(i)).collect::<FelResult<Vec<_>>>()?;
        args.runtime().invoke_method(&receiver, &method, &rest)
    }

    fn arity(&self) -> Arity {
        Arity::AtLeast(2)
    }

    fn is_stable(&self) -> bool {
        false
    }

    fn emit(&self, args: &[String]) -> String {
        match args {
            [receiver, method, rest @ ..] => {
                format!("{receiver}.{}({})", bare(method), rest.join(", "))
            }
            _ => format!(".()({})", args.join(", ")),
        }
    }
}

/// `a[i]` on lists, strings and maps; out of range yields null
struct Index;

impl Function for Index {
    fn name(&self) -> &str {
        "[]"
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        let target = args.eval(0)?;
        let index = args.eval(1)?;
        let position = || index.as_i64().and_then(|i| usize::try_from(i).ok());

        match (&target, &index) {
            (Value::Null, _) => Ok(Value::Null),
            (Value::List(items), _) if index.is_integral() => {
                Ok(position().and_then(|i| items.get(i).cloned()).unwrap_or(Value::Null))
            }
            (Value::Str(s), _) if index.is_integral() => Ok(position()
                .and_then(|i| s.chars().nth(i))
                .map_or(Value::Null, |c| Value::from(c.to_string()))),
            (Value::Map(entries), Value::Str(key)) => {
                Ok(entries.get(key.as_ref()).cloned().unwrap_or(Value::Null))
            }
            _ => Err(FelError::type_mismatch("[]", &target, &index)),
        }
    }

    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }

    fn emit(&self, args: &[String]) -> String {
        match args {
            [target, index] => format!("{target}[{index}]"),
            _ => format!("[]({})", args.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::call;
    use super::*;
    use std::collections::HashMap;
    use std::str::FromStr;

    fn registry() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        install(&mut registry);
        registry
    }

    #[test]
    fn test_math_functions() {
        let r = registry();
        assert_eq!(call(&r, "abs", vec![Value::Int(-4)]).unwrap(), Value::Int(4));
        assert_eq!(call(&r, "floor", vec![Value::Float(2.7)]).unwrap(), Value::Float(2.0));
        assert_eq!(call(&r, "ceil", vec![Value::Float(2.1)]).unwrap(), Value::Float(3.0));
        assert_eq!(call(&r, "sqrt", vec![Value::Int(9)]).unwrap(), Value::Float(3.0));
        assert_eq!(call(&r, "pow", vec![Value::Int(2), Value::Int(10)]).unwrap(), Value::Int(1024));
        assert_eq!(
            call(&r, "pow", vec![Value::Int(4), Value::Float(0.5)]).unwrap(),
            Value::Float(2.0)
        );
    }

    #[test]
    fn test_min_max_keep_argument() {
        let r = registry();
        let result = call(&r, "min", vec![Value::Int(3), Value::Float(1.5), Value::Int(2)]).unwrap();
        assert_eq!(result, Value::Float(1.5));
        assert_eq!(call(&r, "max", vec![Value::Int(3)]).unwrap(), Value::Int(3));
        assert!(call(&r, "max", vec![Value::Int(3), Value::str("x")]).is_err());
    }

    #[test]
    fn test_round() {
        let r = registry();
        assert_eq!(call(&r, "round", vec![Value::Float(2.5)]).unwrap(), Value::Float(3.0));
        assert_eq!(
            call(&r, "round", vec![Value::Float(3.14159), Value::Int(2)]).unwrap(),
            Value::Float(3.14)
        );
        let d = Value::Decimal(bigdecimal::BigDecimal::from_str("1.005").unwrap());
        assert_eq!(
            call(&r, "round", vec![d, Value::Int(2)]).unwrap(),
            Value::Decimal(bigdecimal::BigDecimal::from_str("1.01").unwrap())
        );
    }

    #[test]
    fn test_round_extreme_digits() {
        let r = registry();
        assert_eq!(call(&r, "round", vec![Value::Float(1.5), Value::Int(400)]).unwrap(), Value::Float(1.5));
        assert_eq!(call(&r, "round", vec![Value::Float(1e300), Value::Int(100)]).unwrap(), Value::Float(1e300));
        assert_eq!(call(&r, "round", vec![Value::Float(1.5), Value::Int(-400)]).unwrap(), Value::Float(0.0));
        assert_eq!(call(&r, "round", vec![Value::Float(1234.5), Value::Int(-2)]).unwrap(), Value::Float(1200.0));
    }

    #[test]
    fn test_string_functions() {
        let r = registry();
        assert_eq!(call(&r, "len", vec![Value::str("héllo")]).unwrap(), Value::Int(5));
        assert_eq!(call(&r, "upper", vec![Value::str("ab")]).unwrap(), Value::str("AB"));
        assert_eq!(call(&r, "trim", vec![Value::str(" ab ")]).unwrap(), Value::str("ab"));
        assert_eq!(call(&r, "lower", vec![Value::Null]).unwrap(), Value::Null);
        assert!(call(&r, "upper", vec![Value::Int(1)]).is_err());
    }

    #[test]
    fn test_coalesce_and_now() {
        let r = registry();
        assert_eq!(
            call(&r, "coalesce", vec![Value::Null, Value::Int(2), Value::Int(3)]).unwrap(),
            Value::Int(2)
        );
        assert!(!r.get_fun("now").unwrap().is_stable());
        assert!(matches!(call(&r, "now", vec![]).unwrap(), Value::Int(ms) if ms > 0));
    }

    #[test]
    fn test_property_access() {
        let r = registry();
        let map = Value::map(HashMap::from([("a".to_string(), Value::Int(1))]));
        assert_eq!(call(&r, ".", vec![map.clone(), Value::str("a")]).unwrap(), Value::Int(1));
        assert_eq!(call(&r, ".", vec![map, Value::str("b")]).unwrap(), Value::Null);
        assert_eq!(call(&r, ".", vec![Value::Null, Value::str("a")]).unwrap(), Value::Null);
        // Getter semantics on other receivers
        assert_eq!(call(&r, ".", vec![Value::str("abc"), Value::str("len")]).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_host_ref_and_method_call() {
        let r = registry();
        let math = call(&r, "$", vec![Value::str("Math")]).unwrap();
        let result =
            call(&r, ".()", vec![math, Value::str("max"), Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(result, Value::Int(2));

        let err = call(&r, "$", vec![Value::str("System")]).unwrap_err();
        assert_eq!(err.category(), "security");
    }

    #[test]
    fn test_index() {
        let r = registry();
        let list = Value::list(vec![Value::Int(10), Value::Int(20)]);
        assert_eq!(call(&r, "[]", vec![list.clone(), Value::Int(1)]).unwrap(), Value::Int(20));
        assert_eq!(call(&r, "[]", vec![list.clone(), Value::Int(5)]).unwrap(), Value::Null);
        assert_eq!(call(&r, "[]", vec![list.clone(), Value::Int(-1)]).unwrap(), Value::Null);
        assert_eq!(call(&r, "[]", vec![Value::str("abc"), Value::Int(1)]).unwrap(), Value::str("b"));
        assert!(call(&r, "[]", vec![list, Value::str("x")]).is_err());
    }

    #[test]
    fn test_access_emission() {
        let r = registry();
        let dot = r.get_fun(".").unwrap();
        assert_eq!(dot.emit(&["user".into(), "\"name\"".into()]), "user.name");
        let method = r.get_fun(".()").unwrap();
        assert_eq!(
            method.emit(&["$(\"Math\")".into(), "\"min\"".into(), "1".into(), "2".into()]),
            "$(\"Math\").min(1, 2)"
        );
    }
}
