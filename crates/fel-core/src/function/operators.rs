//! Arithmetic, relational and logical operators
//!
//! Two operator sets exist, selected by [`NumericMode`]. The double set keeps
//! 64-bit integer arithmetic while it does not overflow and otherwise works in
//! doubles. The big set promotes to arbitrary precision: decimals when either
//! operand is floating, integers when both are integral.

use super::numeric::{BigPair, big_pair, compare, divide_decimal, equals};
use super::{Arguments, Arity, Function, FunctionRegistry};
use crate::config::NumericMode;
use crate::error::{FelError, FelResult};
use fel_types::Value;
use num_bigint::BigInt;
use num_traits::Zero;
use std::cmp::Ordering;
use std::sync::Arc;

pub(super) fn install(registry: &mut FunctionRegistry, mode: NumericMode, precision: u32) {
    for op in [ArithOp::Add, ArithOp::Sub, ArithOp::Mul, ArithOp::Div, ArithOp::Mod] {
        registry.register(Arc::new(Arithmetic { op, mode, precision }));
    }

    registry.register(Arc::new(Comparison::new("<", mode, Ordering::is_lt, false)));
    registry.register(Arc::new(Comparison::new("<=", mode, Ordering::is_le, true)));
    registry.register(Arc::new(Comparison::new(">", mode, Ordering::is_gt, false)));
    registry.register(Arc::new(Comparison::new(">=", mode, Ordering::is_ge, true)));

    registry.register(Arc::new(Equality { mode, negated: false }));
    registry.register(Arc::new(Equality { mode, negated: true }));

    registry.register(Arc::new(Logic { and: true }));
    registry.register(Arc::new(Logic { and: false }));
    registry.register(Arc::new(Not));
    registry.register(Arc::new(Negate));
    registry.register(Arc::new(Conditional));
}

fn infix(symbol: &str, args: &[String]) -> String {
    format!("({})", args.join(&format!(" {symbol} ")))
}

/// Truth value of a logical operand; null counts as false
fn truth(symbol: &str, value: &Value) -> FelResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(FelError::eval_with_operands(symbol, &[other], "expected a boolean")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }

    fn apply_f64(self, a: f64, b: f64) -> f64 {
        match self {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Mod => a % b,
        }
    }
}

struct Arithmetic {
    op: ArithOp,
    mode: NumericMode,
    /// Fractional digits kept by big-number division
    precision: u32,
}

impl Arithmetic {
    fn division_by_zero(&self, left: &Value, right: &Value) -> FelError {
        FelError::eval_with_operands(self.op.symbol(), &[left, right], "division by zero")
    }

    fn double(&self, left: &Value, right: &Value) -> FelResult<Value> {
        if let (Value::Int(a), Value::Int(b)) = (left, right) {
            return self.integers(*a, *b, left, right);
        }
        let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
            return Err(FelError::type_mismatch(self.op.symbol(), left, right));
        };
        if matches!(self.op, ArithOp::Div | ArithOp::Mod) && b == 0.0 {
            return Err(self.division_by_zero(left, right));
        }
        Ok(Value::Float(self.op.apply_f64(a, b)))
    }

    #[allow(clippy::cast_precision_loss)]
    fn integers(&self, a: i64, b: i64, left: &Value, right: &Value) -> FelResult<Value> {
        let checked = match self.op {
            ArithOp::Add => a.checked_add(b),
            ArithOp::Sub => a.checked_sub(b),
            ArithOp::Mul => a.checked_mul(b),
            ArithOp::Div | ArithOp::Mod if b == 0 => {
                return Err(self.division_by_zero(left, right));
            }
            ArithOp::Div => return Ok(Value::Float(a as f64 / b as f64)),
            ArithOp::Mod => return Ok(Value::Int(a.wrapping_rem(b))),
        };
        // Overflow falls back to doubles
        Ok(checked.map_or_else(|| Value::Float(self.op.apply_f64(a as f64, b as f64)), Value::Int))
    }

    fn big(&self, left: &Value, right: &Value) -> FelResult<Value> {
        if self.op == ArithOp::Div {
            let (Some(a), Some(b)) = (left.to_big_decimal(), right.to_big_decimal()) else {
                return Err(FelError::type_mismatch("/", left, right));
            };
            return divide_decimal(&a, &b, self.precision)
                .map(Value::Decimal)
                .ok_or_else(|| self.division_by_zero(left, right));
        }

        match big_pair(left, right) {
            Some(BigPair::Integers(a, b)) => Ok(Value::BigInt(match self.op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                _ if b.is_zero() => return Err(self.division_by_zero(left, right)),
                _ => a % b,
            })),
            Some(BigPair::Decimals(a, b)) => Ok(Value::Decimal(match self.op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                _ if b.is_zero() => return Err(self.division_by_zero(left, right)),
                _ => a % b,
            })),
            None => Err(FelError::type_mismatch(self.op.symbol(), left, right)),
        }
    }
}

impl Function for Arithmetic {
    fn name(&self) -> &str {
        self.op.symbol()
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        let left = args.eval(0)?;
        let right = args.eval(1)?;

        if self.op == ArithOp::Add
            && (matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)))
        {
            return Ok(Value::from(format!("{left}{right}")));
        }

        match self.mode {
            NumericMode::Double => self.double(&left, &right),
            NumericMode::Big => self.big(&left, &right),
        }
    }

    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }

    fn emit(&self, args: &[String]) -> String {
        infix(self.op.symbol(), args)
    }
}

/// Shared core of `<`, `<=`, `>`, `>=`
struct Comparison {
    symbol: &'static str,
    mode: NumericMode,
    accepts: fn(Ordering) -> bool,
    /// Result when both operands are the same value
    on_identical: bool,
    /// Result when either operand is null
    on_null: bool,
}

impl Comparison {
    fn new(
        symbol: &'static str,
        mode: NumericMode,
        accepts: fn(Ordering) -> bool,
        on_identical: bool,
    ) -> Self {
        Self { symbol, mode, accepts, on_identical, on_null: false }
    }
}

impl Function for Comparison {
    fn name(&self) -> &str {
        self.symbol
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        let left = args.eval(0)?;
        let right = args.eval(1)?;

        if left.is_identical(&right) {
            return Ok(Value::Bool(self.on_identical));
        }
        if left.is_null() || right.is_null() {
            return Ok(Value::Bool(self.on_null));
        }
        let ordering = compare(self.mode, self.symbol, &left, &right)?;
        Ok(Value::Bool((self.accepts)(ordering)))
    }

    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }

    fn emit(&self, args: &[String]) -> String {
        infix(self.symbol, args)
    }
}

/// `==` and its negation `!=`
struct Equality {
    mode: NumericMode,
    negated: bool,
}

impl Function for Equality {
    fn name(&self) -> &str {
        if self.negated { "!=" } else { "==" }
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        let left = args.eval(0)?;
        let right = args.eval(1)?;
        Ok(Value::Bool(equals(self.mode, &left, &right) != self.negated))
    }

    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }

    fn emit(&self, args: &[String]) -> String {
        infix(self.name(), args)
    }
}

/// Short-circuiting `&&` and `||`
struct Logic {
    and: bool,
}

impl Function for Logic {
    fn name(&self) -> &str {
        if self.and { "&&" } else { "||" }
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        let symbol = self.name();
        let left = truth(symbol, &args.eval(0)?)?;
        // `false && _` and `true || _` are decided by the left operand
        if left != self.and {
            return Ok(Value::Bool(left));
        }
        Ok(Value::Bool(truth(symbol, &args.eval(1)?)?))
    }

    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }

    fn emit(&self, args: &[String]) -> String {
        infix(self.name(), args)
    }
}

struct Not;

impl Function for Not {
    fn name(&self) -> &str {
        "!"
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        Ok(Value::Bool(!truth("!", &args.eval(0)?)?))
    }

    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }

    fn emit(&self, args: &[String]) -> String {
        format!("(!{})", args.join(""))
    }
}

/// Unary minus
struct Negate;

impl Function for Negate {
    fn name(&self) -> &str {
        "neg"
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        match args.eval(0)? {
            Value::Int(i) => Ok(i.checked_neg().map_or_else(|| Value::BigInt(-BigInt::from(i)), Value::Int)),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::BigInt(b) => Ok(Value::BigInt(-b)),
            Value::Decimal(d) => Ok(Value::Decimal(-d)),
            other => Err(FelError::eval_with_operands("neg", &[&other], "expected a number")),
        }
    }

    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }

    fn emit(&self, args: &[String]) -> String {
        format!("(-{})", args.join(""))
    }
}

/// `cond ? a : b`, evaluating only the selected branch
struct Conditional;

impl Function for Conditional {
    fn name(&self) -> &str {
        "?:"
    }

    fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
        if truth("?:", &args.eval(0)?)? { args.eval(1) } else { args.eval(2) }
    }

    fn arity(&self) -> Arity {
        Arity::Exact(3)
    }

    fn emit(&self, args: &[String]) -> String {
        match args {
            [cond, then, otherwise] => format!("({cond} ? {then} : {otherwise})"),
            _ => format!("?:({})", args.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::call;
    use super::*;
    use std::str::FromStr;

    fn double() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        install(&mut registry, NumericMode::Double, 100);
        registry
    }

    fn big(precision: u32) -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        install(&mut registry, NumericMode::Big, precision);
        registry
    }

    #[test]
    fn test_integer_arithmetic() {
        let r = double();
        assert_eq!(call(&r, "+", vec![Value::Int(2), Value::Int(3)]).unwrap(), Value::Int(5));
        assert_eq!(call(&r, "%", vec![Value::Int(7), Value::Int(3)]).unwrap(), Value::Int(1));
        assert_eq!(call(&r, "/", vec![Value::Int(7), Value::Int(2)]).unwrap(), Value::Float(3.5));
        assert_eq!(call(&r, "*", vec![Value::Int(2), Value::Float(0.5)]).unwrap(), Value::Float(1.0));
    }

    #[test]
    fn test_overflow_promotes_to_double() {
        let r = double();
        let result = call(&r, "+", vec![Value::Int(i64::MAX), Value::Int(1)]).unwrap();
        assert!(matches!(result, Value::Float(_)));
    }

    #[test]
    fn test_division_by_zero() {
        let r = double();
        let err = call(&r, "/", vec![Value::Int(1), Value::Int(0)]).unwrap_err();
        assert!(err.to_string().contains("division by zero"));
        assert!(call(&r, "%", vec![Value::Float(1.0), Value::Float(0.0)]).is_err());
        assert!(call(&big(5), "/", vec![Value::Int(1), Value::Int(0)]).is_err());
    }

    #[test]
    fn test_string_concatenation() {
        let r = double();
        assert_eq!(call(&r, "+", vec![Value::str("a"), Value::Int(1)]).unwrap(), Value::str("a1"));
        let err = call(&r, "-", vec![Value::str("a"), Value::Int(1)]).unwrap_err();
        assert_eq!(err.category(), "type");
    }

    #[test]
    fn test_big_arithmetic_is_exact() {
        let r = big(100);
        let a = Value::BigInt(BigInt::from_str("100000000000000000001").unwrap());
        let sum = call(&r, "+", vec![a, Value::Int(1)]).unwrap();
        assert_eq!(sum, Value::BigInt(BigInt::from_str("100000000000000000002").unwrap()));

        let sum = call(&r, "+", vec![Value::Float(0.1), Value::Float(0.2)]).unwrap();
        assert_eq!(sum, Value::Decimal(bigdecimal::BigDecimal::from_str("0.3").unwrap()));
    }

    #[test]
    fn test_big_division_accepts_numeric_strings() {
        let r = big(5);
        let q = call(&r, "/", vec![Value::str("1"), Value::str("3")]).unwrap();
        assert_eq!(q, Value::Decimal(bigdecimal::BigDecimal::from_str("0.33333").unwrap()));
        assert!(call(&r, "/", vec![Value::Bool(true), Value::Int(3)]).is_err());
    }

    #[test]
    fn test_comparison_identity_and_null() {
        let r = double();
        let x = Value::str("same");
        assert_eq!(call(&r, "<=", vec![x.clone(), x.clone()]).unwrap(), Value::Bool(true));
        assert_eq!(call(&r, "<", vec![x.clone(), x]).unwrap(), Value::Bool(false));
        assert_eq!(call(&r, "<=", vec![Value::Null, Value::Null]).unwrap(), Value::Bool(true));
        assert_eq!(call(&r, "<=", vec![Value::Null, Value::Int(5)]).unwrap(), Value::Bool(false));
        assert_eq!(call(&r, "<=", vec![Value::Int(5), Value::Null]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_comparison_type_error() {
        let r = big(10);
        let err = call(&r, ">", vec![Value::str("a"), Value::Int(1)]).unwrap_err();
        assert_eq!(err.category(), "type");
        assert!(err.to_string().contains('>'));
    }

    #[test]
    fn test_logic_requires_booleans() {
        let r = double();
        assert_eq!(call(&r, "&&", vec![Value::Bool(true), Value::Null]).unwrap(), Value::Bool(false));
        assert!(call(&r, "||", vec![Value::Int(1), Value::Bool(true)]).is_err());
        assert_eq!(call(&r, "!", vec![Value::Null]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_negate() {
        let r = double();
        assert_eq!(call(&r, "neg", vec![Value::Int(3)]).unwrap(), Value::Int(-3));
        let min = call(&r, "neg", vec![Value::Int(i64::MIN)]).unwrap();
        assert_eq!(min, Value::BigInt(-BigInt::from(i64::MIN)));
    }

    #[test]
    fn test_emit_infix() {
        let r = double();
        let add = r.get_fun("+").unwrap();
        assert_eq!(add.emit(&["a".into(), "1".into()]), "(a + 1)");
        let cond = r.get_fun("?:").unwrap();
        assert_eq!(cond.emit(&["c".into(), "1".into(), "2".into()]), "(c ? 1 : 2)");
    }
}
