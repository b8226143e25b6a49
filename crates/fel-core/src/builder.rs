//! Parse tree to evaluable nodes
//!
//! Function names are resolved against the registry while building; names
//! that are not registered become [`Callee::Unresolved`] and only fail when the
//! call is evaluated. Number literals take the narrowest type the numeric mode
//! allows.

use crate::config::NumericMode;
use crate::error::{FelError, FelResult};
use crate::function::FunctionRegistry;
use crate::grammar::{ExprKind, Expression};
use crate::node::{Callee, Node};
use bigdecimal::BigDecimal;
use fel_types::Value;
use num_bigint::BigInt;
use std::str::FromStr;
use tracing::debug;

/// Builds [`Node`] trees from parsed [`Expression`]s
pub struct AstBuilder<'a> {
    registry: &'a FunctionRegistry,
    numeric: NumericMode,
}

impl<'a> AstBuilder<'a> {
    pub fn new(registry: &'a FunctionRegistry, numeric: NumericMode) -> Self {
        Self { registry, numeric }
    }

    pub fn build(&self, expr: &Expression) -> FelResult<Node> {
        let position = expr.position;
        match &expr.kind {
            ExprKind::Number { text, float } => {
                let value = self.number(text, *float, position)?;
                Ok(Node::literal(text.clone(), value, position))
            }
            ExprKind::String(s) => {
                let value = Value::str(s);
                Ok(Node::literal(value.to_literal(), value, position))
            }
            ExprKind::Boolean(b) => Ok(Node::literal(b.to_string(), Value::Bool(*b), position)),
            ExprKind::Null => Ok(Node::literal("null", Value::Null, position)),
            ExprKind::Variable(name) => Ok(Node::variable(name.clone(), position)),
            ExprKind::UnaryOp { operator, operand } => {
                self.call(operator.symbol(), vec![self.build(operand)?], position)
            }
            ExprKind::BinaryOp { left, operator, right } => {
                self.call(operator.symbol(), vec![self.build(left)?, self.build(right)?], position)
            }
            ExprKind::Conditional { condition, then_expr, else_expr } => self.call(
                "?:",
                vec![self.build(condition)?, self.build(then_expr)?, self.build(else_expr)?],
                position,
            ),
            ExprKind::FunctionCall { name, args } => {
                let children = args.iter().map(|arg| self.build(arg)).collect::<FelResult<_>>()?;
                self.call(name, children, position)
            }
            ExprKind::FieldAccess { object, field } => {
                let children = vec![self.build(object)?, Self::name_literal(field, position)];
                self.call(".", children, position)
            }
            ExprKind::MethodCall { object, method, args } => {
                let mut children = Vec::with_capacity(args.len() + 2);
                children.push(self.build(object)?);
                children.push(Self::name_literal(method, position));
                for arg in args {
                    children.push(self.build(arg)?);
                }
                self.call(".()", children, position)
            }
            ExprKind::Index { object, index } => {
                self.call("[]", vec![self.build(object)?, self.build(index)?], position)
            }
        }
    }

    fn call(&self, name: &str, children: Vec<Node>, position: usize) -> FelResult<Node> {
        let callee = match self.registry.get_fun(name) {
            Some(function) => Callee::Resolved(function),
            None => {
                debug!(function = name, position, "Function not registered; resolving lazily");
                Callee::Unresolved(name.to_string())
            }
        };
        Ok(Node::call(callee, children, position))
    }

    fn name_literal(name: &str, position: usize) -> Node {
        let value = Value::str(name);
        Node::literal(value.to_literal(), value, position)
    }

    /// Integers become `Int`, or `BigInt` when they do not fit. Decimals become
    /// doubles, or arbitrary precision decimals in [`NumericMode::Big`].
    fn number(&self, text: &str, float: bool, position: usize) -> FelResult<Value> {
        let invalid = |e: &dyn std::fmt::Display| {
            FelError::parse(text, position, format!("Invalid number '{text}': {e}"))
        };

        if !float {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Value::Int(i));
            }
            return BigInt::from_str(text).map(Value::BigInt).map_err(|e| invalid(&e));
        }
        match self.numeric {
            NumericMode::Double => text.parse::<f64>().map(Value::Float).map_err(|e| invalid(&e)),
            NumericMode::Big => BigDecimal::from_str(text).map(Value::Decimal).map_err(|e| invalid(&e)),
        }
    }
}
