//! Error handling for the FEL engine
//!
//! Every fallible engine operation returns [`FelResult`]. The variants follow the
//! phase that failed: parsing, evaluation (including operand type mismatches and
//! denied sandbox calls), building a compiled artifact, or loading configuration.

use fel_types::Value;
use std::fmt;
use thiserror::Error;

/// Error type for all FEL engine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FelError {
    /// Malformed expression text
    #[error("Parse error at `{fragment}` (offset {position}): {message}")]
    Parse { message: String, fragment: String, position: usize },

    /// Runtime failure inside evaluation
    #[error("Evaluation error in `{function}`: {message}")]
    Eval { message: String, function: String, operands: Option<String> },

    /// An operator or function was applied to operands it cannot handle
    #[error("Type error in `{operator}`: cannot apply to {left} and {right}")]
    Type { operator: String, left: String, right: String },

    /// The compile backend could not build an artifact
    #[error("Compile error for `{expression}`: {message}")]
    Compile { message: String, expression: String },

    /// A gated call was denied by the security manager
    #[error("Security error: call to `{target}` is not allowed")]
    Security { target: String },

    /// Invalid engine configuration
    #[error("Configuration error for `{setting}`: {message}")]
    Config { message: String, setting: String },
}

/// Result type alias for engine operations
pub type FelResult<T> = Result<T, FelError>;

impl FelError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            FelError::Parse { .. } => "parse",
            FelError::Eval { .. } => "eval",
            FelError::Type { .. } => "type",
            FelError::Compile { .. } => "compile",
            FelError::Security { .. } => "security",
            FelError::Config { .. } => "config",
        }
    }

    /// `true` for the kinds raised while evaluating an expression
    pub fn is_eval_error(&self) -> bool {
        matches!(self, FelError::Eval { .. } | FelError::Type { .. } | FelError::Security { .. })
    }

    /// Get structured context information for debugging
    pub fn context(&self) -> ErrorContext {
        match self {
            FelError::Parse { fragment, position, .. } => ErrorContext {
                fragment: Some(fragment.clone()),
                position: Some(*position),
                ..Default::default()
            },
            FelError::Eval { function, operands, .. } => ErrorContext {
                function: Some(function.clone()),
                operands: operands.clone(),
                ..Default::default()
            },
            FelError::Type { operator, left, right } => ErrorContext {
                function: Some(operator.clone()),
                operands: Some(format!("{left}, {right}")),
                ..Default::default()
            },
            FelError::Compile { expression, .. } => {
                ErrorContext { fragment: Some(expression.clone()), ..Default::default() }
            }
            FelError::Security { target } => {
                ErrorContext { target: Some(target.clone()), ..Default::default() }
            }
            FelError::Config { setting, .. } => {
                ErrorContext { target: Some(setting.clone()), ..Default::default() }
            }
        }
    }
}

/// Structured error context for debugging
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext {
    pub fragment: Option<String>,
    pub position: Option<usize>,
    pub function: Option<String>,
    pub operands: Option<String>,
    pub target: Option<String>,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(fragment) = &self.fragment {
            parts.push(format!("fragment={fragment}"));
        }
        if let Some(position) = self.position {
            parts.push(format!("position={position}"));
        }
        if let Some(function) = &self.function {
            parts.push(format!("function={function}"));
        }
        if let Some(operands) = &self.operands {
            parts.push(format!("operands=[{operands}]"));
        }
        if let Some(target) = &self.target {
            parts.push(format!("target={target}"));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// Convenience constructors for common error scenarios
impl FelError {
    /// Create a parse error pointing at a fragment of the input
    pub fn parse(fragment: impl Into<String>, position: usize, message: impl Into<String>) -> Self {
        Self::Parse { message: message.into(), fragment: fragment.into(), position }
    }

    /// Create an evaluation error raised by a named function
    pub fn eval(function: &str, message: impl Into<String>) -> Self {
        Self::Eval { message: message.into(), function: function.to_string(), operands: None }
    }

    /// Create an evaluation error that records the offending operands
    pub fn eval_with_operands(function: &str, operands: &[&Value], message: impl Into<String>) -> Self {
        let rendered = operands
            .iter()
            .map(|v| format!("{}:{}", v.type_name(), v.to_literal()))
            .collect::<Vec<_>>()
            .join(", ");
        Self::Eval {
            message: message.into(),
            function: function.to_string(),
            operands: Some(rendered),
        }
    }

    /// Create a type error naming both operand types and the operator
    pub fn type_mismatch(operator: &str, left: &Value, right: &Value) -> Self {
        Self::Type {
            operator: operator.to_string(),
            left: format!("{}({})", left.type_name(), left.to_literal()),
            right: format!("{}({})", right.type_name(), right.to_literal()),
        }
    }

    /// Create a compile error for an expression
    pub fn compile(expression: &str, message: impl Into<String>) -> Self {
        Self::Compile { message: message.into(), expression: expression.to_string() }
    }

    /// Create a security error for a denied target
    pub fn security(target: impl Into<String>) -> Self {
        Self::Security { target: target.into() }
    }

    /// Create a configuration error
    pub fn config(setting: &str, message: impl Into<String>) -> Self {
        Self::Config { message: message.into(), setting: setting.to_string() }
    }
}
