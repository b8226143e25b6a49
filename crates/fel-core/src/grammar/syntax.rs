//! Parse tree produced by the grammar

use std::fmt;

/// A parsed expression and the character offset where it starts
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub position: usize,
}

/// Expression variants
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Numeric literal as written, without its type suffix
    Number { text: String, float: bool },

    /// String literal with escapes resolved
    String(String),

    Boolean(bool),

    Null,

    /// Variable reference
    Variable(String),

    /// Unary operation (-a, !a)
    UnaryOp { operator: UnaryOperator, operand: Box<Expression> },

    /// Binary operation (a + b, a > b, etc.)
    BinaryOp { left: Box<Expression>, operator: BinaryOperator, right: Box<Expression> },

    /// Conditional expression (condition ? a : b)
    Conditional {
        condition: Box<Expression>,
        then_expr: Box<Expression>,
        else_expr: Box<Expression>,
    },

    /// Function call (max(a, b), $('Math'))
    FunctionCall { name: String, args: Vec<Expression> },

    /// Property access (user.name)
    FieldAccess { object: Box<Expression>, field: String },

    /// Method call (name.substring(0, 2))
    MethodCall { object: Box<Expression>, method: String, args: Vec<Expression> },

    /// Indexing (items[0], map['key'])
    Index { object: Box<Expression>, index: Box<Expression> },
}

/// Binary operators, each backed by the registry function of the same symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Logical
    And,
    Or,
}

impl BinaryOperator {
    /// Registry name of the operator
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// Numeric negation (-x)
    Negate,
    /// Logical negation (!x)
    Not,
}

impl UnaryOperator {
    /// Registry name of the operator
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Negate => "neg",
            UnaryOperator::Not => "!",
        }
    }
}

impl Expression {
    pub fn new(kind: ExprKind, position: usize) -> Self {
        Self { kind, position }
    }

    /// Create an integer or decimal literal
    pub fn number(text: impl Into<String>, float: bool, position: usize) -> Self {
        Self::new(ExprKind::Number { text: text.into(), float }, position)
    }

    /// Create a string literal
    pub fn string(value: impl Into<String>, position: usize) -> Self {
        Self::new(ExprKind::String(value.into()), position)
    }

    /// Create a variable reference
    pub fn var(name: impl Into<String>, position: usize) -> Self {
        Self::new(ExprKind::Variable(name.into()), position)
    }

    /// Create a binary operation positioned at its operator
    pub fn binary(left: Expression, operator: BinaryOperator, right: Expression, position: usize) -> Self {
        Self::new(
            ExprKind::BinaryOp { left: Box::new(left), operator, right: Box::new(right) },
            position,
        )
    }

    /// Create a unary operation
    pub fn unary(operator: UnaryOperator, operand: Expression, position: usize) -> Self {
        Self::new(ExprKind::UnaryOp { operator, operand: Box::new(operand) }, position)
    }

    /// Create a function call
    pub fn call(name: impl Into<String>, args: Vec<Expression>, position: usize) -> Self {
        Self::new(ExprKind::FunctionCall { name: name.into(), args }, position)
    }
}
