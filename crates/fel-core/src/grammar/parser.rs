//! Lexer and recursive descent parser for expression text
//!
//! Binary operators are parsed by precedence climbing, lowest first:
//! `?:`, `||`, `&&`, `==`/`!=`, `<`/`<=`/`>`/`>=`, `+`/`-`, `*`/`/`/`%`,
//! unary `-`/`!`, then postfix `.name`, `.name(...)`, `[...]` and calls.

use super::syntax::{BinaryOperator, ExprKind, Expression, UnaryOperator};
use crate::error::{FelError, FelResult};
use std::fmt;

/// Token types recognized by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number { text: String, float: bool },
    String(String),

    // Identifiers and keywords
    Identifier(String),
    True,
    False,
    Null,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    And,
    Or,
    Not,
    Question,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Colon,

    // Special
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number { text, .. } => write!(f, "{text}"),
            Token::String(s) => write!(f, "\"{s}\""),
            Token::Identifier(name) => write!(f, "{name}"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Equal => write!(f, "=="),
            Token::NotEqual => write!(f, "!="),
            Token::LessThan => write!(f, "<"),
            Token::LessThanEqual => write!(f, "<="),
            Token::GreaterThan => write!(f, ">"),
            Token::GreaterThanEqual => write!(f, ">="),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::Question => write!(f, "?"),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::LeftBracket => write!(f, "["),
            Token::RightBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Colon => write!(f, ":"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// Lexer for tokenizing expressions
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self { input: chars, position: 0, current_char }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Source text starting at `position`, for diagnostics
    fn fragment(&self, position: usize) -> String {
        self.input.iter().skip(position).take(16).collect()
    }

    fn error(&self, position: usize, message: impl Into<String>) -> FelError {
        FelError::parse(self.fragment(position), position, message)
    }

    fn read_digits(&mut self, text: &mut String) {
        while let Some(ch) = self.current_char.filter(char::is_ascii_digit) {
            text.push(ch);
            self.advance();
        }
    }

    fn read_number(&mut self) -> FelResult<Token> {
        let start = self.position;
        let mut text = String::new();
        let mut float = false;

        self.read_digits(&mut text);
        if self.current_char == Some('.') && self.peek().is_some_and(|c| c.is_ascii_digit()) {
            float = true;
            text.push('.');
            self.advance();
            self.read_digits(&mut text);
        }
        if matches!(self.current_char, Some('e' | 'E')) {
            float = true;
            text.push('e');
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.current_char {
                text.push(sign);
                self.advance();
            }
            if !self.current_char.is_some_and(|c| c.is_ascii_digit()) {
                return Err(self.error(start, format!("Invalid exponent in number '{text}'")));
            }
            self.read_digits(&mut text);
        }

        // Java-style type suffixes
        match self.current_char {
            Some('l' | 'L') => self.advance(),
            Some('d' | 'D' | 'f' | 'F') => {
                float = true;
                self.advance();
            }
            _ => {}
        }

        Ok(Token::Number { text, float })
    }

    fn read_hex_escape(&mut self, start: usize) -> FelResult<char> {
        let mut code = 0u32;
        for _ in 0..4 {
            self.advance();
            let digit = self
                .current_char
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error(start, "Invalid \\u escape"))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| self.error(start, "Invalid \\u escape"))
    }

    fn read_string(&mut self, quote: char) -> FelResult<Token> {
        let start = self.position;
        let mut string = String::new();
        self.advance(); // Skip opening quote

        while let Some(ch) = self.current_char {
            if ch == quote {
                self.advance(); // Skip closing quote
                return Ok(Token::String(string));
            } else if ch == '\\' {
                self.advance();
                match self.current_char {
                    Some('n') => string.push('\n'),
                    Some('t') => string.push('\t'),
                    Some('r') => string.push('\r'),
                    Some('\\') => string.push('\\'),
                    Some('"') => string.push('"'),
                    Some('\'') => string.push('\''),
                    Some('u') => string.push(self.read_hex_escape(start)?),
                    Some(other) => {
                        string.push('\\');
                        string.push(other);
                    }
                    None => return Err(self.error(start, "Unterminated string literal")),
                }
                self.advance();
            } else {
                string.push(ch);
                self.advance();
            }
        }

        Err(self.error(start, "Unterminated string literal"))
    }

    fn read_identifier(&mut self) -> Token {
        let mut identifier = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' {
                identifier.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // Check for keywords
        match identifier.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => Token::Identifier(identifier),
        }
    }

    /// Consume a one-character token
    fn single(&mut self, token: Token) -> FelResult<Token> {
        self.advance();
        Ok(token)
    }

    /// Consume a token that may be followed by `=`
    fn with_equals(&mut self, plain: Token, with_eq: Token) -> FelResult<Token> {
        if self.peek() == Some('=') {
            self.advance();
            self.advance();
            Ok(with_eq)
        } else {
            self.single(plain)
        }
    }

    /// Consume a doubled operator such as `&&`
    fn doubled(&mut self, ch: char, token: Token) -> FelResult<Token> {
        if self.peek() == Some(ch) {
            self.advance();
            self.advance();
            Ok(token)
        } else {
            Err(self.error(self.position, format!("Unexpected character '{ch}'. Did you mean '{ch}{ch}'?")))
        }
    }

    /// Next token and the offset it starts at
    pub fn next_token(&mut self) -> FelResult<(Token, usize)> {
        self.skip_whitespace();
        let start = self.position;

        let token = match self.current_char {
            None => Ok(Token::Eof),
            Some(ch) => match ch {
                '0'..='9' => self.read_number(),
                '"' | '\'' => self.read_string(ch),
                '$' => self.single(Token::Identifier("$".to_string())),
                c if c.is_alphabetic() || c == '_' => Ok(self.read_identifier()),
                '+' => self.single(Token::Plus),
                '-' => self.single(Token::Minus),
                '*' => self.single(Token::Star),
                '/' => self.single(Token::Slash),
                '%' => self.single(Token::Percent),
                '?' => self.single(Token::Question),
                ':' => self.single(Token::Colon),
                '(' => self.single(Token::LeftParen),
                ')' => self.single(Token::RightParen),
                '[' => self.single(Token::LeftBracket),
                ']' => self.single(Token::RightBracket),
                ',' => self.single(Token::Comma),
                '.' => self.single(Token::Dot),
                '=' => {
                    if self.peek() == Some('=') {
                        self.advance();
                        self.advance();
                        Ok(Token::Equal)
                    } else {
                        Err(self.error(start, "Unexpected character '='. Did you mean '=='?"))
                    }
                }
                '!' => self.with_equals(Token::Not, Token::NotEqual),
                '<' => self.with_equals(Token::LessThan, Token::LessThanEqual),
                '>' => self.with_equals(Token::GreaterThan, Token::GreaterThanEqual),
                '&' => self.doubled('&', Token::And),
                '|' => self.doubled('|', Token::Or),
                _ => Err(self.error(start, format!("Unexpected character '{ch}'"))),
            },
        }?;

        Ok((token, start))
    }
}

/// Parser for expressions
pub struct Parser {
    lexer: Lexer,
    current_token: Token,
    current_position: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    pub fn new(mut lexer: Lexer, max_depth: usize) -> FelResult<Self> {
        let (current_token, current_position) = lexer.next_token()?;
        Ok(Self { lexer, current_token, current_position, depth: 0, max_depth })
    }

    fn advance(&mut self) -> FelResult<()> {
        (self.current_token, self.current_position) = self.lexer.next_token()?;
        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> FelError {
        FelError::parse(self.current_token.to_string(), self.current_position, message)
    }

    fn expect(&mut self, expected: Token) -> FelResult<()> {
        if std::mem::discriminant(&self.current_token) == std::mem::discriminant(&expected) {
            self.advance()
        } else {
            Err(self.error(format!("Expected {}, found {}", expected, self.current_token)))
        }
    }

    /// Run `parse` one nesting level deeper
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> FelResult<T>) -> FelResult<T> {
        self.deepen(1)?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn deepen(&mut self, levels: usize) -> FelResult<()> {
        self.depth += levels;
        if self.depth > self.max_depth {
            let err = self.error(format!("Expression nests deeper than {}", self.max_depth));
            self.depth -= levels;
            return Err(err);
        }
        Ok(())
    }

    /// Parse one left-associative precedence level
    fn binary_level(
        &mut self,
        operand: fn(&mut Self) -> FelResult<Expression>,
        operator: fn(&Token) -> Option<BinaryOperator>,
    ) -> FelResult<Expression> {
        let mut left = operand(self)?;
        let mut chain = 0;

        while let Some(op) = operator(&self.current_token) {
            let position = self.current_position;
            self.advance()?;
            let right = operand(self)?;
            left = Expression::binary(left, op, right, position);

            // Each link of a chain adds a level to the tree
            chain += 1;
            self.deepen(1)?;
        }

        self.depth -= chain;
        Ok(left)
    }

    pub fn parse_expression(&mut self) -> FelResult<Expression> {
        self.nested(Self::parse_conditional_expression)
    }

    fn parse_conditional_expression(&mut self) -> FelResult<Expression> {
        let condition = self.parse_or_expression()?;

        if !matches!(self.current_token, Token::Question) {
            return Ok(condition);
        }
        let position = self.current_position;
        self.advance()?;
        let then_expr = self.parse_expression()?;
        self.expect(Token::Colon)?;
        let else_expr = self.parse_expression()?;

        Ok(Expression::new(
            ExprKind::Conditional {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            position,
        ))
    }

    fn parse_or_expression(&mut self) -> FelResult<Expression> {
        self.binary_level(Self::parse_and_expression, |token| {
            matches!(token, Token::Or).then_some(BinaryOperator::Or)
        })
    }

    fn parse_and_expression(&mut self) -> FelResult<Expression> {
        self.binary_level(Self::parse_equality_expression, |token| {
            matches!(token, Token::And).then_some(BinaryOperator::And)
        })
    }

    fn parse_equality_expression(&mut self) -> FelResult<Expression> {
        self.binary_level(Self::parse_comparison_expression, |token| match token {
            Token::Equal => Some(BinaryOperator::Equal),
            Token::NotEqual => Some(BinaryOperator::NotEqual),
            _ => None,
        })
    }

    fn parse_comparison_expression(&mut self) -> FelResult<Expression> {
        self.binary_level(Self::parse_additive_expression, |token| match token {
            Token::LessThan => Some(BinaryOperator::LessThan),
            Token::LessThanEqual => Some(BinaryOperator::LessThanOrEqual),
            Token::GreaterThan => Some(BinaryOperator::GreaterThan),
            Token::GreaterThanEqual => Some(BinaryOperator::GreaterThanOrEqual),
            _ => None,
        })
    }

    fn parse_additive_expression(&mut self) -> FelResult<Expression> {
        self.binary_level(Self::parse_multiplicative_expression, |token| match token {
            Token::Plus => Some(BinaryOperator::Add),
            Token::Minus => Some(BinaryOperator::Subtract),
            _ => None,
        })
    }

    fn parse_multiplicative_expression(&mut self) -> FelResult<Expression> {
        self.binary_level(Self::parse_unary_expression, |token| match token {
            Token::Star => Some(BinaryOperator::Multiply),
            Token::Slash => Some(BinaryOperator::Divide),
            Token::Percent => Some(BinaryOperator::Modulo),
            _ => None,
        })
    }

    fn parse_unary_expression(&mut self) -> FelResult<Expression> {
        let operator = match self.current_token {
            Token::Minus => UnaryOperator::Negate,
            Token::Not => UnaryOperator::Not,
            _ => return self.parse_postfix_expression(),
        };
        let position = self.current_position;
        self.advance()?;
        let operand = self.nested(Self::parse_unary_expression)?;
        Ok(Expression::unary(operator, operand, position))
    }

    fn parse_arguments(&mut self) -> FelResult<Vec<Expression>> {
        self.expect(Token::LeftParen)?;
        let mut args = Vec::new();

        if !matches!(self.current_token, Token::RightParen) {
            args.push(self.parse_expression()?);

            while matches!(self.current_token, Token::Comma) {
                self.advance()?;
                args.push(self.parse_expression()?);
            }
        }

        self.expect(Token::RightParen)?;
        Ok(args)
    }

    fn parse_postfix_expression(&mut self) -> FelResult<Expression> {
        let mut expr = self.parse_primary_expression()?;
        let mut chain = 0;

        loop {
            let position = self.current_position;
            let kind = match self.current_token {
                Token::Dot => {
                    self.advance()?;
                    let Token::Identifier(name) = &self.current_token else {
                        return Err(self.error("Expected a name after '.'"));
                    };
                    let name = name.clone();
                    self.advance()?;

                    if matches!(self.current_token, Token::LeftParen) {
                        let args = self.parse_arguments()?;
                        ExprKind::MethodCall { object: Box::new(expr), method: name, args }
                    } else {
                        ExprKind::FieldAccess { object: Box::new(expr), field: name }
                    }
                }
                Token::LeftParen => {
                    // Function call
                    let ExprKind::Variable(name) = expr.kind else {
                        return Err(self.error("Only identifiers can be called as functions"));
                    };
                    let args = self.parse_arguments()?;
                    expr = Expression::call(name, args, expr.position);
                    continue;
                }
                Token::LeftBracket => {
                    self.advance()?; // consume '['
                    let index = self.parse_expression()?;
                    self.expect(Token::RightBracket)?;
                    ExprKind::Index { object: Box::new(expr), index: Box::new(index) }
                }
                _ => break,
            };
            expr = Expression::new(kind, position);
            chain += 1;
            self.deepen(1)?;
        }

        self.depth -= chain;
        Ok(expr)
    }

    fn parse_primary_expression(&mut self) -> FelResult<Expression> {
        let position = self.current_position;
        let expr = match &self.current_token {
            Token::Number { text, float } => Expression::number(text.clone(), *float, position),
            Token::String(value) => Expression::string(value.clone(), position),
            Token::True => Expression::new(ExprKind::Boolean(true), position),
            Token::False => Expression::new(ExprKind::Boolean(false), position),
            Token::Null => Expression::new(ExprKind::Null, position),
            Token::Identifier(name) => Expression::var(name.clone(), position),
            Token::LeftParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                return Ok(expr);
            }
            Token::Eof => return Err(self.error("Unexpected end of input")),
            _ => return Err(self.error(format!("Unexpected token: {}", self.current_token))),
        };
        self.advance()?;
        Ok(expr)
    }
}

/// Parse expression text, rejecting nesting deeper than `max_depth`
pub fn parse(input: &str, max_depth: usize) -> FelResult<Expression> {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer, max_depth)?;
    let expr = parser.parse_expression()?;

    // Ensure we've consumed all tokens
    if !matches!(parser.current_token, Token::Eof) {
        return Err(parser.error(format!("Unexpected token after expression: {}", parser.current_token)));
    }

    Ok(expr)
}
