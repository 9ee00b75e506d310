use anyhow::Result;

use crate::ast::{
    BinaryOperator, Declaration, Expression, Function, Literal, Parameter, Program, Scope,
    Statement, StatementKind, Type, VariableDeclaration,
};
use crate::lexer;
use crate::token::{Token, TokenKind};

mod error;

pub use error::ParseError;

type ParseResult<T> = std::result::Result<T, ParseError>;

/// Largest accepted `array[N]` length, in elements.
pub const MAX_ARRAY_SIZE: usize = 1 << 16;

pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    position: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token<'a>>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut declarations = Vec::new();
        loop {
            match self.current() {
                TokenKind::EOF => break,
                TokenKind::Comment(_) | TokenKind::Semicolon => {
                    self.advance();
                }
                TokenKind::Func => declarations.push(Declaration::Function(self.parse_function()?)),
                TokenKind::Static => {
                    let line = self.line();
                    self.advance();
                    let variable = self.parse_variable_declaration(true)?;
                    self.skip_semicolon();
                    declarations.push(Declaration::Static { variable, line });
                }
                _ => return Err(self.error("function or static declaration")),
            }
        }
        Ok(Program { declarations })
    }

    fn parse_function(&mut self) -> ParseResult<Function> {
        let line = self.line();
        self.expect(TokenKind::Func, "'func'")?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LParen, "'('")?;

        let mut params = Vec::new();
        while !matches!(self.current(), TokenKind::RParen) {
            let name = self.expect_identifier()?;
            let ty = if self.eat(&TokenKind::Colon) {
                Some(self.parse_type()?.0)
            } else {
                None
            };
            params.push(Parameter { name, ty });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        let return_type = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?.0)
        } else {
            None
        };
        let body = self.parse_block()?;

        Ok(Function {
            name,
            params,
            return_type,
            body,
            line,
        })
    }

    /// Parses a type name, including the optional `[size]` suffix of `array`.
    fn parse_type(&mut self) -> ParseResult<(Type, Option<usize>)> {
        let TokenKind::Type(ty) = *self.current() else {
            return Err(self.error("type"));
        };
        self.advance();
        if ty == Type::Array && self.eat(&TokenKind::LBracket) {
            let size = self.parse_array_size()?;
            self.expect(TokenKind::RBracket, "']'")?;
            return Ok((ty, Some(size)));
        }
        Ok((ty, None))
    }

    fn parse_array_size(&mut self) -> ParseResult<usize> {
        let line = self.line();
        let TokenKind::Number(value) = *self.current() else {
            return Err(self.error("array size"));
        };
        self.advance();
        usize::try_from(value)
            .ok()
            .filter(|size| *size <= MAX_ARRAY_SIZE)
            .ok_or(ParseError::InvalidArraySize { value, line })
    }

    fn parse_variable_declaration(&mut self, is_static: bool) -> ParseResult<VariableDeclaration> {
        self.expect(TokenKind::Var, "'var'")?;
        let name = self.expect_identifier()?;
        let (ty, size) = if self.eat(&TokenKind::Colon) {
            let (ty, size) = self.parse_type()?;
            (Some(ty), size)
        } else {
            (None, None)
        };

        let line = self.line();
        let mut value = if self.eat(&TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        if let Some(size) = size {
            value = match value {
                None => Some(Expression::Array {
                    size,
                    initializer: None,
                }),
                Some(Expression::Literal(literal)) => Some(Expression::Array {
                    size,
                    initializer: Some(literal),
                }),
                Some(array @ Expression::Array { .. }) => Some(array),
                Some(_) => return Err(ParseError::NonLiteralArrayInitializer { line }),
            };
        }

        Ok(VariableDeclaration {
            name,
            ty,
            is_static,
            value,
        })
    }

    fn parse_block(&mut self) -> ParseResult<Scope> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while !matches!(self.current(), TokenKind::RBrace | TokenKind::EOF) {
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Scope::new(statements))
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let line = self.line();
        let kind = match self.current().clone() {
            TokenKind::Comment(text) => {
                self.advance();
                StatementKind::Comment(text.to_string())
            }
            TokenKind::Var => StatementKind::Declare(self.parse_variable_declaration(false)?),
            TokenKind::Static => {
                self.advance();
                StatementKind::Declare(self.parse_variable_declaration(true)?)
            }
            TokenKind::If => self.parse_if()?,
            TokenKind::While => {
                self.advance();
                let condition = self.parse_condition()?;
                let body = self.parse_block()?;
                StatementKind::While { condition, body }
            }
            TokenKind::Return => {
                self.advance();
                StatementKind::Return(self.parse_expression()?)
            }
            TokenKind::LBrace => StatementKind::Block(self.parse_block()?),
            TokenKind::Identifier(name) => self.parse_identifier_statement(name)?,
            _ => StatementKind::Expression(self.parse_expression()?),
        };
        self.skip_semicolon();
        Ok(Statement::new(kind, line))
    }

    fn parse_identifier_statement(&mut self, name: &str) -> ParseResult<StatementKind> {
        let start = self.position;
        self.advance();
        match self.current() {
            TokenKind::Assign => {
                self.advance();
                let value = self.parse_expression()?;
                return Ok(StatementKind::Assign {
                    name: name.to_string(),
                    value,
                });
            }
            TokenKind::PlusAssign | TokenKind::MinusAssign => {
                let op = if matches!(self.current(), TokenKind::PlusAssign) {
                    BinaryOperator::Add
                } else {
                    BinaryOperator::Sub
                };
                self.advance();
                let rhs = self.parse_expression()?;
                return Ok(StatementKind::Assign {
                    name: name.to_string(),
                    value: Expression::binary(Expression::identifier(name), op, rhs),
                });
            }
            TokenKind::LBracket => {
                self.advance();
                let index = self.parse_expression()?;
                self.expect(TokenKind::RBracket, "']'")?;
                if self.eat(&TokenKind::Assign) {
                    let value = self.parse_expression()?;
                    return Ok(StatementKind::AssignIndex {
                        name: name.to_string(),
                        index,
                        value,
                    });
                }
            }
            _ => {}
        }

        // Not an assignment: rewind and parse the whole thing as an expression.
        self.position = start;
        Ok(StatementKind::Expression(self.parse_expression()?))
    }

    fn parse_if(&mut self) -> ParseResult<StatementKind> {
        self.expect(TokenKind::If, "'if'")?;
        let condition = self.parse_condition()?;
        let then_scope = self.parse_block()?;
        let else_scope = if self.eat(&TokenKind::Else) {
            if matches!(self.current(), TokenKind::If) {
                let line = self.line();
                let nested = self.parse_if()?;
                Some(Scope::new(vec![Statement::new(nested, line)]))
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(StatementKind::If {
            condition,
            then_scope,
            else_scope,
        })
    }

    fn parse_condition(&mut self) -> ParseResult<Expression> {
        self.expect(TokenKind::LParen, "'('")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')'")?;
        Ok(condition)
    }

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_additive()?;
        while let Some(op) = comparison_operator(self.current()) {
            self.advance();
            let right = self.parse_additive()?;
            expr = Expression::binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.current() {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            expr = Expression::binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.current() {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::Percent => BinaryOperator::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = Expression::binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        if !self.eat(&TokenKind::Minus) {
            return self.parse_primary();
        }
        let line = self.line();
        if let TokenKind::Number(value) = *self.current() {
            self.advance();
            return number_literal(-value, line);
        }
        let operand = self.parse_unary()?;
        Ok(Expression::binary(
            Expression::number(0),
            BinaryOperator::Sub,
            operand,
        ))
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let line = self.line();
        match self.current().clone() {
            TokenKind::Number(value) => {
                self.advance();
                number_literal(value, line)
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(Expression::Literal(Literal::String(value)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::boolean(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::boolean(false))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.eat(&TokenKind::LParen) {
                    let mut args = Vec::new();
                    while !matches!(self.current(), TokenKind::RParen) {
                        args.push(self.parse_expression()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen, "')'")?;
                    return Ok(Expression::call(name, args));
                }
                if self.eat(&TokenKind::LBracket) {
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    return Ok(Expression::Index {
                        name: name.to_string(),
                        index: Box::new(index),
                    });
                }
                Ok(Expression::identifier(name))
            }
            TokenKind::Type(Type::Array) => {
                self.advance();
                self.expect(TokenKind::LBracket, "'['")?;
                let size = self.parse_array_size()?;
                self.expect(TokenKind::RBracket, "']'")?;
                Ok(Expression::Array {
                    size,
                    initializer: None,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            _ => Err(self.error("expression")),
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        if let TokenKind::Identifier(name) = self.current() {
            let name = name.to_string();
            self.advance();
            Ok(name)
        } else {
            Err(self.error("identifier"))
        }
    }

    fn expect(&mut self, kind: TokenKind<'a>, expected: &str) -> ParseResult<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn eat(&mut self, kind: &TokenKind<'a>) -> bool {
        if self.current() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_semicolon(&mut self) {
        self.eat(&TokenKind::Semicolon);
    }

    fn current(&self) -> &TokenKind<'a> {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map_or(&TokenKind::EOF, |token| &token.kind)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map_or(1, Token::line)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn error(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: describe(self.current()),
            line: self.line(),
        }
    }
}

fn comparison_operator(kind: &TokenKind<'_>) -> Option<BinaryOperator> {
    match kind {
        TokenKind::EqualEqual => Some(BinaryOperator::Equal),
        TokenKind::NotEqual => Some(BinaryOperator::NotEqual),
        TokenKind::Greater => Some(BinaryOperator::Greater),
        TokenKind::Less => Some(BinaryOperator::Less),
        TokenKind::GreaterEqual => Some(BinaryOperator::GreaterEqual),
        TokenKind::LessEqual => Some(BinaryOperator::LessEqual),
        _ => None,
    }
}

fn number_literal(value: i64, line: usize) -> ParseResult<Expression> {
    i32::try_from(value)
        .map(Expression::number)
        .map_err(|_| ParseError::NumberOutOfRange { value, line })
}

fn describe(kind: &TokenKind<'_>) -> String {
    match kind {
        TokenKind::Identifier(name) => format!("identifier '{name}'"),
        TokenKind::Number(value) => format!("number {value}"),
        TokenKind::String(value) => format!("string \"{value}\""),
        TokenKind::Comment(_) => "comment".to_string(),
        TokenKind::Type(ty) => format!("type '{ty}'"),
        TokenKind::EOF => "end of input".to_string(),
        other => {
            let symbol = match other {
                TokenKind::True => "true",
                TokenKind::False => "false",
                TokenKind::Func => "func",
                TokenKind::Var => "var",
                TokenKind::Static => "static",
                TokenKind::If => "if",
                TokenKind::Else => "else",
                TokenKind::While => "while",
                TokenKind::Return => "return",
                TokenKind::Assign => "=",
                TokenKind::PlusAssign => "+=",
                TokenKind::MinusAssign => "-=",
                TokenKind::Plus => "+",
                TokenKind::Minus => "-",
                TokenKind::Star => "*",
                TokenKind::Percent => "%",
                TokenKind::EqualEqual => "==",
                TokenKind::NotEqual => "!=",
                TokenKind::Greater => ">",
                TokenKind::Less => "<",
                TokenKind::GreaterEqual => ">=",
                TokenKind::LessEqual => "<=",
                TokenKind::LBrace => "{",
                TokenKind::RBrace => "}",
                TokenKind::LParen => "(",
                TokenKind::RParen => ")",
                TokenKind::LBracket => "[",
                TokenKind::RBracket => "]",
                TokenKind::Colon => ":",
                TokenKind::Semicolon => ";",
                TokenKind::Comma => ",",
                _ => "token",
            };
            format!("'{symbol}'")
        }
    }
}

pub fn parse_tokens(tokens: Vec<Token<'_>>) -> ParseResult<Program> {
    Parser::new(tokens).parse_program()
}

/// Tokenizes and parses `source` in one step.
pub fn parse(source: &str) -> Result<Program> {
    let tokens = lexer::tokenize(source)?;
    Ok(parse_tokens(tokens)?)
}
