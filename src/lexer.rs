use std::{iter::Peekable, str::CharIndices};

use crate::ast::Type;
use crate::token::{Span, Token, TokenKind};

mod error;

pub use error::{LexError, LexResult};

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    eof_reached: bool,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            eof_reached: false,
            line: 1,
            column: 0,
        }
    }

    pub fn next_token(&mut self) -> LexResult<Token<'a>> {
        self.skip_whitespace();

        let (start_idx, ch) = match self.chars.peek() {
            Some(&(idx, c)) => (idx, c),
            None => {
                self.eof_reached = true;
                let index = self.input.len();
                return Ok(Token::new(
                    TokenKind::EOF,
                    Span {
                        start: index,
                        end: index,
                        line: self.line,
                        column: self.column,
                    },
                ));
            }
        };

        let start_line = self.line;
        let start_column = self.column;
        let kind = match ch {
            '"' => return self.read_string(start_idx, start_line, start_column),
            '#' => {
                self.advance_char();
                return Ok(self.read_comment(start_idx, start_line, start_column));
            }
            '/' if self.peek_second() == Some('/') => {
                self.advance_char();
                self.advance_char();
                return Ok(self.read_comment(start_idx, start_line, start_column));
            }
            c if c.is_alphabetic() || c == '_' => {
                return Ok(self.read_identifier(start_idx, start_line, start_column));
            }
            c if c.is_ascii_digit() => {
                return self.read_number(start_idx, start_line, start_column);
            }
            '=' => self.one_or_two('=', TokenKind::Assign, TokenKind::EqualEqual),
            '+' => self.one_or_two('=', TokenKind::Plus, TokenKind::PlusAssign),
            '-' => self.one_or_two('=', TokenKind::Minus, TokenKind::MinusAssign),
            '>' => self.one_or_two('=', TokenKind::Greater, TokenKind::GreaterEqual),
            '<' => self.one_or_two('=', TokenKind::Less, TokenKind::LessEqual),
            '!' if self.peek_second() == Some('=') => {
                self.advance_char();
                self.advance_char();
                TokenKind::NotEqual
            }
            '*' => self.single(TokenKind::Star),
            '%' => self.single(TokenKind::Percent),
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            ':' => self.single(TokenKind::Colon),
            ';' => self.single(TokenKind::Semicolon),
            ',' => self.single(TokenKind::Comma),
            _ => {
                return Err(LexError::UnexpectedCharacter {
                    character: ch,
                    line: start_line,
                    column: start_column,
                });
            }
        };

        Ok(Token::new(
            kind,
            Span {
                start: start_idx,
                end: self.current_index(),
                line: start_line,
                column: start_column,
            },
        ))
    }

    fn single(&mut self, kind: TokenKind<'a>) -> TokenKind<'a> {
        self.advance_char();
        kind
    }

    /// Consumes the current character and, when `second` follows, that one too.
    fn one_or_two(
        &mut self,
        second: char,
        short: TokenKind<'a>,
        long: TokenKind<'a>,
    ) -> TokenKind<'a> {
        self.advance_char();
        if self.chars.peek().map(|&(_, c)| c) == Some(second) {
            self.advance_char();
            long
        } else {
            short
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn read_comment(&mut self, start: usize, line: usize, column: usize) -> Token<'a> {
        let content_start = self.current_index();
        while let Some(&(_, c)) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.advance_char();
        }
        let end_idx = self.current_index();
        Token::new(
            TokenKind::Comment(self.input[content_start..end_idx].trim()),
            Span {
                start,
                end: end_idx,
                line,
                column,
            },
        )
    }

    fn read_identifier(&mut self, start: usize, line: usize, column: usize) -> Token<'a> {
        self.advance_char(); // Consume first char
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }

        let end_idx = self.current_index();
        let ident = &self.input[start..end_idx];
        let kind = match ident {
            "func" => TokenKind::Func,
            "var" => TokenKind::Var,
            "static" => TokenKind::Static,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "return" => TokenKind::Return,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "number" => TokenKind::Type(Type::Number),
            "string" => TokenKind::Type(Type::String),
            "bool" => TokenKind::Type(Type::Bool),
            "void" => TokenKind::Type(Type::Void),
            "array" => TokenKind::Type(Type::Array),
            _ => TokenKind::Identifier(ident),
        };
        Token::new(
            kind,
            Span {
                start,
                end: end_idx,
                line,
                column,
            },
        )
    }

    fn read_number(&mut self, start: usize, line: usize, column: usize) -> LexResult<Token<'a>> {
        self.advance_char(); // Consume first digit
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                self.advance_char();
            } else {
                break;
            }
        }

        let end_idx = self.current_index();
        let literal = &self.input[start..end_idx];
        let value = literal
            .parse::<i64>()
            .map_err(|_| LexError::InvalidNumberLiteral {
                literal: literal.to_string(),
                line,
            })?;
        Ok(Token::new(
            TokenKind::Number(value),
            Span {
                start,
                end: end_idx,
                line,
                column,
            },
        ))
    }

    fn read_string(&mut self, start: usize, line: usize, column: usize) -> LexResult<Token<'a>> {
        self.advance_char(); // Consume opening quote
        let mut value = String::new();
        while let Some((idx, c)) = self.advance_char() {
            match c {
                '"' => {
                    return Ok(Token::new(
                        TokenKind::String(value),
                        Span {
                            start,
                            end: idx + 1,
                            line,
                            column,
                        },
                    ));
                }
                '\\' => {
                    let Some((_, escape)) = self.advance_char() else {
                        break;
                    };
                    value.push(match escape {
                        'n' => '\n',
                        't' => '\t',
                        '0' => '\0',
                        '"' => '"',
                        '\\' => '\\',
                        other => {
                            return Err(LexError::InvalidEscape {
                                escape: other,
                                line,
                            });
                        }
                    });
                }
                '\n' => break,
                other => value.push(other),
            }
        }
        Err(LexError::UnterminatedString { line, column })
    }

    fn advance_char(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn peek_second(&self) -> Option<char> {
        let mut lookahead = self.chars.clone();
        lookahead.next();
        lookahead.next().map(|(_, c)| c)
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(idx, _)| *idx)
            .unwrap_or(self.input.len())
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = LexResult<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.eof_reached {
            return None;
        }
        Some(self.next_token())
    }
}

pub fn tokenize(input: &str) -> LexResult<Vec<Token<'_>>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let is_eof = matches!(token.kind, TokenKind::EOF);
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    Ok(tokens)
}
