//! Shared syntax tree consumed by both execution backends.
//!
//! The parser builds these nodes once; the interpreter walks them directly
//! while the code generator lowers them into Thumb assembly. Nodes are never
//! mutated by a backend.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Number,
    String,
    Bool,
    Void,
    Array,
}

impl Type {
    pub fn name(self) -> &'static str {
        match self {
            Type::Number => "number",
            Type::String => "string",
            Type::Bool => "bool",
            Type::Void => "void",
            Type::Array => "array",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Literal {
    Number(i32),
    String(String),
    Bool(bool),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Mod,
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::Greater
                | BinaryOperator::Less
                | BinaryOperator::GreaterEqual
                | BinaryOperator::LessEqual
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Mod => "%",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::Greater => ">",
            BinaryOperator::Less => "<",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::LessEqual => "<=",
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Literal(Literal),
    Identifier(String),
    Binary {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    Call {
        name: String,
        args: Vec<Expression>,
    },
    /// `name[index]`; negative indices count from the end.
    Index {
        name: String,
        index: Box<Expression>,
    },
    /// Fixed-size array. The initializer seeds the leading elements, the rest
    /// are zero.
    Array {
        size: usize,
        initializer: Option<Literal>,
    },
}

impl Expression {
    pub fn number(value: i32) -> Self {
        Expression::Literal(Literal::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Expression::Literal(Literal::Bool(value))
    }

    pub fn identifier(name: impl Into<String>) -> Self {
        Expression::Identifier(name.into())
    }

    pub fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Self {
        Expression::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Call {
            name: name.into(),
            args,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct VariableDeclaration {
    pub name: String,
    pub ty: Option<Type>,
    pub is_static: bool,
    /// `None` zero-initializes.
    pub value: Option<Expression>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum StatementKind {
    Declare(VariableDeclaration),
    Assign {
        name: String,
        value: Expression,
    },
    AssignIndex {
        name: String,
        index: Expression,
        value: Expression,
    },
    If {
        condition: Expression,
        then_scope: Scope,
        else_scope: Option<Scope>,
    },
    While {
        condition: Expression,
        body: Scope,
    },
    Return(Expression),
    Expression(Expression),
    Block(Scope),
    Comment(String),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    pub line: usize,
}

impl Statement {
    pub fn new(kind: StatementKind, line: usize) -> Self {
        Self { kind, line }
    }
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct Scope {
    pub statements: Vec<Statement>,
}

impl Scope {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Parameter {
    pub name: String,
    pub ty: Option<Type>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Parameter>,
    /// `None` when the source omits the annotation; treated as `void`
    /// without being enforced against a produced value.
    pub return_type: Option<Type>,
    pub body: Scope,
    pub line: usize,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Declaration {
    Function(Function),
    Static {
        variable: VariableDeclaration,
        line: usize,
    },
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Function(function) => &function.name,
            Declaration::Static { variable, .. } => &variable.name,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Declaration::Function(function) => function.line,
            Declaration::Static { line, .. } => *line,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct Program {
    pub declarations: Vec<Declaration>,
}

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.declarations
            .iter()
            .filter_map(|declaration| match declaration {
                Declaration::Function(function) => Some(function),
                Declaration::Static { .. } => None,
            })
    }

    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions().find(|function| function.name == name)
    }
}
