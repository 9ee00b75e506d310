use std::rc::Rc;
use std::time::Instant;

use rand::Rng;
use rand::rngs::StdRng;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::ast::{
    BinaryOperator, Expression, Function, Scope, Statement, StatementKind, Type,
    VariableDeclaration,
};
use crate::builtins::BuiltinFunction;

use super::Output;
use super::error::{InterpreterError, RuntimeError};
use super::value::Value;

pub(super) type RunResult<T> = std::result::Result<T, InterpreterError>;

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    /// Declared type, re-checked on every assignment. `None` accepts anything.
    ty: Option<Type>,
}

/// Variable frames shared by the whole call chain.
///
/// Lookup and assignment walk the frames from the top and act on the first
/// frame holding the name, so a callee reads and writes its callers' bindings
/// unless it declares its own. Frame 0 is never popped and holds statics.
#[derive(Debug)]
pub(super) struct CallStack {
    frames: Vec<FxHashMap<String, Binding>>,
}

impl CallStack {
    pub(super) fn new() -> Self {
        Self {
            frames: vec![FxHashMap::default()],
        }
    }

    fn push_frame(&mut self) {
        self.frames.push(FxHashMap::default());
    }

    fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    fn depth(&self) -> usize {
        self.frames.len()
    }

    fn declare(&mut self, name: &str, value: Value, ty: Option<Type>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), Binding { value, ty });
        }
    }

    fn declare_static(&mut self, name: &str, value: Value, ty: Option<Type>) {
        if let Some(frame) = self.frames.first_mut() {
            frame.insert(name.to_string(), Binding { value, ty });
        }
    }

    fn has_static(&self, name: &str) -> bool {
        self.frames
            .first()
            .is_some_and(|frame| frame.contains_key(name))
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Binding> {
        self.frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.get_mut(name))
    }
}

/// Runtime executor for statements and expressions.
pub(super) struct InterpreterRuntime<'a> {
    functions: &'a FxHashMap<&'a str, &'a Function>,
    stack: CallStack,
    output: &'a mut dyn Output,
    rng: StdRng,
    started: Instant,
}

impl<'a> InterpreterRuntime<'a> {
    pub(super) fn new(
        functions: &'a FxHashMap<&'a str, &'a Function>,
        output: &'a mut dyn Output,
        rng: StdRng,
    ) -> Self {
        Self {
            functions,
            stack: CallStack::new(),
            output,
            rng,
            started: Instant::now(),
        }
    }

    pub(super) fn call_function(
        &mut self,
        function: &Function,
        args: Vec<Value>,
    ) -> RunResult<Option<Value>> {
        if args.len() != function.params.len() {
            return Err(RuntimeError::InvalidArguments {
                name: function.name.clone(),
                expected: function.params.len().to_string(),
                found: args.len(),
            }
            .into());
        }
        for (param, arg) in function.params.iter().zip(&args) {
            match param.ty {
                Some(Type::Void) => {
                    return Err(RuntimeError::VoidDeclaration {
                        name: param.name.clone(),
                    }
                    .into());
                }
                Some(ty) if !arg.matches(ty) => return Err(type_mismatch(ty.name(), arg).into()),
                _ => {}
            }
        }

        trace!(function = %function.name, depth = self.stack.depth(), "calling function");
        self.stack.push_frame();
        for (param, arg) in function.params.iter().zip(args) {
            self.stack.declare(&param.name, arg, param.ty);
        }
        let result = self.exec_scope(&function.body);
        self.stack.pop_frame();

        let result = result?;
        if let Some(ty) = function.return_type {
            check_return(ty, result.as_ref())?;
        }
        Ok(result)
    }

    /// Declares a variable; statics go to the bottom frame and initialize once.
    pub(super) fn declare(&mut self, declaration: &VariableDeclaration) -> RunResult<()> {
        if declaration.ty == Some(Type::Void) {
            return Err(RuntimeError::VoidDeclaration {
                name: declaration.name.clone(),
            }
            .into());
        }
        if declaration.is_static && self.stack.has_static(&declaration.name) {
            return Ok(());
        }

        let value = match &declaration.value {
            Some(expr) => self.eval_expression(expr)?,
            None => declaration
                .ty
                .and_then(Value::zero)
                .unwrap_or(Value::Number(0)),
        };
        if let Some(ty) = declaration.ty
            && !value.matches(ty)
        {
            return Err(type_mismatch(ty.name(), &value).into());
        }

        trace!(name = %declaration.name, is_static = declaration.is_static, "declare");
        if declaration.is_static {
            self.stack
                .declare_static(&declaration.name, value, declaration.ty);
        } else {
            self.stack.declare(&declaration.name, value, declaration.ty);
        }
        Ok(())
    }

    fn exec_scope(&mut self, scope: &Scope) -> RunResult<Option<Value>> {
        self.stack.push_frame();
        let result = self.exec_statements(&scope.statements);
        self.stack.pop_frame();
        result
    }

    fn exec_statements(&mut self, statements: &[Statement]) -> RunResult<Option<Value>> {
        // The first statement producing a value ends the scope. Only explicit
        // control flow or the trailing statement may do so.
        for (index, statement) in statements.iter().enumerate() {
            let Some(value) = self.exec_statement(statement)? else {
                continue;
            };
            let explicit = matches!(
                statement.kind,
                StatementKind::Return(_)
                    | StatementKind::If { .. }
                    | StatementKind::While { .. }
                    | StatementKind::Block(_)
            );
            let trailing = statements[index + 1..]
                .iter()
                .all(|rest| matches!(rest.kind, StatementKind::Comment(_)));
            if explicit || trailing {
                return Ok(Some(value));
            }
            return Err(InterpreterError::from(RuntimeError::InvalidImplicitReturn)
                .or_line(statement.line));
        }
        Ok(None)
    }

    fn exec_statement(&mut self, statement: &Statement) -> RunResult<Option<Value>> {
        self.exec_statement_kind(&statement.kind)
            .map_err(|error| error.or_line(statement.line))
    }

    fn exec_statement_kind(&mut self, kind: &StatementKind) -> RunResult<Option<Value>> {
        match kind {
            StatementKind::Declare(declaration) => {
                self.declare(declaration)?;
                Ok(None)
            }
            StatementKind::Assign { name, value } => {
                let value = self.eval_expression(value)?;
                self.assign(name, value)?;
                Ok(None)
            }
            StatementKind::AssignIndex { name, index, value } => {
                let index = self.eval_number(index)?;
                let value = self.eval_expression(value)?;
                let current = self.load(name)?;
                let updated = with_element(current, index, value)?;
                self.assign(name, updated)?;
                Ok(None)
            }
            StatementKind::If {
                condition,
                then_scope,
                else_scope,
            } => {
                if self.eval_condition(condition)? {
                    self.exec_scope(then_scope)
                } else if let Some(else_scope) = else_scope {
                    self.exec_scope(else_scope)
                } else {
                    Ok(None)
                }
            }
            StatementKind::While { condition, body } => {
                while self.eval_condition(condition)? {
                    if let Some(value) = self.exec_scope(body)? {
                        return Ok(Some(value));
                    }
                }
                Ok(None)
            }
            StatementKind::Return(value) => self.eval_expression(value).map(Some),
            StatementKind::Expression(expr) => match expr {
                Expression::Call { name, args } => self.eval_call(name, args),
                other => self.eval_expression(other).map(Some),
            },
            StatementKind::Block(scope) => self.exec_scope(scope),
            StatementKind::Comment(_) => Ok(None),
        }
    }

    fn load(&self, name: &str) -> RunResult<Value> {
        self.stack
            .lookup(name)
            .map(|binding| binding.value.clone())
            .ok_or_else(|| {
                RuntimeError::UndefinedVariable {
                    name: name.to_string(),
                }
                .into()
            })
    }

    fn assign(&mut self, name: &str, value: Value) -> RunResult<()> {
        let binding =
            self.stack
                .lookup_mut(name)
                .ok_or_else(|| RuntimeError::UndefinedVariable {
                    name: name.to_string(),
                })?;
        if let Some(ty) = binding.ty
            && !value.matches(ty)
        {
            return Err(type_mismatch(ty.name(), &value).into());
        }
        binding.value = value;
        Ok(())
    }

    fn eval_expression(&mut self, expr: &Expression) -> RunResult<Value> {
        match expr {
            Expression::Literal(literal) => Ok(Value::from_literal(literal)),
            Expression::Identifier(name) => self.load(name),
            Expression::Binary { left, op, right } => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                Ok(binary_op(*op, left, right)?)
            }
            Expression::Call { name, args } => {
                self.eval_call(name, args)?.ok_or_else(|| {
                    RuntimeError::InvalidType {
                        expected: "a value".to_string(),
                        found: Type::Void.name().to_string(),
                    }
                    .into()
                })
            }
            Expression::Index { name, index } => {
                let index = self.eval_number(index)?;
                let target = self.load(name)?;
                Ok(element(&target, index)?)
            }
            Expression::Array { size, initializer } => {
                Ok(Value::array(*size, initializer.as_ref()))
            }
        }
    }

    fn eval_number(&mut self, expr: &Expression) -> RunResult<i32> {
        match self.eval_expression(expr)? {
            Value::Number(value) => Ok(value),
            other => Err(type_mismatch(Type::Number.name(), &other).into()),
        }
    }

    fn eval_condition(&mut self, expr: &Expression) -> RunResult<bool> {
        match self.eval_expression(expr)? {
            Value::Bool(value) => Ok(value),
            Value::Number(value) => Ok(value != 0),
            other => Err(type_mismatch("bool or number", &other).into()),
        }
    }

    fn eval_call(&mut self, name: &str, args: &[Expression]) -> RunResult<Option<Value>> {
        if let Some(builtin) = BuiltinFunction::from_name(name) {
            return self.eval_builtin(builtin, args);
        }
        let function = self.functions.get(name).copied().ok_or_else(|| {
            RuntimeError::UndefinedFunction {
                name: name.to_string(),
            }
        })?;

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expression(arg)?);
        }
        self.call_function(function, values)
    }

    fn eval_builtin(
        &mut self,
        builtin: BuiltinFunction,
        args: &[Expression],
    ) -> RunResult<Option<Value>> {
        match builtin {
            BuiltinFunction::Print | BuiltinFunction::Println => {
                let mut text = match args {
                    [] => String::new(),
                    [arg] => self.eval_expression(arg)?.to_string(),
                    _ => return Err(invalid_arguments(builtin, "at most 1", args.len()).into()),
                };
                if builtin == BuiltinFunction::Println {
                    text.push('\n');
                }
                self.output.write(&text);
                Ok(None)
            }
            BuiltinFunction::Rand => {
                let (low, high) = match args {
                    [] => (0, 1),
                    [high] => (0, self.eval_number(high)?),
                    [low, high] => (self.eval_number(low)?, self.eval_number(high)?),
                    _ => return Err(invalid_arguments(builtin, "at most 2", args.len()).into()),
                };
                if low > high {
                    return Err(RuntimeError::EmptyRange { low, high }.into());
                }
                Ok(Some(Value::Number(self.rng.random_range(low..=high))))
            }
            BuiltinFunction::Time | BuiltinFunction::TimeMs => {
                if !args.is_empty() {
                    return Err(invalid_arguments(builtin, "0", args.len()).into());
                }
                let elapsed = self.started.elapsed();
                let raw = if builtin == BuiltinFunction::Time {
                    u128::from(elapsed.as_secs())
                } else {
                    elapsed.as_millis()
                };
                Ok(Some(Value::Number(i32::try_from(raw).unwrap_or(i32::MAX))))
            }
        }
    }
}

fn binary_op(op: BinaryOperator, left: Value, right: Value) -> Result<Value, RuntimeError> {
    use BinaryOperator::*;

    let value = match (op, &left, &right) {
        (Equal, _, _) => Value::Bool(left == right),
        (NotEqual, _, _) => Value::Bool(left != right),
        (Add, Value::Number(a), Value::Number(b)) => Value::Number(a.wrapping_add(*b)),
        (Add, Value::String(a), Value::String(b)) => Value::String(format!("{a}{b}")),
        (Sub, Value::Number(a), Value::Number(b)) => Value::Number(a.wrapping_sub(*b)),
        (Mul, Value::Number(a), Value::Number(b)) => Value::Number(a.wrapping_mul(*b)),
        (Mod, Value::Number(_), Value::Number(0)) => return Err(RuntimeError::DivisionByZero),
        (Mod, Value::Number(a), Value::Number(b)) => Value::Number(a.wrapping_rem(*b)),
        (Greater, Value::Number(a), Value::Number(b)) => Value::Bool(a > b),
        (Less, Value::Number(a), Value::Number(b)) => Value::Bool(a < b),
        (GreaterEqual, Value::Number(a), Value::Number(b)) => Value::Bool(a >= b),
        (LessEqual, Value::Number(a), Value::Number(b)) => Value::Bool(a <= b),
        _ => {
            return Err(RuntimeError::UnsupportedOperation {
                operation: op.symbol(),
                left: left.type_name(),
                right: right.type_name(),
            });
        }
    };
    Ok(value)
}

/// Maps a possibly negative index onto `0..len`.
fn resolve_index(index: i32, len: usize) -> Result<usize, RuntimeError> {
    let len_signed = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if index < 0 {
        len_signed + i64::from(index)
    } else {
        i64::from(index)
    };
    if (0..len_signed).contains(&resolved) {
        usize::try_from(resolved).map_err(|_| RuntimeError::IndexOutOfBounds { index, len })
    } else {
        Err(RuntimeError::IndexOutOfBounds { index, len })
    }
}

fn element(target: &Value, index: i32) -> Result<Value, RuntimeError> {
    match target {
        Value::Array(elements) => {
            let position = resolve_index(index, elements.len())?;
            Ok(elements[position].clone())
        }
        Value::String(text) => {
            let len = text.chars().count();
            let position = resolve_index(index, len)?;
            let ch = text
                .chars()
                .nth(position)
                .ok_or(RuntimeError::IndexOutOfBounds { index, len })?;
            Ok(Value::String(ch.to_string()))
        }
        other => Err(RuntimeError::NotIndexable {
            type_name: other.type_name(),
        }),
    }
}

/// Builds the snapshot that results from writing `value` at `index`.
fn with_element(target: Value, index: i32, value: Value) -> Result<Value, RuntimeError> {
    match target {
        Value::Array(elements) => {
            let position = resolve_index(index, elements.len())?;
            let mut updated = elements.to_vec();
            updated[position] = array_element(value)?;
            Ok(Value::Array(Rc::from(updated)))
        }
        Value::String(text) => {
            let mut chars = text.chars().collect::<Vec<_>>();
            let position = resolve_index(index, chars.len())?;
            chars[position] = string_element(value)?;
            Ok(Value::String(chars.into_iter().collect()))
        }
        other => Err(RuntimeError::NotIndexable {
            type_name: other.type_name(),
        }),
    }
}

/// Array slots hold numbers; a one-character string stores its code.
fn array_element(value: Value) -> Result<Value, RuntimeError> {
    match &value {
        Value::Number(_) => Ok(value),
        Value::String(text) => match single_char(text) {
            Some(ch) => Ok(Value::Number(ch as i32)),
            None => Err(type_mismatch("number or single character", &value)),
        },
        _ => Err(type_mismatch("number or single character", &value)),
    }
}

fn string_element(value: Value) -> Result<char, RuntimeError> {
    let ch = match &value {
        Value::String(text) => single_char(text),
        Value::Number(code) => u32::try_from(*code).ok().and_then(char::from_u32),
        _ => None,
    };
    ch.ok_or_else(|| type_mismatch("single character", &value))
}

fn single_char(text: &str) -> Option<char> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Some(ch),
        _ => None,
    }
}

/// No result counts as `void`.
fn check_return(ty: Type, result: Option<&Value>) -> Result<(), RuntimeError> {
    match result {
        None if ty == Type::Void => Ok(()),
        None => Err(RuntimeError::InvalidType {
            expected: ty.name().to_string(),
            found: Type::Void.name().to_string(),
        }),
        Some(value) if value.matches(ty) => Ok(()),
        Some(value) => Err(type_mismatch(ty.name(), value)),
    }
}

fn type_mismatch(expected: &str, found: &Value) -> RuntimeError {
    RuntimeError::InvalidType {
        expected: expected.to_string(),
        found: found.type_name().to_string(),
    }
}

fn invalid_arguments(builtin: BuiltinFunction, expected: &str, found: usize) -> RuntimeError {
    RuntimeError::InvalidArguments {
        name: builtin.name().to_string(),
        expected: expected.to_string(),
        found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_stack_resolves_names_top_down() {
        let mut stack = CallStack::new();
        stack.declare("a", Value::Number(1), None);
        stack.push_frame();
        assert_eq!(
            stack.lookup("a").map(|binding| binding.value.clone()),
            Some(Value::Number(1))
        );

        stack.declare("a", Value::Number(2), None);
        assert_eq!(
            stack.lookup("a").map(|binding| binding.value.clone()),
            Some(Value::Number(2))
        );

        stack.pop_frame();
        assert_eq!(
            stack.lookup("a").map(|binding| binding.value.clone()),
            Some(Value::Number(1))
        );
    }

    #[test]
    fn bottom_frame_survives_pops() {
        let mut stack = CallStack::new();
        stack.push_frame();
        stack.declare_static("counter", Value::Number(3), Some(Type::Number));
        stack.pop_frame();
        stack.pop_frame();
        assert_eq!(stack.depth(), 1);
        assert!(stack.has_static("counter"));
    }

    #[test]
    fn resolves_negative_indices_from_the_end() {
        assert_eq!(resolve_index(-1, 3), Ok(2));
        assert_eq!(resolve_index(0, 3), Ok(0));
        assert_eq!(
            resolve_index(-4, 3),
            Err(RuntimeError::IndexOutOfBounds { index: -4, len: 3 })
        );
        assert_eq!(
            resolve_index(3, 3),
            Err(RuntimeError::IndexOutOfBounds { index: 3, len: 3 })
        );
    }

    #[test]
    fn writes_produce_new_snapshots() {
        let original = Value::array(3, None);
        let updated = with_element(original.clone(), -1, Value::String("A".to_string()))
            .expect("write failed");
        assert_eq!(original.to_string(), "[0, 0, 0]");
        assert_eq!(updated.to_string(), "[0, 0, 65]");
    }

    #[test]
    fn string_writes_replace_one_character() {
        let updated = with_element(
            Value::String("cat".to_string()),
            0,
            Value::String("b".to_string()),
        )
        .expect("write failed");
        assert_eq!(updated, Value::String("bat".to_string()));
    }

    #[test]
    fn arithmetic_wraps_at_32_bits() {
        assert_eq!(
            binary_op(BinaryOperator::Add, Value::Number(i32::MAX), Value::Number(1)),
            Ok(Value::Number(i32::MIN))
        );
        assert_eq!(
            binary_op(BinaryOperator::Mod, Value::Number(-7), Value::Number(3)),
            Ok(Value::Number(-1))
        );
    }

    #[test]
    fn rejects_mixed_operands() {
        assert_eq!(
            binary_op(
                BinaryOperator::Add,
                Value::Number(1),
                Value::String("x".to_string())
            ),
            Err(RuntimeError::UnsupportedOperation {
                operation: "+",
                left: "number",
                right: "string",
            })
        );
    }
}
