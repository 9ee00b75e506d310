use rustc_hash::FxHashMap;
use tracing::trace;

use crate::ast::{
    BinaryOperator, Expression, Literal, Scope, Statement, StatementKind, Type,
    VariableDeclaration,
};
use crate::builtins::{BuiltinFunction, symbols};

use super::ValueKind;
use super::asm::{Condition, Instruction, Register};
use super::error::{CodegenError, CompileError};
use super::labels::LabelGenerator;
use super::registers::RegisterPool;
use super::statics::{StaticData, StaticSymbol, StaticTable, array_data};

pub(super) type CompileResult<T> = std::result::Result<T, CompileError>;

const ARGUMENT_REGISTERS: [Register; 4] = [Register::R0, Register::R1, Register::R2, Register::R3];

/// Forward reach of a Thumb `b<cond>`, in bytes past the branch.
const CONDITIONAL_REACH: usize = 252;

/// What call sites need to know about a user function.
#[derive(Debug, Clone)]
pub(super) struct Signature {
    pub(super) label: String,
    pub(super) params: usize,
    pub(super) return_type: Option<Type>,
}

impl Signature {
    /// Kind of the value left in r0. Unannotated functions are read as numbers.
    fn result_kind(&self) -> Option<ValueKind> {
        match self.return_type {
            Some(Type::Void) => None,
            Some(ty) => Some(ValueKind::from_type(ty)),
            None => Some(ValueKind::Number),
        }
    }

    fn declares_result(&self) -> bool {
        self.return_type.is_some_and(|ty| ty != Type::Void)
    }
}

#[derive(Debug, Clone, Copy)]
struct Local {
    register: Register,
    kind: ValueKind,
}

enum Place {
    Local(Local),
    Static(StaticSymbol),
}

/// Where an indexed value lives.
enum Base {
    Register(Register),
    Label(String),
}

/// Registers a static in the data section.
///
/// Literal initializers are baked into the data; any other initializer is
/// returned together with the symbol's label so the caller can store it at
/// runtime.
pub(super) fn declare_static<'e>(
    statics: &mut StaticTable,
    declaration: &'e VariableDeclaration,
) -> CompileResult<Option<(String, &'e Expression)>> {
    let name = &declaration.name;
    let declared_kind = declaration.ty.map_or(ValueKind::Number, ValueKind::from_type);
    let (kind, data, deferred) = match (&declaration.value, declaration.ty) {
        (_, Some(Type::Void)) => {
            return Err(CodegenError::VoidDeclaration { name: name.clone() }.into());
        }
        (Some(Expression::Array { size, initializer }), _) => (
            ValueKind::Array,
            array_data(*size, initializer.as_ref()),
            None,
        ),
        (Some(Expression::Literal(Literal::String(text))), _) => {
            (ValueKind::Text, StaticData::Text(text.clone()), None)
        }
        (Some(Expression::Literal(Literal::Number(value))), _) => {
            (ValueKind::Number, StaticData::Word(*value), None)
        }
        (Some(Expression::Literal(Literal::Bool(value))), _) => {
            (ValueKind::Bool, StaticData::Word(i32::from(*value)), None)
        }
        (Some(value), _) => {
            if matches!(declared_kind, ValueKind::Text | ValueKind::Array) {
                return Err(CodegenError::unsupported(format!(
                    "non-literal initializer for static '{name}'"
                ))
                .into());
            }
            (declared_kind, StaticData::Word(0), Some(value))
        }
        (None, Some(Type::String)) => (ValueKind::Text, StaticData::Text(String::new()), None),
        (None, Some(Type::Array)) => {
            return Err(CodegenError::unsupported(format!("array '{name}' without a size")).into());
        }
        (None, _) => (declared_kind, StaticData::Word(0), None),
    };

    let label = statics.declare(name, kind, data)?.label.clone();
    Ok(deferred.map(|value| (label, value)))
}

/// Lowers the body of one function.
pub(super) struct FunctionCodegen<'a> {
    signatures: &'a FxHashMap<String, Signature>,
    statics: &'a mut StaticTable,
    labels: &'a mut LabelGenerator,
    scopes: Vec<FxHashMap<String, Local>>,
    pool: RegisterPool,
    code: Vec<Instruction>,
}

impl<'a> FunctionCodegen<'a> {
    pub(super) fn new(
        signatures: &'a FxHashMap<String, Signature>,
        statics: &'a mut StaticTable,
        labels: &'a mut LabelGenerator,
    ) -> Self {
        Self {
            signatures,
            statics,
            labels,
            scopes: vec![FxHashMap::default()],
            pool: RegisterPool::new(),
            code: Vec::new(),
        }
    }

    /// Moves the incoming argument out of r0 into a callee-saved register.
    pub(super) fn bind_parameter(&mut self, name: &str, ty: Option<Type>) -> CompileResult<()> {
        let register = self.allocate(name)?;
        self.code.push(Instruction::Move {
            dst: register,
            src: Register::R0,
        });
        let kind = ty.map_or(ValueKind::Number, ValueKind::from_type);
        self.bind(name, Local { register, kind });
        Ok(())
    }

    pub(super) fn initialize_static(&mut self, label: &str, value: &Expression) -> CompileResult<()> {
        self.emit_value(value, Register::R1)?;
        self.store_word(Register::R1, label);
        Ok(())
    }

    /// Stores `value` into a function-local static on the first call only,
    /// tracked by a flag word next to the static.
    fn initialize_static_once(&mut self, label: &str, value: &Expression) -> CompileResult<()> {
        let flag = self.statics.flag(label);
        let done_label = self.labels.fresh("static_done");
        self.code.extend([
            Instruction::LoadAddress {
                dst: Register::R3,
                label: flag.clone(),
            },
            Instruction::LoadWord {
                dst: Register::R3,
                base: Register::R3,
                offset: None,
            },
            Instruction::CompareImmediate {
                lhs: Register::R3,
                value: 0,
            },
            Instruction::branch_if(Condition::Ne, done_label.clone()),
        ]);
        let branch = self.code.len() - 1;
        self.initialize_static(label, value)?;
        self.code.push(Instruction::MoveImmediate {
            dst: Register::R1,
            value: 1,
        });
        self.store_word(Register::R1, &flag);
        self.code.push(Instruction::Label(done_label));
        self.widen_branch(branch);
        Ok(())
    }

    /// Rewrites the conditional branch at `at` as an inverted branch over an
    /// unconditional `b` when the code after it is out of `b<cond>` reach.
    fn widen_branch(&mut self, at: usize) {
        let distance = self.code[at + 1..]
            .iter()
            .map(Instruction::size)
            .sum::<usize>();
        if distance <= CONDITIONAL_REACH {
            return;
        }
        let Some(Instruction::Branch {
            condition: Some(condition),
            label,
        }) = self.code.get(at).cloned()
        else {
            return;
        };
        let skip_label = self.labels.fresh("near");
        trace!(%label, distance, "widened conditional branch");
        self.code[at] = Instruction::branch_if(condition.inverse(), skip_label.clone());
        self.code.insert(at + 1, Instruction::branch(label));
        self.code.insert(at + 2, Instruction::Label(skip_label));
    }

    pub(super) fn emit_body(&mut self, body: &Scope) -> CompileResult<()> {
        self.emit_scope(body)
    }

    /// Wraps the body in its prologue and epilogue.
    pub(super) fn finish(self, label: &str) -> Vec<Instruction> {
        let used = self.pool.used();
        let mut pushed = used.to_vec();
        pushed.push(Register::Lr);
        let mut popped = used.to_vec();
        popped.push(Register::Pc);

        let returns = matches!(
            self.code
                .iter()
                .rev()
                .find(|instruction| !matches!(instruction, Instruction::Comment(_))),
            Some(Instruction::Epilogue)
        );

        let mut out = Vec::with_capacity(self.code.len() + 4);
        out.push(Instruction::Label(label.to_string()));
        out.push(Instruction::Push(pushed));
        out.extend(self.code.into_iter().map(|instruction| match instruction {
            Instruction::Epilogue => Instruction::Pop(popped.clone()),
            other => other,
        }));
        if !returns {
            out.push(Instruction::Pop(popped));
        }
        out.push(Instruction::LiteralPool);
        out
    }

    fn allocate(&mut self, name: &str) -> CompileResult<Register> {
        let register = self
            .pool
            .allocate()
            .ok_or_else(|| CodegenError::VariableLimitReached {
                name: name.to_string(),
            })?;
        trace!(name, %register, "allocated register");
        Ok(register)
    }

    fn bind(&mut self, name: &str, local: Local) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), local);
        }
    }

    fn resolve(&self, name: &str) -> CompileResult<Place> {
        if let Some(local) = self.scopes.iter().rev().find_map(|scope| scope.get(name)) {
            return Ok(Place::Local(*local));
        }
        self.statics
            .lookup(name)
            .cloned()
            .map(Place::Static)
            .ok_or_else(|| {
                CodegenError::UndefinedVariable {
                    name: name.to_string(),
                }
                .into()
            })
    }

    fn emit_scope(&mut self, scope: &Scope) -> CompileResult<()> {
        self.scopes.push(FxHashMap::default());
        let mark = self.pool.mark();
        let result = self.emit_statements(&scope.statements);
        self.scopes.pop();
        self.pool.release_to(mark);
        result
    }

    fn emit_statements(&mut self, statements: &[Statement]) -> CompileResult<()> {
        for (index, statement) in statements.iter().enumerate() {
            let trailing = statements[index + 1..]
                .iter()
                .all(|rest| matches!(rest.kind, StatementKind::Comment(_)));
            self.emit_statement(statement, trailing)
                .map_err(|error| error.or_line(statement.line))?;
        }
        Ok(())
    }

    fn emit_statement(&mut self, statement: &Statement, trailing: bool) -> CompileResult<()> {
        match &statement.kind {
            StatementKind::Declare(declaration) if declaration.is_static => {
                if let Some((label, value)) = declare_static(self.statics, declaration)? {
                    self.initialize_static_once(&label, value)?;
                }
                Ok(())
            }
            StatementKind::Declare(declaration) => self.declare_local(declaration),
            StatementKind::Assign { name, value } => self.assign(name, value),
            StatementKind::AssignIndex { name, index, value } => {
                self.assign_index(name, index, value)
            }
            StatementKind::If {
                condition,
                then_scope,
                else_scope,
            } => {
                let false_label = self.labels.fresh("if_false");
                let branch = self.emit_condition(condition, &false_label)?;
                self.emit_scope(then_scope)?;
                match else_scope {
                    Some(else_scope) => {
                        let end_label = self.labels.fresh("if_end");
                        self.code.push(Instruction::branch(end_label.clone()));
                        self.code.push(Instruction::Label(false_label));
                        self.widen_branch(branch);
                        self.emit_scope(else_scope)?;
                        self.code.push(Instruction::Label(end_label));
                    }
                    None => {
                        self.code.push(Instruction::Label(false_label));
                        self.widen_branch(branch);
                    }
                }
                Ok(())
            }
            StatementKind::While { condition, body } => {
                let start_label = self.labels.fresh("while");
                let end_label = self.labels.fresh("while_end");
                self.code.push(Instruction::Label(start_label.clone()));
                let branch = self.emit_condition(condition, &end_label)?;
                self.emit_scope(body)?;
                self.code.push(Instruction::branch(start_label));
                self.code.push(Instruction::Label(end_label));
                self.widen_branch(branch);
                Ok(())
            }
            StatementKind::Return(value) => {
                self.emit_value(value, Register::R0)?;
                self.code.push(Instruction::Epilogue);
                Ok(())
            }
            StatementKind::Expression(expr) => {
                if !self.yields_value(expr) {
                    if let Expression::Call { name, args } = expr {
                        self.emit_call(name, args)?;
                    }
                    return Ok(());
                }
                if !trailing {
                    return Err(CodegenError::InvalidImplicitReturn.into());
                }
                self.emit_value(expr, Register::R0)?;
                self.code.push(Instruction::Epilogue);
                Ok(())
            }
            StatementKind::Block(scope) => self.emit_scope(scope),
            StatementKind::Comment(text) => {
                self.code.push(Instruction::Comment(text.clone()));
                Ok(())
            }
        }
    }

    fn yields_value(&self, expr: &Expression) -> bool {
        match expr {
            Expression::Call { name, .. } => {
                if let Some(builtin) = BuiltinFunction::from_name(name) {
                    builtin.returns_value()
                } else if symbols::is_direct_helper(name) {
                    false
                } else {
                    self.signatures
                        .get(name.as_str())
                        .is_some_and(Signature::declares_result)
                }
            }
            _ => true,
        }
    }

    fn declare_local(&mut self, declaration: &VariableDeclaration) -> CompileResult<()> {
        let name = &declaration.name;
        match (declaration.ty, &declaration.value) {
            (Some(Type::Void), _) => {
                return Err(CodegenError::VoidDeclaration { name: name.clone() }.into());
            }
            (Some(Type::Array), _) | (_, Some(Expression::Array { .. })) => {
                return Err(CodegenError::ArrayMustBeStatic { name: name.clone() }.into());
            }
            _ => {}
        }

        let existing = self
            .scopes
            .last()
            .and_then(|scope| scope.get(name.as_str()))
            .copied();
        let register = match existing {
            Some(local) => local.register,
            None => self.allocate(name)?,
        };
        let kind = match &declaration.value {
            Some(value) => self.emit_value(value, register)?,
            None => {
                self.load_immediate(register, 0);
                ValueKind::Number
            }
        };
        let kind = declaration.ty.map_or(kind, ValueKind::from_type);
        self.bind(name, Local { register, kind });
        Ok(())
    }

    fn assign(&mut self, name: &str, value: &Expression) -> CompileResult<()> {
        match self.resolve(name)? {
            Place::Local(local) => {
                self.emit_value(value, local.register)?;
                Ok(())
            }
            Place::Static(symbol) => match symbol.data {
                StaticData::Word(_) => self.initialize_static(&symbol.label, value),
                StaticData::Text(_) | StaticData::Words { .. } => Err(CodegenError::unsupported(
                    format!("assigning to static {} '{name}'", symbol.kind),
                )
                .into()),
            },
        }
    }

    fn assign_index(
        &mut self,
        name: &str,
        index: &Expression,
        value: &Expression,
    ) -> CompileResult<()> {
        let symbol = match self.resolve(name)? {
            Place::Static(symbol) if matches!(symbol.data, StaticData::Words { .. }) => symbol,
            _ => {
                return Err(
                    CodegenError::unsupported(format!("element assignment to '{name}'")).into(),
                );
            }
        };

        self.emit_offset(index, symbol.len(), true, Register::R1)?;
        match char_code(value) {
            Some(code) => self.load_immediate(Register::R2, code),
            None => {
                self.emit_protected(Register::R1, value, Register::R2)?;
            }
        }
        self.code.push(Instruction::LoadAddress {
            dst: Register::R3,
            label: symbol.label,
        });
        self.code.push(Instruction::StoreWord {
            src: Register::R2,
            base: Register::R3,
            offset: Some(Register::R1),
        });
        Ok(())
    }

    /// Branches to `false_label` unless `condition` holds; returns the
    /// position of the branch.
    fn emit_condition(&mut self, condition: &Expression, false_label: &str) -> CompileResult<usize> {
        if let Expression::Binary { left, op, right } = condition
            && let Some(comparison) = Condition::from_operator(*op)
        {
            self.emit_value(left, Register::R1)?;
            self.emit_compare(right)?;
            self.code
                .push(Instruction::branch_if(comparison.inverse(), false_label));
            return Ok(self.code.len() - 1);
        }

        self.emit_value(condition, Register::R1)?;
        self.code.push(Instruction::CompareImmediate {
            lhs: Register::R1,
            value: 0,
        });
        self.code
            .push(Instruction::branch_if(Condition::Eq, false_label));
        Ok(self.code.len() - 1)
    }

    /// Compares r1 against `right`.
    fn emit_compare(&mut self, right: &Expression) -> CompileResult<()> {
        if let Some(value) = small_immediate(right) {
            self.code.push(Instruction::CompareImmediate {
                lhs: Register::R1,
                value,
            });
        } else {
            self.emit_protected(Register::R1, right, Register::R2)?;
            self.code.push(Instruction::Compare {
                lhs: Register::R1,
                rhs: Register::R2,
            });
        }
        Ok(())
    }

    /// Evaluates `expr` into `dst`, saving `live` around it when the
    /// evaluation may clobber scratch registers.
    fn emit_protected(
        &mut self,
        live: Register,
        expr: &Expression,
        dst: Register,
    ) -> CompileResult<ValueKind> {
        if matches!(expr, Expression::Literal(_) | Expression::Identifier(_)) {
            return self.emit_value(expr, dst);
        }
        self.code.push(Instruction::Push(vec![live]));
        let kind = self.emit_value(expr, dst)?;
        self.code.push(Instruction::Pop(vec![live]));
        Ok(kind)
    }

    fn emit_value(&mut self, expr: &Expression, dst: Register) -> CompileResult<ValueKind> {
        match expr {
            Expression::Literal(Literal::Number(value)) => {
                self.load_immediate(dst, *value);
                Ok(ValueKind::Number)
            }
            Expression::Literal(Literal::Bool(value)) => {
                self.code.push(Instruction::MoveImmediate {
                    dst,
                    value: u8::from(*value),
                });
                Ok(ValueKind::Bool)
            }
            Expression::Literal(Literal::String(text)) => {
                let label = self.statics.literal(text);
                self.code.push(Instruction::LoadAddress { dst, label });
                Ok(ValueKind::Text)
            }
            Expression::Identifier(name) => match self.resolve(name)? {
                Place::Local(local) => {
                    if local.register != dst {
                        self.code.push(Instruction::Move {
                            dst,
                            src: local.register,
                        });
                    }
                    Ok(local.kind)
                }
                Place::Static(symbol) => {
                    let is_word = matches!(symbol.data, StaticData::Word(_));
                    self.code.push(Instruction::LoadAddress {
                        dst,
                        label: symbol.label,
                    });
                    if is_word {
                        self.code.push(Instruction::LoadWord {
                            dst,
                            base: dst,
                            offset: None,
                        });
                    }
                    Ok(symbol.kind)
                }
            },
            Expression::Binary { left, op, right } => self.emit_binary(left, *op, right, dst),
            Expression::Call { name, args } => {
                let kind = self
                    .emit_call(name, args)?
                    .ok_or_else(|| CodegenError::VoidValue { name: name.clone() })?;
                if dst != Register::R0 {
                    self.code.push(Instruction::Move {
                        dst,
                        src: Register::R0,
                    });
                }
                Ok(kind)
            }
            Expression::Index { name, index } => self.emit_index(name, index, dst),
            Expression::Array { .. } => Err(CodegenError::unsupported(
                "array constructor outside a static declaration",
            )
            .into()),
        }
    }

    fn emit_binary(
        &mut self,
        left: &Expression,
        op: BinaryOperator,
        right: &Expression,
        dst: Register,
    ) -> CompileResult<ValueKind> {
        let left_kind = self.emit_value(left, Register::R1)?;
        let right_kind = self.emit_protected(Register::R1, right, Register::R2)?;

        let condition = match op {
            BinaryOperator::Equal => Condition::Eq,
            BinaryOperator::NotEqual => Condition::Ne,
            BinaryOperator::Greater => Condition::Gt,
            BinaryOperator::Less => Condition::Lt,
            BinaryOperator::GreaterEqual => Condition::Ge,
            BinaryOperator::LessEqual => Condition::Le,
            BinaryOperator::Add | BinaryOperator::Sub | BinaryOperator::Mul | BinaryOperator::Mod => {
                self.emit_arithmetic(op, left_kind, right_kind, dst)?;
                return Ok(ValueKind::Number);
            }
        };

        let false_label = self.labels.fresh("cmp_false");
        let end_label = self.labels.fresh("cmp_end");
        self.code.extend([
            Instruction::Compare {
                lhs: Register::R1,
                rhs: Register::R2,
            },
            Instruction::branch_if(condition.inverse(), false_label.clone()),
            Instruction::MoveImmediate { dst, value: 1 },
            Instruction::branch(end_label.clone()),
            Instruction::Label(false_label),
            Instruction::MoveImmediate { dst, value: 0 },
            Instruction::Label(end_label),
        ]);
        Ok(ValueKind::Bool)
    }

    /// Applies `op` to r1 and r2, leaving the result in `dst`.
    fn emit_arithmetic(
        &mut self,
        op: BinaryOperator,
        left: ValueKind,
        right: ValueKind,
        dst: Register,
    ) -> CompileResult<()> {
        for kind in [left, right] {
            if matches!(kind, ValueKind::Text | ValueKind::Array) {
                return Err(CodegenError::unsupported(format!(
                    "operator '{}' on {kind} values",
                    op.symbol()
                ))
                .into());
            }
        }

        match op {
            BinaryOperator::Add => self.code.push(Instruction::Add {
                dst,
                lhs: Register::R1,
                rhs: Register::R2,
            }),
            BinaryOperator::Sub => self.code.push(Instruction::Sub {
                dst,
                lhs: Register::R1,
                rhs: Register::R2,
            }),
            BinaryOperator::Mul => {
                self.code.push(Instruction::Multiply {
                    dst: Register::R1,
                    src: Register::R2,
                });
                if dst != Register::R1 {
                    self.code.push(Instruction::Move {
                        dst,
                        src: Register::R1,
                    });
                }
            }
            _ => {
                // No divide instruction on this core; the runtime computes it.
                self.code.extend([
                    Instruction::Move {
                        dst: Register::R0,
                        src: Register::R1,
                    },
                    Instruction::Move {
                        dst: Register::R1,
                        src: Register::R2,
                    },
                    Instruction::BranchLink(symbols::MODULO.to_string()),
                ]);
                if dst != Register::R0 {
                    self.code.push(Instruction::Move {
                        dst,
                        src: Register::R0,
                    });
                }
            }
        }
        Ok(())
    }

    fn emit_index(
        &mut self,
        name: &str,
        index: &Expression,
        dst: Register,
    ) -> CompileResult<ValueKind> {
        let (base, len, words) = match self.resolve(name)? {
            Place::Static(symbol) => match &symbol.data {
                StaticData::Words { size, .. } => (Base::Label(symbol.label.clone()), Some(*size), true),
                StaticData::Text(text) => (Base::Label(symbol.label.clone()), Some(text.len()), false),
                StaticData::Word(_) => {
                    return Err(
                        CodegenError::unsupported(format!("indexing scalar '{name}'")).into(),
                    );
                }
            },
            Place::Local(local) if local.kind == ValueKind::Text => {
                (Base::Register(local.register), None, false)
            }
            Place::Local(_) => {
                return Err(CodegenError::unsupported(format!("indexing '{name}'")).into());
            }
        };

        self.emit_offset(index, len, words, dst)?;
        let base = match base {
            Base::Register(register) => register,
            Base::Label(label) => {
                self.code.push(Instruction::LoadAddress {
                    dst: Register::R3,
                    label,
                });
                Register::R3
            }
        };
        if words {
            self.code.push(Instruction::LoadWord {
                dst,
                base,
                offset: Some(dst),
            });
            Ok(ValueKind::Number)
        } else {
            self.code.push(Instruction::LoadByte {
                dst,
                base,
                offset: Some(dst),
            });
            Ok(ValueKind::Char)
        }
    }

    /// Loads the byte offset of element `index` into `dst`.
    ///
    /// Literal indices are range-checked and negative ones are counted from
    /// the end when the length is known.
    fn emit_offset(
        &mut self,
        index: &Expression,
        len: Option<usize>,
        words: bool,
        dst: Register,
    ) -> CompileResult<()> {
        let scale = if words { 4 } else { 1 };
        if let Expression::Literal(Literal::Number(raw)) = index {
            let resolved = match len {
                Some(len) => normalize_index(*raw, len)?,
                None if *raw >= 0 => *raw,
                None => {
                    return Err(CodegenError::unsupported(
                        "negative index into a value of unknown length",
                    )
                    .into());
                }
            };
            self.load_immediate(dst, resolved.wrapping_mul(scale));
            return Ok(());
        }

        self.emit_value(index, dst)?;
        if words {
            self.code.push(Instruction::ShiftLeft {
                dst,
                src: dst,
                amount: 2,
            });
        }
        Ok(())
    }

    /// Emits a call; returns the kind of the value left in r0, if any.
    fn emit_call(&mut self, name: &str, args: &[Expression]) -> CompileResult<Option<ValueKind>> {
        if let Some(builtin) = BuiltinFunction::from_name(name) {
            return self.emit_builtin(builtin, args);
        }
        if symbols::is_direct_helper(name) {
            self.emit_helper_call(name, args)?;
            return Ok(None);
        }

        let signature = self.signatures.get(name).cloned().ok_or_else(|| {
            CodegenError::UndefinedFunction {
                name: name.to_string(),
            }
        })?;
        if args.len() != signature.params {
            return Err(CodegenError::InvalidArguments {
                name: name.to_string(),
                expected: signature.params.to_string(),
                found: args.len(),
            }
            .into());
        }
        if let Some(arg) = args.first() {
            self.emit_value(arg, Register::R0)?;
        }
        self.code
            .push(Instruction::BranchLink(signature.label.clone()));
        Ok(signature.result_kind())
    }

    /// Calls a runtime helper with up to four register arguments.
    fn emit_helper_call(&mut self, name: &str, args: &[Expression]) -> CompileResult<()> {
        match args {
            [] => {}
            [arg] => {
                self.emit_value(arg, Register::R0)?;
            }
            _ if args.len() <= ARGUMENT_REGISTERS.len() => {
                for arg in args {
                    self.emit_value(arg, Register::R0)?;
                    self.code.push(Instruction::Push(vec![Register::R0]));
                }
                for register in ARGUMENT_REGISTERS[..args.len()].iter().rev() {
                    self.code.push(Instruction::Pop(vec![*register]));
                }
            }
            _ => {
                return Err(CodegenError::InvalidArguments {
                    name: name.to_string(),
                    expected: format!("at most {}", ARGUMENT_REGISTERS.len()),
                    found: args.len(),
                }
                .into());
            }
        }
        self.code.push(Instruction::BranchLink(name.to_string()));
        Ok(())
    }

    fn emit_builtin(
        &mut self,
        builtin: BuiltinFunction,
        args: &[Expression],
    ) -> CompileResult<Option<ValueKind>> {
        let invalid = |expected: &str| -> CompileError {
            CodegenError::InvalidArguments {
                name: builtin.name().to_string(),
                expected: expected.to_string(),
                found: args.len(),
            }
            .into()
        };

        match builtin {
            BuiltinFunction::Print | BuiltinFunction::Println => {
                let newline = builtin == BuiltinFunction::Println;
                match args {
                    [] if newline => self.emit_newline(),
                    [] => {}
                    [arg] => {
                        let kind = self.emit_value(arg, Register::R0)?;
                        self.emit_print(kind, newline)?;
                    }
                    _ => return Err(invalid("at most 1")),
                }
                Ok(None)
            }
            BuiltinFunction::Rand => {
                match args {
                    [] => self.code.push(Instruction::MoveImmediate {
                        dst: Register::R0,
                        value: 2,
                    }),
                    [high] => {
                        self.emit_value(high, Register::R0)?;
                        self.code.push(Instruction::AddImmediate {
                            dst: Register::R0,
                            src: Register::R0,
                            value: 1,
                        });
                    }
                    [low, high] => {
                        // low + random(high - low + 1); the runtime's bound is exclusive.
                        self.emit_value(low, Register::R1)?;
                        self.emit_protected(Register::R1, high, Register::R2)?;
                        self.code.extend([
                            Instruction::Sub {
                                dst: Register::R0,
                                lhs: Register::R2,
                                rhs: Register::R1,
                            },
                            Instruction::AddImmediate {
                                dst: Register::R0,
                                src: Register::R0,
                                value: 1,
                            },
                            Instruction::Push(vec![Register::R1]),
                            Instruction::BranchLink(symbols::RAND.to_string()),
                            Instruction::Pop(vec![Register::R1]),
                            Instruction::Add {
                                dst: Register::R0,
                                lhs: Register::R0,
                                rhs: Register::R1,
                            },
                        ]);
                        return Ok(Some(ValueKind::Number));
                    }
                    _ => return Err(invalid("at most 2")),
                }
                self.code
                    .push(Instruction::BranchLink(symbols::RAND.to_string()));
                Ok(Some(ValueKind::Number))
            }
            BuiltinFunction::Time | BuiltinFunction::TimeMs => {
                if !args.is_empty() {
                    return Err(invalid("0"));
                }
                let symbol = if builtin == BuiltinFunction::Time {
                    symbols::TIME
                } else {
                    symbols::TIME_MS
                };
                self.code.push(Instruction::BranchLink(symbol.to_string()));
                Ok(Some(ValueKind::Number))
            }
        }
    }

    /// Prints the value in r0 according to its kind.
    fn emit_print(&mut self, kind: ValueKind, newline: bool) -> CompileResult<()> {
        let text_symbol = if newline {
            symbols::PRINTLN_STR
        } else {
            symbols::PRINT_STR
        };
        match kind {
            ValueKind::Number => {
                let symbol = if newline {
                    symbols::PRINTLN_INTEGER
                } else {
                    symbols::PRINT_INTEGER
                };
                self.code.push(Instruction::BranchLink(symbol.to_string()));
            }
            ValueKind::Text => {
                self.code
                    .push(Instruction::BranchLink(text_symbol.to_string()));
            }
            ValueKind::Char => {
                self.code.push(Instruction::BranchLink(
                    symbols::PRINT_INT_AS_CHAR.to_string(),
                ));
                if newline {
                    self.emit_newline();
                }
            }
            ValueKind::Bool => {
                let false_label = self.labels.fresh("bool_false");
                let end_label = self.labels.fresh("bool_end");
                let true_text = self.statics.literal("true");
                let false_text = self.statics.literal("false");
                self.code.extend([
                    Instruction::CompareImmediate {
                        lhs: Register::R0,
                        value: 0,
                    },
                    Instruction::branch_if(Condition::Eq, false_label.clone()),
                    Instruction::LoadAddress {
                        dst: Register::R0,
                        label: true_text,
                    },
                    Instruction::branch(end_label.clone()),
                    Instruction::Label(false_label),
                    Instruction::LoadAddress {
                        dst: Register::R0,
                        label: false_text,
                    },
                    Instruction::Label(end_label),
                    Instruction::BranchLink(text_symbol.to_string()),
                ]);
            }
            ValueKind::Array => return Err(CodegenError::unsupported("printing an array").into()),
        }
        Ok(())
    }

    fn emit_newline(&mut self) {
        let label = self.statics.literal("");
        self.code.push(Instruction::LoadAddress {
            dst: Register::R0,
            label,
        });
        self.code
            .push(Instruction::BranchLink(symbols::PRINTLN_STR.to_string()));
    }

    fn store_word(&mut self, src: Register, label: &str) {
        let base = if src == Register::R2 {
            Register::R3
        } else {
            Register::R2
        };
        self.code.push(Instruction::LoadAddress {
            dst: base,
            label: label.to_string(),
        });
        self.code.push(Instruction::StoreWord {
            src,
            base,
            offset: None,
        });
    }

    fn load_immediate(&mut self, dst: Register, value: i32) {
        let instruction = match u8::try_from(value) {
            Ok(value) => Instruction::MoveImmediate { dst, value },
            Err(_) => Instruction::LoadConstant { dst, value },
        };
        self.code.push(instruction);
    }
}

fn small_immediate(expr: &Expression) -> Option<u8> {
    match expr {
        Expression::Literal(Literal::Number(value)) => u8::try_from(*value).ok(),
        _ => None,
    }
}

/// Character code of a one-character string literal.
fn char_code(expr: &Expression) -> Option<i32> {
    let Expression::Literal(Literal::String(text)) = expr else {
        return None;
    };
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Some(ch as i32),
        _ => None,
    }
}

fn normalize_index(index: i32, len: usize) -> Result<i32, CodegenError> {
    let out_of_bounds = || CodegenError::IndexOutOfBounds { index, len };
    let len = i32::try_from(len).map_err(|_| out_of_bounds())?;
    let resolved = if index < 0 { len + index } else { index };
    if (0..len).contains(&resolved) {
        Ok(resolved)
    } else {
        Err(out_of_bounds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_literal_indices() {
        assert_eq!(normalize_index(-1, 4), Ok(3));
        assert_eq!(normalize_index(2, 4), Ok(2));
        assert_eq!(
            normalize_index(4, 4),
            Err(CodegenError::IndexOutOfBounds { index: 4, len: 4 })
        );
        assert_eq!(
            normalize_index(-5, 4),
            Err(CodegenError::IndexOutOfBounds { index: -5, len: 4 })
        );
    }

    #[test]
    fn recognizes_single_character_literals() {
        assert_eq!(char_code(&Expression::string("H")), Some(72));
        assert_eq!(char_code(&Expression::string("Hi")), None);
        assert_eq!(char_code(&Expression::number(1)), None);
    }

    #[test]
    fn only_small_literals_are_immediates() {
        assert_eq!(small_immediate(&Expression::number(255)), Some(255));
        assert_eq!(small_immediate(&Expression::number(256)), None);
        assert_eq!(small_immediate(&Expression::number(-1)), None);
    }

    #[test]
    fn static_literals_are_baked_into_data() {
        let mut statics = StaticTable::new();
        let declaration = VariableDeclaration {
            name: "greeting".to_string(),
            ty: None,
            is_static: true,
            value: Some(Expression::string("hi")),
        };
        assert_eq!(
            declare_static(&mut statics, &declaration).expect("declare failed"),
            None
        );
        let symbol = statics.lookup("greeting").expect("symbol should exist");
        assert_eq!(symbol.kind, ValueKind::Text);
        assert_eq!(symbol.data, StaticData::Text("hi".to_string()));
    }

    #[test]
    fn static_expressions_are_deferred() {
        let mut statics = StaticTable::new();
        let value = Expression::binary(
            Expression::number(2),
            BinaryOperator::Mul,
            Expression::number(3),
        );
        let declaration = VariableDeclaration {
            name: "limit".to_string(),
            ty: Some(Type::Number),
            is_static: true,
            value: Some(value.clone()),
        };
        let deferred = declare_static(&mut statics, &declaration).expect("declare failed");
        assert_eq!(deferred, Some(("static_limit".to_string(), &value)));
    }
}
