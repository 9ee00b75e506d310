use std::fmt;

use crate::ast::BinaryOperator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    Lr,
    Pc,
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Register::R0 => "r0",
            Register::R1 => "r1",
            Register::R2 => "r2",
            Register::R3 => "r3",
            Register::R4 => "r4",
            Register::R5 => "r5",
            Register::R6 => "r6",
            Register::R7 => "r7",
            Register::Lr => "lr",
            Register::Pc => "pc",
        };
        f.write_str(name)
    }
}

/// Condition codes for the comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl Condition {
    pub fn from_operator(op: BinaryOperator) -> Option<Self> {
        match op {
            BinaryOperator::Equal => Some(Condition::Eq),
            BinaryOperator::NotEqual => Some(Condition::Ne),
            BinaryOperator::Greater => Some(Condition::Gt),
            BinaryOperator::Less => Some(Condition::Lt),
            BinaryOperator::GreaterEqual => Some(Condition::Ge),
            BinaryOperator::LessEqual => Some(Condition::Le),
            BinaryOperator::Add
            | BinaryOperator::Sub
            | BinaryOperator::Mul
            | BinaryOperator::Mod => None,
        }
    }

    /// The condition that holds exactly when `self` does not.
    pub fn inverse(self) -> Self {
        match self {
            Condition::Eq => Condition::Ne,
            Condition::Ne => Condition::Eq,
            Condition::Gt => Condition::Le,
            Condition::Lt => Condition::Ge,
            Condition::Ge => Condition::Lt,
            Condition::Le => Condition::Gt,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Condition::Eq => "eq",
            Condition::Ne => "ne",
            Condition::Gt => "gt",
            Condition::Lt => "lt",
            Condition::Ge => "ge",
            Condition::Le => "le",
        }
    }
}

/// One line of Thumb assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Label(String),
    Comment(String),
    /// `movs dst, #value`
    MoveImmediate { dst: Register, value: u8 },
    /// `ldr dst, =value`
    LoadConstant { dst: Register, value: i32 },
    /// `ldr dst, =label`
    LoadAddress { dst: Register, label: String },
    Move { dst: Register, src: Register },
    LoadWord {
        dst: Register,
        base: Register,
        offset: Option<Register>,
    },
    LoadByte {
        dst: Register,
        base: Register,
        offset: Option<Register>,
    },
    StoreWord {
        src: Register,
        base: Register,
        offset: Option<Register>,
    },
    Add {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    AddImmediate {
        dst: Register,
        src: Register,
        value: u8,
    },
    Sub {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    /// `muls dst, src, dst`; the destination must double as an operand.
    Multiply { dst: Register, src: Register },
    ShiftLeft {
        dst: Register,
        src: Register,
        amount: u8,
    },
    Compare { lhs: Register, rhs: Register },
    CompareImmediate { lhs: Register, value: u8 },
    Branch {
        condition: Option<Condition>,
        label: String,
    },
    BranchLink(String),
    Push(Vec<Register>),
    Pop(Vec<Register>),
    /// Stands in for the function's `pop` until its saved registers are known.
    Epilogue,
    LiteralPool,
}

impl Instruction {
    pub fn branch(label: impl Into<String>) -> Self {
        Instruction::Branch {
            condition: None,
            label: label.into(),
        }
    }

    pub fn branch_if(condition: Condition, label: impl Into<String>) -> Self {
        Instruction::Branch {
            condition: Some(condition),
            label: label.into(),
        }
    }

    /// Encoded size in bytes; directives take none.
    pub fn size(&self) -> usize {
        match self {
            Instruction::Label(_) | Instruction::Comment(_) | Instruction::LiteralPool => 0,
            Instruction::BranchLink(_) => 4,
            _ => 2,
        }
    }
}

fn address(base: Register, offset: Option<Register>) -> String {
    match offset {
        Some(offset) => format!("[{base}, {offset}]"),
        None => format!("[{base}]"),
    }
}

fn register_list(registers: &[Register]) -> String {
    registers
        .iter()
        .map(Register::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Label(label) => write!(f, "{label}:"),
            Instruction::Comment(text) => write!(f, "  @ {text}"),
            Instruction::MoveImmediate { dst, value } => write!(f, "  movs {dst}, #{value}"),
            Instruction::LoadConstant { dst, value } => write!(f, "  ldr {dst}, ={value}"),
            Instruction::LoadAddress { dst, label } => write!(f, "  ldr {dst}, ={label}"),
            Instruction::Move { dst, src } => write!(f, "  mov {dst}, {src}"),
            Instruction::LoadWord { dst, base, offset } => {
                write!(f, "  ldr {dst}, {}", address(*base, *offset))
            }
            Instruction::LoadByte { dst, base, offset } => {
                write!(f, "  ldrb {dst}, {}", address(*base, *offset))
            }
            Instruction::StoreWord { src, base, offset } => {
                write!(f, "  str {src}, {}", address(*base, *offset))
            }
            Instruction::Add { dst, lhs, rhs } => write!(f, "  adds {dst}, {lhs}, {rhs}"),
            Instruction::AddImmediate { dst, src, value } => {
                write!(f, "  adds {dst}, {src}, #{value}")
            }
            Instruction::Sub { dst, lhs, rhs } => write!(f, "  subs {dst}, {lhs}, {rhs}"),
            Instruction::Multiply { dst, src } => write!(f, "  muls {dst}, {src}, {dst}"),
            Instruction::ShiftLeft { dst, src, amount } => {
                write!(f, "  lsls {dst}, {src}, #{amount}")
            }
            Instruction::Compare { lhs, rhs } => write!(f, "  cmp {lhs}, {rhs}"),
            Instruction::CompareImmediate { lhs, value } => write!(f, "  cmp {lhs}, #{value}"),
            Instruction::Branch { condition, label } => match condition {
                Some(condition) => write!(f, "  b{} {label}", condition.suffix()),
                None => write!(f, "  b {label}"),
            },
            Instruction::BranchLink(label) => write!(f, "  bl {label}"),
            Instruction::Push(registers) => write!(f, "  push {{{}}}", register_list(registers)),
            Instruction::Pop(registers) => write!(f, "  pop {{{}}}", register_list(registers)),
            Instruction::Epilogue => f.write_str("  @ epilogue"),
            Instruction::LiteralPool => f.write_str("  .ltorg"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_conditions_round_trip() {
        for condition in [
            Condition::Eq,
            Condition::Ne,
            Condition::Gt,
            Condition::Lt,
            Condition::Ge,
            Condition::Le,
        ] {
            assert_ne!(condition.inverse(), condition);
            assert_eq!(condition.inverse().inverse(), condition);
        }
        assert_eq!(Condition::Gt.inverse(), Condition::Le);
    }

    #[test]
    fn renders_thumb_syntax() {
        let rendered = [
            Instruction::Label("loop".to_string()),
            Instruction::MoveImmediate {
                dst: Register::R1,
                value: 255,
            },
            Instruction::LoadConstant {
                dst: Register::R2,
                value: -1,
            },
            Instruction::Multiply {
                dst: Register::R1,
                src: Register::R2,
            },
            Instruction::LoadByte {
                dst: Register::R0,
                base: Register::R3,
                offset: Some(Register::R0),
            },
            Instruction::StoreWord {
                src: Register::R1,
                base: Register::R2,
                offset: None,
            },
            Instruction::branch_if(Condition::Ne, "loop"),
            Instruction::Push(vec![Register::R4, Register::Lr]),
        ]
        .iter()
        .map(Instruction::to_string)
        .collect::<Vec<_>>();

        assert_eq!(
            rendered,
            vec![
                "loop:",
                "  movs r1, #255",
                "  ldr r2, =-1",
                "  muls r1, r2, r1",
                "  ldrb r0, [r3, r0]",
                "  str r1, [r2]",
                "  bne loop",
                "  push {r4, lr}",
            ]
        );
    }

    #[test]
    fn directives_take_no_space() {
        assert_eq!(Instruction::Label("loop".to_string()).size(), 0);
        assert_eq!(Instruction::LiteralPool.size(), 0);
        assert_eq!(Instruction::branch_if(Condition::Eq, "loop").size(), 2);
        assert_eq!(Instruction::BranchLink("print_str".to_string()).size(), 4);
    }
}
