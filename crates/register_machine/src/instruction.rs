use core::fmt;

use serde::{Deserialize, Serialize};
use variant_count::VariantCount;

use crate::{ProgramCounter, Register, RegisterIndex};

/// One machine operation and its operands.
///
/// `Move` and `MoveImmediate` address the register file absolutely, every
/// other register operand is relative to the executing frame's window.
/// `Call::destination_register` is relative to the caller's window.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Instruction {
    Return,
    Call {
        target_pc: ProgramCounter,
        frame_size: usize,
        destination_register: RegisterIndex,
    },
    Move {
        destination_register: RegisterIndex,
        source_register: RegisterIndex,
    },
    MoveImmediate {
        destination_register: RegisterIndex,
        value: Register,
    },
    Add {
        destination_register: RegisterIndex,
        source_register: RegisterIndex,
    },
    AddImmediate {
        destination_register: RegisterIndex,
        value: Register,
    },
    Increment {
        register: RegisterIndex,
    },
    Decrement {
        register: RegisterIndex,
    },
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Return => Opcode::Return,
            Self::Call { .. } => Opcode::Call,
            Self::Move { .. } => Opcode::Move,
            Self::MoveImmediate { .. } => Opcode::MoveImmediate,
            Self::Add { .. } => Opcode::Add,
            Self::AddImmediate { .. } => Opcode::AddImmediate,
            Self::Increment { .. } => Opcode::Increment,
            Self::Decrement { .. } => Opcode::Decrement,
        }
    }
}

/// Absolute operands print as `%n`, frame-relative ones as `rn`.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.opcode().mnemonic();
        match *self {
            Self::Return => write!(f, "{mnemonic}"),
            Self::Call {
                target_pc,
                frame_size,
                destination_register,
            } => write!(
                f,
                "{mnemonic} @{target_pc} frame {frame_size} -> r{destination_register}"
            ),
            Self::Move {
                destination_register,
                source_register,
            } => write!(f, "{mnemonic} %{destination_register}, %{source_register}"),
            Self::MoveImmediate {
                destination_register,
                value,
            } => write!(f, "{mnemonic} %{destination_register}, #{value}"),
            Self::Add {
                destination_register,
                source_register,
            } => write!(f, "{mnemonic} r{destination_register}, r{source_register}"),
            Self::AddImmediate {
                destination_register,
                value,
            } => write!(f, "{mnemonic} r{destination_register}, #{value}"),
            Self::Increment { register } | Self::Decrement { register } => {
                write!(f, "{mnemonic} r{register}")
            }
        }
    }
}

/// The operation kind of an [`Instruction`] without its operands.
#[repr(u8)]
#[derive(VariantCount, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Opcode {
    Return,
    Call,
    Move,
    MoveImmediate,
    Add,
    AddImmediate,
    Increment,
    Decrement,
}

impl Opcode {
    pub const ALL: [Opcode; Opcode::VARIANT_COUNT] = [
        Opcode::Return,
        Opcode::Call,
        Opcode::Move,
        Opcode::MoveImmediate,
        Opcode::Add,
        Opcode::AddImmediate,
        Opcode::Increment,
        Opcode::Decrement,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Return => "ret",
            Opcode::Call => "call",
            Opcode::Move => "mov",
            Opcode::MoveImmediate => "movi",
            Opcode::Add => "add",
            Opcode::AddImmediate => "addi",
            Opcode::Increment => "inc",
            Opcode::Decrement => "dec",
        }
    }

    /// Dense index in `0..Opcode::VARIANT_COUNT`.
    pub fn index(self) -> usize {
        self as usize
    }
}
