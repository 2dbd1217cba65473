#![no_std]

#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::todo,
        clippy::unimplemented,
        clippy::string_slice,
        clippy::panicking_unwrap,
        clippy::out_of_bounds_indexing,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
    )
)]
#![cfg_attr(not(test), warn(clippy::missing_panics_doc))]

//! A register based virtual machine.
//!
//! The machine runs a borrowed slice of [`Instruction`]s against one
//! growable register file shared by every call frame. Each frame owns a
//! window of that file. `Move` and `MoveImmediate` address the whole file
//! absolutely, which is how callers pass parameters into a callee window
//! before a `Call`. The arithmetic instructions address the executing
//! frame's window relatively.
//!
//! Programs are trusted. A bad register index, an empty call frame or a pc
//! past the end of the program panics. Running out of room for registers or
//! frames is the only error [`Machine::execute`] reports.

extern crate alloc;
#[cfg(test)]
extern crate std;

mod fmt;

pub mod config;
pub mod frames;
pub mod image;
pub mod instruction;
pub mod registers;
pub mod stats;

use thiserror_no_std::Error;

pub use config::{DEFAULT_GROWTH_INCREMENT, DEFAULT_REGISTER_CAPACITY, MachineConfig};
pub use image::{IMAGE_VERSION, ImageError, ProgramImage};
pub use instruction::{Instruction, Opcode};
pub use stats::ExecutionStats;

use crate::frames::CallStack;
use crate::registers::{RegisterFile, Window};

/// A register word. Registers are as wide as the host pointer.
pub type Register = usize;
/// A register operand as it appears in an [`Instruction`].
pub type RegisterIndex = usize;
/// An index into the instruction slice.
pub type ProgramCounter = usize;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MachineError {
    #[error("the register file cannot grow to {requested} registers")]
    RegisterFileExhausted { requested: usize },
    #[error("the call stack cannot hold more than {depth} frames")]
    CallStackExhausted { depth: usize },
}

pub struct Machine<'p> {
    program: &'p [Instruction],
    registers: RegisterFile,
    frames: CallStack,
    pc: ProgramCounter,
    stats: ExecutionStats,
    poisoned: bool,
}

impl<'p> Machine<'p> {
    /// Build a machine over `program` with `initial_registers` registers
    /// and default growth settings.
    pub fn new(program: &'p [Instruction], initial_registers: usize) -> Result<Self, MachineError> {
        let config = MachineConfig::new().with_initial_registers(initial_registers);
        Self::with_config(program, config)
    }

    pub fn with_config(
        program: &'p [Instruction],
        config: MachineConfig,
    ) -> Result<Self, MachineError> {
        let registers = RegisterFile::new(&config)?;
        Ok(Self {
            program,
            registers,
            frames: CallStack::new(config.max_frames),
            pc: 0,
            stats: ExecutionStats::new(),
            poisoned: false,
        })
    }

    /// Run from `entry_pc` until the root frame returns, giving back the
    /// root frame's register 0.
    ///
    /// The root frame owns registers `0..root_window_size`, and the file is
    /// grown first if it is smaller. When growth fails every live frame is
    /// destroyed before the error is returned, and the machine must not be
    /// used again.
    ///
    /// # Panics
    ///
    /// Panics if the machine already failed, if `root_window_size` is zero,
    /// or if the program is malformed: a register index out of range, a call
    /// with an empty frame, or a pc past the last instruction.
    pub fn execute(
        &mut self,
        entry_pc: ProgramCounter,
        root_window_size: usize,
    ) -> Result<Register, MachineError> {
        assert!(!self.poisoned, "machine reused after a failed execution");
        assert!(root_window_size > 0, "the root frame needs a return register");
        debug_assert_eq!(self.frames.live(), 0);

        self.stats = ExecutionStats::new();
        match self.run(entry_pc, root_window_size) {
            Ok(result) => Ok(result),
            Err(err) => {
                let destroyed = self.frames.unwind();
                self.registers.release_all();
                self.poisoned = true;
                warn!("execution failed at pc {}, {} frames destroyed", self.pc, destroyed);
                Err(err)
            }
        }
    }

    pub fn pc(&self) -> ProgramCounter {
        self.pc
    }

    pub fn capacity(&self) -> usize {
        self.registers.capacity()
    }

    pub fn registers_in_use(&self) -> usize {
        self.registers.in_use()
    }

    pub fn live_frames(&self) -> usize {
        self.frames.live()
    }

    /// Read a register by absolute index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`Machine::capacity`].
    pub fn register(&self, index: RegisterIndex) -> Register {
        self.registers.get(index)
    }

    pub fn registers(&self) -> &[Register] {
        self.registers.as_slice()
    }

    /// Counters for the most recent `execute` call.
    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn run(
        &mut self,
        entry_pc: ProgramCounter,
        root_window_size: usize,
    ) -> Result<Register, MachineError> {
        let window = self.allocate(root_window_size)?;
        self.frames.push_root(window)?;
        self.observe();
        self.pc = entry_pc;
        trace!("execute from pc {} with {} root registers", entry_pc, root_window_size);

        loop {
            let instruction = self.fetch();
            self.stats.count(instruction.opcode());
            let window = self.current_window();

            match instruction {
                Instruction::Move {
                    destination_register,
                    source_register,
                } => {
                    let value = self.registers.get(source_register);
                    self.registers.set(destination_register, value);
                }
                Instruction::MoveImmediate {
                    destination_register,
                    value,
                } => {
                    self.registers.set(destination_register, value);
                }
                Instruction::Add {
                    destination_register,
                    source_register,
                } => {
                    let value = self.registers.get(window.absolute(source_register));
                    self.registers
                        .update(window.absolute(destination_register), |word| {
                            word.wrapping_add(value)
                        });
                }
                Instruction::AddImmediate {
                    destination_register,
                    value,
                } => {
                    self.registers
                        .update(window.absolute(destination_register), |word| {
                            word.wrapping_add(value)
                        });
                }
                Instruction::Increment { register } => {
                    self.registers
                        .update(window.absolute(register), |word| word.wrapping_add(1));
                }
                Instruction::Decrement { register } => {
                    self.registers
                        .update(window.absolute(register), |word| word.wrapping_sub(1));
                }
                Instruction::Call {
                    target_pc,
                    frame_size,
                    destination_register,
                } => {
                    let destination = window.absolute(destination_register);
                    self.call(target_pc, frame_size, destination)?;
                    continue;
                }
                Instruction::Return => match self.ret() {
                    Some(result) => return Ok(result),
                    None => continue,
                },
            }

            self.pc += 1;
        }
    }

    fn fetch(&self) -> Instruction {
        assert!(
            self.pc < self.program.len(),
            "pc {} ran past the end of a {} instruction program",
            self.pc,
            self.program.len()
        );
        self.program[self.pc]
    }

    fn current_window(&self) -> Window {
        match self.frames.current_frame() {
            Some(frame) => frame.window,
            None => unreachable!("dispatch without a live frame"),
        }
    }

    fn call(
        &mut self,
        target_pc: ProgramCounter,
        frame_size: usize,
        destination: usize,
    ) -> Result<(), MachineError> {
        assert!(frame_size > 0, "call at pc {} has an empty frame", self.pc);
        let resume_pc = self.pc + 1;
        let window = self.allocate(frame_size)?;
        self.frames.push_call(window, resume_pc, destination)?;
        self.observe();
        trace!(
            "call {} -> {} with registers {}..{}",
            self.pc,
            target_pc,
            window.base(),
            window.end()
        );
        self.pc = target_pc;
        Ok(())
    }

    /// Pop the current frame. Gives the result when the root returned.
    fn ret(&mut self) -> Option<Register> {
        let Some(frame) = self.frames.pop() else {
            unreachable!("return without a live frame");
        };
        let result = self.registers.get(frame.window.absolute(0));
        self.registers.release(frame.window);
        match frame.link {
            Some(link) => {
                self.registers.set(link.destination, result);
                trace!("return {} to %{} at pc {}", result, link.destination, link.resume_pc);
                self.pc = link.resume_pc;
                None
            }
            None => Some(result),
        }
    }

    fn allocate(&mut self, len: usize) -> Result<Window, MachineError> {
        let capacity = self.registers.capacity();
        let window = self.registers.allocate(len)?;
        if self.registers.capacity() != capacity {
            self.stats.record_growth();
        }
        Ok(window)
    }

    fn observe(&mut self) {
        self.stats
            .observe(self.frames.live(), self.registers.in_use());
    }
}

#[cfg(test)]
mod test;
