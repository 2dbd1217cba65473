use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::{Instruction, Machine, MachineConfig, MachineError, ProgramCounter, Register};

/// Image layout revision written by [`ProgramImage::to_bytes`].
pub const IMAGE_VERSION: u16 = 1;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImageError {
    #[error("the program image could not be encoded")]
    Encode,
    #[error("the program image is malformed")]
    Malformed,
    #[error("program image version {0} is not supported")]
    UnsupportedVersion(u16),
    #[error("the program image has no instructions")]
    EmptyProgram,
    #[error("the program image has an empty root window")]
    EmptyRootWindow,
    #[error("entry pc {entry_pc} is past the end of a {len} instruction image")]
    EntryOutOfRange { entry_pc: ProgramCounter, len: usize },
}

/// An assembled program together with how to enter it.
///
/// Images travel as COBS framed postcard, so a stream of them can be split
/// on zero bytes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    version: u16,
    entry_pc: ProgramCounter,
    root_window_size: usize,
    instructions: Vec<Instruction>,
}

impl ProgramImage {
    pub fn new(
        instructions: Vec<Instruction>,
        entry_pc: ProgramCounter,
        root_window_size: usize,
    ) -> Self {
        Self {
            version: IMAGE_VERSION,
            entry_pc,
            root_window_size,
            instructions,
        }
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn entry_pc(&self) -> ProgramCounter {
        self.entry_pc
    }

    pub fn root_window_size(&self) -> usize {
        self.root_window_size
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ImageError> {
        postcard::to_allocvec_cobs(self).map_err(|_| ImageError::Encode)
    }

    /// Decode one COBS frame. The buffer is decoded in place.
    ///
    /// Rejects images whose entry point [`Machine::execute`] would panic on.
    pub fn from_bytes(bytes: &mut [u8]) -> Result<Self, ImageError> {
        let image: Self = postcard::from_bytes_cobs(bytes).map_err(|_| ImageError::Malformed)?;
        if image.version != IMAGE_VERSION {
            return Err(ImageError::UnsupportedVersion(image.version));
        }
        image.check_entry()?;
        Ok(image)
    }

    fn check_entry(&self) -> Result<(), ImageError> {
        if self.instructions.is_empty() {
            return Err(ImageError::EmptyProgram);
        }
        if self.root_window_size == 0 {
            return Err(ImageError::EmptyRootWindow);
        }
        if self.entry_pc >= self.instructions.len() {
            return Err(ImageError::EntryOutOfRange {
                entry_pc: self.entry_pc,
                len: self.instructions.len(),
            });
        }
        Ok(())
    }

    /// Execute the image on a fresh machine.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Machine::execute`].
    pub fn run(&self, config: MachineConfig) -> Result<Register, MachineError> {
        let mut machine = Machine::with_config(&self.instructions, config)?;
        machine.execute(self.entry_pc, self.root_window_size)
    }
}
