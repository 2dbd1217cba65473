use alloc::vec::Vec;

use crate::config::MachineConfig;
use crate::{MachineError, Register, RegisterIndex};

/// A frame's range of the register file, stored as offsets.
///
/// Windows never borrow the file, so they stay valid when the file grows and
/// its storage moves. Slices are re-derived from the file on every access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Window {
    base: usize,
    len: usize,
}

impl Window {
    pub fn new(base: usize, len: usize) -> Self {
        Self { base, len }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last register of the window.
    pub fn end(&self) -> usize {
        self.base + self.len
    }

    /// Resolve a frame-relative index to an offset in the register file.
    ///
    /// # Panics
    ///
    /// Panics if `index` falls outside the window.
    pub fn absolute(&self, index: RegisterIndex) -> usize {
        assert!(
            index < self.len,
            "register r{index} is outside a window of {} registers",
            self.len
        );
        self.base + index
    }
}

/// The register words shared by every frame.
///
/// Registers `0..in_use` belong to live frames; windows are handed out and
/// taken back in stack order. Capacity only ever grows, in multiples of the
/// configured increment, and new registers read as zero.
#[derive(Debug)]
pub struct RegisterFile {
    words: Vec<Register>,
    in_use: usize,
    growth_increment: usize,
    max_registers: Option<usize>,
}

impl RegisterFile {
    pub fn new(config: &MachineConfig) -> Result<Self, MachineError> {
        let mut file = Self {
            words: Vec::new(),
            in_use: 0,
            growth_increment: config.growth_increment.max(1),
            max_registers: config.max_registers,
        };
        file.resize(config.initial_registers)?;
        Ok(file)
    }

    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    pub fn as_slice(&self) -> &[Register] {
        &self.words
    }

    /// Hand out the next `len` registers above everything in use, growing
    /// the file first when they do not fit.
    pub fn allocate(&mut self, len: usize) -> Result<Window, MachineError> {
        let required = self
            .in_use
            .checked_add(len)
            .ok_or(MachineError::RegisterFileExhausted {
                requested: usize::MAX,
            })?;
        if required > self.capacity() {
            self.grow_to(required)?;
        }
        let window = Window::new(self.in_use, len);
        self.in_use = required;
        Ok(window)
    }

    /// Give back the topmost window.
    pub fn release(&mut self, window: Window) {
        debug_assert_eq!(
            window.end(),
            self.in_use,
            "register windows must be released in stack order"
        );
        self.in_use = window.base();
    }

    /// Drop every window at once. Register contents are left as they are.
    pub fn release_all(&mut self) {
        self.in_use = 0;
    }

    /// # Panics
    ///
    /// Panics if `index` is not below the capacity.
    pub fn get(&self, index: usize) -> Register {
        self.check(index);
        self.words[index]
    }

    /// # Panics
    ///
    /// Panics if `index` is not below the capacity.
    pub fn set(&mut self, index: usize, value: Register) {
        self.check(index);
        self.words[index] = value;
    }

    /// Replace the register at `index` with `f` applied to it.
    pub fn update(&mut self, index: usize, f: impl FnOnce(Register) -> Register) {
        self.check(index);
        let slot = &mut self.words[index];
        *slot = f(*slot);
    }

    fn check(&self, index: usize) {
        assert!(
            index < self.words.len(),
            "register %{index} is outside a register file of {} registers",
            self.words.len()
        );
    }

    fn grow_to(&mut self, required: usize) -> Result<(), MachineError> {
        let capacity = self.capacity();
        let steps = (required - capacity).div_ceil(self.growth_increment);
        let mut target = steps
            .checked_mul(self.growth_increment)
            .and_then(|extra| capacity.checked_add(extra))
            .unwrap_or(required);
        if let Some(limit) = self.max_registers {
            if required > limit {
                return Err(MachineError::RegisterFileExhausted {
                    requested: required,
                });
            }
            target = target.min(limit);
        }
        self.resize(target)?;
        debug!("register file grew from {} to {} registers", capacity, target);
        Ok(())
    }

    fn resize(&mut self, target: usize) -> Result<(), MachineError> {
        if self.max_registers.is_some_and(|limit| target > limit) {
            return Err(MachineError::RegisterFileExhausted { requested: target });
        }
        let additional = target.saturating_sub(self.words.len());
        self.words
            .try_reserve_exact(additional)
            .map_err(|_| MachineError::RegisterFileExhausted { requested: target })?;
        self.words.resize(target, 0);
        Ok(())
    }
}
