use crate::instruction::Opcode;

/// Counters collected over one `execute` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExecutionStats {
    dispatched: [u64; Opcode::VARIANT_COUNT],
    max_depth: usize,
    peak_registers: usize,
    growths: usize,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions of `opcode` dispatched.
    pub fn dispatched(&self, opcode: Opcode) -> u64 {
        self.dispatched.get(opcode.index()).copied().unwrap_or(0)
    }

    /// Every instruction dispatched.
    pub fn total(&self) -> u64 {
        self.dispatched.iter().sum()
    }

    /// Deepest the call stack got, root frame included.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Most registers in use at once.
    pub fn peak_registers(&self) -> usize {
        self.peak_registers
    }

    /// Times the register file had to grow.
    pub fn growths(&self) -> usize {
        self.growths
    }

    pub(crate) fn count(&mut self, opcode: Opcode) {
        if let Some(count) = self.dispatched.get_mut(opcode.index()) {
            *count = count.wrapping_add(1);
        }
    }

    pub(crate) fn observe(&mut self, depth: usize, registers_in_use: usize) {
        self.max_depth = self.max_depth.max(depth);
        self.peak_registers = self.peak_registers.max(registers_in_use);
    }

    pub(crate) fn record_growth(&mut self) {
        self.growths += 1;
    }
}
