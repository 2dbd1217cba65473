use serde::{Deserialize, Serialize};

pub const DEFAULT_REGISTER_CAPACITY: usize = 256;
pub const DEFAULT_GROWTH_INCREMENT: usize = 256;

/// Sizing and limits for a [`Machine`](crate::Machine).
///
/// Missing fields deserialize to their defaults, so a host can keep only
/// the settings it cares about in its own configuration file.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct MachineConfig {
    /// Register file capacity allocated up front.
    pub initial_registers: usize,
    /// Fixed step the register file grows by. Growth rounds up to a multiple.
    pub growth_increment: usize,
    /// Capacity the register file may never grow past.
    pub max_registers: Option<usize>,
    /// Number of frames that may be live at once, root included.
    pub max_frames: Option<usize>,
}

impl MachineConfig {
    pub fn new() -> Self {
        Self {
            initial_registers: DEFAULT_REGISTER_CAPACITY,
            growth_increment: DEFAULT_GROWTH_INCREMENT,
            max_registers: None,
            max_frames: None,
        }
    }

    pub fn with_initial_registers(mut self, initial_registers: usize) -> Self {
        self.initial_registers = initial_registers;
        self
    }

    /// # Panics
    ///
    /// Panics if `growth_increment` is zero.
    pub fn with_growth_increment(mut self, growth_increment: usize) -> Self {
        assert!(growth_increment > 0, "register growth increment must be positive");
        self.growth_increment = growth_increment;
        self
    }

    pub fn with_max_registers(mut self, max_registers: usize) -> Self {
        self.max_registers = Some(max_registers);
        self
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = Some(max_frames);
        self
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self::new()
    }
}
