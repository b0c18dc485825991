//! Machine configuration.
//!
//! Grounded on the teacher's `RunnerConfig`/`VideoConfig` pattern: a plain
//! struct of fields built up by the CLI stub and handed to [`crate::BbcMicro::new`],
//! rather than a builder or a config file format.

use crate::error::ConfigError;

/// How the emulation thread drives the 6502.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Dynamic binary translation, falling back to the interpreter on trap.
    #[default]
    Jit,
    /// The reference interpreter only, no translation.
    Interp,
}

/// Cycle-accounting granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accuracy {
    /// Exit to the dispatcher after every translated instruction.
    #[default]
    Accurate,
    /// Exit only when the countdown underflows a whole block.
    Fast,
}

/// One ROM image to load at a fixed bank address.
#[derive(Debug, Clone)]
pub struct RomBank {
    pub path: String,
    pub load_address: u16,
}

/// Batch-mode stop condition: run until the CPU reaches a PC or a total
/// cycle count, then exit with the run result.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopCondition {
    pub pc: Option<u16>,
    pub cycles: Option<u64>,
}

/// Full configuration for a [`crate::BbcMicro`] instance.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub rom_banks: Vec<RomBank>,
    pub mode: ExecutionMode,
    pub accuracy: Accuracy,
    /// JIT code cache slot width in bytes; must be a power of two.
    pub slot_width: usize,
    /// No UI thread is spawned; the emulation thread runs standalone and
    /// acknowledges its own VSYNC requests.
    pub headless: bool,
    pub stop: StopCondition,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            rom_banks: Vec::new(),
            mode: ExecutionMode::default(),
            accuracy: Accuracy::default(),
            slot_width: mos_6502_jit::DEFAULT_SLOT_WIDTH,
            headless: true,
            stop: StopCondition::default(),
        }
    }
}

impl MachineConfig {
    /// Validate the parts of the configuration that aren't already
    /// type-enforced (slot width, ROM bank placement).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.slot_width.is_power_of_two() {
            return Err(ConfigError::SlotWidthNotPowerOfTwo(self.slot_width));
        }
        for bank in &self.rom_banks {
            if usize::from(bank.load_address) + 0x4000 > 0x1_0000 {
                return Err(ConfigError::RomBankOutOfRange {
                    load_address: bank.load_address,
                    len: 0x4000,
                });
            }
        }
        Ok(())
    }
}
