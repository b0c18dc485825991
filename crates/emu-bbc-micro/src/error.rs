//! Error types for machine boot and configuration.
//!
//! Plain hand-rolled enums, matching the rest of the workspace's avoidance
//! of `thiserror`/`anyhow` — nothing else here reaches for an error-derive
//! crate, so this doesn't either.

use std::fmt;

/// Fatal error raised while loading ROM images into a fresh machine.
#[derive(Debug)]
pub enum BootError {
    /// A requested ROM bank file could not be read from disk.
    RomMissing { path: String },
    /// A ROM bank's contents were shorter than the slot it was loaded into.
    RomTooShort { path: String, expected: usize, actual: usize },
    /// The dynamic translator's code cache or trampoline could not be
    /// mapped (e.g. `mmap` failed).
    CodeCache(mos_6502_jit::CacheError),
    /// The supplied `MachineConfig` failed validation.
    Config(ConfigError),
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::RomMissing { path } => write!(f, "ROM image not found: {path}"),
            BootError::RomTooShort { path, expected, actual } => write!(
                f,
                "ROM image {path} is too short: expected {expected} bytes, got {actual}"
            ),
            BootError::CodeCache(e) => write!(f, "failed to map JIT code cache: {e}"),
            BootError::Config(e) => write!(f, "invalid machine configuration: {e}"),
        }
    }
}

impl std::error::Error for BootError {}

impl From<mos_6502_jit::CacheError> for BootError {
    fn from(e: mos_6502_jit::CacheError) -> Self {
        BootError::CodeCache(e)
    }
}

impl From<ConfigError> for BootError {
    fn from(e: ConfigError) -> Self {
        BootError::Config(e)
    }
}

/// Fatal error raised by contradictory or malformed configuration flags.
#[derive(Debug)]
pub enum ConfigError {
    /// The requested JIT slot width was not a power of two.
    SlotWidthNotPowerOfTwo(usize),
    /// A ROM bank load address plus the bank size would wrap past 0xFFFF.
    RomBankOutOfRange { load_address: u16, len: usize },
    /// `--mode interp` and a JIT-only flag were both given.
    ContradictoryMode(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::SlotWidthNotPowerOfTwo(n) => {
                write!(f, "JIT slot width {n} is not a power of two")
            }
            ConfigError::RomBankOutOfRange { load_address, len } => write!(
                f,
                "ROM bank at {load_address:#06x} ({len} bytes) would wrap past 0xFFFF"
            ),
            ConfigError::ContradictoryMode(detail) => write!(f, "contradictory configuration: {detail}"),
        }
    }
}

impl std::error::Error for ConfigError {}
