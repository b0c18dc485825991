//! Emulation traps and the policy for handling them.

use std::fmt;

/// Raised when the dispatcher reaches a slot that is not valid translated
/// code: either the guest byte there has never been emitted, or it names
/// an opcode the translator doesn't cover (BRK, and anything with no
/// per-opcode emitter yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trap {
    /// Guest PC the dispatcher was about to enter.
    pub pc: u16,
    /// The opcode byte found there.
    pub opcode: u8,
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid translation at PC={:#06x} (opcode {:#04x})",
            self.pc, self.opcode
        )
    }
}

impl std::error::Error for Trap {}

/// What the dispatcher does when it hits a [`Trap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrapPolicy {
    /// Hand the architectural state to the reference interpreter for one
    /// step, then resume looking for a JIT-able run. This is the default:
    /// the translator only covers a representative opcode subset, and
    /// trap-and-interpret is how the rest of the instruction set keeps
    /// working without every opcode needing a host emitter.
    #[default]
    FallBackToInterp,
    /// Treat any trap as fatal. Useful for translation-coverage tests that
    /// want to assert a given run never leaves the JIT.
    Abort,
}
