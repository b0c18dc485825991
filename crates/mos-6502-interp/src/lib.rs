//! Cycle-stepped interpreter for the NMOS 6502.
//!
//! This is the reference execution engine: every opcode, including the
//! documented illegal instructions, executes one bus cycle at a time via
//! [`Cpu::tick`]. `mos-6502-jit` translates straight-line runs of this same
//! instruction set to host code and falls back here — via [`Registers`] and
//! [`Status`] — whenever it hits something not worth translating.

mod cpu;
mod flags;
mod registers;

pub use cpu::Mos6502;
pub use flags::{Status, B, C, D, I, N, U, V, Z};
pub use registers::Registers;
