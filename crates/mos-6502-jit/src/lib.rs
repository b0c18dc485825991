//! Dynamic binary translator from NMOS 6502 machine code to host x86-64.
//!
//! [`Dispatcher`] owns the [`cache::CodeCache`] and the fixed
//! [`trampoline::Trampoline`] that bridges Rust calls into translated
//! code's pinned-register convention. Anything the translator doesn't
//! cover — including every opcode `mos_6502_interp` treats as
//! "undocumented" — surfaces as a [`trap::Trap`] for the caller to run
//! through the interpreter instead, per [`trap::TrapPolicy`].

pub mod cache;
pub mod dispatcher;
pub mod encoder;
pub mod state;
pub mod trampoline;
pub mod translator;
pub mod trap;

pub use cache::{CacheError, CodeCache, DEFAULT_SLOT_WIDTH};
pub use dispatcher::{Dispatcher, Exit};
pub use trap::{Trap, TrapPolicy};
