//! BBC Micro Model B emulator.
//!
//! This crate provides the machine core: ROM banking, the MOS 6502
//! dynamic binary translator with interpreter fallback, the System and
//! User 6522 VIAs, a register-interface-only 6845 CRTC and SN76489 PSG,
//! and the two-thread emulation/UI-stub split described in the
//! configuration and IPC modules. Video rendering, audio synthesis, and
//! disc/tape filesystems are out of scope — this crate emulates the
//! machine's timing and register-level behavior, not its peripherals'
//! analog outputs.

mod config;
mod error;
mod ipc;
mod keyboard;
mod machine;

pub use config::{Accuracy, ExecutionMode, MachineConfig, RomBank, StopCondition};
pub use error::{BootError, ConfigError};
pub use ipc::{spawn_stub_ui, Message, UiHandle};
pub use keyboard::KeyMatrix;
pub use machine::{is_mmio, BbcMicro, RunResult, WheelEvent, MMIO_END, MMIO_START};
