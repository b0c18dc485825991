//! The host-resident state block translated code runs against.
//!
//! `dispatcher` pins a pointer to one of these in `rbx` for the whole
//! translated run; `translator` emits loads/stores at the fixed offsets
//! below. Everything else the 6502 architecture needs — A, X, Y, S, and
//! the split flag bits — lives directly in host registers for the
//! duration of a run (see the register convention documented in
//! `dispatcher`), so this struct only holds what has to survive a call
//! into the dispatcher: the guest address space pointer, the cycle
//! countdown, and the reason the last run exited.
#[repr(C)]
#[derive(Debug)]
pub struct HostState {
    /// Pointer to the 64 KiB flat guest address space.
    pub mem: *mut u8,
    /// Cycles remaining before the next mandatory exit to the dispatcher.
    pub countdown: i64,
    /// Why translated code last returned; see [`ExitReason`].
    pub exit_reason: u8,
    /// Set by the owning thread to force an exit at the next boundary.
    pub stop_flag: u8,
    /// Guest PC to enter at, or (on `ExitReason::TRAP`/`RETURN` exit) the PC
    /// translated code stopped at / should resume at.
    pub trap_pc: u16,
    /// Opcode byte found at `trap_pc`, valid when `exit_reason == ExitReason::TRAP`.
    pub trap_opcode: u8,
    /// Accumulator, reloaded into `r12b` by the entry trampoline and saved
    /// back by the exit stub.
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub s: u8,
    pub carry: u8,
    pub zero: u8,
    pub negative: u8,
    /// I/D/V/B/U bits, packed in their native 6502 `P` bit positions.
    pub other_p: u8,
}

/// `exit_reason` values written by translated code before returning control
/// to the dispatcher.
pub struct ExitReason;

impl ExitReason {
    pub const COUNTDOWN: u8 = 0;
    pub const STOP_FLAG: u8 = 1;
    pub const TRAP: u8 = 2;
    /// An indirect control transfer (RTS) resolved its target at runtime;
    /// `trap_pc` holds the guest PC to resume at, not a trapped opcode.
    pub const RETURN: u8 = 3;
}

/// Byte offsets of each [`HostState`] field, for the encoder to address
/// through the pinned `rbx` pointer. Kept in sync with the struct layout
/// by the `layout_matches_offsets` test below.
pub mod offset {
    pub const MEM: i8 = 0;
    pub const COUNTDOWN: i8 = 8;
    pub const EXIT_REASON: i8 = 16;
    pub const STOP_FLAG: i8 = 17;
    pub const TRAP_PC: i8 = 18;
    pub const TRAP_OPCODE: i8 = 20;
    pub const A: i8 = 21;
    pub const X: i8 = 22;
    pub const Y: i8 = 23;
    pub const S: i8 = 24;
    pub const CARRY: i8 = 25;
    pub const ZERO: i8 = 26;
    pub const NEGATIVE: i8 = 27;
    pub const OTHER_P: i8 = 28;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_offsets() {
        let s = HostState {
            mem: std::ptr::null_mut(),
            countdown: 0,
            exit_reason: 0,
            stop_flag: 0,
            trap_pc: 0,
            trap_opcode: 0,
            a: 0,
            x: 0,
            y: 0,
            s: 0,
            carry: 0,
            zero: 0,
            negative: 0,
            other_p: 0,
        };
        let base = std::ptr::addr_of!(s) as usize;
        assert_eq!(std::ptr::addr_of!(s.mem) as usize - base, offset::MEM as usize);
        assert_eq!(std::ptr::addr_of!(s.countdown) as usize - base, offset::COUNTDOWN as usize);
        assert_eq!(std::ptr::addr_of!(s.exit_reason) as usize - base, offset::EXIT_REASON as usize);
        assert_eq!(std::ptr::addr_of!(s.stop_flag) as usize - base, offset::STOP_FLAG as usize);
        assert_eq!(std::ptr::addr_of!(s.trap_pc) as usize - base, offset::TRAP_PC as usize);
        assert_eq!(std::ptr::addr_of!(s.trap_opcode) as usize - base, offset::TRAP_OPCODE as usize);
        assert_eq!(std::ptr::addr_of!(s.a) as usize - base, offset::A as usize);
        assert_eq!(std::ptr::addr_of!(s.x) as usize - base, offset::X as usize);
        assert_eq!(std::ptr::addr_of!(s.y) as usize - base, offset::Y as usize);
        assert_eq!(std::ptr::addr_of!(s.s) as usize - base, offset::S as usize);
        assert_eq!(std::ptr::addr_of!(s.carry) as usize - base, offset::CARRY as usize);
        assert_eq!(std::ptr::addr_of!(s.zero) as usize - base, offset::ZERO as usize);
        assert_eq!(std::ptr::addr_of!(s.negative) as usize - base, offset::NEGATIVE as usize);
        assert_eq!(std::ptr::addr_of!(s.other_p) as usize - base, offset::OTHER_P as usize);
    }
}
