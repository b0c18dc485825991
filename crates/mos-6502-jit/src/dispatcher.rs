//! Owns the code cache and the fixed entry/exit trampoline, and arbitrates
//! between translated execution and the reference interpreter.
//!
//! A `Dispatcher` does not own guest memory or the architectural register
//! file — those are supplied by the caller on every call to [`Dispatcher::run_once`]
//! so that `emu-bbc-micro` can interleave JIT runs with timing-wheel
//! advances and MMIO-backed peripheral access without the dispatcher
//! needing to know about either.

use mos_6502_interp::{Registers, Status, C, N, V, Z};

use crate::cache::{CacheError, CodeCache, SlotState};
use crate::encoder::Emitter;
use crate::state::{ExitReason, HostState};
use crate::trampoline::Trampoline;
use crate::translator;
use crate::trap::Trap;

/// Why one `run_once` call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The cycle countdown reached zero; `regs.pc` names where to resume.
    Countdown,
    /// The caller's `stop` flag was observed before entering.
    Stopped,
    /// Hit a guest byte the translator doesn't cover, or one whose
    /// effective address could be MMIO. `regs.pc` still names the
    /// untranslated instruction; the caller is expected to single-step it
    /// through the interpreter and call `run_once` again.
    Trap(Trap),
}

pub struct Dispatcher {
    cache: CodeCache,
    trampoline: Trampoline,
}

impl Dispatcher {
    pub fn new(slot_width: usize) -> Result<Self, CacheError> {
        let cache = CodeCache::new(slot_width)?;
        let cache_base = cache.slot_ptr(0) as u64;
        let trampoline = Trampoline::new(cache_base, slot_width)?;
        Ok(Self { cache, trampoline })
    }

    #[must_use]
    pub fn slot_width(&self) -> usize {
        self.cache.slot_width()
    }

    /// Mark the slot(s) covering a guest write as stale. The caller treats
    /// every RAM write as potentially hitting code, per the design's
    /// conservative invalidation policy.
    pub fn invalidate(&mut self, addr: u16) {
        self.cache.invalidate(addr);
    }

    fn ensure_slot(&mut self, mem: &[u8; 0x1_0000], pc: u16, is_mmio: &impl Fn(u16) -> bool) -> Result<(), Trap> {
        if self.cache.state(pc) == SlotState::Valid {
            return Ok(());
        }
        let mut e = Emitter::new();
        let exit_ptr = self.trampoline.exit_ptr();
        let result = {
            let cache = &self.cache;
            translator::translate_one(&mut e, mem, pc, |t| cache.slot_ptr(t) as u64, exit_ptr, is_mmio)
        };
        match result {
            Ok(_) => {
                log::trace!("translated slot at {:#06x}", pc);
                self.cache.emit(pc, &e.finish());
                Ok(())
            }
            Err(trap) => {
                log::debug!("{trap}, falling back to interpreter");
                self.cache.mark_uninitialized(pc);
                Err(trap)
            }
        }
    }

    /// Run translated code starting at `regs.pc` until the countdown
    /// expires, a trap is hit, or `stop` was already set. `mem` must be a
    /// full 64 KiB guest address space the caller keeps alive and
    /// synchronized with its `Bus` (writes through the bus must also be
    /// reported to [`Dispatcher::invalidate`]).
    ///
    /// Returns the exit reason together with how many 6502 cycles were
    /// actually consumed, so the caller can advance its timing wheel by
    /// exactly that much before computing the next budget — per the
    /// design, `countdown_budget` is meant to be the wheel's own
    /// `next_deadline()`, not an independent clock.
    pub fn run_once(
        &mut self,
        mem: &mut [u8; 0x1_0000],
        regs: &mut Registers,
        countdown_budget: i64,
        stop: bool,
        is_mmio: impl Fn(u16) -> bool,
    ) -> (Exit, i64) {
        if stop {
            return (Exit::Stopped, 0);
        }

        if let Err(trap) = self.ensure_slot(mem, regs.pc, &is_mmio) {
            return (Exit::Trap(trap), 0);
        }

        let p = regs.p.to_byte();
        let mut state = HostState {
            mem: mem.as_mut_ptr(),
            countdown: countdown_budget,
            exit_reason: 0,
            stop_flag: 0,
            trap_pc: regs.pc,
            trap_opcode: 0,
            a: regs.a,
            x: regs.x,
            y: regs.y,
            s: regs.s,
            carry: u8::from(p & C != 0),
            zero: u8::from(p & Z != 0),
            negative: u8::from(p & N != 0),
            other_p: p & !(C | Z | N),
        };

        // SAFETY: `state.mem` covers the full 0x10000-byte guest address
        // space for the lifetime of this call, and `self.cache`/`self.trampoline`
        // are both still mapped.
        unsafe {
            self.trampoline.enter(std::ptr::addr_of_mut!(state));
        }

        regs.a = state.a;
        regs.x = state.x;
        regs.y = state.y;
        regs.s = state.s;
        let mut p = state.other_p;
        if state.carry != 0 {
            p |= C;
        }
        if state.zero != 0 {
            p |= Z;
        }
        if state.negative != 0 {
            p |= N;
        }
        regs.p = Status(p);
        regs.pc = state.trap_pc;

        let consumed = countdown_budget - state.countdown;
        match state.exit_reason {
            ExitReason::COUNTDOWN | ExitReason::RETURN => (Exit::Countdown, consumed),
            _ => unreachable!("translated code only ever exits via COUNTDOWN or RETURN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_mmio(_pc: u16) -> bool {
        false
    }

    #[test]
    fn lda_sta_round_trips_through_guest_memory() {
        let mut dispatcher = Dispatcher::new(256).unwrap();
        let mut mem = [0u8; 0x1_0000];
        // LDA #$42 ; STA $0010
        mem[0x1000] = 0xA9;
        mem[0x1001] = 0x42;
        mem[0x1002] = 0x85;
        mem[0x1003] = 0x10;
        let mut regs = Registers { pc: 0x1000, ..Registers::new() };

        // LDA #$42 costs 2 cycles and falls straight through (countdown
        // only goes to 2, not negative); STA $10 costs 3 more, taking it to
        // -1 and triggering the exit, so this consumes 5 total despite the
        // 4-cycle budget.
        let (exit, consumed) = dispatcher.run_once(&mut mem, &mut regs, 4, false, no_mmio);
        assert_eq!(exit, Exit::Countdown);
        assert_eq!(consumed, 5);
        assert_eq!(regs.a, 0x42);
        assert_eq!(mem[0x0010], 0x42);
        assert_eq!(regs.pc, 0x1004);
    }

    #[test]
    fn unsupported_opcode_surfaces_as_trap_without_advancing_pc() {
        let mut dispatcher = Dispatcher::new(256).unwrap();
        let mut mem = [0u8; 0x1_0000];
        mem[0x2000] = 0x00; // BRK: not translated, always traps
        let mut regs = Registers { pc: 0x2000, ..Registers::new() };

        let (exit, _) = dispatcher.run_once(&mut mem, &mut regs, 100, false, no_mmio);
        assert_eq!(exit, Exit::Trap(Trap { pc: 0x2000, opcode: 0x00 }));
        assert_eq!(regs.pc, 0x2000);
    }

    #[test]
    fn stop_flag_short_circuits_before_entering() {
        let mut dispatcher = Dispatcher::new(256).unwrap();
        let mut mem = [0u8; 0x1_0000];
        let mut regs = Registers::new();
        assert_eq!(dispatcher.run_once(&mut mem, &mut regs, 10, true, no_mmio), (Exit::Stopped, 0));
    }

    #[test]
    fn jsr_then_rts_returns_to_the_instruction_after_the_call() {
        // JSR's emitted code jumps straight into the target slot without
        // returning to Rust in between, and RTS always exits back out to
        // the dispatcher — so a single run_once with enough budget carries
        // the call all the way through the return, landing at $1003 with
        // the stack popped back to its starting depth.
        let mut dispatcher = Dispatcher::new(256).unwrap();
        let mut mem = [0u8; 0x1_0000];
        // JSR $2000 ; (back here at $1003) ; at $2000: RTS
        mem[0x1000] = 0x20;
        mem[0x1001] = 0x00;
        mem[0x1002] = 0x20;
        mem[0x2000] = 0x60;
        let mut regs = Registers { pc: 0x1000, s: 0xFF, ..Registers::new() };

        let (exit, consumed) = dispatcher.run_once(&mut mem, &mut regs, 100, false, no_mmio);
        assert_eq!(exit, Exit::Countdown);
        assert_eq!(consumed, 12);
        assert_eq!(regs.pc, 0x1003);
        assert_eq!(regs.s, 0xFF);
        assert_eq!(mem[0x01FF], 0x10); // high byte of $1002 (return - 1), pushed then popped
        assert_eq!(mem[0x01FE], 0x02); // low byte of $1002
    }

    #[test]
    fn jsr_alone_reaches_the_target_when_the_budget_is_too_small_for_the_return() {
        let mut dispatcher = Dispatcher::new(256).unwrap();
        let mut mem = [0u8; 0x1_0000];
        mem[0x1000] = 0x20;
        mem[0x1001] = 0x00;
        mem[0x1002] = 0x20;
        mem[0x2000] = 0x60;
        let mut regs = Registers { pc: 0x1000, s: 0xFF, ..Registers::new() };

        // JSR's tail decrements the countdown by 6 and only exits back to
        // Rust if that goes negative, so a budget of 6 would fall straight
        // through into RTS's slot; 5 is the largest budget that still stops
        // at the target before RTS runs.
        let (exit, consumed) = dispatcher.run_once(&mut mem, &mut regs, 5, false, no_mmio);
        assert_eq!(exit, Exit::Countdown);
        assert_eq!(consumed, 6);
        assert_eq!(regs.pc, 0x2000);
        assert_eq!(regs.s, 0xFD);
        assert_eq!(mem[0x01FF], 0x10);
        assert_eq!(mem[0x01FE], 0x02);

        let (exit, consumed) = dispatcher.run_once(&mut mem, &mut regs, 100, false, no_mmio);
        assert_eq!(exit, Exit::Countdown);
        assert_eq!(consumed, 6);
        assert_eq!(regs.pc, 0x1003);
        assert_eq!(regs.s, 0xFF);
    }

    #[test]
    fn bvc_branches_when_overflow_clear_and_falls_through_when_set() {
        let mut dispatcher = Dispatcher::new(256).unwrap();
        let mut mem = [0u8; 0x1_0000];
        mem[0x1000] = 0x50; // BVC +$10
        mem[0x1001] = 0x10;

        let mut regs = Registers { pc: 0x1000, p: Status(0), ..Registers::new() };
        let (exit, _) = dispatcher.run_once(&mut mem, &mut regs, 100, false, no_mmio);
        assert_eq!(exit, Exit::Countdown);
        assert_eq!(regs.pc, 0x1012, "V clear: BVC must take the branch");

        let mut regs = Registers { pc: 0x1000, p: Status(V), ..Registers::new() };
        let (exit, _) = dispatcher.run_once(&mut mem, &mut regs, 100, false, no_mmio);
        assert_eq!(exit, Exit::Countdown);
        assert_eq!(regs.pc, 0x1002, "V set: BVC must fall through");
    }

    #[test]
    fn bvs_branches_when_overflow_set_and_falls_through_when_clear() {
        let mut dispatcher = Dispatcher::new(256).unwrap();
        let mut mem = [0u8; 0x1_0000];
        mem[0x1000] = 0x70; // BVS +$10
        mem[0x1001] = 0x10;

        let mut regs = Registers { pc: 0x1000, p: Status(V), ..Registers::new() };
        let (exit, _) = dispatcher.run_once(&mut mem, &mut regs, 100, false, no_mmio);
        assert_eq!(exit, Exit::Countdown);
        assert_eq!(regs.pc, 0x1012, "V set: BVS must take the branch");

        let mut regs = Registers { pc: 0x1000, p: Status(0), ..Registers::new() };
        let (exit, _) = dispatcher.run_once(&mut mem, &mut regs, 100, false, no_mmio);
        assert_eq!(exit, Exit::Countdown);
        assert_eq!(regs.pc, 0x1002, "V clear: BVS must fall through");
    }

    #[test]
    fn mmio_address_traps_instead_of_translating() {
        let mut dispatcher = Dispatcher::new(256).unwrap();
        let mut mem = [0u8; 0x1_0000];
        mem[0x1000] = 0xAD; // LDA absolute $FE40
        mem[0x1001] = 0x40;
        mem[0x1002] = 0xFE;
        let mut regs = Registers { pc: 0x1000, ..Registers::new() };

        let (exit, _) = dispatcher.run_once(&mut mem, &mut regs, 10, false, |pc| (0xFE00..0xFF00).contains(&pc));
        assert_eq!(exit, Exit::Trap(Trap { pc: 0x1000, opcode: 0xAD }));
    }
}
