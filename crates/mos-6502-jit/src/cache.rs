//! The JIT code cache: one fixed-width executable slot per guest byte.
//!
//! Guest PC `0x0000..=0xFFFF` maps to host offset `pc * slot_width` inside
//! a single contiguous `mmap`ed region, so guest-to-host translation is a
//! scaled add rather than a lookup table.

use std::num::NonZeroUsize;
use std::ptr::NonNull;

use nix::sys::mman::{mmap_anonymous, MapFlags, ProtFlags};

/// Default slot width in bytes. Must stay a power of two; 256 bytes
/// comfortably exceeds the worst case `translator` emits (`JSR`, the
/// longest shape, runs to a bit under 170 bytes once its tail is counted).
pub const DEFAULT_SLOT_WIDTH: usize = 256;

const NUM_SLOTS: usize = 0x1_0000;

/// State of one code-cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Never emitted — executing it is an error.
    Uninitialized,
    /// Emitted and matches the current guest byte at this address.
    Valid,
    /// Was emitted once, but the guest byte has since been overwritten;
    /// must be re-translated before the dispatcher re-enters it.
    Stale,
}

/// Failure to reserve the executable mapping.
#[derive(Debug)]
pub struct CacheError(pub String);

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to map JIT code cache: {}", self.0)
    }
}

impl std::error::Error for CacheError {}

/// Fixed-stride executable code cache.
pub struct CodeCache {
    region: NonNull<u8>,
    region_len: usize,
    slot_width: usize,
    states: Vec<SlotState>,
}

// SAFETY: `region` points at memory this type owns exclusively and never
// shares across threads without external synchronization; the cache is
// only ever touched by the single emulation thread (see `emu-bbc-micro`'s
// concurrency model).
unsafe impl Send for CodeCache {}

impl CodeCache {
    /// Reserve `slot_width * 0x10000` bytes of `rwx` memory. `slot_width`
    /// must be a power of two.
    pub fn new(slot_width: usize) -> Result<Self, CacheError> {
        assert!(slot_width.is_power_of_two(), "slot width must be a power of two");
        let region_len = slot_width * NUM_SLOTS;
        let len = NonZeroUsize::new(region_len).ok_or_else(|| CacheError("zero-length region".into()))?;

        // SAFETY: anonymous mapping, no file descriptor involved; the
        // returned pointer is owned by this `CodeCache` for its lifetime.
        let region = unsafe {
            mmap_anonymous(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE | ProtFlags::PROT_EXEC,
                MapFlags::MAP_PRIVATE,
            )
        }
        .map_err(|e| CacheError(e.to_string()))?
        .cast::<u8>();

        let mut cache = Self {
            region,
            region_len,
            slot_width,
            states: vec![SlotState::Uninitialized; NUM_SLOTS],
        };
        for pc in 0..NUM_SLOTS {
            cache.reset_slot_bytes(pc as u16);
        }
        Ok(cache)
    }

    #[must_use]
    pub fn slot_width(&self) -> usize {
        self.slot_width
    }

    #[must_use]
    pub fn state(&self, pc: u16) -> SlotState {
        self.states[pc as usize]
    }

    /// Host address of the slot for `pc`. Valid only while `self` is alive.
    #[must_use]
    pub fn slot_ptr(&self, pc: u16) -> *const u8 {
        // SAFETY: `pc as usize * slot_width` is always < region_len by construction.
        unsafe { self.region.as_ptr().add(pc as usize * self.slot_width) }
    }

    fn slot_mut(&mut self, pc: u16) -> &mut [u8] {
        let offset = pc as usize * self.slot_width;
        // SAFETY: offset + slot_width <= region_len for every pc.
        unsafe { std::slice::from_raw_parts_mut(self.region.as_ptr().add(offset), self.slot_width) }
    }

    /// Fill a slot with the uninitialized trap pattern: a two-byte `int3
    /// int3` trap followed by a no-op fill, matching the source's
    /// "trap trailed by a wide no-op region" layout. The Rust dispatcher
    /// does not rely on the host actually executing the trap — it checks
    /// [`SlotState`] before jumping — but the pattern is still planted so
    /// a disassembly of the cache looks the way the design intends.
    fn reset_slot_bytes(&mut self, pc: u16) {
        let width = self.slot_width;
        let slot = self.slot_mut(pc);
        slot[0] = 0xCC;
        slot[1] = 0xCC;
        for b in &mut slot[2..width] {
            *b = 0x90;
        }
    }

    /// Emit finished machine code into the slot for `pc`. `code.len()`
    /// must leave room for nothing further — the translator is
    /// responsible for including its own fallthrough jump.
    pub fn emit(&mut self, pc: u16, code: &[u8]) {
        let width = self.slot_width;
        assert!(code.len() <= width, "translated instruction overflows slot width");
        let slot = self.slot_mut(pc);
        slot[..code.len()].copy_from_slice(code);
        for b in &mut slot[code.len()..] {
            *b = 0x90;
        }
        self.states[pc as usize] = SlotState::Valid;
    }

    /// Mark a slot stale in response to a guest write landing on it.
    /// Called for every write address that falls in RAM, since the
    /// design conservatively treats all RAM as potentially-code.
    pub fn invalidate(&mut self, pc: u16) {
        if self.states[pc as usize] == SlotState::Valid {
            self.states[pc as usize] = SlotState::Stale;
        }
    }

    pub fn mark_uninitialized(&mut self, pc: u16) {
        self.states[pc as usize] = SlotState::Uninitialized;
        self.reset_slot_bytes(pc);
    }
}

impl Drop for CodeCache {
    fn drop(&mut self) {
        // SAFETY: `region` was obtained from `mmap_anonymous` with this
        // exact length and is not used after this point.
        unsafe {
            let _ = nix::sys::mman::munmap(self.region.cast(), self.region_len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_slots_are_uninitialized() {
        let cache = CodeCache::new(64).unwrap();
        assert_eq!(cache.state(0x1234), SlotState::Uninitialized);
    }

    #[test]
    fn emit_marks_slot_valid() {
        let mut cache = CodeCache::new(64).unwrap();
        cache.emit(0x1000, &[0x90, 0xC3]);
        assert_eq!(cache.state(0x1000), SlotState::Valid);
    }

    #[test]
    fn invalidate_after_emit_marks_stale() {
        let mut cache = CodeCache::new(64).unwrap();
        cache.emit(0x1000, &[0x90, 0xC3]);
        cache.invalidate(0x1000);
        assert_eq!(cache.state(0x1000), SlotState::Stale);
    }

    #[test]
    fn invalidate_before_emit_is_a_no_op() {
        let mut cache = CodeCache::new(64).unwrap();
        cache.invalidate(0x1000);
        assert_eq!(cache.state(0x1000), SlotState::Uninitialized);
    }

    #[test]
    #[should_panic(expected = "overflows slot width")]
    fn emit_panics_on_oversized_code() {
        let mut cache = CodeCache::new(16).unwrap();
        cache.emit(0, &[0u8; 17]);
    }

    #[test]
    fn slot_addresses_are_scaled_by_width() {
        let cache = CodeCache::new(64).unwrap();
        let base = cache.slot_ptr(0) as usize;
        let slot5 = cache.slot_ptr(5) as usize;
        assert_eq!(slot5 - base, 5 * 64);
    }
}
