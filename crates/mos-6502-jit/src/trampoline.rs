//! The fixed entry/exit glue that bridges a plain Rust `extern "C"` call
//! into the pinned-register convention translated slots run under.
//!
//! Built once per [`crate::cache::CodeCache`] and mapped into its own
//! small executable page. `dispatcher` calls [`Trampoline::entry_fn`] the
//! way it would any other function pointer; the trampoline itself never
//! returns directly — it loads the architectural state into the pinned
//! registers and jumps into the code cache. Translated slots that need to
//! hand control back to Rust jump to [`Trampoline::exit_ptr`], which
//! reverses the load and performs the real `ret`.

use nix::sys::mman::{mmap_anonymous, MapFlags, ProtFlags};
use std::num::NonZeroUsize;
use std::ptr::NonNull;

use crate::encoder::{Emitter, Reg};
use crate::state::{offset, HostState};

fn build_entry(cache_base: u64, slot_width: usize) -> Vec<u8> {
    let mut e = Emitter::new();
    // Save the Rust caller's callee-saved registers before repurposing them.
    e.push_reg(Reg::Rbx);
    e.push_reg(Reg::R12);
    e.push_reg(Reg::R13);
    e.push_reg(Reg::R14);
    e.push_reg(Reg::R15);

    // rdi (first SysV integer arg) is the `*mut HostState`; pin it in rbx.
    e.mov_reg_reg(Reg::Rbx, Reg::Rdi);

    e.mov_reg8_mem8(Reg::R12, Reg::Rbx, offset::A);
    e.mov_reg8_mem8(Reg::R13, Reg::Rbx, offset::X);
    e.mov_reg8_mem8(Reg::R14, Reg::Rbx, offset::Y);
    e.mov_reg8_mem8(Reg::R15, Reg::Rbx, offset::S);
    e.mov_reg8_mem8(Reg::R8, Reg::Rbx, offset::CARRY);
    e.mov_reg8_mem8(Reg::R9, Reg::Rbx, offset::ZERO);
    e.mov_reg8_mem8(Reg::R10, Reg::Rbx, offset::NEGATIVE);
    e.mov_reg8_mem8(Reg::R11, Reg::Rbx, offset::OTHER_P);

    // rax = target slot address = cache_base + (trap_pc << log2(slot_width)).
    e.mov_reg16_mem16(Reg::Rax, Reg::Rbx, offset::TRAP_PC);
    let shift = slot_width.trailing_zeros();
    assert!(slot_width.is_power_of_two(), "slot width must be a power of two");
    e.shl_reg_imm(Reg::Rax, shift as u8);
    e.mov_reg_imm64(Reg::Rcx, cache_base);
    e.add_reg_reg(Reg::Rax, Reg::Rcx);
    e.jmp_reg(Reg::Rax);
    e.finish()
}

fn build_exit() -> Vec<u8> {
    let mut e = Emitter::new();
    e.mov_mem8_reg8(Reg::Rbx, offset::A, Reg::R12);
    e.mov_mem8_reg8(Reg::Rbx, offset::X, Reg::R13);
    e.mov_mem8_reg8(Reg::Rbx, offset::Y, Reg::R14);
    e.mov_mem8_reg8(Reg::Rbx, offset::S, Reg::R15);
    e.mov_mem8_reg8(Reg::Rbx, offset::CARRY, Reg::R8);
    e.mov_mem8_reg8(Reg::Rbx, offset::ZERO, Reg::R9);
    e.mov_mem8_reg8(Reg::Rbx, offset::NEGATIVE, Reg::R10);
    e.mov_mem8_reg8(Reg::Rbx, offset::OTHER_P, Reg::R11);
    e.pop_reg(Reg::R15);
    e.pop_reg(Reg::R14);
    e.pop_reg(Reg::R13);
    e.pop_reg(Reg::R12);
    e.pop_reg(Reg::Rbx);
    e.ret();
    e.finish()
}

/// Owns the small fixed executable mapping holding the entry/exit stubs.
pub struct Trampoline {
    region: NonNull<u8>,
    region_len: usize,
    exit_offset: usize,
}

// SAFETY: see `CodeCache`'s identical justification — single-owner, single-thread.
unsafe impl Send for Trampoline {}

impl Trampoline {
    /// `cache_base`/`slot_width` describe the code cache this trampoline
    /// dispatches into.
    pub fn new(cache_base: u64, slot_width: usize) -> Result<Self, crate::cache::CacheError> {
        let entry = build_entry(cache_base, slot_width);
        let exit = build_exit();
        let region_len = entry.len() + exit.len();
        let len = NonZeroUsize::new(region_len)
            .ok_or_else(|| crate::cache::CacheError("empty trampoline".into()))?;

        // SAFETY: anonymous mapping, sole owner for the lifetime of `Self`.
        let region = unsafe {
            mmap_anonymous(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE | ProtFlags::PROT_EXEC,
                MapFlags::MAP_PRIVATE,
            )
        }
        .map_err(|e| crate::cache::CacheError(e.to_string()))?
        .cast::<u8>();

        // SAFETY: `region_len` bytes were just reserved above.
        unsafe {
            std::ptr::copy_nonoverlapping(entry.as_ptr(), region.as_ptr(), entry.len());
            std::ptr::copy_nonoverlapping(exit.as_ptr(), region.as_ptr().add(entry.len()), exit.len());
        }

        Ok(Self {
            region,
            region_len,
            exit_offset: entry.len(),
        })
    }

    /// The address translated code should jump to in order to return control to the dispatcher.
    #[must_use]
    pub fn exit_ptr(&self) -> u64 {
        // SAFETY: exit_offset < region_len by construction.
        unsafe { self.region.as_ptr().add(self.exit_offset) as u64 }
    }

    /// Call into translated code. `state.trap_pc` must already hold the
    /// guest PC to enter at.
    ///
    /// # Safety
    /// `state` must point at a live [`HostState`] whose `mem` pointer
    /// covers a full 64 KiB guest address space, and the code cache this
    /// trampoline was built against must still be mapped.
    pub unsafe fn enter(&self, state: *mut HostState) {
        let entry_fn: extern "C" fn(*mut HostState) = std::mem::transmute(self.region.as_ptr());
        entry_fn(state);
    }
}

impl Drop for Trampoline {
    fn drop(&mut self) {
        // SAFETY: `region` was obtained from `mmap_anonymous` with this exact length.
        unsafe {
            let _ = nix::sys::mman::munmap(self.region.cast(), self.region_len);
        }
    }
}
