//! Minimal hand-rolled x86-64 encoder.
//!
//! The translator only ever needs a small, fixed repertoire of host
//! instruction shapes, so there is no call for a general assembler
//! backend here — just enough opcode tables to plant exactly the forms
//! `translator` and `dispatcher` use. Registers are named the way the
//! System V calling convention numbers them (rax=0 .. r15=15); the
//! caller is responsible for picking a convention and sticking to it.

/// A general-purpose 64-bit host register, numbered per the x86-64 `ModRM`/`REX` scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Reg {
    const fn low(self) -> u8 {
        (self as u8) & 0x7
    }

    const fn needs_rex_b(self) -> bool {
        (self as u8) & 0x8 != 0
    }
}

/// Condition codes for `Jcc`/`SETcc`, matching the 6502 branch set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    /// CC — carry clear.
    Cc,
    /// CS — carry set.
    Cs,
    /// EQ — zero set.
    Eq,
    /// NE — zero clear.
    Ne,
    /// MI — negative set.
    Mi,
    /// PL — negative clear.
    Pl,
    /// VS — overflow set.
    Vs,
    /// VC — overflow clear.
    Vc,
}

impl Cond {
    /// The `tttn` nibble used by both `0F 8n` (Jcc rel32) and `0F 9n` (SETcc).
    const fn code(self) -> u8 {
        match self {
            Self::Cc => 0x3,
            Self::Cs => 0x2,
            Self::Eq => 0x4,
            Self::Ne => 0x5,
            Self::Mi => 0x8,
            Self::Pl => 0x9,
            Self::Vs => 0x0,
            Self::Vc => 0x1,
        }
    }
}

/// Accumulates machine code bytes for one translated slot.
///
/// `Emitter` knows nothing about guest semantics; `translator` drives it
/// one host instruction at a time, and `cache` copies the finished byte
/// buffer into the executable mapping.
#[derive(Debug, Default)]
pub struct Emitter {
    bytes: Vec<u8>,
}

impl Emitter {
    #[must_use]
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }

    fn push(&mut self, b: u8) {
        self.bytes.push(b);
    }

    fn push_u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn push_i32(&mut self, v: i32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn push_u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// `REX.W` prefix, with the B bit set when `reg` is r8-r15.
    fn rex_w(&mut self, reg: Reg, rm_extended: bool) {
        let rex = 0x48 | (u8::from(reg.needs_rex_b()) << 2) | u8::from(rm_extended);
        self.push(rex);
    }

    fn modrm_direct(&mut self, reg_field: u8, rm: Reg) {
        self.push(0xC0 | (reg_field << 3) | rm.low());
    }

    /// `mov reg, imm64`.
    pub fn mov_reg_imm64(&mut self, dst: Reg, imm: u64) {
        self.rex_w(dst, false);
        self.push(0xB8 | dst.low());
        self.push_u64(imm);
    }

    /// `mov reg, [base + disp8]` — byte load zero-extended is not modeled;
    /// callers needing a single byte use [`Self::mov_reg8_mem8`].
    pub fn mov_reg_mem(&mut self, dst: Reg, base: Reg, disp: i8) {
        self.rex_w(dst, base.needs_rex_b());
        self.push(0x8B);
        self.push(0x40 | (dst.low() << 3) | base.low());
        self.push(disp as u8);
    }

    /// `mov [base + disp8], reg`.
    pub fn mov_mem_reg(&mut self, base: Reg, disp: i8, src: Reg) {
        self.rex_w(src, base.needs_rex_b());
        self.push(0x89);
        self.push(0x40 | (src.low() << 3) | base.low());
        self.push(disp as u8);
    }

    /// `movzx reg32, byte [base + disp8]`.
    pub fn mov_reg8_mem8(&mut self, dst: Reg, base: Reg, disp: i8) {
        let rex = 0x40 | (u8::from(dst.needs_rex_b()) << 2) | u8::from(base.needs_rex_b());
        if rex != 0x40 {
            self.push(rex);
        }
        self.push(0x0F);
        self.push(0xB6);
        self.push(0x40 | (dst.low() << 3) | base.low());
        self.push(disp as u8);
    }

    /// `movzx reg32, word [base + disp8]`.
    pub fn mov_reg16_mem16(&mut self, dst: Reg, base: Reg, disp: i8) {
        let rex = 0x40 | (u8::from(dst.needs_rex_b()) << 2) | u8::from(base.needs_rex_b());
        if rex != 0x40 {
            self.push(rex);
        }
        self.push(0x0F);
        self.push(0xB7);
        self.push(0x40 | (dst.low() << 3) | base.low());
        self.push(disp as u8);
    }

    /// `mov byte [base + disp8], reg8`.
    pub fn mov_mem8_reg8(&mut self, base: Reg, disp: i8, src: Reg) {
        let rex = 0x40 | (u8::from(src.needs_rex_b()) << 2) | u8::from(base.needs_rex_b());
        if rex != 0x40 {
            self.push(rex);
        }
        self.push(0x88);
        self.push(0x40 | (src.low() << 3) | base.low());
        self.push(disp as u8);
    }

    /// `mov dst, src` (64-bit register to register).
    pub fn mov_reg_reg(&mut self, dst: Reg, src: Reg) {
        self.alu_reg_reg(0x89, dst, src);
    }

    fn alu_reg_reg(&mut self, opcode: u8, dst: Reg, src: Reg) {
        self.rex_w(src, dst.needs_rex_b());
        self.push(opcode);
        self.modrm_direct(src.low(), dst);
    }

    pub fn add_reg_reg(&mut self, dst: Reg, src: Reg) {
        self.alu_reg_reg(0x01, dst, src);
    }

    pub fn sub_reg_reg(&mut self, dst: Reg, src: Reg) {
        self.alu_reg_reg(0x29, dst, src);
    }

    pub fn and_reg_reg(&mut self, dst: Reg, src: Reg) {
        self.alu_reg_reg(0x21, dst, src);
    }

    pub fn or_reg_reg(&mut self, dst: Reg, src: Reg) {
        self.alu_reg_reg(0x09, dst, src);
    }

    pub fn xor_reg_reg(&mut self, dst: Reg, src: Reg) {
        self.alu_reg_reg(0x31, dst, src);
    }

    pub fn cmp_reg_reg(&mut self, lhs: Reg, rhs: Reg) {
        self.alu_reg_reg(0x39, lhs, rhs);
    }

    pub fn test_reg_reg(&mut self, lhs: Reg, rhs: Reg) {
        self.alu_reg_reg(0x85, lhs, rhs);
    }

    /// `op reg, imm32` (sign-extended), `/0`-style group for `add/sub/and/or/xor/cmp`.
    fn alu_reg_imm(&mut self, group_ext: u8, dst: Reg, imm: i32) {
        self.rex_w(dst, false);
        self.push(0x81);
        self.modrm_direct(group_ext, dst);
        self.push_i32(imm);
    }

    pub fn add_reg_imm(&mut self, dst: Reg, imm: i32) {
        self.alu_reg_imm(0, dst, imm);
    }

    pub fn sub_reg_imm(&mut self, dst: Reg, imm: i32) {
        self.alu_reg_imm(5, dst, imm);
    }

    pub fn and_reg_imm(&mut self, dst: Reg, imm: i32) {
        self.alu_reg_imm(4, dst, imm);
    }

    pub fn or_reg_imm(&mut self, dst: Reg, imm: i32) {
        self.alu_reg_imm(1, dst, imm);
    }

    pub fn xor_reg_imm(&mut self, dst: Reg, imm: i32) {
        self.alu_reg_imm(6, dst, imm);
    }

    pub fn cmp_reg_imm(&mut self, dst: Reg, imm: i32) {
        self.alu_reg_imm(7, dst, imm);
    }

    /// `setcc r/m8`.
    pub fn setcc(&mut self, cond: Cond, dst: Reg) {
        if dst.needs_rex_b() {
            self.push(0x41);
        }
        self.push(0x0F);
        self.push(0x90 | cond.code());
        self.push(0xC0 | dst.low());
    }

    /// `shl/shr/rol/ror reg, 1`.
    fn shift_by_one(&mut self, group_ext: u8, dst: Reg) {
        self.rex_w(dst, false);
        self.push(0xD1);
        self.modrm_direct(group_ext, dst);
    }

    pub fn shl_reg_1(&mut self, dst: Reg) {
        self.shift_by_one(4, dst);
    }

    pub fn shr_reg_1(&mut self, dst: Reg) {
        self.shift_by_one(5, dst);
    }

    pub fn rol_reg_1(&mut self, dst: Reg) {
        self.shift_by_one(0, dst);
    }

    pub fn ror_reg_1(&mut self, dst: Reg) {
        self.shift_by_one(1, dst);
    }

    /// `shl/shr/rol/ror reg, imm8`.
    fn shift_by_imm(&mut self, group_ext: u8, dst: Reg, imm: u8) {
        self.rex_w(dst, false);
        self.push(0xC1);
        self.modrm_direct(group_ext, dst);
        self.push(imm);
    }

    pub fn shl_reg_imm(&mut self, dst: Reg, imm: u8) {
        self.shift_by_imm(4, dst, imm);
    }

    pub fn shr_reg_imm(&mut self, dst: Reg, imm: u8) {
        self.shift_by_imm(5, dst, imm);
    }

    /// `jmp rel32` — placeholder target, patched via [`Self::patch_rel32`].
    pub fn jmp_rel32(&mut self, target: i32) -> usize {
        self.push(0xE9);
        let fixup = self.bytes.len();
        self.push_i32(target);
        fixup
    }

    /// `jcc rel32` (near, 6-byte form). Returns the offset of the displacement
    /// field for later patching.
    pub fn jcc_rel32(&mut self, cond: Cond, target: i32) -> usize {
        self.push(0x0F);
        self.push(0x80 | cond.code());
        let fixup = self.bytes.len();
        self.push_i32(target);
        fixup
    }

    /// Overwrite a previously emitted rel32 fixup with a displacement
    /// computed from the final instruction boundary.
    pub fn patch_rel32(&mut self, fixup_offset: usize, rel: i32) {
        self.bytes[fixup_offset..fixup_offset + 4].copy_from_slice(&rel.to_le_bytes());
    }

    /// `jmp reg` (indirect, absolute within the process).
    pub fn jmp_reg(&mut self, target: Reg) {
        if target.needs_rex_b() {
            self.push(0x41);
        }
        self.push(0xFF);
        self.push(0xE0 | target.low());
    }

    pub fn call_reg(&mut self, target: Reg) {
        if target.needs_rex_b() {
            self.push(0x41);
        }
        self.push(0xFF);
        self.push(0xD0 | target.low());
    }

    pub fn ret(&mut self) {
        self.push(0xC3);
    }

    pub fn push_reg(&mut self, reg: Reg) {
        if reg.needs_rex_b() {
            self.push(0x41);
        }
        self.push(0x50 | reg.low());
    }

    pub fn pop_reg(&mut self, reg: Reg) {
        if reg.needs_rex_b() {
            self.push(0x41);
        }
        self.push(0x58 | reg.low());
    }

    /// `int3` — used for the uninitialized-slot trap pattern.
    pub fn int3(&mut self) {
        self.push(0xCC);
    }

    /// `nop`.
    pub fn nop(&mut self) {
        self.push(0x90);
    }

    /// Absolute jump through an immediate 64-bit address: `mov rax, imm64; jmp rax`.
    /// Used for slot-table jumps where the target is computed at translation
    /// time rather than reached via a host-relative branch.
    pub fn jmp_abs64(&mut self, scratch: Reg, target: u64) {
        self.mov_reg_imm64(scratch, target);
        self.jmp_reg(scratch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mov_reg_imm64_has_rex_w_and_b8_opcode() {
        let mut e = Emitter::new();
        e.mov_reg_imm64(Reg::Rax, 0x1122_3344_5566_7788);
        let bytes = e.finish();
        assert_eq!(bytes[0], 0x48);
        assert_eq!(bytes[1], 0xB8);
        assert_eq!(&bytes[2..10], &0x1122_3344_5566_7788u64.to_le_bytes());
    }

    #[test]
    fn mov_reg_imm64_sets_rex_b_for_extended_register() {
        let mut e = Emitter::new();
        e.mov_reg_imm64(Reg::R9, 1);
        let bytes = e.finish();
        assert_eq!(bytes[0], 0x49);
        assert_eq!(bytes[1], 0xB8 | 1);
    }

    #[test]
    fn jmp_rel32_fixup_round_trips() {
        let mut e = Emitter::new();
        let fixup = e.jmp_rel32(0);
        e.patch_rel32(fixup, -5);
        let bytes = e.finish();
        assert_eq!(bytes[0], 0xE9);
        assert_eq!(i32::from_le_bytes(bytes[1..5].try_into().unwrap()), -5);
    }

    #[test]
    fn setcc_encodes_condition_nibble() {
        let mut e = Emitter::new();
        e.setcc(Cond::Eq, Reg::Rcx);
        let bytes = e.finish();
        assert_eq!(bytes, vec![0x0F, 0x94, 0xC1]);
    }

    #[test]
    fn ret_is_single_byte() {
        let mut e = Emitter::new();
        e.ret();
        assert_eq!(e.finish(), vec![0xC3]);
    }
}
