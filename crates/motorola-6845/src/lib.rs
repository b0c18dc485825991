//! Motorola 6845 CRT Controller — interface stub.
//!
//! Video rendering is out of scope for this workspace. What's modeled here
//! is the chip's register interface (the address register plus the 18
//! indexed registers it gates) and the handful of derived quantities
//! (`vertical_total`, `cycles_per_frame`) the machine needs to drive the
//! System VIA's CA1 (vertical sync) line at the right cadence — not the
//! raster/teletext pipeline the real chip drives.

use emu_core::Observable;

/// Number of addressable registers (R0-R17).
const NUM_REGISTERS: usize = 18;

/// Motorola 6845 CRTC register file.
pub struct Crtc6845 {
    address: u8,
    registers: [u8; NUM_REGISTERS],
}

impl Crtc6845 {
    #[must_use]
    pub fn new() -> Self {
        Self { address: 0, registers: [0; NUM_REGISTERS] }
    }

    /// Write the address register (selects which of R0-R17 subsequent data
    /// writes/reads target).
    pub fn write_address(&mut self, value: u8) {
        self.address = value & 0x1F;
    }

    /// Write the currently addressed register. Registers past R17 are
    /// write-only no-ops on real hardware.
    pub fn write_data(&mut self, value: u8) {
        if let Some(slot) = self.registers.get_mut(self.address as usize) {
            *slot = value;
        }
    }

    /// Read the currently addressed register. Only R14-R17 (cursor/light
    /// pen) are readable on real hardware; others return the last latched
    /// bus value, which this stub models as the stored register value.
    #[must_use]
    pub fn read_data(&self) -> u8 {
        self.registers.get(self.address as usize).copied().unwrap_or(0xFF)
    }

    #[must_use]
    pub fn register(&self, index: u8) -> u8 {
        self.registers.get(index as usize).copied().unwrap_or(0)
    }

    /// R4: vertical total (character rows per frame, minus one).
    #[must_use]
    pub fn vertical_total(&self) -> u8 {
        self.register(4) & 0x7F
    }

    /// R9: max scan line address (scan lines per character row, minus one).
    #[must_use]
    pub fn max_scan_line(&self) -> u8 {
        self.register(9) & 0x1F
    }

    /// R0: horizontal total (character clocks per scan line, minus one).
    #[must_use]
    pub fn horizontal_total(&self) -> u8 {
        self.register(0)
    }

    /// Character clocks per frame, derived from R0/R4/R9 the way the real
    /// raster counter would accumulate them. The machine uses this to arm
    /// a timing-wheel deadline for vertical sync without rendering
    /// anything.
    #[must_use]
    pub fn character_clocks_per_frame(&self) -> u32 {
        (u32::from(self.horizontal_total()) + 1)
            * (u32::from(self.vertical_total()) + 1)
            * (u32::from(self.max_scan_line()) + 1)
    }
}

impl Default for Crtc6845 {
    fn default() -> Self {
        Self::new()
    }
}

impl Observable for Crtc6845 {
    fn query(&self, path: &str) -> Option<emu_core::Value> {
        match path {
            "address" => Some(emu_core::Value::U8(self.address)),
            "vertical_total" => Some(emu_core::Value::U8(self.vertical_total())),
            "horizontal_total" => Some(emu_core::Value::U8(self.horizontal_total())),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["address", "vertical_total", "horizontal_total"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_register_selects_data_target() {
        let mut crtc = Crtc6845::new();
        crtc.write_address(4);
        crtc.write_data(0x26);
        assert_eq!(crtc.register(4), 0x26);
        assert_eq!(crtc.vertical_total(), 0x26);
    }

    #[test]
    fn address_is_masked_to_five_bits() {
        let mut crtc = Crtc6845::new();
        crtc.write_address(0xFF);
        crtc.write_data(0x01);
        assert_eq!(crtc.register(0x1F & 0xFF), 0);
    }

    #[test]
    fn frame_clock_count_derives_from_registers() {
        let mut crtc = Crtc6845::new();
        crtc.write_address(0);
        crtc.write_data(63); // 64 character clocks/line
        crtc.write_address(4);
        crtc.write_data(38); // 39 character rows
        crtc.write_address(9);
        crtc.write_data(7); // 8 scan lines/row
        assert_eq!(crtc.character_clocks_per_frame(), 64 * 39 * 8);
    }
}
