//! MOS 6522 Versatile Interface Adapter (VIA).
//!
//! The 6522 provides two 8-bit I/O ports, two 16-bit timers, a serial
//! shift register, and an interrupt controller. This crate models the
//! register interface and the two timers; it does not know whether it is
//! wired up as a System VIA or a User VIA, or what, if anything, its Port B
//! strobe line is connected to — that wiring belongs to the machine that
//! owns the VIA.
//!
//! Timers do not tick themselves. A VIA is created against an
//! [`emu_timing_wheel::TimingWheel`] shared with the CPU and every other
//! peripheral, and registers two timers on it. The wheel, not the VIA,
//! owns "what happens next and when" — this lets the CPU (interpreter or
//! JIT) advance the wheel in large bulk steps between dispatcher exits
//! instead of ticking every peripheral every cycle.
//!
//! # Registers ($0-$F)
//!
//! | Reg | Name | Description                               |
//! |-----|------|--------------------------------------------|
//! | $0  | ORB  | Port B data (handshake on read)            |
//! | $1  | ORA  | Port A data (handshake on read)             |
//! | $2  | DDRB | Port B data direction (1 = output)          |
//! | $3  | DDRA | Port A data direction (1 = output)          |
//! | $4  | T1CL | Timer 1 counter low (read clears T1 IRQ)    |
//! | $5  | T1CH | Timer 1 counter high (write starts T1)      |
//! | $6  | T1LL | Timer 1 latch low                           |
//! | $7  | T1LH | Timer 1 latch high                          |
//! | $8  | T2CL | Timer 2 counter low (read clears T2 IRQ)    |
//! | $9  | T2CH | Timer 2 counter high (write starts T2)      |
//! | $A  | SR   | Shift register                              |
//! | $B  | ACR  | Auxiliary control register                  |
//! | $C  | PCR  | Peripheral control register                 |
//! | $D  | IFR  | Interrupt flag register                     |
//! | $E  | IER  | Interrupt enable register                   |
//! | $F  | ORA  | Port A data (no handshake)                   |

#![allow(clippy::cast_possible_truncation)]

use emu_core::Observable;
use emu_timing_wheel::{TimerId, TimingWheel};

// IFR/IER bit masks.
const IFR_CA2: u8 = 0x01;
const IFR_CA1: u8 = 0x02;
const IFR_SR: u8 = 0x04;
const IFR_CB2: u8 = 0x08;
const IFR_CB1: u8 = 0x10;
const IFR_T2: u8 = 0x20;
const IFR_T1: u8 = 0x40;

/// Wheel-tick period T1 and T2 free-wheel at once a one-shot underflow has
/// fired: one full pass of the 16-bit counter, at two wheel ticks per
/// architectural cycle.
const FREE_WHEEL_PERIOD: i64 = 0x1_0000 * 2;

/// Convert a 16-bit latch value to the wheel-tick period of the timer it
/// feeds.
///
/// Real 6522 timers take two extra cycles to reload after the triggering
/// write (and, for T1 in free-run mode, after every subsequent reload) —
/// loading latch `N` produces an interval of `N + 2` architectural cycles,
/// not `N`. The wheel runs at twice the VIA's clock, so the stored period
/// is doubled again.
const fn period_for_latch(latch: u16) -> i64 {
    (latch as i64 + 2) * 2
}

/// MOS 6522 Versatile Interface Adapter.
///
/// `Ctx` is the tag the owning machine associates with this VIA's two
/// timers on its shared [`TimingWheel`] — typically an enum distinguishing
/// "System VIA Timer 1" from "User VIA Timer 2" and so on, so the wheel's
/// fire callback knows which VIA (and which of its two timers) to resync
/// without the VIA needing to own the wheel itself.
pub struct Via6522<Ctx> {
    /// Port A output register.
    port_a: u8,
    /// Port B output register.
    port_b: u8,
    /// Port A data direction register (1 = output).
    ddr_a: u8,
    /// Port B data direction register (1 = output).
    ddr_b: u8,
    /// External input lines for port A (active-high, directly readable).
    pub external_a: u8,
    /// External input lines for port B (active-high, directly readable).
    pub external_b: u8,

    t1: TimerId,
    t1_latch: u16,
    /// Wheel-tick period this incarnation of T1 is currently running at:
    /// `period_for_latch(t1_latch)` while still firing, or
    /// [`FREE_WHEEL_PERIOD`] once a one-shot underflow has happened.
    t1_period: i64,
    /// Cleared on every T1CH write; set the first time a one-shot T1
    /// underflows, so a later resync does not re-raise the flag.
    t1_one_shot_fired: bool,
    /// Toggled on every underflow while ACR bit 7 selects PB7 output.
    pb7: bool,

    t2: TimerId,
    t2_latch_lo: u8,
    t2_period: i64,
    t2_one_shot_fired: bool,
    /// Live counter while ACR bit 5 selects pulse-counting mode: decremented
    /// only by [`Self::set_pb6`], not by the wheel, since nothing about
    /// elapsed cycle count governs it in that mode.
    t2_pulse_counter: u16,
    /// Previous PB6 input state (for pulse-counting edge detection).
    pb6_prev: bool,

    /// Shift register.
    shift_register: u8,
    /// Shift count (number of bits shifted).
    shift_count: u8,

    /// Auxiliary control register (ACR).
    /// Bits 7-6: T1 control (00/01 = one-shot, 1x = free-run)
    /// Bit 5: T2 control (0 = timed, 1 = count PB6 pulses via [`Via6522::set_pb6`])
    /// Bits 4-2: Shift register control
    /// Bit 1: PB latching enable
    /// Bit 0: PA latching enable
    acr: u8,

    /// Peripheral control register (PCR).
    /// Bits 7-5: CB2 control
    /// Bit 4: CB1 edge (0 = negative, 1 = positive)
    /// Bits 3-1: CA2 control
    /// Bit 0: CA1 edge (0 = negative, 1 = positive)
    pcr: u8,

    /// Interrupt flag register (IFR, bits 0-6; bit 7 is computed on read).
    ifr: u8,
    /// Interrupt enable register (IER, bits 0-6; bit 7 always reads 1).
    ier: u8,

    /// Previous CA1 input state (for edge detection).
    ca1_prev: bool,
    /// Previous CB1 input state (for edge detection).
    cb1_prev: bool,
}

impl<Ctx: Copy> Via6522<Ctx> {
    /// Create a new VIA with all registers in their reset state, and
    /// register its two timers on `wheel` under `t1_ctx`/`t2_ctx`.
    pub fn new(wheel: &mut TimingWheel<Ctx>, t1_ctx: Ctx, t2_ctx: Ctx) -> Self {
        let t1 = wheel.register_timer(t1_ctx);
        let t2 = wheel.register_timer(t2_ctx);
        Self {
            port_a: 0,
            port_b: 0,
            ddr_a: 0,
            ddr_b: 0,
            external_a: 0xFF,
            external_b: 0xFF,
            t1,
            t1_latch: 0xFFFF,
            t1_period: period_for_latch(0xFFFF),
            t1_one_shot_fired: false,
            pb7: false,
            t2,
            t2_latch_lo: 0xFF,
            t2_period: period_for_latch(0xFFFF),
            t2_one_shot_fired: false,
            t2_pulse_counter: 0xFFFF,
            pb6_prev: false,
            shift_register: 0,
            shift_count: 0,
            acr: 0,
            pcr: 0,
            ifr: 0,
            ier: 0,
            ca1_prev: false,
            cb1_prev: false,
        }
    }

    /// The [`TimerId`] this VIA registered for Timer 1. Used by the owning
    /// machine to route wheel fire callbacks back to [`Via6522::on_timer_fired`].
    #[must_use]
    pub fn timer1_id(&self) -> TimerId {
        self.t1
    }

    /// The [`TimerId`] this VIA registered for Timer 2.
    #[must_use]
    pub fn timer2_id(&self) -> TimerId {
        self.t2
    }

    /// Called by the owning machine's wheel-fire dispatch when `id` fires.
    /// Routes to whichever of this VIA's two timers underflowed; a `None`
    /// return (no match) means the id belongs to a different VIA.
    pub fn on_timer_fired(&mut self, wheel: &mut TimingWheel<Ctx>, id: TimerId) {
        if id == self.t1 {
            self.resync_t1(wheel);
        } else if id == self.t2 {
            self.resync_t2(wheel);
        }
    }

    /// Reconcile IFR, PB7 parity, and the wheel's own countdown against
    /// however much time has actually passed — whether or not the wheel
    /// ever invoked a fire callback for it.
    ///
    /// T1 in continuous mode is only wired to fire on the wheel (see
    /// [`Self::sync_firing`]) while its interrupt is enabled, so that a long
    /// CPU run with T1's interrupt masked doesn't force the wheel to stop
    /// at every single period — the JIT can cover the whole masked stretch
    /// in one bulk advance. This is the cost of that: the countdown can go
    /// arbitrarily negative while masked, and this resync must reconstruct
    /// how many periods were actually missed from how overdue it is, not
    /// just treat it as "one more event".
    fn resync_t1(&mut self, wheel: &mut TimingWheel<Ctx>) {
        let raw = wheel.get_timer_value(self.t1);
        if raw > 0 {
            return;
        }
        let overdue = -raw;
        if self.acr & 0x40 != 0 {
            let missed = 1 + overdue / self.t1_period;
            self.ifr |= IFR_T1;
            if missed % 2 == 1 {
                self.pb7 = !self.pb7;
            }
            let rem = overdue % self.t1_period;
            let next = if rem == 0 { self.t1_period } else { self.t1_period - rem };
            wheel.start_timer(self.t1, next);
        } else {
            if !self.t1_one_shot_fired {
                self.ifr |= IFR_T1;
                self.t1_one_shot_fired = true;
                // `overdue` is already measured from the exact underflow
                // instant, which is where the free-wheel epoch begins.
                let remaining = overdue.rem_euclid(FREE_WHEEL_PERIOD);
                self.t1_period = FREE_WHEEL_PERIOD;
                let next = if remaining == 0 {
                    FREE_WHEEL_PERIOD
                } else {
                    FREE_WHEEL_PERIOD - remaining
                };
                wheel.start_timer(self.t1, next);
            } else {
                let rem = overdue.rem_euclid(self.t1_period);
                let next = if rem == 0 { self.t1_period } else { self.t1_period - rem };
                wheel.start_timer(self.t1, next);
            }
            wheel.set_firing(self.t1, false);
        }
    }

    /// Timer 2 is always one-shot: it raises IFR exactly once per start,
    /// then free-wheels silently through the rest of the 16-bit range.
    ///
    /// In pulse-counting mode (ACR bit 5) the wheel timer is left
    /// disarmed entirely — [`Self::set_pb6`] is the only thing that moves
    /// the counter — so there is nothing here to reconcile.
    fn resync_t2(&mut self, wheel: &mut TimingWheel<Ctx>) {
        if self.acr & 0x20 != 0 {
            return;
        }
        let raw = wheel.get_timer_value(self.t2);
        if raw > 0 {
            return;
        }
        let overdue = -raw;
        if !self.t2_one_shot_fired {
            self.ifr |= IFR_T2;
            self.t2_one_shot_fired = true;
            let remaining = overdue.rem_euclid(FREE_WHEEL_PERIOD);
            self.t2_period = FREE_WHEEL_PERIOD;
            let next = if remaining == 0 {
                FREE_WHEEL_PERIOD
            } else {
                FREE_WHEEL_PERIOD - remaining
            };
            wheel.start_timer(self.t2, next);
        } else {
            let rem = overdue.rem_euclid(self.t2_period);
            let next = if rem == 0 { self.t2_period } else { self.t2_period - rem };
            wheel.start_timer(self.t2, next);
        }
        wheel.set_firing(self.t2, false);
    }

    /// Whether the wheel should actually invoke a callback when T1
    /// crosses zero: always for one-shot (hardware always raises IFR),
    /// gated on the interrupt enable for continuous mode so a masked
    /// repeating timer doesn't force frequent wheel stops.
    fn sync_t1_firing(&self, wheel: &mut TimingWheel<Ctx>) {
        let firing = self.acr & 0x40 == 0 || self.ier & IFR_T1 != 0;
        wheel.set_firing(self.t1, firing);
    }

    /// Force both timers to reconcile against the current wheel time.
    /// The owning machine should call this before computing its aggregate
    /// CPU interrupt line, so a long masked run doesn't leave IFR stale.
    pub fn sync(&mut self, wheel: &mut TimingWheel<Ctx>) {
        self.resync_t1(wheel);
        self.resync_t2(wheel);
    }

    /// Check if the VIA has an active (and enabled) interrupt. Call
    /// [`Self::sync`] first if a long run may have elapsed since the last
    /// check.
    #[must_use]
    pub fn irq_active(&self) -> bool {
        (self.ifr & self.ier & 0x7F) != 0
    }

    /// Read a VIA register.
    pub fn read(&mut self, wheel: &mut TimingWheel<Ctx>, reg: u8) -> u8 {
        match reg & 0x0F {
            0x00 => {
                self.ifr &= !(IFR_CB1 | IFR_CB2);
                self.read_port_b()
            }
            0x01 => {
                self.ifr &= !(IFR_CA1 | IFR_CA2);
                self.read_port_a()
            }
            0x02 => self.ddr_b,
            0x03 => self.ddr_a,
            0x04 => {
                self.resync_t1(wheel);
                self.ifr &= !IFR_T1;
                self.t1_counter(wheel) as u8
            }
            0x05 => {
                self.resync_t1(wheel);
                (self.t1_counter(wheel) >> 8) as u8
            }
            0x06 => self.t1_latch as u8,
            0x07 => (self.t1_latch >> 8) as u8,
            0x08 => {
                self.resync_t2(wheel);
                self.ifr &= !IFR_T2;
                self.t2_counter(wheel) as u8
            }
            0x09 => {
                self.resync_t2(wheel);
                (self.t2_counter(wheel) >> 8) as u8
            }
            0x0A => self.shift_register,
            0x0B => self.acr,
            0x0C => self.pcr,
            0x0D => {
                self.sync(wheel);
                let irq_any = if (self.ifr & self.ier & 0x7F) != 0 {
                    0x80
                } else {
                    0
                };
                (self.ifr & 0x7F) | irq_any
            }
            0x0E => self.ier | 0x80,
            0x0F => self.read_port_a(),
            _ => 0xFF,
        }
    }

    /// Write a VIA register.
    pub fn write(&mut self, wheel: &mut TimingWheel<Ctx>, reg: u8, value: u8) {
        match reg & 0x0F {
            0x00 => {
                self.ifr &= !(IFR_CB1 | IFR_CB2);
                self.port_b = value;
            }
            0x01 => {
                self.ifr &= !(IFR_CA1 | IFR_CA2);
                self.port_a = value;
            }
            0x02 => self.ddr_b = value,
            0x03 => self.ddr_a = value,
            0x04 => {
                self.t1_latch = (self.t1_latch & 0xFF00) | u16::from(value);
            }
            0x05 => {
                self.t1_latch = (self.t1_latch & 0x00FF) | (u16::from(value) << 8);
                self.t1_period = period_for_latch(self.t1_latch);
                self.t1_one_shot_fired = false;
                self.pb7 = false;
                self.ifr &= !IFR_T1;
                wheel.start_timer(self.t1, self.t1_period);
                self.sync_t1_firing(wheel);
            }
            0x06 => {
                self.t1_latch = (self.t1_latch & 0xFF00) | u16::from(value);
            }
            0x07 => {
                self.t1_latch = (self.t1_latch & 0x00FF) | (u16::from(value) << 8);
                self.ifr &= !IFR_T1;
            }
            0x08 => self.t2_latch_lo = value,
            0x09 => {
                let latch = u16::from(self.t2_latch_lo) | (u16::from(value) << 8);
                self.t2_one_shot_fired = false;
                self.ifr &= !IFR_T2;
                if self.acr & 0x20 != 0 {
                    // Pulse-counting mode: decrement is suspended entirely
                    // until a PB6 edge arrives, so the wheel timer is left
                    // disarmed rather than armed with a cycle deadline.
                    self.t2_pulse_counter = latch;
                    wheel.stop_timer(self.t2);
                } else {
                    self.t2_period = period_for_latch(latch);
                    wheel.start_timer(self.t2, self.t2_period);
                    wheel.set_firing(self.t2, true);
                }
            }
            0x0A => {
                self.shift_register = value;
                self.shift_count = 0;
                self.ifr &= !IFR_SR;
            }
            0x0B => {
                // T2's timed/pulse-counting mode switch (bit 5) is only
                // recognized at the next T2CH write, matching T1's own
                // control bits which likewise take effect on their next
                // reload rather than retroactively converting a timer
                // that's already running.
                self.acr = value;
                self.sync_t1_firing(wheel);
            }
            0x0C => self.pcr = value,
            0x0D => self.ifr &= !value,
            0x0E => {
                if value & 0x80 != 0 {
                    self.ier |= value & 0x7F;
                } else {
                    self.ier &= !(value & 0x7F);
                }
                self.resync_t1(wheel);
                self.sync_t1_firing(wheel);
            }
            0x0F => self.port_a = value,
            _ => {}
        }
    }

    /// Set the CA1 input line. Call this when the external signal changes.
    pub fn set_ca1(&mut self, state: bool) {
        let active_edge = self.pcr & 0x01 != 0;
        let triggered = if active_edge {
            !self.ca1_prev && state
        } else {
            self.ca1_prev && !state
        };
        if triggered {
            self.ifr |= IFR_CA1;
        }
        self.ca1_prev = state;
    }

    /// Set the CB1 input line. Call this when the external signal changes.
    pub fn set_cb1(&mut self, state: bool) {
        let active_edge = self.pcr & 0x10 != 0;
        let triggered = if active_edge {
            !self.cb1_prev && state
        } else {
            self.cb1_prev && !state
        };
        if triggered {
            self.ifr |= IFR_CB1;
        }
        self.cb1_prev = state;
    }

    /// Set the PB6 input line. Call this when the external signal changes.
    /// Only has an effect in T2 pulse-counting mode (ACR bit 5): each
    /// high-to-low transition decrements T2's counter by one, exactly as a
    /// cycle tick would in timed mode.
    pub fn set_pb6(&mut self, state: bool) {
        let falling = self.pb6_prev && !state;
        self.pb6_prev = state;
        if falling && self.acr & 0x20 != 0 {
            self.t2_pulse_counter = self.t2_pulse_counter.wrapping_sub(1);
            if self.t2_pulse_counter == 0xFFFF && !self.t2_one_shot_fired {
                self.ifr |= IFR_T2;
                self.t2_one_shot_fired = true;
            }
        }
    }

    /// Set the CA2 flag directly, for external logic that detects the
    /// condition which should raise the CA2 interrupt flag.
    pub fn set_ca2_flag(&mut self) {
        self.ifr |= IFR_CA2;
    }

    /// Set the CB2 flag directly.
    pub fn set_cb2_flag(&mut self) {
        self.ifr |= IFR_CB2;
    }

    /// Port A output value (combines port register and DDR).
    #[must_use]
    pub fn port_a_output(&self) -> u8 {
        self.port_a & self.ddr_a
    }

    /// Port B output value (combines port register and DDR). If ACR bit 7
    /// selects PB7-as-timer-output, bit 7 reflects the T1 toggle instead
    /// of the port B output register.
    #[must_use]
    pub fn port_b_output(&self) -> u8 {
        let mut out = self.port_b & self.ddr_b;
        if self.acr & 0x80 != 0 {
            out = (out & 0x7F) | if self.pb7 { 0x80 } else { 0 };
        }
        out
    }

    #[must_use]
    pub fn ifr(&self) -> u8 {
        self.ifr
    }

    #[must_use]
    pub fn ier(&self) -> u8 {
        self.ier
    }

    #[must_use]
    pub fn acr(&self) -> u8 {
        self.acr
    }

    /// Timer 1's live 16-bit counter value.
    #[must_use]
    pub fn timer1_counter(&self, wheel: &TimingWheel<Ctx>) -> u16 {
        self.t1_counter(wheel)
    }

    /// Timer 2's live 16-bit counter value.
    #[must_use]
    pub fn timer2_counter(&self, wheel: &TimingWheel<Ctx>) -> u16 {
        self.t2_counter(wheel)
    }

    fn t1_counter(&self, wheel: &TimingWheel<Ctx>) -> u16 {
        let raw = wheel.get_timer_value(self.t1).max(0);
        (raw.div_euclid(2) as u32 % 0x1_0000) as u16
    }

    fn t2_counter(&self, wheel: &TimingWheel<Ctx>) -> u16 {
        if self.acr & 0x20 != 0 {
            return self.t2_pulse_counter;
        }
        let raw = wheel.get_timer_value(self.t2).max(0);
        (raw.div_euclid(2) as u32 % 0x1_0000) as u16
    }

    fn read_port_a(&self) -> u8 {
        (self.port_a & self.ddr_a) | (self.external_a & !self.ddr_a)
    }

    fn read_port_b(&self) -> u8 {
        let mut val = (self.port_b & self.ddr_b) | (self.external_b & !self.ddr_b);
        if self.acr & 0x80 != 0 {
            val = (val & 0x7F) | if self.pb7 { 0x80 } else { 0 };
        }
        val
    }
}

impl<Ctx: Copy> Observable for Via6522<Ctx> {
    fn query(&self, path: &str) -> Option<emu_core::Value> {
        match path {
            "ifr" => Some(emu_core::Value::U8(self.ifr)),
            "ier" => Some(emu_core::Value::U8(self.ier)),
            "acr" => Some(emu_core::Value::U8(self.acr)),
            "pcr" => Some(emu_core::Value::U8(self.pcr)),
            "port_a" => Some(emu_core::Value::U8(self.port_a_output())),
            "port_b" => Some(emu_core::Value::U8(self.port_b_output())),
            "pb7" => Some(emu_core::Value::Bool(self.pb7)),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["ifr", "ier", "acr", "pcr", "port_a", "port_b", "pb7"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Ctx {
        T1,
        T2,
    }

    fn new_via() -> (Via6522<Ctx>, TimingWheel<Ctx>) {
        let mut wheel = TimingWheel::new();
        let via = Via6522::new(&mut wheel, Ctx::T1, Ctx::T2);
        (via, wheel)
    }

    fn advance(via: &mut Via6522<Ctx>, wheel: &mut TimingWheel<Ctx>, n: u64) {
        let t1 = via.timer1_id();
        let t2 = via.timer2_id();
        wheel.advance(n, |wheel, id, _ctx| {
            if id == t1 || id == t2 {
                via.on_timer_fired(wheel, id);
            }
        });
    }

    #[test]
    fn t1_continuous_fires_at_latch_plus_two_and_toggles_pb7() {
        let (mut via, mut wheel) = new_via();
        via.write(&mut wheel, 0x0B, 0x80 | 0x40); // PB7 out + T1 free-run
        via.write(&mut wheel, 0x04, 0x10); // T1L-L = 0x10
        via.write(&mut wheel, 0x05, 0x00); // T1C-H: start

        // period_for_latch(0x10) = 18 architectural cycles = 36 wheel ticks.
        advance(&mut via, &mut wheel, 36);
        via.sync(&mut wheel);
        assert_ne!(via.ifr() & IFR_T1, 0);
        assert_eq!(via.port_b_output() & 0x80, 0x80);

        via.write(&mut wheel, 0x0D, IFR_T1); // clear IFR for the next check
        advance(&mut via, &mut wheel, 36);
        via.sync(&mut wheel);
        assert_ne!(via.ifr() & IFR_T1, 0);
        assert_eq!(via.port_b_output() & 0x80, 0);
    }

    #[test]
    fn t1_one_shot_fires_once_then_free_wheels() {
        let (mut via, mut wheel) = new_via();
        via.write(&mut wheel, 0x04, 0x02);
        via.write(&mut wheel, 0x05, 0x00); // period = 4 arch cycles = 8 ticks

        advance(&mut via, &mut wheel, 8);
        via.sync(&mut wheel);
        assert_ne!(via.ifr() & IFR_T1, 0);

        via.write(&mut wheel, 0x0D, IFR_T1);
        // Free-wheel period is 0x10000 architectural cycles; one more
        // short advance must not re-raise the flag.
        advance(&mut via, &mut wheel, 8);
        via.sync(&mut wheel);
        assert_eq!(via.ifr() & IFR_T1, 0);
    }

    #[test]
    fn t1_masked_continuous_timer_catches_up_on_resync() {
        let (mut via, mut wheel) = new_via();
        via.write(&mut wheel, 0x0B, 0x40); // free-run, no PB7 routing to port
        via.write(&mut wheel, 0x04, 0x02);
        via.write(&mut wheel, 0x05, 0x00); // period = 4 arch cycles = 8 ticks
        // IER never enabled: firing should be masked off for a continuous
        // timer, so a long bulk advance doesn't stop at every period.
        advance(&mut via, &mut wheel, 8 * 5 + 3);
        assert_eq!(via.ifr() & IFR_T1, 0); // not yet resynced

        via.sync(&mut wheel);
        assert_ne!(via.ifr() & IFR_T1, 0);
    }

    #[test]
    fn t2_one_shot_fires_once() {
        let (mut via, mut wheel) = new_via();
        via.write(&mut wheel, 0x08, 0x02);
        via.write(&mut wheel, 0x09, 0x00); // period = 4 arch cycles = 8 ticks

        advance(&mut via, &mut wheel, 8);
        via.sync(&mut wheel);
        assert_ne!(via.ifr() & IFR_T2, 0);

        via.write(&mut wheel, 0x0D, IFR_T2);
        advance(&mut via, &mut wheel, 8);
        via.sync(&mut wheel);
        assert_eq!(via.ifr() & IFR_T2, 0);
    }

    #[test]
    fn t2_pulse_counting_mode_ignores_wheel_ticks_and_counts_pb6_edges() {
        let (mut via, mut wheel) = new_via();
        via.write(&mut wheel, 0x0B, 0x20); // ACR bit 5: T2 pulse-counting
        via.write(&mut wheel, 0x08, 0x02);
        via.write(&mut wheel, 0x09, 0x00); // count = 2 pulses

        // A long wheel advance must not move the counter at all.
        advance(&mut via, &mut wheel, 1000);
        via.sync(&mut wheel);
        assert_eq!(via.ifr() & IFR_T2, 0);

        // Only falling edges count; a rising edge is a no-op.
        via.set_pb6(true);
        assert_eq!(via.ifr() & IFR_T2, 0);

        via.set_pb6(false); // 1st falling edge: 2 -> 1
        via.set_pb6(true);
        via.set_pb6(false); // 2nd falling edge: 1 -> 0
        assert_eq!(via.ifr() & IFR_T2, 0);

        via.set_pb6(true);
        via.set_pb6(false); // 3rd falling edge: 0 -> 0xFFFF, underflow raises IFR
        assert_ne!(via.ifr() & IFR_T2, 0);

        via.write(&mut wheel, 0x0D, IFR_T2);
        via.set_pb6(true);
        via.set_pb6(false); // one-shot: must not re-raise on further edges
        assert_eq!(via.ifr() & IFR_T2, 0);
    }

    #[test]
    fn t1_read_low_clears_irq() {
        let (mut via, mut wheel) = new_via();
        via.write(&mut wheel, 0x04, 0x02);
        via.write(&mut wheel, 0x05, 0x00);
        advance(&mut via, &mut wheel, 8);
        let _ = via.read(&mut wheel, 0x04);
        assert_eq!(via.ifr() & IFR_T1, 0);
    }

    #[test]
    fn ifr_write_clears_flags() {
        let (mut via, mut wheel) = new_via();
        via.set_cb1(true);
        via.write(&mut wheel, 0x0C, 0x10); // CB1 positive edge going forward
        via.set_ca1(true);
        let pending = via.ifr();
        via.write(&mut wheel, 0x0D, pending);
        assert_eq!(via.ifr(), 0);
    }

    #[test]
    fn ier_set_clear_mode_and_bit7_readback() {
        let (mut via, mut wheel) = new_via();
        via.write(&mut wheel, 0x0E, 0x80 | IFR_T1 | IFR_CB1);
        assert_eq!(via.ier() & IFR_T1, IFR_T1);
        assert_eq!(via.ier() & IFR_CB1, IFR_CB1);

        via.write(&mut wheel, 0x0E, IFR_T1);
        assert_eq!(via.ier() & IFR_T1, 0);
        assert_eq!(via.ier() & IFR_CB1, IFR_CB1);

        assert_eq!(via.read(&mut wheel, 0x0E), 0x80 | IFR_CB1);
    }

    #[test]
    fn enabling_t1_interrupt_surfaces_a_missed_underflow() {
        let (mut via, mut wheel) = new_via();
        via.write(&mut wheel, 0x0B, 0x40); // continuous, masked
        via.write(&mut wheel, 0x04, 0x02);
        via.write(&mut wheel, 0x05, 0x00); // period = 8 ticks
        advance(&mut via, &mut wheel, 8);
        assert_eq!(via.ifr() & IFR_T1, 0);

        via.write(&mut wheel, 0x0E, 0x80 | IFR_T1); // enable: must resync
        assert_ne!(via.ifr() & IFR_T1, 0);
        assert!(via.irq_active());
    }

    #[test]
    fn ca1_edge_sets_flag() {
        let (mut via, mut wheel) = new_via();
        via.write(&mut wheel, 0x0C, 0x01); // CA1 positive edge
        via.set_ca1(true);
        assert_ne!(via.ifr() & IFR_CA1, 0);
    }

    #[test]
    fn cb1_negative_edge() {
        let (mut via, _wheel) = new_via();
        via.set_cb1(true); // establish a high baseline with default PCR (negative edge)
        assert_eq!(via.ifr() & IFR_CB1, 0);
        via.set_cb1(false); // falling edge
        assert_ne!(via.ifr() & IFR_CB1, 0);
    }

    #[test]
    fn external_port_reads() {
        let (mut via, mut wheel) = new_via();
        via.ddr_a = 0x0F;
        via.port_a = 0xAB;
        via.external_a = 0xC0;
        let val = via.read(&mut wheel, 0x0F);
        assert_eq!(val, 0xCB);
    }

    #[test]
    fn read_orb_clears_cb_flags_but_not_t1() {
        let (mut via, mut wheel) = new_via();
        via.ifr = IFR_CB1 | IFR_CB2 | IFR_T1;
        let _ = via.read(&mut wheel, 0x00);
        assert_eq!(via.ifr & IFR_CB1, 0);
        assert_eq!(via.ifr & IFR_CB2, 0);
        assert_ne!(via.ifr & IFR_T1, 0);
    }

    #[test]
    fn ora_no_handshake_preserves_ca_flags() {
        let (mut via, mut wheel) = new_via();
        via.ifr = IFR_CA1 | IFR_CA2;
        let _ = via.read(&mut wheel, 0x0F);
        assert_ne!(via.ifr & IFR_CA1, 0);
        assert_ne!(via.ifr & IFR_CA2, 0);
    }

    #[test]
    fn latch_only_write_does_not_start_timer() {
        let (mut via, mut wheel) = new_via();
        via.write(&mut wheel, 0x06, 0x10);
        via.write(&mut wheel, 0x07, 0x00);
        // The timer registered at construction time is still unarmed.
        assert!(!wheel.is_armed(via.timer1_id()));
    }
}
