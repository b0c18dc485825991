//! Deterministic cycle-deadline event scheduler.
//!
//! The timing wheel is the single owner of "what happens next, and when".
//! The CPU (JIT or interpreter) advances it in bulk between dispatcher
//! exits rather than ticking every component on every cycle — that bulk
//! advance is what lets the JIT run long straight-line stretches of
//! translated code without leaving it.
//!
//! Every timer's countdown is stored relative to "now": [`advance`]
//! subtracts the elapsed ticks from every armed timer and fires the ones
//! that crossed zero, in registration order. A timer that underflows stays
//! armed and keeps counting (through negative values, or wrapping by
//! whatever period its owner cares about) until the owner re-arms it —
//! the wheel itself never reloads or disarms on your behalf.

use emu_core::{Observable, Ticks, Value};

/// Opaque handle to a registered timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u32);

struct TimerSlot<Ctx> {
    context: Ctx,
    /// Ticks remaining until this timer fires. Negative means overdue.
    countdown: i64,
    /// Whether this timer is counting at all.
    armed: bool,
    /// Whether crossing zero should invoke the callback. A timer can be
    /// armed (still decrementing, still observable via
    /// [`TimingWheel::timer_value`]) without firing — this is how Timer 2's
    /// "count once, then free-wheel silently" behavior and general
    /// sub-deadline tracking are expressed.
    firing: bool,
}

/// A priority queue of cycle-deadline timers shared by the CPU and
/// peripherals.
///
/// `Ctx` is the small, `Copy` tag a caller associates with each timer (e.g.
/// "System VIA Timer 1") so that the callback passed to [`advance`] knows
/// which owner fired without the wheel needing to store a trait object —
/// closures that both live inside a peripheral and get invoked *by* that
/// peripheral's own timer would otherwise create an ownership cycle.
pub struct TimingWheel<Ctx> {
    timers: Vec<TimerSlot<Ctx>>,
    /// Monotonic count of ticks this wheel has ever been advanced by.
    now: u64,
}

impl<Ctx: Copy> TimingWheel<Ctx> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            timers: Vec::new(),
            now: 0,
        }
    }

    /// Register a new timer, initially unarmed and non-firing.
    ///
    /// `context` is the opaque tag handed back to the [`advance`] callback
    /// when this timer fires.
    pub fn register_timer(&mut self, context: Ctx) -> TimerId {
        self.timers.push(TimerSlot {
            context,
            countdown: 0,
            armed: false,
            firing: false,
        });
        TimerId((self.timers.len() - 1) as u32)
    }

    fn slot(&self, id: TimerId) -> &TimerSlot<Ctx> {
        &self.timers[id.0 as usize]
    }

    fn slot_mut(&mut self, id: TimerId) -> &mut TimerSlot<Ctx> {
        &mut self.timers[id.0 as usize]
    }

    /// Arm `id` with a fresh countdown, measured from now. The fire tick is
    /// `now() + countdown`.
    ///
    /// # Panics
    ///
    /// Panics if `countdown` is negative — arming a timer in the past is a
    /// timing-wheel invariant violation and is always a caller bug, not a
    /// recoverable condition (see the error-handling design: "a callback
    /// arms a timer in the past" is a fatal assertion).
    pub fn start_timer(&mut self, id: TimerId, countdown: i64) {
        if countdown < 0 {
            log::error!(
                "timing wheel invariant violation: timer {id:?} armed with a negative countdown ({countdown})"
            );
        }
        assert!(
            countdown >= 0,
            "timing wheel invariant violation: timer {id:?} armed with a negative countdown ({countdown})"
        );
        let slot = self.slot_mut(id);
        slot.countdown = countdown;
        slot.armed = true;
    }

    /// Enable or disable whether `id` invokes its callback on underflow.
    /// The timer keeps decrementing either way as long as it's armed.
    pub fn set_firing(&mut self, id: TimerId, on: bool) {
        self.slot_mut(id).firing = on;
    }

    #[must_use]
    pub fn is_firing(&self, id: TimerId) -> bool {
        self.slot(id).firing
    }

    /// Directly set the countdown (relative to now) without changing the
    /// armed/firing state. Used for partial-latch writes that must not
    /// restart or clear the timer.
    pub fn set_timer_value(&mut self, id: TimerId, value: i64) {
        self.slot_mut(id).countdown = value;
    }

    /// Read the current countdown (relative to now).
    #[must_use]
    pub fn get_timer_value(&self, id: TimerId) -> i64 {
        self.slot(id).countdown
    }

    #[must_use]
    pub fn is_armed(&self, id: TimerId) -> bool {
        self.slot(id).armed
    }

    /// Disarm `id`: it stops decrementing and stops firing until
    /// [`start_timer`] is called again.
    pub fn stop_timer(&mut self, id: TimerId) {
        let slot = self.slot_mut(id);
        slot.armed = false;
    }

    /// The monotonic tick counter: total ticks this wheel has ever advanced.
    #[must_use]
    pub fn now(&self) -> Ticks {
        Ticks::new(self.now)
    }

    /// Advance every armed timer's countdown by `n` ticks and fire the
    /// callback, in registration order, for each timer that crossed from a
    /// positive countdown to zero-or-negative this call and has `firing`
    /// set.
    ///
    /// `on_fire` receives `&mut self` so a callback can re-arm its own (or
    /// any other) timer; timers it arms with a still-future deadline are
    /// not retroactively checked within this same `advance` call.
    pub fn advance(&mut self, n: u64, mut on_fire: impl FnMut(&mut Self, TimerId, Ctx)) {
        self.now += n;
        let delta = n as i64;
        let mut fired = Vec::new();
        for (idx, slot) in self.timers.iter_mut().enumerate() {
            if !slot.armed {
                continue;
            }
            let prev = slot.countdown;
            slot.countdown -= delta;
            if prev > 0 && slot.countdown <= 0 && slot.firing {
                fired.push((TimerId(idx as u32), slot.context));
            }
        }
        for (id, ctx) in fired {
            on_fire(self, id, ctx);
        }
    }

    /// The number of ticks the CPU may safely execute before the next
    /// relevant event. `u64::MAX` if no timer is armed and firing.
    #[must_use]
    pub fn next_deadline(&self) -> u64 {
        self.timers
            .iter()
            .filter(|slot| slot.armed && slot.firing && slot.countdown > 0)
            .map(|slot| slot.countdown as u64)
            .min()
            .unwrap_or(u64::MAX)
    }
}

impl<Ctx: Copy> Default for TimingWheel<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Ctx: Copy> Observable for TimingWheel<Ctx> {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "now" => Some(Value::U64(self.now)),
            "next_deadline" => Some(Value::U64(self.next_deadline())),
            "timer_count" => Some(Value::U64(self.timers.len() as u64)),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["now", "next_deadline", "timer_count"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Owner {
        A,
        B,
    }

    #[test]
    fn fires_on_underflow_in_registration_order() {
        let mut wheel = TimingWheel::new();
        let a = wheel.register_timer(Owner::A);
        let b = wheel.register_timer(Owner::B);
        wheel.start_timer(a, 5);
        wheel.set_firing(a, true);
        wheel.start_timer(b, 5);
        wheel.set_firing(b, true);

        let mut order = Vec::new();
        wheel.advance(5, |_, id, ctx| order.push((id, ctx)));
        assert_eq!(order, vec![(a, Owner::A), (b, Owner::B)]);
    }

    #[test]
    fn does_not_refire_while_overdue() {
        let mut wheel = TimingWheel::new();
        let a = wheel.register_timer(Owner::A);
        wheel.start_timer(a, 3);
        wheel.set_firing(a, true);

        let mut fires = 0;
        wheel.advance(3, |_, _, _| fires += 1);
        assert_eq!(fires, 1);
        // Still armed, now deeply negative, but must not fire again.
        wheel.advance(1000, |_, _, _| fires += 1);
        assert_eq!(fires, 1);
        assert!(wheel.get_timer_value(a) < 0);
    }

    #[test]
    fn rearm_inside_callback_does_not_retroactively_fire() {
        let mut wheel = TimingWheel::new();
        let a = wheel.register_timer(Owner::A);
        wheel.start_timer(a, 2);
        wheel.set_firing(a, true);

        let mut fires = 0;
        wheel.advance(2, |wheel, id, _| {
            fires += 1;
            wheel.start_timer(id, 100);
        });
        assert_eq!(fires, 1);
        assert_eq!(wheel.get_timer_value(a), 100);
    }

    #[test]
    fn next_deadline_is_minimum_armed_firing_countdown() {
        let mut wheel = TimingWheel::new();
        let a = wheel.register_timer(Owner::A);
        let b = wheel.register_timer(Owner::B);
        wheel.start_timer(a, 10);
        wheel.set_firing(a, true);
        wheel.start_timer(b, 4);
        wheel.set_firing(b, true);
        assert_eq!(wheel.next_deadline(), 4);

        wheel.advance(4, |_, _, _| {});
        // b fired and is now overdue (countdown <= 0), so it no longer
        // contributes to next_deadline.
        assert_eq!(wheel.next_deadline(), 6);
    }

    #[test]
    fn set_firing_off_suppresses_callback_but_keeps_counting() {
        let mut wheel = TimingWheel::new();
        let a = wheel.register_timer(Owner::A);
        wheel.start_timer(a, 2);
        wheel.set_firing(a, false);

        let mut fires = 0;
        wheel.advance(10, |_, _, _| fires += 1);
        assert_eq!(fires, 0);
        assert_eq!(wheel.get_timer_value(a), -8);
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn arming_in_the_past_panics() {
        let mut wheel = TimingWheel::new();
        let a = wheel.register_timer(Owner::A);
        wheel.start_timer(a, -1);
    }

    #[test]
    fn now_is_monotonic_non_decreasing() {
        let mut wheel = TimingWheel::new();
        let a = wheel.register_timer(Owner::A);
        wheel.start_timer(a, 1000);
        let mut last = wheel.now().get();
        for _ in 0..10 {
            wheel.advance(3, |_, _, _| {});
            let now = wheel.now().get();
            assert!(now >= last);
            last = now;
        }
    }
}
