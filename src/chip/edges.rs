use std::ops::{
	Deref,
	DerefMut,
};

use super::ChipPins;

/// Pins borrowed for the duration of a transfer; leaves the critical
/// section when dropped.
pub struct CriticalSection<'a, P: ?Sized + ChipPins + 'a>(&'a mut P);

impl<'a, P: ?Sized + ChipPins> CriticalSection<'a, P> {
	pub fn enter(pins: &'a mut P) -> Self {
		pins.enter_critical();
		CriticalSection(pins)
	}
}

impl<'a, P: ?Sized + ChipPins> Drop for CriticalSection<'a, P> {
	fn drop(&mut self) {
		self.0.leave_critical();
	}
}

impl<'a, P: ?Sized + ChipPins> Deref for CriticalSection<'a, P> {
	type Target = P;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl<'a, P: ?Sized + ChipPins> DerefMut for CriticalSection<'a, P> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.0
	}
}

/// Follows the clock line driven by the chip, one falling edge at a time.
///
/// Every poll of the clock line costs one unit of the poll budget; once it
/// is used up no further edges are reported.
pub struct ClockFollower<'a, P: ?Sized + ChipPins + 'a> {
	pins: &'a mut P,
	prev_clock: bool,
	remaining: u32,
	edges: usize,
}

impl<'a, P: ?Sized + ChipPins> ClockFollower<'a, P> {
	/// the clock is expected to idle high
	pub fn new(pins: &'a mut P, budget: u32) -> Self {
		ClockFollower {
			pins,
			prev_clock: true,
			remaining: budget,
			edges: 0,
		}
	}

	/// start a new phase: fresh budget and edge count, keeps the clock state
	pub fn restart(&mut self, budget: u32) {
		self.remaining = budget;
		self.edges = 0;
	}

	/// falling edges seen since the last `restart`
	pub fn edges(&self) -> usize {
		self.edges
	}

	/// returns false if the budget ran out before the next falling edge
	pub fn wait_falling_edge(&mut self) -> bool {
		while self.remaining > 0 {
			self.remaining -= 1;
			let clock = self.pins.read_clock();
			self.pins.feed_watchdog();
			let falling = self.prev_clock && !clock;
			self.prev_clock = clock;
			if falling {
				self.edges += 1;
				return true;
			}
		}
		false
	}

	pub fn set_data(&mut self, high: bool) {
		self.pins.set_data(high);
	}
}
