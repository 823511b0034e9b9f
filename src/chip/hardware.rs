use std::hint;
use std::time::{
	Duration,
	Instant,
};

/// how long the notify line is held low before the FV-1 starts clocking
pub const NOTIFY_PULSE: Duration = Duration::from_micros(50);

/// Pins of the FV-1 boot link.
///
/// The FV-1 is the bus master: it drives the clock line and reads its
/// program through the data line as if it was talking to a boot EEPROM. We
/// only ever read the clock, and drive data (open drain: `true` releases the
/// line, which is pulled high) and the notify (reset) line.
pub trait ChipPins {
	fn read_clock(&mut self) -> bool;
	fn set_data(&mut self, high: bool);
	fn set_notify(&mut self, high: bool);

	/// release all lines we drive
	fn release(&mut self) {
		self.set_data(true);
		self.set_notify(true);
	}

	/// called on every poll while a transfer is running; must be cheap
	fn feed_watchdog(&mut self) {
	}

	/// stop everything that could delay us while following the chip clock
	fn enter_critical(&mut self) {
	}

	fn leave_critical(&mut self) {
	}

	/// busy wait with notify pulled low; sleeping isn't possible while in
	/// the critical section
	fn notify_delay(&mut self) {
		let start = Instant::now();
		while start.elapsed() < NOTIFY_PULSE {
			self.feed_watchdog();
			hint::spin_loop();
		}
	}
}
