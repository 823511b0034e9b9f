use std::fmt;

use crate::image::PROGRAM_SIZE;

use super::{
	ChipPins,
	ClockFollower,
	CriticalSection,
};

/// falling clock edges in the header preceding the program data
pub const HEADER_EDGES: usize = 37;

/// default number of clock polls allowed per phase
pub const POLL_BUDGET: u32 = 0x8000;

/// The header is what the chip's EEPROM read looks like on the wire:
/// device address, two address bytes, repeated start with device address.
/// We acknowledge each of them by pulling data low on the falling edge
/// (counted from zero) before the acknowledge clock.
fn header_data_level(edge: usize) -> bool {
	match edge {
		8 | 17 | 26 | 36 => false,
		_ => true,
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Phase {
	Header,
	Data,
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Phase::Header => write!(f, "header"),
			Phase::Data => write!(f, "data"),
		}
	}
}

#[derive(Debug, Fail)]
pub enum TransferError {
	#[fail(display = "FV-1 clock stalled in {} phase after {} falling edges (chip unresponsive or not connected)", phase, edges)]
	Timeout {
		phase: Phase,
		edges: usize,
	},
	#[fail(display = "program has {} bytes, expected 512", _0)]
	ProgramSize(usize),
}

fn send_header<P: ?Sized + ChipPins>(clock: &mut ClockFollower<P>) -> Result<(), TransferError> {
	for edge in 0..HEADER_EDGES {
		if !clock.wait_falling_edge() {
			return Err(TransferError::Timeout {
				phase: Phase::Header,
				edges: clock.edges(),
			});
		}
		clock.set_data(header_data_level(edge));
	}
	Ok(())
}

// 8 data bits (MSB first) and a 9th clock for the master acknowledge, where
// we release the line.
fn send_data<P: ?Sized + ChipPins>(clock: &mut ClockFollower<P>, program: &[u8]) -> Result<(), TransferError> {
	for &byte in program {
		for bit in (0..9).rev() {
			if !clock.wait_falling_edge() {
				return Err(TransferError::Timeout {
					phase: Phase::Data,
					edges: clock.edges(),
				});
			}
			// bit 0 is the acknowledge slot
			let level = bit == 0 || 0 != (byte >> (bit - 1)) & 1;
			clock.set_data(level);
		}
	}
	Ok(())
}

/// Clock one 512-byte program into the FV-1.
///
/// Pulses the notify line so the chip reloads its program, then answers
/// the chip's read request. Nothing is read back; both phases fail with
/// `Timeout` if the chip stops clocking for longer than `budget` polls.
pub fn transfer_program_with_budget<P>(pins: &mut P, program: &[u8], budget: u32) -> Result<(), TransferError>
where
	P: ?Sized + ChipPins,
{
	if program.len() != PROGRAM_SIZE {
		return Err(TransferError::ProgramSize(program.len()));
	}

	pins.release();
	let mut cs = CriticalSection::enter(pins);

	cs.set_notify(false);
	cs.notify_delay();
	cs.set_data(true);
	cs.set_notify(true);

	let mut clock = ClockFollower::new(&mut *cs, budget);
	let result = match send_header(&mut clock) {
		Ok(()) => {
			clock.restart(budget);
			send_data(&mut clock, program)
		},
		Err(e) => Err(e),
	};
	// released on timeouts too
	clock.set_data(true);

	result
}

pub fn transfer_program<P: ?Sized + ChipPins>(pins: &mut P, program: &[u8]) -> Result<(), TransferError> {
	transfer_program_with_budget(pins, program, POLL_BUDGET)
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Toggles the clock on every poll for `cycles` full cycles, then
	/// stalls high. Samples the data line on rising edges like the chip.
	struct SimulatedChip {
		cycles: usize,
		polls: usize,
		data: bool,
		notify: Vec<bool>,
		sampled: Vec<bool>,
		feeds: usize,
		// feeds while notify is held low
		notify_low_feeds: usize,
		critical: bool,
		critical_entered: usize,
	}

	impl SimulatedChip {
		fn new(cycles: usize) -> Self {
			SimulatedChip {
				cycles,
				polls: 0,
				data: true,
				notify: Vec::new(),
				sampled: Vec::new(),
				feeds: 0,
				notify_low_feeds: 0,
				critical: false,
				critical_entered: 0,
			}
		}
	}

	impl ChipPins for SimulatedChip {
		fn read_clock(&mut self) -> bool {
			assert!(self.critical, "clock polled outside critical section");
			let poll = self.polls;
			self.polls += 1;
			// poll 2n: low (falling edge of cycle n), poll 2n+1: high
			if poll / 2 >= self.cycles {
				return true;
			}
			let high = poll % 2 == 1;
			if high {
				self.sampled.push(self.data);
			}
			high
		}

		fn set_data(&mut self, high: bool) {
			self.data = high;
		}

		fn set_notify(&mut self, high: bool) {
			self.notify.push(high);
		}

		fn feed_watchdog(&mut self) {
			self.feeds += 1;
			if self.notify.last() == Some(&false) {
				self.notify_low_feeds += 1;
			}
		}

		fn enter_critical(&mut self) {
			self.critical = true;
			self.critical_entered += 1;
		}

		fn leave_critical(&mut self) {
			self.critical = false;
		}
	}

	fn program() -> Vec<u8> {
		(0..PROGRAM_SIZE).map(|i| (i * 7 + 0x35) as u8).collect()
	}

	fn expected_bits(program: &[u8]) -> Vec<bool> {
		let mut bits: Vec<bool> = (0..HEADER_EDGES).map(header_data_level).collect();
		for &byte in program {
			for bit in (0..8).rev() {
				bits.push(0 != (byte >> bit) & 1);
			}
			bits.push(true);
		}
		bits
	}

	#[test]
	fn full_transfer() {
		let program = program();
		let mut chip = SimulatedChip::new(HEADER_EDGES + 9 * PROGRAM_SIZE);
		transfer_program(&mut chip, &program).unwrap();

		// the chip samples the last acknowledge slot after we returned
		let last = chip.data;
		chip.sampled.push(last);
		assert_eq!(chip.sampled, expected_bits(&program));
		// notify: released, pulled low, released
		assert_eq!(chip.notify, vec![true, false, true]);
		assert!(!chip.critical);
		assert_eq!(chip.critical_entered, 1);
		assert!(chip.notify_low_feeds > 0);
		assert_eq!(chip.feeds, chip.polls + chip.notify_low_feeds);
		assert!(chip.data);
	}

	#[test]
	fn header_pattern() {
		let low: Vec<usize> = (0..HEADER_EDGES).filter(|&e| !header_data_level(e)).collect();
		assert_eq!(low, vec![8, 17, 26, 36]);
	}

	#[test]
	fn stalled_header_times_out() {
		let mut chip = SimulatedChip::new(20);
		match transfer_program_with_budget(&mut chip, &program(), 1000) {
			Err(TransferError::Timeout { phase: Phase::Header, edges: 20 }) => (),
			other => panic!("unexpected result: {:?}", other),
		}
		assert_eq!(chip.polls, 1000);
		assert!(!chip.critical);
	}

	#[test]
	fn dead_chip_times_out() {
		let mut chip = SimulatedChip::new(0);
		match transfer_program(&mut chip, &program()) {
			Err(TransferError::Timeout { phase: Phase::Header, edges: 0 }) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn stalled_data_times_out() {
		let mut chip = SimulatedChip::new(HEADER_EDGES + 9 * 100 + 4);
		match transfer_program(&mut chip, &program()) {
			Err(TransferError::Timeout { phase: Phase::Data, edges }) => assert_eq!(edges, 9 * 100 + 4),
			other => panic!("unexpected result: {:?}", other),
		}
		assert!(!chip.critical);
	}

	#[test]
	fn timeout_releases_data_line() {
		// stalls right after the first acknowledge was pulled low
		let mut chip = SimulatedChip::new(9);
		assert!(transfer_program_with_budget(&mut chip, &program(), 1000).is_err());
		assert_eq!(chip.sampled.last(), Some(&false));
		assert!(chip.data);

		// byte 100 is 0xf1: the 5th bit sent is a zero
		let program = program();
		assert_eq!(program[100], 0xf1);
		let mut chip = SimulatedChip::new(HEADER_EDGES + 9 * 100 + 5);
		assert!(transfer_program_with_budget(&mut chip, &program, 1000).is_err());
		// low when the chip stopped clocking, released afterwards
		assert_eq!(chip.sampled.last(), Some(&false));
		assert!(chip.data);
	}

	#[test]
	fn wrong_program_size() {
		let mut chip = SimulatedChip::new(0);
		match transfer_program(&mut chip, &[0u8; 100]) {
			Err(TransferError::ProgramSize(100)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
		assert_eq!(chip.critical_entered, 0);
	}
}
