/// Boot link of the SpinSemi FV-1
///
/// On a notify pulse the FV-1 loads one program (512 bytes) from what it
/// believes to be its boot EEPROM at I²C address 0x50. We pretend to be that
/// EEPROM, bit by bit, following the clock the chip generates:
///
/// - header: 37 clocks (device address, 16-bit memory address, repeated
///   start with device address); we only acknowledge at the right places
/// - data: 512 bytes, each 8 bits MSB first plus an acknowledge clock from
///   the chip.
///
/// The chip never waits for us, so the clock has to be polled without
/// interruption.

mod edges;
mod hardware;
mod transfer;

pub use self::edges::{
	ClockFollower,
	CriticalSection,
};

pub use self::hardware::{
	ChipPins,
	NOTIFY_PULSE,
};

pub use self::transfer::{
	HEADER_EDGES,
	POLL_BUDGET,
	Phase,
	TransferError,
	transfer_program,
	transfer_program_with_budget,
};
