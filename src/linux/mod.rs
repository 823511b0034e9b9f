/// Linux backends: sysfs GPIO for the FV-1 link and the bus select pin,
/// i2c-dev for the external EEPROM.

mod gpio;
mod i2c;
mod realtime;

pub use self::gpio::{
	Direction,
	SysfsGpio,
};

pub use self::i2c::{
	EepromGeometry,
	GEOMETRY_24LC32A,
	I2cEeprom,
};

pub use self::realtime::RealtimeGuard;

use crate::chip::ChipPins;
use crate::eeprom::BusSelectPin;

pub struct LinuxChipPins {
	clock: SysfsGpio,
	data: SysfsGpio,
	notify: SysfsGpio,
	realtime: Option<RealtimeGuard>,
}

impl LinuxChipPins {
	/// clock is an input; data and notify are open drain, released at start
	pub fn open(clock: u32, data: u32, notify: u32) -> crate::AResult<Self> {
		Ok(LinuxChipPins {
			clock: SysfsGpio::open(clock, Direction::Input)?,
			data: SysfsGpio::open(data, Direction::Input)?,
			notify: SysfsGpio::open(notify, Direction::Input)?,
			realtime: None,
		})
	}
}

impl ChipPins for LinuxChipPins {
	fn read_clock(&mut self) -> bool {
		match self.clock.read() {
			Ok(v) => v,
			Err(e) => {
				// a stuck high clock ends in a transfer timeout
				error!("GPIO {}: couldn't read clock: {}", self.clock.number(), e);
				true
			},
		}
	}

	fn set_data(&mut self, high: bool) {
		if let Err(e) = self.data.set_open_drain(high) {
			error!("GPIO {}: couldn't set data line: {}", self.data.number(), e);
		}
	}

	fn set_notify(&mut self, high: bool) {
		if let Err(e) = self.notify.set_open_drain(high) {
			error!("GPIO {}: couldn't set notify line: {}", self.notify.number(), e);
		}
	}

	fn enter_critical(&mut self) {
		self.realtime = Some(RealtimeGuard::enter());
	}

	fn leave_critical(&mut self) {
		self.realtime = None;
	}
}

pub struct LinuxSelectPin(SysfsGpio);

impl LinuxSelectPin {
	pub fn open(number: u32) -> crate::AResult<Self> {
		Ok(LinuxSelectPin(SysfsGpio::open(number, Direction::High)?))
	}
}

impl BusSelectPin for LinuxSelectPin {
	fn set_select(&mut self, high: bool) {
		if let Err(e) = self.0.write(high) {
			error!("GPIO {}: couldn't set EEPROM select: {}", self.0.number(), e);
		}
	}
}
