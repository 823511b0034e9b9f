//! External boot EEPROM of the FV-1 (24LC32A or compatible)
//!
//! The FV-1 normally reads its programs from us (see `chip`); a select pin
//! hands the I²C bus to an external EEPROM instead, which can then be
//! burned with the full image so the chip boots without this programmer.

use std::fmt;
use std::thread;
use std::time::Duration;

use crate::chip::ChipPins;
use crate::image::{
	FirmwareImage,
	IMAGE_SIZE,
};

/// delay between probes while waiting for the EEPROM to show up
pub const PROBE_RETRY: Duration = Duration::from_millis(250);

/// notify (reset) pulse length when handing the bus to the external EEPROM
pub const BUS_SWITCH_RESET: Duration = Duration::from_millis(100);

pub trait EepromDevice {
	/// bytes per page; writes never cross a page boundary
	fn page_size(&self) -> usize;

	/// total size in bytes
	fn capacity(&self) -> usize;

	fn is_present(&mut self) -> bool;

	fn read(&mut self, address: usize, target: &mut [u8]) -> crate::AResult<()>;

	/// write (at most) one page
	fn write_page(&mut self, address: usize, data: &[u8]) -> crate::AResult<()>;
}

#[derive(Debug, Fail)]
pub enum EepromError {
	#[fail(display = "no firmware image loaded")]
	NoImage,
	#[fail(display = "Verify failed at 0x{:04x}: read 0x{:02x}, expected 0x{:02x}", address, read, expected)]
	VerifyMismatch {
		address: usize,
		read: u8,
		expected: u8,
	},
}

/// page sized chunks `(address, length)` covering the image, cut at the
/// device capacity
fn pages(page_size: usize, capacity: usize) -> impl Iterator<Item = (usize, usize)> {
	let end = IMAGE_SIZE.min(capacity);
	let step = page_size.max(1);
	(0..end).step_by(step).map(move |address| (address, step.min(end - address)))
}

/// Block until the device answers; there is no upper bound.
pub fn wait_for_device<D: EepromDevice + ?Sized>(device: &mut D, retry: Duration) {
	while !device.is_present() {
		warn!("No memory detected.");
		thread::sleep(retry);
	}
}

pub fn write_image<D: EepromDevice + ?Sized>(device: &mut D, image: &FirmwareImage) -> crate::AResult<()> {
	let capacity = device.capacity();
	if capacity < IMAGE_SIZE {
		warn!("EEPROM has only {} bytes, image truncated (needs {})", capacity, IMAGE_SIZE);
	}

	let data = image.as_bytes();
	for (address, len) in pages(device.page_size(), capacity) {
		with_context!(("writing EEPROM page at 0x{:04x}", address),
			device.write_page(address, &data[address..address + len])
		)?;
	}

	Ok(())
}

/// Compare the EEPROM contents with `image`, page by page.
///
/// A single differing byte is logged and tolerated; the second one aborts
/// the verification.
// TODO: confirm whether one mismatch should really pass
pub fn verify_image<D: EepromDevice + ?Sized>(device: &mut D, image: &FirmwareImage) -> crate::AResult<()> {
	let page_size = device.page_size();
	let capacity = device.capacity();
	let expected = image.as_bytes();
	let mut page = vec![0u8; page_size.max(1)];
	let mut mismatches = 0usize;

	for (index, (address, len)) in pages(page_size, capacity).enumerate() {
		with_context!(("reading EEPROM page at 0x{:04x}", address),
			device.read(address, &mut page[..len])
		)?;

		for (offset, &read) in page[..len].iter().enumerate() {
			let expected = expected[address + offset];
			if read == expected {
				continue;
			}
			let mismatch = EepromError::VerifyMismatch {
				address: address + offset,
				read,
				expected,
			};
			error!("{}", mismatch);
			mismatches += 1;
			if mismatches > 1 {
				return Err(mismatch.into());
			}
		}

		if 0 == (index + 1) % 16 {
			debug!("verified {} bytes", address + len);
		}
	}

	info!("Verification PASSED!");
	Ok(())
}

/// wait for the device, write the image and read it back
pub fn burn<D: EepromDevice + ?Sized>(device: &mut D, image: Option<&FirmwareImage>, retry: Duration) -> crate::AResult<()> {
	let image = image.ok_or(EepromError::NoImage)?;

	wait_for_device(device, retry);

	info!("Writing EEPROM...");
	write_image(device, image)?;
	info!("Verifying EEPROM...");
	verify_image(device, image)
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum EepromBus {
	/// the FV-1 talks to us (programs are clocked in through `chip`)
	Onboard,
	/// the FV-1 talks to the external EEPROM
	External,
}

impl EepromBus {
	pub fn other(self) -> Self {
		match self {
			EepromBus::Onboard => EepromBus::External,
			EepromBus::External => EepromBus::Onboard,
		}
	}
}

impl fmt::Display for EepromBus {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			EepromBus::Onboard => write!(f, "onboard"),
			EepromBus::External => write!(f, "external EEPROM"),
		}
	}
}

pub trait BusSelectPin {
	/// high: onboard, low: external EEPROM
	fn set_select(&mut self, high: bool);
}

#[derive(Debug)]
pub struct BusSelect<S: BusSelectPin> {
	pin: S,
	bus: EepromBus,
	reset_pulse: Duration,
}

impl<S: BusSelectPin> BusSelect<S> {
	/// drives the pin to "onboard"
	pub fn new(pin: S) -> Self {
		Self::with_reset_pulse(pin, BUS_SWITCH_RESET)
	}

	pub fn with_reset_pulse(mut pin: S, reset_pulse: Duration) -> Self {
		pin.set_select(true);
		BusSelect {
			pin,
			bus: EepromBus::Onboard,
			reset_pulse,
		}
	}

	pub fn bus(&self) -> EepromBus {
		self.bus
	}

	/// Switching to the external EEPROM resets the chip so it boots from
	/// there. Selecting the current bus does nothing.
	pub fn select<P: ChipPins + ?Sized>(&mut self, bus: EepromBus, chip: &mut P) -> EepromBus {
		if bus == self.bus {
			return self.bus;
		}

		match bus {
			EepromBus::Onboard => {
				self.pin.set_select(true);
			},
			EepromBus::External => {
				self.pin.set_select(false);
				chip.set_notify(false);
				thread::sleep(self.reset_pulse);
				chip.set_notify(true);
			},
		}
		self.bus = bus;
		info!("EEPROM bus: {}", bus);
		bus
	}

	pub fn toggle<P: ChipPins + ?Sized>(&mut self, chip: &mut P) -> EepromBus {
		let other = self.bus.other();
		self.select(other, chip)
	}
}
