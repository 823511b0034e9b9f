use std::fs;
use std::io::{
	self,
	Read,
	Write,
};
use std::os::unix::io::AsRawFd;
use std::thread;
use std::time::Duration;

use libc::{
	c_ulong,
	ioctl,
};

use crate::eeprom::EepromDevice;

// from linux/i2c-dev.h
const I2C_SLAVE: c_ulong = 0x0703;

/// a page write takes up to 5ms; poll for the acknowledge meanwhile
const WRITE_CYCLE_POLL: Duration = Duration::from_millis(1);
const WRITE_CYCLE_POLLS: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct EepromGeometry {
	pub capacity: usize,
	pub page_size: usize,
}

/// Microchip 24LC32A: 32 kbit, 32-byte pages, 16-bit addresses
pub const GEOMETRY_24LC32A: EepromGeometry = EepromGeometry {
	capacity: 4096,
	page_size: 32,
};

/// EEPROM with 16-bit addressing behind a linux i2c-dev bus
pub struct I2cEeprom {
	file: fs::File,
	geometry: EepromGeometry,
}

impl I2cEeprom {
	pub fn open(bus: u32, address: u16, geometry: EepromGeometry) -> crate::AResult<Self> {
		let path = format!("/dev/i2c-{}", bus);
		with_context!(("couldn't open EEPROM 0x{:02x} on {}", address, path), {
			let file = fs::OpenOptions::new()
				.read(true)
				.write(true)
				.open(&path)?;

			if 0 > unsafe { ioctl(file.as_raw_fd(), I2C_SLAVE as _, address as c_ulong) } {
				return Err(failure::Error::from(io::Error::last_os_error()));
			}

			Ok(I2cEeprom {
				file,
				geometry,
			})
		})
	}

	fn address_bytes(address: usize) -> [u8; 2] {
		[(address >> 8) as u8, address as u8]
	}

	// setting the address pointer is a write without data; the device NAKs
	// it while it is busy or missing
	fn set_address(&mut self, address: usize) -> io::Result<()> {
		self.file.write_all(&Self::address_bytes(address))
	}

	fn wait_write_cycle(&mut self, address: usize) -> crate::AResult<()> {
		for _ in 0..WRITE_CYCLE_POLLS {
			thread::sleep(WRITE_CYCLE_POLL);
			if self.set_address(address).is_ok() {
				return Ok(());
			}
		}
		bail!("EEPROM didn't finish write cycle at 0x{:04x}", address);
	}
}

impl EepromDevice for I2cEeprom {
	fn page_size(&self) -> usize {
		self.geometry.page_size
	}

	fn capacity(&self) -> usize {
		self.geometry.capacity
	}

	fn is_present(&mut self) -> bool {
		self.set_address(0).is_ok()
	}

	fn read(&mut self, address: usize, target: &mut [u8]) -> crate::AResult<()> {
		ensure!(address + target.len() <= self.geometry.capacity, "read beyond EEPROM capacity");
		self.set_address(address)?;
		self.file.read_exact(target)?;
		Ok(())
	}

	fn write_page(&mut self, address: usize, data: &[u8]) -> crate::AResult<()> {
		let page_size = self.geometry.page_size;
		ensure!(data.len() <= page_size - address % page_size, "write crosses EEPROM page boundary");
		ensure!(address + data.len() <= self.geometry.capacity, "write beyond EEPROM capacity");

		let mut buf = Vec::with_capacity(2 + data.len());
		buf.extend_from_slice(&Self::address_bytes(address));
		buf.extend_from_slice(data);
		// one write() is one I²C transaction
		let l = self.file.write(&buf)?;
		ensure!(l == buf.len(), "short write to EEPROM: {} of {} bytes", l, buf.len());

		self.wait_write_cycle(address)
	}
}
