use std::fs;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{
	Path,
	PathBuf,
};
use std::thread;
use std::time::Duration;

const SYSFS_GPIO: &str = "/sys/class/gpio";

// sysfs attributes need to be written in one syscall
fn write_once(file: &fs::File, value: &str) -> io::Result<()> {
	let l = file.write_at(value.as_bytes(), 0)?;
	if l != value.len() {
		return Err(io::Error::new(io::ErrorKind::Other, "failed to write whole attribute"));
	}
	Ok(())
}

fn write_attribute(path: PathBuf, value: &str) -> io::Result<()> {
	write_once(&fs::OpenOptions::new().write(true).open(path)?, value)
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Direction {
	Input,
	/// output, starting high
	High,
	/// output, starting low
	Low,
}

impl Direction {
	fn as_str(self) -> &'static str {
		match self {
			Direction::Input => "in",
			Direction::High => "high",
			Direction::Low => "low",
		}
	}
}

/// GPIO line through the (legacy) sysfs interface
#[derive(Debug)]
pub struct SysfsGpio {
	number: u32,
	value: fs::File,
	// kept open, data bits are sent by switching direction
	direction_file: fs::File,
	direction: Direction,
}

impl SysfsGpio {
	pub fn open(number: u32, direction: Direction) -> crate::AResult<Self> {
		Self::open_in(Path::new(SYSFS_GPIO), number, direction)
	}

	fn open_in(root: &Path, number: u32, direction: Direction) -> crate::AResult<Self> {
		let pin_path = |attribute: &str| root.join(format!("gpio{}", number)).join(attribute);

		with_context!(("couldn't open GPIO {}", number), {
			if !pin_path("value").exists() {
				write_attribute(root.join("export"), &number.to_string())?;
				// udev needs a moment to fix the permissions of new pins
				thread::sleep(Duration::from_millis(100));
			}
			let direction_file = fs::OpenOptions::new()
				.write(true)
				.open(pin_path("direction"))?;
			write_once(&direction_file, direction.as_str())?;

			let value = fs::OpenOptions::new()
				.read(true)
				.write(true)
				.open(pin_path("value"))?;

			Ok(SysfsGpio {
				number,
				value,
				direction_file,
				direction,
			})
		})
	}

	pub fn number(&self) -> u32 {
		self.number
	}

	pub fn read(&self) -> io::Result<bool> {
		let mut buf = [0u8; 1];
		let l = self.value.read_at(&mut buf, 0)?;
		if l != 1 {
			return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "empty GPIO value"));
		}
		Ok(buf[0] == b'1')
	}

	pub fn write(&self, high: bool) -> io::Result<()> {
		let buf = if high { b"1" } else { b"0" };
		self.value.write_at(buf, 0)?;
		Ok(())
	}

	/// Open drain emulation: release the line (input, pulled up) for high,
	/// drive it low otherwise.
	pub fn set_open_drain(&mut self, high: bool) -> io::Result<()> {
		let direction = if high { Direction::Input } else { Direction::Low };
		if direction != self.direction {
			write_once(&self.direction_file, direction.as_str())?;
			self.direction = direction;
		}
		Ok(())
	}
}
