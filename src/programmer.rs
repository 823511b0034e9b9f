use std::fmt;
use std::fs;
use std::io;
use std::path::{
	Path,
	PathBuf,
};
use std::time::Duration;

use crate::chip::{
	self,
	ChipPins,
	POLL_BUDGET,
};
use crate::eeprom::{
	self,
	BusSelect,
	BusSelectPin,
	EepromBus,
	EepromDevice,
	PROBE_RETRY,
};
use crate::hex::{
	self,
	LoadError,
};
use crate::image::{
	FirmwareImage,
	ImageStore,
	ProgramSlot,
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum LoadResult {
	Ok,
	FileNotFound,
	Malformed,
	ChecksumError,
	OtherError,
}

impl LoadResult {
	pub fn is_ok(&self) -> bool {
		*self == LoadResult::Ok
	}
}

impl<'a> From<&'a LoadError> for LoadResult {
	fn from(e: &'a LoadError) -> Self {
		match e {
			LoadError::NotFound(_) => LoadResult::FileNotFound,
			LoadError::Malformed(_) => LoadResult::Malformed,
			LoadError::ChecksumMismatch { .. } => LoadResult::ChecksumError,
			LoadError::Io(_) => LoadResult::OtherError,
		}
	}
}

impl fmt::Display for LoadResult {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			LoadResult::Ok => write!(f, "Hex file load success!"),
			LoadResult::FileNotFound => write!(f, "Hex file not found!"),
			LoadResult::Malformed => write!(f, "Hex file wrong!"),
			LoadResult::ChecksumError => write!(f, "Hex file checksum error!"),
			LoadResult::OtherError => write!(f, "Hex file other error!"),
		}
	}
}

/// Remembers the last hex file loaded, to reload it on the next start.
pub trait LastUsedStore {
	fn load(&mut self) -> crate::AResult<Option<PathBuf>>;
	fn save(&mut self, path: &Path) -> crate::AResult<()>;
}

/// last used path as the only content of a plain file
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LastUsedFile {
	path: PathBuf,
}

impl LastUsedFile {
	pub fn new<P: Into<PathBuf>>(path: P) -> Self {
		LastUsedFile { path: path.into() }
	}
}

impl LastUsedStore for LastUsedFile {
	fn load(&mut self) -> crate::AResult<Option<PathBuf>> {
		let content = match fs::read_to_string(&self.path) {
			Ok(c) => c,
			Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(e) => bail!("couldn't read {:?}: {}", self.path, e),
		};
		let content = content.trim();
		if content.is_empty() {
			Ok(None)
		} else {
			Ok(Some(PathBuf::from(content)))
		}
	}

	fn save(&mut self, path: &Path) -> crate::AResult<()> {
		let path = path.to_str().ok_or_else(|| format_err!("non UTF-8 path {:?}", path))?;
		with_context!(("couldn't write {:?}", self.path), {
			fs::write(&self.path, path)?;
			Ok(())
		})
	}
}

/// Everything the programmer needs for the lifetime of the process: the
/// loaded image, the hardware and the "last used" store.
///
/// Operations never run concurrently; every method takes `&mut self`.
pub struct Programmer<P, S, E, L>
where
	P: ChipPins,
	S: BusSelectPin,
	E: EepromDevice,
	L: LastUsedStore,
{
	chip: P,
	bus: BusSelect<S>,
	eeprom: E,
	last_used: L,
	store: ImageStore,
	loaded_path: Option<PathBuf>,
	boot_complete: bool,
	poll_budget: u32,
	probe_retry: Duration,
}

impl<P, S, E, L> Programmer<P, S, E, L>
where
	P: ChipPins,
	S: BusSelectPin,
	E: EepromDevice,
	L: LastUsedStore,
{
	pub fn new(mut chip: P, bus: BusSelect<S>, eeprom: E, last_used: L) -> Self {
		chip.release();
		Programmer {
			chip,
			bus,
			eeprom,
			last_used,
			store: ImageStore::new(),
			loaded_path: None,
			boot_complete: false,
			poll_budget: POLL_BUDGET,
			probe_retry: PROBE_RETRY,
		}
	}

	pub fn with_poll_budget(mut self, poll_budget: u32) -> Self {
		self.poll_budget = poll_budget;
		self
	}

	pub fn with_probe_retry(mut self, probe_retry: Duration) -> Self {
		self.probe_retry = probe_retry;
		self
	}

	/// Reload the last used file; the boot load itself is never persisted.
	///
	/// Returns `None` if no file was remembered.
	pub fn begin(&mut self) -> Option<LoadResult> {
		self.chip.release();

		let result = match self.last_used.load() {
			Ok(Some(path)) => {
				info!("last used file = {}", path.display());
				Some(self.load_firmware(&path))
			},
			Ok(None) => {
				info!("no last used file");
				None
			},
			Err(e) => {
				warn!("{}", e);
				None
			},
		};
		self.boot_complete = true;
		result
	}

	pub fn load_firmware<Q: AsRef<Path>>(&mut self, path: Q) -> LoadResult {
		let path = path.as_ref();
		let persist = self.boot_complete;
		self.boot_complete = true;

		let image = match hex::load_file(path) {
			Ok(image) => image,
			Err(e) => {
				warn!("{}: {}", path.display(), e);
				let result = LoadResult::from(&e);
				info!("{}", result);
				return result;
			},
		};

		self.store.replace_image(image);
		self.loaded_path = Some(path.into());
		if persist {
			if let Err(e) = self.last_used.save(path) {
				error!("couldn't remember last used file: {}", e);
			}
		}
		info!("{}", LoadResult::Ok);
		LoadResult::Ok
	}

	/// Stage program `index` and clock it into the chip.
	///
	/// Fails for invalid indices, without an image, or if the chip doesn't
	/// clock the transfer.
	pub fn select_program(&mut self, index: u8) -> bool {
		if !self.store.is_loaded() {
			warn!("no firmware loaded, can't set program {}", index);
			return false;
		}
		let program = match self.store.select_program(index) {
			Some(program) => program,
			None => {
				warn!("invalid program {}", index);
				return false;
			},
		};

		info!("Setting program: {}", index);
		match chip::transfer_program_with_budget(&mut self.chip, program, self.poll_budget) {
			Ok(()) => true,
			Err(e) => {
				error!("Error loading program {}: {}", index, e);
				false
			},
		}
	}

	pub fn burn_to_eeprom(&mut self) -> bool {
		if self.bus.bus() == EepromBus::Onboard {
			warn!("EEPROM bus is onboard; the external EEPROM may not be reachable");
		}

		let result = eeprom::burn(&mut self.eeprom, self.store.image(), self.probe_retry);
		// the burn may have disturbed the link lines
		self.chip.release();

		match result {
			Ok(()) => {
				info!("EEPROM write success!");
				true
			},
			Err(e) => {
				error!("EEPROM write error: {}", e);
				false
			},
		}
	}

	/// returns whether the bus is now onboard
	pub fn toggle_eeprom_bus(&mut self) -> bool {
		self.bus.toggle(&mut self.chip) == EepromBus::Onboard
	}

	pub fn select_eeprom_bus(&mut self, bus: EepromBus) -> EepromBus {
		self.bus.select(bus, &mut self.chip)
	}

	pub fn eeprom_bus(&self) -> EepromBus {
		self.bus.bus()
	}

	pub fn image(&self) -> Option<&FirmwareImage> {
		self.store.image()
	}

	pub fn selected_program(&self) -> Option<ProgramSlot> {
		self.store.selected()
	}

	pub fn loaded_path(&self) -> Option<&Path> {
		self.loaded_path.as_ref().map(|p| p.as_path())
	}

	pub fn status(&self) -> String {
		match (&self.loaded_path, self.store.selected()) {
			(Some(path), Some(slot)) => format!(
				"firmware {}, program {}, bus {}", path.display(), slot, self.bus.bus()
			),
			_ => format!("no firmware loaded, bus {}", self.bus.bus()),
		}
	}
}
