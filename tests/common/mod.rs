//! Simulated hardware for driving the programmer without an FV-1

#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{
	Path,
	PathBuf,
};
use std::rc::Rc;
use std::time::Duration;

use fv1_flash::chip::{
	ChipPins,
	HEADER_EDGES,
};
use fv1_flash::eeprom::{
	BusSelect,
	BusSelectPin,
	EepromDevice,
};
use fv1_flash::hex::{
	self,
	LineEnding,
};
use fv1_flash::image::{
	FirmwareImage,
	PROGRAM_SIZE,
};
use fv1_flash::programmer::LastUsedStore;
use fv1_flash::{
	AResult,
	Programmer,
};

/// clock cycles of a complete program load
pub const FULL_TRANSFER_CYCLES: usize = HEADER_EDGES + 9 * PROGRAM_SIZE;

#[derive(Debug, Default)]
pub struct ChipState {
	/// clock cycles the chip generates after each notify pulse
	pub cycles: usize,
	pub polls: usize,
	pub data: bool,
	pub notify: bool,
	pub notify_pulses: usize,
	/// data line sampled on rising clock edges, per transfer
	pub transfers: Vec<Vec<bool>>,
	pub watchdog_feeds: usize,
	pub critical: bool,
}

impl ChipState {
	/// program bytes of the last transfer (the last acknowledge slot is
	/// sampled after the transfer ends and therefore missing)
	pub fn last_program(&self) -> Vec<u8> {
		let bits = self.transfers.last().expect("no transfer");
		bits[HEADER_EDGES..].chunks(9).map(|bits| {
			bits[..8].iter().fold(0u8, |acc, &b| acc << 1 | b as u8)
		}).collect()
	}
}

#[derive(Clone, Default)]
pub struct SimulatedChip(pub Rc<RefCell<ChipState>>);

impl SimulatedChip {
	pub fn new(cycles: usize) -> Self {
		let chip = SimulatedChip::default();
		chip.0.borrow_mut().cycles = cycles;
		chip.0.borrow_mut().notify = true;
		chip
	}

	pub fn state(&self) -> std::cell::Ref<ChipState> {
		self.0.borrow()
	}
}

impl ChipPins for SimulatedChip {
	fn read_clock(&mut self) -> bool {
		let mut state = self.0.borrow_mut();
		assert!(state.critical, "clock polled outside critical section");
		let poll = state.polls;
		state.polls += 1;
		if poll / 2 >= state.cycles {
			return true;
		}
		let high = poll % 2 == 1;
		if high {
			let data = state.data;
			if let Some(bits) = state.transfers.last_mut() {
				bits.push(data);
			}
		}
		high
	}

	fn set_data(&mut self, high: bool) {
		self.0.borrow_mut().data = high;
	}

	fn set_notify(&mut self, high: bool) {
		let mut state = self.0.borrow_mut();
		if high && !state.notify {
			// chip restarts its program load
			state.notify_pulses += 1;
			state.polls = 0;
			state.transfers.push(Vec::new());
		}
		state.notify = high;
	}

	fn feed_watchdog(&mut self) {
		self.0.borrow_mut().watchdog_feeds += 1;
	}

	fn enter_critical(&mut self) {
		self.0.borrow_mut().critical = true;
	}

	fn leave_critical(&mut self) {
		self.0.borrow_mut().critical = false;
	}
}

#[derive(Clone, Default)]
pub struct SelectPin(pub Rc<RefCell<Vec<bool>>>);

impl BusSelectPin for SelectPin {
	fn set_select(&mut self, high: bool) {
		self.0.borrow_mut().push(high);
	}
}

#[derive(Debug)]
pub struct EepromState {
	pub data: Vec<u8>,
	pub page_size: usize,
	pub absent_probes: usize,
	pub page_writes: usize,
	/// bits flipped on every read
	pub read_noise: Vec<(usize, u8)>,
}

#[derive(Clone)]
pub struct MemoryEeprom(pub Rc<RefCell<EepromState>>);

impl MemoryEeprom {
	pub fn new() -> Self {
		MemoryEeprom(Rc::new(RefCell::new(EepromState {
			data: vec![0xff; 4096],
			page_size: 32,
			absent_probes: 0,
			page_writes: 0,
			read_noise: Vec::new(),
		})))
	}
}

impl EepromDevice for MemoryEeprom {
	fn page_size(&self) -> usize {
		self.0.borrow().page_size
	}

	fn capacity(&self) -> usize {
		self.0.borrow().data.len()
	}

	fn is_present(&mut self) -> bool {
		let mut state = self.0.borrow_mut();
		if state.absent_probes > 0 {
			state.absent_probes -= 1;
			false
		} else {
			true
		}
	}

	fn read(&mut self, address: usize, target: &mut [u8]) -> AResult<()> {
		let state = self.0.borrow();
		target.copy_from_slice(&state.data[address..address + target.len()]);
		for &(noise_address, mask) in &state.read_noise {
			if noise_address >= address && noise_address < address + target.len() {
				target[noise_address - address] ^= mask;
			}
		}
		Ok(())
	}

	fn write_page(&mut self, address: usize, data: &[u8]) -> AResult<()> {
		let mut state = self.0.borrow_mut();
		state.data[address..address + data.len()].copy_from_slice(data);
		state.page_writes += 1;
		Ok(())
	}
}

#[derive(Clone, Default)]
pub struct MemoryLastUsed(pub Rc<RefCell<Option<PathBuf>>>, pub Rc<RefCell<usize>>);

impl MemoryLastUsed {
	pub fn saves(&self) -> usize {
		*self.1.borrow()
	}

	pub fn path(&self) -> Option<PathBuf> {
		self.0.borrow().clone()
	}
}

impl LastUsedStore for MemoryLastUsed {
	fn load(&mut self) -> AResult<Option<PathBuf>> {
		Ok(self.0.borrow().clone())
	}

	fn save(&mut self, path: &Path) -> AResult<()> {
		*self.0.borrow_mut() = Some(path.into());
		*self.1.borrow_mut() += 1;
		Ok(())
	}
}

pub type TestProgrammer = Programmer<SimulatedChip, SelectPin, MemoryEeprom, MemoryLastUsed>;

pub struct Bench {
	pub chip: SimulatedChip,
	pub select: SelectPin,
	pub eeprom: MemoryEeprom,
	pub last_used: MemoryLastUsed,
	pub programmer: TestProgrammer,
}

impl Bench {
	pub fn new() -> Self {
		let chip = SimulatedChip::new(FULL_TRANSFER_CYCLES);
		let select = SelectPin::default();
		let eeprom = MemoryEeprom::new();
		let last_used = MemoryLastUsed::default();
		let programmer = Programmer::new(
			chip.clone(),
			BusSelect::with_reset_pulse(select.clone(), Duration::from_millis(1)),
			eeprom.clone(),
			last_used.clone(),
		).with_probe_retry(Duration::from_millis(1));

		Bench {
			chip,
			select,
			eeprom,
			last_used,
			programmer,
		}
	}
}

/// image where every byte of program `n` has its top three bits set to `n`
pub fn test_image(seed: u8) -> FirmwareImage {
	let mut image = FirmwareImage::zeroed();
	for (i, b) in image.as_bytes_mut().iter_mut().enumerate() {
		let program = (i / PROGRAM_SIZE) as u8;
		*b = program << 5 | ((i as u8).wrapping_mul(31).wrapping_add(seed) & 0x1f);
	}
	image
}

pub fn write_hex(dir: &Path, name: &str, image: &FirmwareImage, ending: LineEnding) -> PathBuf {
	let path = dir.join(name);
	std::fs::write(&path, hex::encode(image, ending)).expect("write hex file");
	path
}
