//! Firmware image of the FV-1: eight programs of 512 bytes each
//!
//! Each program holds 128 instructions of 32 bits (big endian), the layout
//! the chip expects on its boot EEPROM.

use std::fmt;

pub const PROGRAM_SIZE: usize = 512;
pub const PROGRAM_COUNT: usize = 8;
pub const IMAGE_SIZE: usize = PROGRAM_SIZE * PROGRAM_COUNT;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ProgramSlot(u8);

impl ProgramSlot {
	pub fn new(index: u8) -> Option<Self> {
		if (index as usize) < PROGRAM_COUNT {
			Some(ProgramSlot(index))
		} else {
			None
		}
	}

	pub fn index(&self) -> u8 {
		self.0
	}

	/// byte offset of the slot within the image
	pub fn offset(&self) -> usize {
		PROGRAM_SIZE * self.0 as usize
	}

	pub fn all() -> impl Iterator<Item = ProgramSlot> {
		(0..PROGRAM_COUNT as u8).map(ProgramSlot)
	}
}

impl fmt::Display for ProgramSlot {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

#[derive(Clone, PartialEq, Eq)]
pub struct FirmwareImage(Box<[u8; IMAGE_SIZE]>);

impl FirmwareImage {
	pub fn zeroed() -> Self {
		FirmwareImage(Box::new([0u8; IMAGE_SIZE]))
	}

	pub fn as_bytes(&self) -> &[u8; IMAGE_SIZE] {
		&self.0
	}

	pub fn as_bytes_mut(&mut self) -> &mut [u8; IMAGE_SIZE] {
		&mut self.0
	}

	pub fn program(&self, slot: ProgramSlot) -> &[u8] {
		&self.0[slot.offset()..slot.offset() + PROGRAM_SIZE]
	}

	/// 32-bit instruction words of a program
	pub fn instructions(&self, slot: ProgramSlot) -> impl Iterator<Item = u32> + '_ {
		self.program(slot).chunks(4).map(|w| {
			(w[0] as u32) << 24
			| (w[1] as u32) << 16
			| (w[2] as u32) << 8
			| (w[3] as u32)
		})
	}
}

impl fmt::Debug for FirmwareImage {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "FirmwareImage({} bytes)", IMAGE_SIZE)
	}
}

/// Holds the loaded image and the program staged for transfer.
///
/// Until the first successful `replace_image` there is no image, and no
/// program can be selected.
#[derive(Debug, Default)]
pub struct ImageStore {
	image: Option<FirmwareImage>,
	selected: Option<ProgramSlot>,
}

impl ImageStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_loaded(&self) -> bool {
		self.image.is_some()
	}

	pub fn image(&self) -> Option<&FirmwareImage> {
		self.image.as_ref()
	}

	pub fn selected(&self) -> Option<ProgramSlot> {
		self.selected
	}

	/// swap the whole image; resets the selection to slot 0
	pub fn replace_image(&mut self, image: FirmwareImage) {
		self.image = Some(image);
		self.selected = ProgramSlot::new(0);
	}

	pub fn select_program(&mut self, index: u8) -> Option<&[u8]> {
		let slot = ProgramSlot::new(index)?;
		let image = self.image.as_ref()?;
		self.selected = Some(slot);
		Some(image.program(slot))
	}

	pub fn selected_program(&self) -> Option<&[u8]> {
		match (&self.image, self.selected) {
			(Some(image), Some(slot)) => Some(image.program(slot)),
			_ => None,
		}
	}
}
