use super::LoadError;

pub const START_CODE: u8 = b':';

pub const DATA: u8 = 0x00;
pub const END_OF_FILE: u8 = 0x01;

// ':' + byte count (2) + address (4) + record type (2)
const HEADER_LEN: usize = 9;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RecordKind {
	Data(Vec<u8>),
	EndOfFile,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct HexRecord {
	pub address: u16,
	pub kind: RecordKind,
	pub checksum: u8,
}

fn hex_digit(c: u8) -> Option<u8> {
	match c {
		b'0'..=b'9' => Some(c - b'0'),
		b'a'..=b'f' => Some(c - b'a' + 10),
		b'A'..=b'F' => Some(c - b'A' + 10),
		_ => None,
	}
}

fn hex_byte(line: &[u8], pos: usize, line_no: usize) -> Result<u8, LoadError> {
	let digits = line.get(pos..pos + 2).ok_or_else(|| {
		LoadError::malformed(line_no, format!("line ends at column {}", line.len()))
	})?;
	match (hex_digit(digits[0]), hex_digit(digits[1])) {
		(Some(hi), Some(lo)) => Ok(hi << 4 | lo),
		_ => Err(LoadError::malformed(line_no, format!(
			"invalid hex digits {:?} at column {}", String::from_utf8_lossy(digits), pos
		))),
	}
}

impl HexRecord {
	/// Decode one (trimmed, non-empty) line.
	///
	/// The running sum over count, address, type, data and checksum must
	/// be zero in its low 8 bits.
	pub fn parse(line: &[u8], line_no: usize) -> Result<Self, LoadError> {
		if line.first() != Some(&START_CODE) {
			return Err(LoadError::malformed(line_no, "missing ':' start code".into()));
		}

		let byte_count = hex_byte(line, 1, line_no)?;
		let address_hi = hex_byte(line, 3, line_no)?;
		let address_lo = hex_byte(line, 5, line_no)?;
		let record_type = hex_byte(line, 7, line_no)?;
		let checksum = hex_byte(line, HEADER_LEN + 2 * byte_count as usize, line_no)?;
		let address = (address_hi as u16) << 8 | address_lo as u16;

		let mut sum = byte_count as u32
			+ address_hi as u32
			+ address_lo as u32
			+ checksum as u32
			+ record_type as u32;

		let kind = match record_type {
			DATA => {
				let mut data = Vec::with_capacity(byte_count as usize);
				for i in 0..byte_count as usize {
					let b = hex_byte(line, HEADER_LEN + 2 * i, line_no)?;
					sum += b as u32;
					data.push(b);
				}
				RecordKind::Data(data)
			},
			END_OF_FILE => RecordKind::EndOfFile,
			t => return Err(LoadError::malformed(line_no, format!("unsupported record type 0x{:02x}", t))),
		};

		if sum & 0xff != 0 {
			return Err(LoadError::ChecksumMismatch {
				line: line_no,
				checksum,
			});
		}

		Ok(HexRecord {
			address,
			kind,
			checksum,
		})
	}

	/// two's complement checksum for a record
	pub fn checksum_for(record_type: u8, address: u16, data: &[u8]) -> u8 {
		let sum = data.iter().fold(
			(data.len() as u8)
				.wrapping_add((address >> 8) as u8)
				.wrapping_add(address as u8)
				.wrapping_add(record_type),
			|acc, &b| acc.wrapping_add(b),
		);
		sum.wrapping_neg()
	}

	pub fn encode_data(address: u16, data: &[u8]) -> String {
		let mut line = format!(":{:02X}{:04X}{:02X}", data.len(), address, DATA);
		for b in data {
			line.push_str(&format!("{:02X}", b));
		}
		line.push_str(&format!("{:02X}", Self::checksum_for(DATA, address, data)));
		line
	}

	pub fn encode_end_of_file() -> String {
		format!(":00000001{:02X}", Self::checksum_for(END_OF_FILE, 0, &[]))
	}
}
