//! Intel-HEX firmware files as produced by SpinASM
//!
//! SpinASM always emits 1024 data records of 4 bytes (one FV-1 instruction
//! each) followed by an end-of-file record, so a valid file has one of two
//! sizes depending on the line endings. Anything else is rejected before
//! parsing a single line.

use std::fs;
use std::io::{
	self,
	Read,
};
use std::path::{
	Path,
	PathBuf,
};

use crate::image::{
	FirmwareImage,
	IMAGE_SIZE,
};

mod record;

pub use self::record::{
	HexRecord,
	RecordKind,
};

/// file size with CRLF line endings
pub const HEXFILE_SIZE_CRLF: u64 = 21517;
/// file size with LF (or old Mac CR) line endings
pub const HEXFILE_SIZE_LF: u64 = 20492;

/// instruction size; bytes per data record in SpinASM output
const RECORD_DATA_LEN: usize = 4;

#[derive(Debug, Fail)]
pub enum LoadError {
	#[fail(display = "hex file {:?} not found", _0)]
	NotFound(PathBuf),
	#[fail(display = "malformed hex file: {}", _0)]
	Malformed(String),
	#[fail(display = "checksum error in line {} (checksum field 0x{:02x})", line, checksum)]
	ChecksumMismatch {
		line: usize,
		checksum: u8,
	},
	#[fail(display = "failed to read hex file: {}", _0)]
	Io(#[cause] io::Error),
}

impl LoadError {
	pub(crate) fn malformed(line: usize, reason: String) -> Self {
		LoadError::Malformed(format!("line {}: {}", line, reason))
	}
}

impl From<io::Error> for LoadError {
	fn from(e: io::Error) -> Self {
		LoadError::Io(e)
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum LineEnding {
	/// Windows
	CrLf,
	/// Unix
	Lf,
	/// Mac before OS X
	Cr,
}

impl LineEnding {
	/// a CR anywhere means CRLF if there is also a LF, old Mac style
	/// otherwise; no CR means unix style.
	pub fn detect(data: &[u8]) -> Self {
		if data.contains(&b'\r') {
			if data.contains(&b'\n') {
				LineEnding::CrLf
			} else {
				LineEnding::Cr
			}
		} else {
			LineEnding::Lf
		}
	}

	fn terminator(self) -> u8 {
		match self {
			LineEnding::CrLf | LineEnding::Lf => b'\n',
			LineEnding::Cr => b'\r',
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			LineEnding::CrLf => "\r\n",
			LineEnding::Lf => "\n",
			LineEnding::Cr => "\r",
		}
	}

	/// numbered (starting at 1), trimmed lines
	fn lines(self, data: &[u8]) -> impl Iterator<Item = (usize, &[u8])> {
		data.split(move |&b| b == self.terminator())
			.map(trim_ascii)
			.enumerate()
			.map(|(i, line)| (i + 1, line))
	}
}

fn trim_ascii(line: &[u8]) -> &[u8] {
	let start = line.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(line.len());
	let end = line.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |p| p + 1);
	&line[start..end]
}

pub fn check_size(size: u64) -> Result<(), LoadError> {
	if size == HEXFILE_SIZE_CRLF || size == HEXFILE_SIZE_LF {
		Ok(())
	} else {
		Err(LoadError::Malformed(format!(
			"unexpected file size {} (SpinASM output has {} or {} bytes)",
			size, HEXFILE_SIZE_CRLF, HEXFILE_SIZE_LF,
		)))
	}
}

/// Decode all records into a fresh image.
///
/// Bytes not covered by any data record stay zero. Records following the
/// end-of-file record are still decoded.
pub fn decode_records(data: &[u8]) -> Result<FirmwareImage, LoadError> {
	let ending = LineEnding::detect(data);
	debug!("{:?} line endings detected", ending);

	let mut image = FirmwareImage::zeroed();
	let mut eof_reached = false;

	for (line_no, line) in ending.lines(data) {
		if line.is_empty() {
			continue;
		}
		let record = HexRecord::parse(line, line_no)?;
		match record.kind {
			RecordKind::Data(ref bytes) if bytes.is_empty() => (),
			RecordKind::Data(bytes) => {
				let start = record.address as usize;
				let end = start + bytes.len();
				if end > IMAGE_SIZE {
					return Err(LoadError::malformed(line_no, format!(
						"data at 0x{:04x}..0x{:04x} exceeds the {} byte image", start, end, IMAGE_SIZE
					)));
				}
				image.as_bytes_mut()[start..end].copy_from_slice(&bytes);
			},
			RecordKind::EndOfFile => {
				eof_reached = true;
			},
		}
	}

	if !eof_reached {
		return Err(LoadError::Malformed("missing end-of-file record".into()));
	}

	Ok(image)
}

/// size check followed by `decode_records`
pub fn decode(data: &[u8]) -> Result<FirmwareImage, LoadError> {
	check_size(data.len() as u64)?;
	decode_records(data)
}

pub fn load_file<P: AsRef<Path>>(path: P) -> Result<FirmwareImage, LoadError> {
	let path = path.as_ref();

	let mut file = match fs::File::open(path) {
		Ok(f) => f,
		Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
			return Err(LoadError::NotFound(path.into()));
		},
		Err(e) => return Err(e.into()),
	};

	let size = file.metadata()?.len();
	check_size(size)?;

	let mut data = Vec::with_capacity(size as usize);
	file.read_to_end(&mut data)?;
	decode(&data)
}

/// Encode an image the way SpinASM does: one record per instruction.
pub fn encode(image: &FirmwareImage, ending: LineEnding) -> String {
	let eol = ending.as_str();
	let mut out = String::with_capacity(HEXFILE_SIZE_CRLF as usize);
	for (i, chunk) in image.as_bytes().chunks(RECORD_DATA_LEN).enumerate() {
		out.push_str(&HexRecord::encode_data((i * RECORD_DATA_LEN) as u16, chunk));
		out.push_str(eol);
	}
	out.push_str(&HexRecord::encode_end_of_file());
	out.push_str(eol);
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	fn pseudo_random_image(seed: u32) -> FirmwareImage {
		let mut state = seed;
		let mut image = FirmwareImage::zeroed();
		for b in image.as_bytes_mut().iter_mut() {
			// xorshift
			state ^= state << 13;
			state ^= state >> 17;
			state ^= state << 5;
			*b = state as u8;
		}
		image
	}

	#[test]
	fn encoded_sizes_match_spinasm() {
		let image = pseudo_random_image(1);
		assert_eq!(encode(&image, LineEnding::CrLf).len() as u64, HEXFILE_SIZE_CRLF);
		assert_eq!(encode(&image, LineEnding::Lf).len() as u64, HEXFILE_SIZE_LF);
		assert_eq!(encode(&image, LineEnding::Cr).len() as u64, HEXFILE_SIZE_LF);
	}

	#[test]
	fn round_trip_all_line_endings() {
		for (seed, ending) in [(7, LineEnding::CrLf), (42, LineEnding::Lf), (0xdead, LineEnding::Cr)].iter() {
			let image = pseudo_random_image(*seed);
			let text = encode(&image, *ending);
			assert_eq!(LineEnding::detect(text.as_bytes()), *ending);
			let decoded = decode(text.as_bytes()).unwrap();
			assert!(decoded == image, "round trip failed for {:?}", ending);
		}
	}

	#[test]
	fn wrong_size_rejected() {
		let mut text = encode(&pseudo_random_image(3), LineEnding::Lf);
		text.push('\n');
		match decode(text.as_bytes()) {
			Err(LoadError::Malformed(_)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn missing_end_of_file() {
		let text = ":0400000000000011EB\n:0400040000000011E7\n";
		match decode_records(text.as_bytes()) {
			Err(LoadError::Malformed(ref reason)) => assert!(reason.contains("end-of-file")),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn missing_end_of_file_in_full_size_file() {
		// replace the EOF record by an empty data record of the same length
		let text = encode(&pseudo_random_image(9), LineEnding::Lf);
		let text = text.replace(":00000001FF", ":0000000000");
		assert_eq!(text.len() as u64, HEXFILE_SIZE_LF);
		match decode(text.as_bytes()) {
			Err(LoadError::Malformed(ref reason)) => assert!(reason.contains("end-of-file")),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn line_without_start_code() {
		let text = encode(&pseudo_random_image(5), LineEnding::CrLf);
		let text = text.replacen(":", ";", 1);
		match decode(text.as_bytes()) {
			Err(LoadError::Malformed(ref reason)) => assert!(reason.starts_with("line 1:")),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn address_out_of_range() {
		let text = format!("{}\n{}\n", HexRecord::encode_data(0x0ffe, &[1, 2, 3, 4]), HexRecord::encode_end_of_file());
		match decode_records(text.as_bytes()) {
			Err(LoadError::Malformed(_)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn empty_record_anywhere() {
		let text = format!("{}\n{}\n", HexRecord::encode_data(0x2000, &[]), HexRecord::encode_end_of_file());
		let image = decode_records(text.as_bytes()).unwrap();
		assert!(image.as_bytes().iter().all(|&b| b == 0));
	}

	#[test]
	fn uncovered_bytes_are_zero() {
		let text = format!("{}\n{}\n", HexRecord::encode_data(0x0200, &[1, 2, 3, 4]), HexRecord::encode_end_of_file());
		let image = decode_records(text.as_bytes()).unwrap();
		assert_eq!(&image.as_bytes()[0x200..0x204], &[1, 2, 3, 4]);
		assert_eq!(image.as_bytes().iter().filter(|&&b| b != 0).count(), 4);
	}

	#[test]
	fn trim_handles_blank_lines() {
		assert_eq!(trim_ascii(b"  :00  \r"), b":00");
		assert_eq!(trim_ascii(b" \t "), b"");
		assert_eq!(trim_ascii(b""), b"");
	}
}
