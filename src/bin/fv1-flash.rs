#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate fv1_flash;
use fv1_flash::*;

use std::fs;
use std::io::{
	self,
	BufRead,
	Write,
};
use std::path::PathBuf;
use std::process::exit;

use fv1_flash::eeprom::{
	BusSelect,
	EepromBus,
};
use fv1_flash::hex::LineEnding;
use fv1_flash::image::ProgramSlot;
use fv1_flash::linux::{
	GEOMETRY_24LC32A,
	I2cEeprom,
	LinuxChipPins,
	LinuxSelectPin,
};
use fv1_flash::programmer::LastUsedFile;

type LinuxProgrammer = Programmer<LinuxChipPins, LinuxSelectPin, I2cEeprom, LastUsedFile>;

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid paramater {}: {}", name, e);
		e.context(msg).into()
	})
}

fn get_param_or<T>(matches: &clap::ArgMatches, name: &str, default: T) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	if matches.is_present(name) {
		get_param(matches, name)
	} else {
		Ok(default)
	}
}

// accepts "0x51" and "81"
fn parse_i2c_address(s: &str) -> AResult<u16> {
	let address = if s.starts_with("0x") {
		u16::from_str_radix(&s[2..], 16)
	} else {
		s.parse::<u16>()
	};
	let address = address.map_err(|e| format_err!("invalid I2C address {:?}: {}", s, e))?;
	ensure!(address < 0x80, "invalid I2C address {:?}: not a 7-bit address", s);
	Ok(address)
}

struct Config {
	clock_gpio: u32,
	data_gpio: u32,
	notify_gpio: u32,
	select_gpio: u32,
	i2c_bus: u32,
	eeprom_address: u16,
	state_file: PathBuf,
	poll_budget: u32,
}

impl Config {
	fn from_matches(matches: &clap::ArgMatches) -> AResult<Self> {
		Ok(Config {
			clock_gpio: get_param_or(matches, "clock", 5)?,
			data_gpio: get_param_or(matches, "data", 4)?,
			notify_gpio: get_param_or(matches, "notify", 14)?,
			select_gpio: get_param_or(matches, "select", 12)?,
			i2c_bus: get_param_or(matches, "bus", 1)?,
			eeprom_address: match matches.value_of("address") {
				Some(a) => parse_i2c_address(a)?,
				None => 0x51,
			},
			state_file: get_param_or(matches, "state", PathBuf::from("fv1-last-used"))?,
			poll_budget: get_param_or(matches, "budget", chip::POLL_BUDGET)?,
		})
	}

	fn open_programmer(&self) -> AResult<LinuxProgrammer> {
		let chip = LinuxChipPins::open(self.clock_gpio, self.data_gpio, self.notify_gpio)?;
		let select = LinuxSelectPin::open(self.select_gpio)?;
		let eeprom = I2cEeprom::open(self.i2c_bus, self.eeprom_address, GEOMETRY_24LC32A)?;
		let last_used = LastUsedFile::new(self.state_file.clone());

		let mut programmer = Programmer::new(chip, BusSelect::new(select), eeprom, last_used)
			.with_poll_budget(self.poll_budget);
		if let Some(result) = programmer.begin() {
			info!("Boot: {}", result);
		}
		Ok(programmer)
	}
}

fn load_optional_file(programmer: &mut LinuxProgrammer, sub_m: &clap::ArgMatches) -> AResult<()> {
	if let Some(file) = sub_m.value_of("file") {
		let result = programmer.load_firmware(file);
		ensure!(result.is_ok(), "{}: {}", file, result);
	}
	Ok(())
}

fn check(sub_m: &clap::ArgMatches) -> AResult<()> {
	let file: PathBuf = get_param(sub_m, "FILE")?;
	match hex::load_file(&file) {
		Ok(_) => {
			println!("{}", LoadResult::Ok);
			Ok(())
		},
		Err(e) => {
			println!("{}", LoadResult::from(&e));
			bail!("{}: {}", file.display(), e)
		},
	}
}

fn dump(sub_m: &clap::ArgMatches) -> AResult<()> {
	let file: PathBuf = get_param(sub_m, "FILE")?;
	let image = hex::load_file(&file)?;

	for slot in ProgramSlot::all() {
		println!("program {}:", slot);
		let words: Vec<u32> = image.instructions(slot).collect();
		for (row, pair) in words.chunks(2).enumerate() {
			println!("{:04}:\t{:08x}\t{:04}:\t{:08x}", 2 * row, pair[0], 2 * row + 1, pair[1]);
		}
	}

	Ok(())
}

fn export(sub_m: &clap::ArgMatches) -> AResult<()> {
	let file: PathBuf = get_param(sub_m, "FILE")?;
	let out: PathBuf = get_param(sub_m, "OUT")?;
	let ending = if sub_m.is_present("crlf") {
		LineEnding::CrLf
	} else if sub_m.is_present("cr") {
		LineEnding::Cr
	} else {
		LineEnding::Lf
	};

	let image = hex::load_file(&file)?;
	fs::write(&out, hex::encode(&image, ending)).map_err(|e| {
		let msg = format!("couldn't write {}: {}", out.display(), e);
		failure::Error::from(e).context(msg).into()
	})
}

fn select(config: &Config, sub_m: &clap::ArgMatches) -> AResult<()> {
	let program: u8 = get_param(sub_m, "PROGRAM")?;
	let mut programmer = config.open_programmer()?;
	load_optional_file(&mut programmer, sub_m)?;

	ensure!(programmer.select_program(program), "failed to set program {}", program);
	println!("{}", programmer.status());
	Ok(())
}

fn burn(config: &Config, sub_m: &clap::ArgMatches) -> AResult<()> {
	let mut programmer = config.open_programmer()?;
	load_optional_file(&mut programmer, sub_m)?;

	programmer.select_eeprom_bus(EepromBus::External);
	let success = programmer.burn_to_eeprom();
	programmer.select_eeprom_bus(EepromBus::Onboard);

	ensure!(success, "EEPROM write error!");
	println!("EEPROM write success!");
	Ok(())
}

const SHELL_HELP: &str = "commands: load PATH, select N, burn, bus, status, quit";

fn shell(config: &Config) -> AResult<()> {
	let mut programmer = config.open_programmer()?;
	let stdin = io::stdin();
	let mut stdout = io::stdout();

	println!("{}", programmer.status());
	println!("{}", SHELL_HELP);
	loop {
		print!("> ");
		stdout.flush()?;

		let mut line = String::new();
		if 0 == stdin.lock().read_line(&mut line)? {
			break;
		}

		let mut words = line.split_whitespace();
		match (words.next(), words.next()) {
			(None, _) => (),
			(Some("load"), Some(path)) => {
				println!("{}", programmer.load_firmware(path));
			},
			(Some("select"), Some(program)) => match program.parse::<u8>() {
				Ok(program) => {
					if programmer.select_program(program) {
						println!("program {} set", program);
					} else {
						println!("Error loading program {}", program);
					}
				},
				Err(e) => println!("invalid program {:?}: {}", program, e),
			},
			(Some("burn"), None) => {
				if programmer.burn_to_eeprom() {
					println!("EEPROM write success!");
				} else {
					println!("EEPROM write error!");
				}
			},
			(Some("bus"), None) => {
				programmer.toggle_eeprom_bus();
				println!("bus: {}", programmer.eeprom_bus());
			},
			(Some("status"), None) => {
				println!("{}", programmer.status());
			},
			(Some("quit"), None) | (Some("exit"), None) => break,
			_ => println!("{}", SHELL_HELP),
		}
	}

	Ok(())
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg clock: --clock +takes_value "GPIO of the FV-1 clock line (default 5)")
		(@arg data: --data +takes_value "GPIO of the FV-1 data line (default 4)")
		(@arg notify: --notify +takes_value "GPIO of the FV-1 notify/reset line (default 14)")
		(@arg select: --select +takes_value "GPIO of the EEPROM bus select (default 12)")
		(@arg bus: --bus +takes_value "I2C bus of the external EEPROM (default 1)")
		(@arg address: --address +takes_value "I2C address of the external EEPROM (default 0x51)")
		(@arg state: --state +takes_value "file remembering the last used hex file (default fv1-last-used)")
		(@arg budget: --budget +takes_value "clock polls per transfer phase before giving up")
		(@subcommand check =>
			(about: "validate a SpinASM hex file")
			(@arg FILE: +required "hex file")
		)
		(@subcommand dump =>
			(about: "print the instructions of all programs in a hex file")
			(@arg FILE: +required "hex file")
		)
		(@subcommand export =>
			(about: "re-encode a hex file in SpinASM layout")
			(@arg crlf: --crlf conflicts_with[cr] "use CRLF line endings")
			(@arg cr: --cr "use CR line endings")
			(@arg FILE: +required "hex file")
			(@arg OUT: +required "output file")
		)
		(@subcommand select =>
			(about: "clock a program into the FV-1")
			(@arg file: -f --file +takes_value "load (and remember) this hex file first")
			(@arg PROGRAM: +required "program number (0-7)")
		)
		(@subcommand burn =>
			(about: "write the firmware to the external EEPROM and verify it")
			(@arg file: -f --file +takes_value "load (and remember) this hex file first")
		)
		(@subcommand shell =>
			(about: "interactive session reading commands from stdin")
		)
	).get_matches();

	let config = Config::from_matches(&matches)?;

	match matches.subcommand() {
		("check", Some(sub_m)) => {
			check(sub_m)
		},
		("dump", Some(sub_m)) => {
			dump(sub_m)
		},
		("export", Some(sub_m)) => {
			export(sub_m)
		},
		("select", Some(sub_m)) => {
			select(&config, sub_m)
		},
		("burn", Some(sub_m)) => {
			burn(&config, sub_m)
		},
		("shell", _) => {
			shell(&config)
		},
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
