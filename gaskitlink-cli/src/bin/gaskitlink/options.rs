/// Talk to a GasKitLink fuel dispenser over a serial line.
#[derive(clap::Parser)]
pub struct Options {
	/// Print more verbose messages. Can be used multiple times.
	#[clap(long, short)]
	#[clap(global = true)]
	#[clap(action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// The serial port to use.
	#[clap(long, short)]
	#[clap(global = true)]
	#[cfg_attr(target_os = "windows", clap(default_value = "COM1"))]
	#[cfg_attr(not(target_os = "windows"), clap(default_value = "/dev/ttyUSB0"))]
	pub serial_port: String,

	/// The dispenser address, 1..32.
	#[clap(long, short)]
	#[clap(global = true)]
	#[clap(default_value = "1")]
	pub address: String,

	#[clap(subcommand)]
	pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
	/// Connect, print one status line, and exit.
	Status,

	/// Connect and stream status/fuel/transaction/error callbacks until Ctrl-C.
	Watch,

	/// Stop the current delivery.
	Stop,

	/// Resume a stopped delivery.
	Resume,

	/// Preset a volume for the next delivery.
	PresetVolume {
		/// Nozzle number, 1..6.
		nozzle: u8,
		/// Volume to dispense, in centilitres.
		volume_cl: u32,
		/// Unit price, in integer currency units.
		price: u32,
	},

	/// Preset a money amount for the next delivery.
	PresetMoney {
		/// Nozzle number, 1..6.
		nozzle: u8,
		/// Money amount, in integer currency units.
		money: u32,
		/// Unit price, in integer currency units.
		price: u32,
	},

	/// Acknowledge the end of the current transaction.
	EndTransaction,
}
