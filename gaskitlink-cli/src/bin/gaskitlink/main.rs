use clap::Parser;
use gaskitlink::Controller;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

mod logging;
mod options;

use options::{Command, Options};

fn main() {
	let options = Options::parse();
	logging::init(env!("CARGO_CRATE_NAME"), options.verbose);
	if let Err(()) = do_main(options) {
		std::process::exit(1);
	}
}

fn do_main(options: Options) -> Result<(), ()> {
	let mut controller: Controller<serial2::SerialPort> = Controller::new();
	controller.on_error(|message| log::error!("{}", message));
	controller.on_log(|message, is_sent| {
		if is_sent {
			log::trace!("-> {}", message);
		} else {
			log::trace!("<- {}", message);
		}
	});

	log::debug!("Connecting to {} at address {}", options.serial_port, options.address);
	if !controller.connect(&options.serial_port, &options.address) {
		return Err(());
	}

	let is_watch = matches!(options.command, Command::Watch);

	match options.command {
		Command::Status => {
			std::thread::sleep(Duration::from_millis(500));
			log::info!("state: {:?}, nozzle: {}", controller.current_state(), controller.current_nozzle());
		},
		Command::Watch => {
			controller.on_status_change(|state, nozzle| log::info!("status: {:?}, nozzle {}", state, nozzle));
			controller.on_fuel_data(|liters, money| log::info!("fuel: {:.2} L, {:.2}", liters, money));
			controller.on_transaction_complete(|liters, money, price| {
				log::info!("transaction complete: {:.2} L, {:.2}, unit price {:.2}", liters, money, price);
			});

			let running = Arc::new(AtomicBool::new(true));
			let handler_flag = running.clone();
			ctrlc::set_handler(move || handler_flag.store(false, Ordering::Relaxed))
				.map_err(|e| log::error!("failed to install Ctrl-C handler: {}", e))?;
			while running.load(Ordering::Relaxed) {
				std::thread::sleep(Duration::from_millis(100));
			}
		},
		Command::Stop => {
			log::debug!("Queueing stop request");
			controller.queue_stop();
		},
		Command::Resume => {
			log::debug!("Queueing resume request");
			controller.queue_resume();
		},
		Command::PresetVolume { nozzle, volume_cl, price } => {
			log::debug!("Queueing volume preset: nozzle {}, {} cL, price {}", nozzle, volume_cl, price);
			controller.queue_volume_preset(nozzle, volume_cl, price);
		},
		Command::PresetMoney { nozzle, money, price } => {
			log::debug!("Queueing money preset: nozzle {}, {}, price {}", nozzle, money, price);
			controller.queue_money_preset(nozzle, money, price);
		},
		Command::EndTransaction => {
			log::debug!("Queueing end-of-transaction acknowledgement");
			controller.queue_end_transaction();
		},
	}

	if !is_watch {
		// Give the worker a moment to drain the queued command before disconnecting.
		std::thread::sleep(Duration::from_millis(300));
	}

	controller.disconnect();
	Ok(())
}
