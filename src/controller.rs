//! Runs the polling loop on a dedicated worker, drains a user-command
//! queue with priority over polling, dispatches FSM actions, fans out UI
//! callbacks, and exposes atomic observable fields.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::codec;
use crate::error::OpenError;
use crate::frame::Frame;
use crate::fsm::{Action, Fsm, HardwareState};
use crate::observables::Observables;
use crate::retry;
use crate::timing::{defaults, TimingParams};
use crate::transport::{SerialPort, Transport};

struct PendingCommand {
	frame: Frame,
	description: &'static str,
}

type StatusCallback = dyn Fn(HardwareState, u8) + Send + 'static;
type FuelDataCallback = dyn Fn(f64, f64) + Send + 'static;
type TransactionCallback = dyn Fn(f64, f64, f64) + Send + 'static;
type ErrorCallback = dyn Fn(&str) + Send + 'static;
type LogCallback = dyn Fn(&str, bool) + Send + 'static;

#[derive(Default)]
struct Callbacks {
	on_status_change: Mutex<Option<Box<StatusCallback>>>,
	on_fuel_data: Mutex<Option<Box<FuelDataCallback>>>,
	on_transaction_complete: Mutex<Option<Box<TransactionCallback>>>,
	on_error: Mutex<Option<Box<ErrorCallback>>>,
	on_log: Mutex<Option<Box<LogCallback>>>,
}

impl Callbacks {
	fn fire_status(&self, state: HardwareState, nozzle: u8) {
		if let Some(cb) = self.on_status_change.lock().unwrap().as_deref() {
			cb(state, nozzle);
		}
	}

	fn fire_fuel_data(&self, liters: f64, money: f64) {
		if let Some(cb) = self.on_fuel_data.lock().unwrap().as_deref() {
			cb(liters, money);
		}
	}

	fn fire_transaction_complete(&self, liters: f64, money: f64, price: f64) {
		if let Some(cb) = self.on_transaction_complete.lock().unwrap().as_deref() {
			cb(liters, money, price);
		}
	}

	fn fire_error(&self, message: &str) {
		error!("{}", message);
		if let Some(cb) = self.on_error.lock().unwrap().as_deref() {
			cb(message);
		}
	}

	fn fire_log(&self, message: &str, is_sent: bool) {
		trace!("{} {}", if is_sent { "->" } else { "<-" }, message);
		if let Some(cb) = self.on_log.lock().unwrap().as_deref() {
			cb(message, is_sent);
		}
	}
}

fn encode_addr(addr: (u8, u8)) -> u16 {
	(u16::from(addr.0) << 8) | u16::from(addr.1)
}

fn decode_addr(bits: u16) -> (u8, u8) {
	((bits >> 8) as u8, (bits & 0xFF) as u8)
}

/// Parse the caller's address string: a base-10 integer,
/// clamped to `[1, 32]`, placed in the low byte with a zero high byte.
fn parse_address(addr_str: &str) -> (u8, u8) {
	let value: i64 = addr_str.trim().parse().unwrap_or(1);
	(0x00, value.clamp(1, 32) as u8)
}

/// Shared state the polling worker and the `Controller` handle both touch.
///
/// Everything here is either atomic or behind a short-lived lock that is
/// never held across I/O; the only thing the worker owns
/// exclusively is the `Transport` and the `Fsm` themselves, which never
/// leave its stack frame.
struct Shared {
	addr: AtomicU16,
	timing: Mutex<TimingParams>,
	pending: Mutex<VecDeque<PendingCommand>>,
	observables: Observables,
	current_state: AtomicU8,
	current_nozzle: AtomicU8,
	callbacks: Callbacks,
	running: AtomicBool,
}

impl Shared {
	fn new() -> Self {
		Self {
			addr: AtomicU16::new(encode_addr(defaults::SLAVE_ADDR)),
			timing: Mutex::new(TimingParams::default()),
			pending: Mutex::new(VecDeque::new()),
			observables: Observables::default(),
			current_state: AtomicU8::new(HardwareState::Idle.code()),
			current_nozzle: AtomicU8::new(0),
			callbacks: Callbacks::default(),
			running: AtomicBool::new(false),
		}
	}

	fn addr(&self) -> (u8, u8) {
		decode_addr(self.addr.load(Ordering::Relaxed))
	}

	fn timing(&self) -> TimingParams {
		*self.timing.lock().unwrap()
	}

	fn enqueue(&self, frame: Frame, description: &'static str) {
		self.pending.lock().unwrap().push_back(PendingCommand { frame, description });
	}
}

/// Non-blocking command/observation surface over a GasKitLink dispenser
/// connection.
///
/// `connect`/`disconnect` are the only blocking operations; everything
/// else queues work for, or reads a snapshot published by, the dedicated
/// polling worker.
pub struct Controller<T: SerialPort + 'static> {
	shared: Arc<Shared>,
	worker: Option<JoinHandle<Transport<T>>>,
}

impl<T: SerialPort + 'static> Default for Controller<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: SerialPort + 'static> Controller<T> {
	pub fn new() -> Self {
		Self { shared: Arc::new(Shared::new()), worker: None }
	}

	pub fn is_connected(&self) -> bool {
		self.worker.is_some()
	}

	/// Reset the FSM, remember the dispenser address, and start the
	/// polling worker over an already-open `Transport`.
	///
	/// This is the generic entry point used by tests with a mock
	/// transport; [`Controller::connect`] (available when `T =
	/// serial2::SerialPort`) also opens the serial port itself.
	pub fn connect_with_transport(&mut self, transport: Transport<T>, addr_str: &str) {
		if self.worker.is_some() {
			self.disconnect();
		}

		self.shared.addr.store(encode_addr(parse_address(addr_str)), Ordering::Relaxed);
		self.shared.observables.reset();
		self.shared.current_state.store(HardwareState::Idle.code(), Ordering::Relaxed);
		self.shared.current_nozzle.store(0, Ordering::Relaxed);
		self.shared.running.store(true, Ordering::Relaxed);

		let shared = self.shared.clone();
		self.worker = Some(thread::spawn(move || run_worker(transport, Fsm::new(), shared)));
	}

	/// Signal the worker to stop, join it, and close the transport
	/// Idempotent: calling it with no active connection is
	/// a no-op.
	pub fn disconnect(&mut self) {
		self.shared.running.store(false, Ordering::Relaxed);
		if let Some(handle) = self.worker.take() {
			match handle.join() {
				Ok(transport) => transport.close(),
				Err(_) => error!("polling worker panicked"),
			}
		}
		self.shared.observables.reset();
		self.shared.current_state.store(HardwareState::Idle.code(), Ordering::Relaxed);
		self.shared.current_nozzle.store(0, Ordering::Relaxed);
	}

	pub fn queue_stop(&self) {
		self.shared.enqueue(codec::build_stop_request(self.shared.addr()), "stop");
	}

	pub fn queue_resume(&self) {
		self.shared.enqueue(codec::build_resume_request(self.shared.addr()), "resume");
	}

	pub fn queue_volume_preset(&self, nozzle: u8, volume_cl: u32, price: u32) {
		self.shared
			.enqueue(codec::build_volume_preset_request(self.shared.addr(), nozzle, volume_cl, price), "volume preset");
	}

	pub fn queue_money_preset(&self, nozzle: u8, money: u32, price: u32) {
		self.shared
			.enqueue(codec::build_money_preset_request(self.shared.addr(), nozzle, money, price), "money preset");
	}

	pub fn queue_end_transaction(&self) {
		self.shared.enqueue(codec::build_end_transaction_request(self.shared.addr()), "end transaction");
	}

	pub fn current_liters(&self) -> f64 {
		self.shared.observables.current_liters.load(Ordering::Relaxed)
	}

	pub fn current_money(&self) -> f64 {
		self.shared.observables.current_money.load(Ordering::Relaxed)
	}

	pub fn total_counter(&self) -> f64 {
		self.shared.observables.total_counter.load(Ordering::Relaxed)
	}

	pub fn transaction_data_ready(&self) -> bool {
		self.shared.observables.transaction_data_ready.load(Ordering::Relaxed)
	}

	pub fn no_response_count(&self) -> u64 {
		self.shared.observables.no_response_count.load(Ordering::Relaxed)
	}

	pub fn crc_error_count(&self) -> u64 {
		self.shared.observables.crc_error_count.load(Ordering::Relaxed)
	}

	pub fn current_state(&self) -> HardwareState {
		HardwareState::from_code(self.shared.current_state.load(Ordering::Relaxed)).unwrap_or(HardwareState::Error)
	}

	pub fn current_nozzle(&self) -> u8 {
		self.shared.current_nozzle.load(Ordering::Relaxed)
	}

	pub fn timing_params(&self) -> TimingParams {
		self.shared.timing()
	}

	pub fn set_timing_params(&self, params: TimingParams) {
		*self.shared.timing.lock().unwrap() = params;
	}

	pub fn on_status_change<F: Fn(HardwareState, u8) + Send + 'static>(&self, callback: F) {
		*self.shared.callbacks.on_status_change.lock().unwrap() = Some(Box::new(callback));
	}

	pub fn on_fuel_data<F: Fn(f64, f64) + Send + 'static>(&self, callback: F) {
		*self.shared.callbacks.on_fuel_data.lock().unwrap() = Some(Box::new(callback));
	}

	pub fn on_transaction_complete<F: Fn(f64, f64, f64) + Send + 'static>(&self, callback: F) {
		*self.shared.callbacks.on_transaction_complete.lock().unwrap() = Some(Box::new(callback));
	}

	pub fn on_error<F: Fn(&str) + Send + 'static>(&self, callback: F) {
		*self.shared.callbacks.on_error.lock().unwrap() = Some(Box::new(callback));
	}

	pub fn on_log<F: Fn(&str, bool) + Send + 'static>(&self, callback: F) {
		*self.shared.callbacks.on_log.lock().unwrap() = Some(Box::new(callback));
	}
}

impl<T: SerialPort + 'static> Drop for Controller<T> {
	fn drop(&mut self) {
		self.disconnect();
	}
}

impl Controller<serial2::SerialPort> {
	/// Parse `addr_str`, open the serial port at 9600 8N1, reset the FSM
	/// and start polling.
	pub fn connect(&mut self, port_name: impl AsRef<Path>, addr_str: &str) -> bool {
		match Transport::open(port_name, 9600) {
			Ok(transport) => {
				self.connect_with_transport(transport, addr_str);
				true
			},
			Err(e) => {
				self.shared.callbacks.fire_error(&e.to_string());
				false
			},
		}
	}
}

impl<T> std::fmt::Debug for Controller<T>
where
	T: SerialPort + 'static,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Controller")
			.field("connected", &self.is_connected())
			.field("current_state", &self.current_state())
			.finish_non_exhaustive()
	}
}

/// The polling loop body, owning the transport and FSM for
/// the lifetime of the connection and handing the transport back on exit
/// so [`Controller::disconnect`] can close it.
fn run_worker<T: SerialPort>(mut transport: Transport<T>, mut fsm: Fsm, shared: Arc<Shared>) -> Transport<T> {
	while shared.running.load(Ordering::Relaxed) {
		let timing = shared.timing();
		let addr = shared.addr();

		drain_pending(&mut transport, &mut fsm, addr, &timing, &shared);
		if !shared.running.load(Ordering::Relaxed) {
			break;
		}

		let status_request = codec::build_status_request(addr);
		shared.callbacks.fire_log(&status_request.to_string(), true);
		let response = retry::send_with_retry(
			&mut transport,
			addr,
			&status_request,
			b'S',
			&timing,
			&shared.running,
			&shared.observables.no_response_count,
			&shared.observables.crc_error_count,
		);

		let Some(raw) = response else {
			thread::sleep(timing.link_lost_poll());
			continue;
		};
		shared.callbacks.fire_log(&crate::frame::Frame::from_raw(raw.clone()).to_string(), false);

		shared.observables.no_response_count.store(0, Ordering::Relaxed);

		match codec::parse_status(&raw) {
			Some(status) => process_status(&mut transport, &mut fsm, addr, &timing, &shared, status),
			None => {
				thread::sleep(timing.inter_command_delay());
				continue;
			},
		}

		let sleep_for = match fsm.current() {
			HardwareState::Idle | HardwareState::Error => timing.idle_poll_delay(),
			_ => timing.inter_command_delay(),
		};
		thread::sleep(sleep_for);
	}

	transport
}

fn drain_pending<T: SerialPort>(transport: &mut Transport<T>, fsm: &mut Fsm, addr: (u8, u8), timing: &TimingParams, shared: &Arc<Shared>) {
	loop {
		if !shared.running.load(Ordering::Relaxed) {
			return;
		}
		let Some(command) = shared.pending.lock().unwrap().pop_front() else {
			return;
		};

		shared.callbacks.fire_log(&format!("{} ({})", command.frame, command.description), true);
		let response = retry::send_with_retry(
			transport,
			addr,
			&command.frame,
			b'S',
			timing,
			&shared.running,
			&shared.observables.no_response_count,
			&shared.observables.crc_error_count,
		);

		if let Some(raw) = response {
			shared.callbacks.fire_log(&crate::frame::Frame::from_raw(raw.clone()).to_string(), false);
			if let Some(status) = codec::parse_status(&raw) {
				process_status(transport, fsm, addr, timing, shared, status);
			}
		}
	}
}

fn process_status<T: SerialPort>(
	transport: &mut Transport<T>,
	fsm: &mut Fsm,
	addr: (u8, u8),
	timing: &TimingParams,
	shared: &Arc<Shared>,
	status: codec::StatusResponse,
) {
	let action = fsm.process_hardware_status(status.state, status.nozzle);
	shared.current_state.store(fsm.current().code(), Ordering::Relaxed);
	shared.current_nozzle.store(fsm.nozzle(), Ordering::Relaxed);
	shared.callbacks.fire_status(fsm.current(), fsm.nozzle());
	dispatch_action(action, transport, fsm, addr, timing, shared);
}

fn dispatch_action<T: SerialPort>(action: Action, transport: &mut Transport<T>, fsm: &mut Fsm, addr: (u8, u8), timing: &TimingParams, shared: &Arc<Shared>) {
	let counters = (&shared.observables.no_response_count, &shared.observables.crc_error_count);

	match action {
		Action::PollSR => {},
		Action::PollSrLmRs => {
			let request = codec::build_volume_readback_request(addr);
			if let Some(raw) = retry::send_with_retry(transport, addr, &request, b'L', timing, &shared.running, counters.0, counters.1) {
				if let Some(volume) = codec::parse_volume(&raw) {
					shared.observables.current_liters.store(f64::from(volume.volume_cl) / 100.0, Ordering::Relaxed);
					shared.callbacks.fire_fuel_data(shared.observables.current_liters.load(Ordering::Relaxed), shared.observables.current_money.load(Ordering::Relaxed));
				}
			}

			let request = codec::build_money_readback_request(addr);
			if let Some(raw) = retry::send_with_retry(transport, addr, &request, b'R', timing, &shared.running, counters.0, counters.1) {
				if let Some(money) = codec::parse_money(&raw) {
					shared.observables.current_money.store(f64::from(money.money), Ordering::Relaxed);
					shared.callbacks.fire_fuel_data(shared.observables.current_liters.load(Ordering::Relaxed), shared.observables.current_money.load(Ordering::Relaxed));
				}
			}
		},
		Action::SendTu => {
			fsm.mark_tu_sent();
			let request = codec::build_transaction_request(addr);
			if let Some(raw) = retry::send_with_retry(transport, addr, &request, b'T', timing, &shared.running, counters.0, counters.1) {
				if let Some(transaction) = codec::parse_transaction(&raw) {
					let liters = f64::from(transaction.volume_cl) / 100.0;
					let money = f64::from(transaction.money);
					let price = f64::from(transaction.price);
					shared.observables.current_liters.store(liters, Ordering::Relaxed);
					shared.observables.current_money.store(money, Ordering::Relaxed);
					shared.observables.transaction_data_ready.store(true, Ordering::Relaxed);
					shared.callbacks.fire_transaction_complete(liters, money, price);
				}
			}
		},
		Action::SendC0 => {
			fsm.mark_c0_sent();
			let request = codec::build_total_counter_request(addr, fsm.nozzle());
			if let Some(raw) = retry::send_with_retry(transport, addr, &request, b'C', timing, &shared.running, counters.0, counters.1) {
				if let Some(total) = codec::parse_total_counter(&raw) {
					shared.observables.total_counter.store(f64::from(total.total_cl) / 100.0, Ordering::Relaxed);
				}
			}
		},
		Action::SendNo => {
			fsm.mark_no_sent();
			let request = codec::build_end_transaction_request(addr);
			if let Some(raw) = retry::send_with_retry(transport, addr, &request, b'S', timing, &shared.running, counters.0, counters.1) {
				if let Some(status) = codec::parse_status(&raw) {
					process_status(transport, fsm, addr, timing, shared, status);
				}
			}
			thread::sleep(timing.post_end_delay());
		},
		Action::IdlePollC0 => {
			fsm.mark_idle_c0_sent();
			let request = codec::build_total_counter_request(addr, fsm.nozzle());
			if let Some(raw) = retry::send_with_retry(transport, addr, &request, b'C', timing, &shared.running, counters.0, counters.1) {
				if let Some(total) = codec::parse_total_counter(&raw) {
					shared.observables.total_counter.store(f64::from(total.total_cl) / 100.0, Ordering::Relaxed);
				}
			}
		},
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::transport::test::MockSerialPort;
	use assert2::assert;
	use std::sync::mpsc;
	use std::time::Duration;

	fn status_frame(addr: (u8, u8), state_digit: u8, nozzle_digit: u8) -> Vec<u8> {
		crate::frame::build(addr, &[b'S', state_digit, nozzle_digit]).as_bytes().to_vec()
	}

	fn fast_timing() -> TimingParams {
		TimingParams {
			response_timeout_ms: 10,
			inter_byte_timeout_ms: 3,
			max_retries: 2,
			retry_backoff_ms: 1,
			inter_command_delay_ms: 0,
			idle_poll_delay_ms: 5,
			link_lost_poll_ms: 5,
			post_end_delay_ms: 5,
			..TimingParams::default()
		}
	}

	#[test]
	fn connect_reaches_idle_and_disconnect_joins_cleanly() {
		let mock = MockSerialPort::new();
		let mut device = mock.device_side();
		for _ in 0..20 {
			device.write_all(&status_frame((0x00, 0x01), b'1', b'0')).unwrap();
		}

		let mut controller: Controller<MockSerialPort> = Controller::new();
		controller.set_timing_params(fast_timing());
		controller.connect_with_transport(Transport::new(mock), "1");

		std::thread::sleep(Duration::from_millis(50));
		assert!(controller.current_state() == HardwareState::Idle);
		controller.disconnect();
		assert!(!controller.is_connected());
	}

	#[test]
	fn queued_stop_is_sent_before_polling_continues() {
		let mock = MockSerialPort::new();
		let mut device = mock.device_side();
		// Any request the worker sends gets back a status response.
		for _ in 0..20 {
			device.write_all(&status_frame((0x00, 0x01), b'1', b'0')).unwrap();
		}

		let mut controller: Controller<MockSerialPort> = Controller::new();
		controller.set_timing_params(fast_timing());
		controller.connect_with_transport(Transport::new(mock), "1");
		controller.queue_stop();

		std::thread::sleep(Duration::from_millis(50));
		controller.disconnect();
	}

	#[test]
	fn status_callback_fires_with_parsed_state() {
		let mock = MockSerialPort::new();
		let mut device = mock.device_side();
		for _ in 0..10 {
			device.write_all(&status_frame((0x00, 0x01), b'6', b'1')).unwrap(); // Fuelling
		}

		let (tx, rx) = mpsc::channel();
		let mut controller: Controller<MockSerialPort> = Controller::new();
		controller.set_timing_params(fast_timing());
		controller.on_status_change(move |state, nozzle| {
			let _ = tx.send((state, nozzle));
		});
		controller.connect_with_transport(Transport::new(mock), "1");

		let (state, nozzle) = rx.recv_timeout(Duration::from_secs(2)).expect("status callback should fire");
		assert!(state == HardwareState::Fuelling);
		assert!(nozzle == 1);
		controller.disconnect();
	}

	#[test]
	fn address_string_is_clamped_into_low_byte() {
		assert!(parse_address("1") == (0x00, 1));
		assert!(parse_address("32") == (0x00, 32));
		assert!(parse_address("99") == (0x00, 32));
		assert!(parse_address("0") == (0x00, 1));
		assert!(parse_address("not a number") == (0x00, 1));
	}
}
