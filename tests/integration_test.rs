
use assert2::assert;
use gaskitlink::{Controller, HardwareState, SerialPort, Transport};
use mock_serial_port::MockSerialPort;
use std::sync::mpsc;
use std::time::Duration;

fn status_frame(addr: (u8, u8), state_digit: u8, nozzle_digit: u8) -> Vec<u8> {
	gaskitlink::frame::build(addr, &[b'S', state_digit, nozzle_digit]).as_bytes().to_vec()
}

fn fast_timing() -> gaskitlink::TimingParams {
	gaskitlink::TimingParams {
		response_timeout_ms: 10,
		inter_byte_timeout_ms: 3,
		max_retries: 2,
		retry_backoff_ms: 1,
		inter_command_delay_ms: 0,
		idle_poll_delay_ms: 5,
		link_lost_poll_ms: 5,
		post_end_delay_ms: 5,
		..gaskitlink::TimingParams::default()
	}
}

#[test]
fn controller_reaches_idle_over_mock_transport() {
	let mock = MockSerialPort::new();
	let mut device = mock.device_side();
	for _ in 0..20 {
		device.write_all(&status_frame((0x00, 0x01), b'1', b'0')).unwrap();
	}

	let mut controller: Controller<MockSerialPort> = Controller::new();
	controller.set_timing_params(fast_timing());
	controller.connect_with_transport(Transport::new(mock), "1");

	std::thread::sleep(Duration::from_millis(80));
	assert!(controller.current_state() == HardwareState::Idle);
	controller.disconnect();
	assert!(!controller.is_connected());
}

/// Block until the controller has written a full request, then hand back
/// one canned response. Pre-queuing the whole transcript up front would let
/// the transport's chunked reads coalesce several frames into one read and
/// lose everything past the first; serving one response per request keeps
/// each reply aligned with the request that asked for it.
fn serve_one_request(device: &mut MockSerialPort, response: &[u8]) {
	let mut buf = [0u8; 64];
	loop {
		match device.read(&mut buf, Duration::from_millis(200)) {
			Ok(0) => continue,
			Ok(_) => break,
			Err(_) => return,
		}
	}
	let _ = device.write_all(response);
}

#[test]
fn transaction_lifecycle_fires_transaction_complete_callback() {
	let mock = MockSerialPort::new();
	let mut device = mock.device_side();

	// Stopped status first, so the controller latches a pending TU fetch,
	// then the TU (transaction totals) response itself.
	let stopped_status = status_frame((0x00, 0x01), b'8', b'1');
	let transaction = gaskitlink::frame::build((0x00, 0x01), b"T108;002233;001000;2233").as_bytes().to_vec();
	std::thread::spawn(move || {
		serve_one_request(&mut device, &stopped_status);
		serve_one_request(&mut device, &transaction);
	});

	let (tx, rx) = mpsc::channel();
	let mut controller: Controller<MockSerialPort> = Controller::new();
	controller.set_timing_params(fast_timing());
	controller.on_transaction_complete(move |liters, money, price| {
		let _ = tx.send((liters, money, price));
	});
	controller.connect_with_transport(Transport::new(mock), "1");

	let (liters, money, price) = rx.recv_timeout(Duration::from_secs(2)).expect("transaction-complete callback should fire");
	assert!(liters == 10.0);
	assert!(money == 2233.0);
	assert!(price == 2233.0);
	controller.disconnect();
}

#[test]
fn no_response_count_reflects_a_silent_line() {
	let mock = MockSerialPort::new();
	// No responses queued at all: every poll times out.
	let mut controller: Controller<MockSerialPort> = Controller::new();
	controller.set_timing_params(fast_timing());
	controller.connect_with_transport(Transport::new(mock), "1");

	std::thread::sleep(Duration::from_millis(80));
	assert!(controller.no_response_count() >= 1);
	controller.disconnect();
	assert!(controller.no_response_count() == 0);
}
