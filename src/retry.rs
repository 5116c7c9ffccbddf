//! Drives transport + codec + resync with bounded retries, backoff, and a
//! two-axis error counter.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use crate::frame::MAX_FRAME_SIZE;
use crate::resync;
use crate::timing::TimingParams;
use crate::transport::{SerialPort, Transport};

/// Maps a request's leading payload byte to the response letter the retry
/// engine (and resync scanner) should expect back.
pub fn expected_letter_for(request_letter: u8) -> u8 {
	match request_letter {
		b'S' | b'L' | b'R' | b'T' | b'C' => request_letter,
		_ => b'S',
	}
}

/// Send `request` and read back a validated response frame, retrying up
/// to `timing.max_retries` times.
///
/// Returns `None` if every attempt failed to produce a usable frame, or
/// if `shutdown` was observed set. `no_response_count` is bumped at most
/// once per call (after retries are exhausted with only empty reads);
/// `crc_error_count` is bumped once per individually garbled reception.
pub fn send_with_retry<T: SerialPort>(
	transport: &mut Transport<T>,
	addr: (u8, u8),
	request: &[u8],
	expected_letter: u8,
	timing: &TimingParams,
	shutdown: &AtomicBool,
	no_response_count: &AtomicU64,
	crc_error_count: &AtomicU64,
) -> Option<Vec<u8>> {
	if shutdown.load(Ordering::Relaxed) {
		return None;
	}

	let mut saw_only_empty = true;

	for attempt in 0..timing.max_retries {
		if shutdown.load(Ordering::Relaxed) {
			return None;
		}

		let response = transport.send_and_receive(request, timing.response_timeout(), timing.inter_byte_timeout(), timing.force_buffer_clear);

		if response.is_empty() {
			debug!("no response on attempt {}/{}", attempt + 1, timing.max_retries);
			if attempt + 1 < timing.max_retries {
				thread::sleep(timing.retry_backoff());
			}
			continue;
		}

		saw_only_empty = false;

		if response.len() > MAX_FRAME_SIZE {
			warn!("response of {} bytes exceeds MAX_FRAME_SIZE, attempting validation anyway", response.len());
		}

		if response.len() <= MAX_FRAME_SIZE && crate::frame::validate_crc(&response) {
			thread::sleep(timing.inter_command_delay());
			return Some(response);
		}

		match resync::find_frame(&response, addr, expected_letter) {
			Some(recovered) => {
				crc_error_count.fetch_add(1, Ordering::Relaxed);
				debug!("recovered frame via resync after CRC failure");
				thread::sleep(timing.inter_command_delay());
				return Some(recovered);
			},
			None => {
				crc_error_count.fetch_add(1, Ordering::Relaxed);
				warn!("CRC/structural failure with no recoverable frame, attempt {}/{}", attempt + 1, timing.max_retries);
				if attempt + 1 < timing.max_retries {
					thread::sleep(timing.retry_backoff());
				}
			},
		}
	}

	if saw_only_empty {
		no_response_count.fetch_add(1, Ordering::Relaxed);
	}
	None
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::transport::test::MockSerialPort;
	use assert2::assert;

	fn timing_fast() -> TimingParams {
		TimingParams {
			response_timeout_ms: 15,
			inter_byte_timeout_ms: 5,
			max_retries: 3,
			retry_backoff_ms: 1,
			inter_command_delay_ms: 0,
			..TimingParams::default()
		}
	}

	#[test]
	fn empty_reads_exhaust_retries_and_bump_no_response_once() {
		let mock = MockSerialPort::new();
		let mut transport = Transport::new(mock);
		let shutdown = AtomicBool::new(false);
		let no_response = AtomicU64::new(0);
		let crc_errors = AtomicU64::new(0);

		let result = send_with_retry(&mut transport, (0x00, 0x01), b"\x02\x00\x01S\x52", b'S', &timing_fast(), &shutdown, &no_response, &crc_errors);

		assert!(result.is_none());
		assert!(no_response.load(Ordering::Relaxed) == 1);
		assert!(crc_errors.load(Ordering::Relaxed) == 0);
	}

	#[test]
	fn direct_valid_response_does_not_touch_counters() {
		let mock = MockSerialPort::new();
		let mut good = vec![0x02, 0x00, 0x01, b'S', b'1', b'1'];
		let crc = crate::checksum::calculate_checksum(0, &good[1..]);
		good.push(crc);
		mock.push_response(&good);

		let mut transport = Transport::new(mock);
		let shutdown = AtomicBool::new(false);
		let no_response = AtomicU64::new(0);
		let crc_errors = AtomicU64::new(0);

		let result = send_with_retry(&mut transport, (0x00, 0x01), b"\x02\x00\x01S\x52", b'S', &timing_fast(), &shutdown, &no_response, &crc_errors);

		assert!(result == Some(good));
		assert!(no_response.load(Ordering::Relaxed) == 0);
		assert!(crc_errors.load(Ordering::Relaxed) == 0);
	}

	#[test]
	fn garbled_response_is_recovered_via_resync_and_bumps_crc_errors() {
		let mock = MockSerialPort::new();
		let mut good = vec![0x02, 0x00, 0x01, b'S', b'2', b'1'];
		let crc = crate::checksum::calculate_checksum(0, &good[1..]);
		good.push(crc);
		let mut noisy = vec![0xFF, 0xEE];
		noisy.extend_from_slice(&good);
		mock.push_response(&noisy);

		let mut transport = Transport::new(mock);
		let shutdown = AtomicBool::new(false);
		let no_response = AtomicU64::new(0);
		let crc_errors = AtomicU64::new(0);

		let result = send_with_retry(&mut transport, (0x00, 0x01), b"\x02\x00\x01S\x52", b'S', &timing_fast(), &shutdown, &no_response, &crc_errors);

		assert!(result == Some(good));
		assert!(no_response.load(Ordering::Relaxed) == 0);
		assert!(crc_errors.load(Ordering::Relaxed) == 1);
	}

	#[test]
	fn shutdown_short_circuits_without_counting() {
		let mock = MockSerialPort::new();
		let mut transport = Transport::new(mock);
		let shutdown = AtomicBool::new(true);
		let no_response = AtomicU64::new(0);
		let crc_errors = AtomicU64::new(0);

		let result = send_with_retry(&mut transport, (0x00, 0x01), b"\x02\x00\x01S\x52", b'S', &timing_fast(), &shutdown, &no_response, &crc_errors);

		assert!(result.is_none());
		assert!(no_response.load(Ordering::Relaxed) == 0);
	}
}
