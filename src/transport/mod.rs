//! Low level serial transport: opens the line, writes a frame, and reads a
//! response bounded by an overall timeout and an inter-byte silence timeout.

pub mod serial2;

use std::time::{Duration, Instant};

/// Minimum response length worth waking up for: enough bytes to hold any of
/// the fixed-width `L`/`R`/`T`/`C` response payloads.
const MIN_USEFUL_RESPONSE: usize = 14;

/// Raw byte-level access to a serial line.
///
/// This is the seam a test harness stubs out.
pub trait SerialPort: Send {
	type Error: std::fmt::Debug + std::fmt::Display;

	/// Purge both the RX and TX buffers of the underlying line.
	fn discard_buffers(&mut self) -> Result<(), Self::Error>;

	/// Read whatever is available within `timeout`.
	///
	/// Returning `Ok(0)` on a timeout is expected and is not an error at
	/// this layer; the retry engine decides what an empty read means.
	fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize, Self::Error>;

	fn write_all(&mut self, buffer: &[u8]) -> Result<(), Self::Error>;
}

/// Drives a [`SerialPort`] with the accumulate-until-useful-or-timeout read
/// loop GasKitLink needs to tolerate USB-UART byte fragmentation.
pub struct Transport<T> {
	port: T,
}

impl<T: SerialPort> Transport<T> {
	pub fn new(port: T) -> Self {
		Self { port }
	}

	/// Write `cmd`, then read until the accumulated buffer reaches
	/// [`MIN_USEFUL_RESPONSE`] bytes or `total_timeout` elapses.
	///
	/// Empty result means "no response"; this is not
	/// reported as an error, matching "read timeout is not an error".
	pub fn send_and_receive(
		&mut self,
		cmd: &[u8],
		total_timeout: Duration,
		inter_byte_timeout: Duration,
		force_clear: bool,
	) -> Vec<u8> {
		if force_clear {
			if let Err(e) = self.port.discard_buffers() {
				warn!("failed to discard serial buffers before send: {}", e);
			}
		}

		if let Err(e) = self.port.write_all(cmd) {
			warn!("failed to write request: {}", e);
			return Vec::new();
		}

		let deadline = Instant::now() + total_timeout;
		let mut accumulated = Vec::new();
		let mut chunk = [0u8; 64];

		loop {
			let now = Instant::now();
			if now >= deadline {
				break;
			}
			let read_timeout = (deadline - now).min(inter_byte_timeout);

			match self.port.read(&mut chunk, read_timeout) {
				Ok(0) => continue,
				Ok(n) => {
					accumulated.extend_from_slice(&chunk[..n]);
					trace!("received {} bytes, {} accumulated", n, accumulated.len());
					if accumulated.len() >= MIN_USEFUL_RESPONSE {
						break;
					}
				},
				Err(e) => {
					warn!("read error while waiting for response: {}", e);
					break;
				},
			}
		}

		accumulated
	}

	/// Release the underlying handle. Idempotent because it consumes `self`.
	pub fn close(self) {
		drop(self.port);
	}
}
