//! Timing knobs and protocol-level defaults the UI layer may override
//! on a per-connection basis.

use std::time::Duration;

/// Tunable timing/retry parameters shared by the retry engine and the
/// polling loop.
#[derive(Debug, Clone, Copy)]
pub struct TimingParams {
	pub response_timeout_ms: u64,
	pub inter_byte_timeout_ms: u64,
	pub max_retries: u32,
	pub inter_command_delay_ms: u64,
	pub idle_poll_delay_ms: u64,
	pub link_lost_poll_ms: u64,
	pub post_end_delay_ms: u64,
	pub error_threshold: u32,
	pub force_buffer_clear: bool,
	/// Backoff slept between retry attempts after an empty read.
	///
	/// Fixed at 150 ms by default, but kept as a field rather than a
	/// bare constant so tests can shrink it.
	pub retry_backoff_ms: u64,
}

impl Default for TimingParams {
	fn default() -> Self {
		Self {
			response_timeout_ms: 80,
			inter_byte_timeout_ms: 20,
			max_retries: 3,
			inter_command_delay_ms: 10,
			idle_poll_delay_ms: 450,
			link_lost_poll_ms: 350,
			post_end_delay_ms: 800,
			error_threshold: 6,
			force_buffer_clear: false,
			retry_backoff_ms: 150,
		}
	}
}

impl TimingParams {
	pub fn response_timeout(&self) -> Duration {
		Duration::from_millis(self.response_timeout_ms)
	}

	pub fn inter_byte_timeout(&self) -> Duration {
		Duration::from_millis(self.inter_byte_timeout_ms)
	}

	pub fn inter_command_delay(&self) -> Duration {
		Duration::from_millis(self.inter_command_delay_ms)
	}

	pub fn idle_poll_delay(&self) -> Duration {
		Duration::from_millis(self.idle_poll_delay_ms)
	}

	pub fn link_lost_poll(&self) -> Duration {
		Duration::from_millis(self.link_lost_poll_ms)
	}

	pub fn post_end_delay(&self) -> Duration {
		Duration::from_millis(self.post_end_delay_ms)
	}

	pub fn retry_backoff(&self) -> Duration {
		Duration::from_millis(self.retry_backoff_ms)
	}
}

/// Protocol-level defaults exposed to the UI layer, overridable per
/// connection.
pub mod defaults {
	/// Default price used when presetting a transaction, in integer
	/// currency units.
	pub const PRICE: f64 = 2233.0;

	/// Default fuel grade label shown by the UI.
	pub const FUEL_LABEL: &str = "AI-95";

	/// Default nozzle number.
	pub const NOZZLE: u8 = 1;

	/// Default protocol address: dispenser #1, high byte always zero.
	pub const SLAVE_ADDR: (u8, u8) = (0x00, 0x01);
}
