//! Atomic, single-writer/multi-reader observable fields the UI layer polls
//! without synchronising with the worker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// An `f64` readable and writable from any thread without a lock.
///
/// Hosts without a native 64-bit float atomic still have one for `u64`;
/// storing the IEEE-754 bit pattern there is the standard way to emulate
/// a float atomic.
#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
	pub fn new(value: f64) -> Self {
		Self(AtomicU64::new(value.to_bits()))
	}

	pub fn load(&self, order: Ordering) -> f64 {
		f64::from_bits(self.0.load(order))
	}

	pub fn store(&self, value: f64, order: Ordering) {
		self.0.store(value.to_bits(), order);
	}
}

/// The controller's atomic snapshot fields.
#[derive(Debug, Default)]
pub struct Observables {
	pub current_liters: AtomicF64,
	pub current_money: AtomicF64,
	pub total_counter: AtomicF64,
	pub transaction_data_ready: AtomicBool,
	pub no_response_count: AtomicU64,
	pub crc_error_count: AtomicU64,
}

impl Observables {
	pub fn reset(&self) {
		self.current_liters.store(0.0, Ordering::Relaxed);
		self.current_money.store(0.0, Ordering::Relaxed);
		self.total_counter.store(0.0, Ordering::Relaxed);
		self.transaction_data_ready.store(false, Ordering::Relaxed);
		self.no_response_count.store(0, Ordering::Relaxed);
		self.crc_error_count.store(0, Ordering::Relaxed);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::assert;

	#[test]
	fn atomic_f64_round_trips_through_bit_pattern() {
		let value = AtomicF64::new(12.34);
		assert!(value.load(Ordering::Relaxed) == 12.34);
		value.store(56.78, Ordering::Relaxed);
		assert!(value.load(Ordering::Relaxed) == 56.78);
	}

	#[test]
	fn reset_zeroes_everything() {
		let observables = Observables::default();
		observables.current_liters.store(1.0, Ordering::Relaxed);
		observables.no_response_count.store(3, Ordering::Relaxed);
		observables.transaction_data_ready.store(true, Ordering::Relaxed);
		observables.reset();
		assert!(observables.current_liters.load(Ordering::Relaxed) == 0.0);
		assert!(observables.no_response_count.load(Ordering::Relaxed) == 0);
		assert!(!observables.transaction_data_ready.load(Ordering::Relaxed));
	}
}
