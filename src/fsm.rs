//! Authoritative pump state tracking: the hardware state enum, the action
//! a controller should take next, and the FSM that latches one-shot
//! end-of-transaction sub-commands.

/// Wire-level hardware state reported by every `S` response.
///
/// The numeric code *is* the wire representation; keep
/// [`HardwareState::code`] and [`HardwareState::from_code`] in sync with
/// the table there.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum HardwareState {
	Error,
	Idle,
	Calling,
	Authorized,
	Started,
	SuspendedStarted,
	Fuelling,
	SuspendedFuelling,
	Stopped,
	EndOfTransaction,
}

impl HardwareState {
	pub fn code(self) -> u8 {
		match self {
			Self::Error => 0,
			Self::Idle => 1,
			Self::Calling => 2,
			Self::Authorized => 3,
			Self::Started => 4,
			Self::SuspendedStarted => 5,
			Self::Fuelling => 6,
			Self::SuspendedFuelling => 7,
			Self::Stopped => 8,
			Self::EndOfTransaction => 9,
		}
	}

	pub fn from_code(code: u8) -> Option<Self> {
		Some(match code {
			0 => Self::Error,
			1 => Self::Idle,
			2 => Self::Calling,
			3 => Self::Authorized,
			4 => Self::Started,
			5 => Self::SuspendedStarted,
			6 => Self::Fuelling,
			7 => Self::SuspendedFuelling,
			8 => Self::Stopped,
			9 => Self::EndOfTransaction,
			_ => return None,
		})
	}
}

/// What the orchestrator should do next, derived from the current
/// hardware state and latch state.
///
/// Deliberately exhaustive at every `match` site: a new variant here must
/// be handled everywhere an `Action` is dispatched, so it cannot be
/// silently ignored.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Action {
	/// Poll with a plain status request.
	PollSR,
	/// Poll status, then volume readback, then money readback.
	PollSrLmRs,
	/// Send the transaction-totals request; the caller must mark the `TU`
	/// latch *before* sending, so a failed send is not retried.
	SendTu,
	/// Send the total-counter request after a transaction; mark `C0`
	/// before sending.
	SendC0,
	/// Send the end-of-transaction acknowledgement; mark `NO` before
	/// sending.
	SendNo,
	/// The idle throttle fired: poll the total counter instead of status.
	IdlePollC0,
}

/// Default threshold for how many consecutive `Idle` observations trigger
/// one [`Action::IdlePollC0`]. This is a throttle, not a hard contract.
pub const DEFAULT_IDLE_C0_INTERVAL: u32 = 20;

/// Owns the authoritative pump state plus the one-shot latches for the
/// current transaction window.
#[derive(Debug)]
pub struct Fsm {
	current: HardwareState,
	nozzle: u8,
	tu_latched: bool,
	c0_latched: bool,
	no_latched: bool,
	idle_poll_counter: u32,
	idle_c0_interval: u32,
}

impl Default for Fsm {
	fn default() -> Self {
		Self::new()
	}
}

impl Fsm {
	pub fn new() -> Self {
		Self::with_idle_c0_interval(DEFAULT_IDLE_C0_INTERVAL)
	}

	/// As [`Fsm::new`], but with a configurable idle throttle interval —
	/// the literal 20 is not a contract, so tests can assert
	/// the "roughly every Nth idle status" behaviour against a small N.
	pub fn with_idle_c0_interval(idle_c0_interval: u32) -> Self {
		Self {
			current: HardwareState::Idle,
			nozzle: 0,
			tu_latched: false,
			c0_latched: false,
			no_latched: false,
			idle_poll_counter: 0,
			idle_c0_interval,
		}
	}

	pub fn current(&self) -> HardwareState {
		self.current
	}

	pub fn nozzle(&self) -> u8 {
		self.nozzle
	}

	pub fn tu_latched(&self) -> bool {
		self.tu_latched
	}

	pub fn c0_latched(&self) -> bool {
		self.c0_latched
	}

	pub fn no_latched(&self) -> bool {
		self.no_latched
	}

	/// Reset to the post-connect state: `Idle`, nozzle 0, all latches and
	/// the idle counter cleared.
	pub fn reset(&mut self) {
		self.current = HardwareState::Idle;
		self.nozzle = 0;
		self.tu_latched = false;
		self.c0_latched = false;
		self.no_latched = false;
		self.idle_poll_counter = 0;
	}

	/// Mark the `TU` (transaction-totals) sub-command as sent.
	///
	/// Called by the orchestrator *before* performing the I/O, so a failed
	/// send is not retried (one-shot semantics).
	pub fn mark_tu_sent(&mut self) {
		self.tu_latched = true;
	}

	pub fn mark_c0_sent(&mut self) {
		self.c0_latched = true;
	}

	pub fn mark_no_sent(&mut self) {
		self.no_latched = true;
	}

	/// Mark the idle throttle as handled for this cycle.
	pub fn mark_idle_c0_sent(&mut self) {
		self.idle_poll_counter = 0;
	}

	/// Feed a freshly parsed `S` response through the FSM, applying
	/// transition resets and returning the next [`Action`].
	pub fn process_hardware_status(&mut self, state: HardwareState, nozzle: u8) -> Action {
		let previous = self.current;
		self.current = state;
		self.nozzle = nozzle;

		match (previous, state) {
			// Dead branch preserved intentionally: latches do NOT reset
			// here even though the dispenser left the prior Stopped
			// transaction behind.
			(HardwareState::Stopped, _) => {},
			(HardwareState::EndOfTransaction, HardwareState::Idle) => {
				self.tu_latched = false;
				self.c0_latched = false;
				self.no_latched = false;
			},
			(HardwareState::Idle, HardwareState::Authorized) | (HardwareState::Idle, HardwareState::Calling) => {
				self.tu_latched = false;
				self.c0_latched = false;
				self.no_latched = false;
				self.idle_poll_counter = 0;
			},
			_ => {},
		}

		self.next_action()
	}

	fn next_action(&mut self) -> Action {
		match self.current {
			HardwareState::Idle => {
				self.idle_poll_counter += 1;
				if self.idle_poll_counter >= self.idle_c0_interval {
					self.idle_poll_counter = 0;
					Action::IdlePollC0
				} else {
					Action::PollSR
				}
			},
			HardwareState::Calling | HardwareState::Authorized | HardwareState::Started => Action::PollSR,
			HardwareState::Fuelling | HardwareState::SuspendedFuelling | HardwareState::SuspendedStarted => Action::PollSrLmRs,
			HardwareState::Stopped => {
				if !self.tu_latched {
					Action::SendTu
				} else if !self.c0_latched {
					Action::SendC0
				} else {
					Action::PollSR
				}
			},
			HardwareState::EndOfTransaction => {
				if !self.no_latched {
					Action::SendNo
				} else {
					Action::PollSR
				}
			},
			HardwareState::Error => Action::PollSR,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::assert;

	#[test]
	fn stopped_then_tu_then_c0() {
		let mut fsm = Fsm::new();
		fsm.process_hardware_status(HardwareState::Idle, 1);

		assert!(fsm.process_hardware_status(HardwareState::Stopped, 1) == Action::SendTu);
		fsm.mark_tu_sent();
		assert!(fsm.process_hardware_status(HardwareState::Stopped, 1) == Action::SendC0);
		fsm.mark_c0_sent();
		assert!(fsm.process_hardware_status(HardwareState::Stopped, 1) == Action::PollSR);
	}

	#[test]
	fn end_of_transaction_then_no_then_idle_reset() {
		let mut fsm = Fsm::new();
		assert!(fsm.process_hardware_status(HardwareState::EndOfTransaction, 1) == Action::SendNo);
		fsm.mark_no_sent();
		assert!(fsm.process_hardware_status(HardwareState::EndOfTransaction, 1) == Action::PollSR);

		assert!(fsm.process_hardware_status(HardwareState::Idle, 0) == Action::PollSR);
		assert!(!fsm.tu_latched());
		assert!(!fsm.c0_latched());
		assert!(!fsm.no_latched());
	}

	#[test]
	fn stopped_to_anything_does_not_reset_latches() {
		let mut fsm = Fsm::new();
		fsm.process_hardware_status(HardwareState::Stopped, 1);
		fsm.mark_tu_sent();
		fsm.mark_c0_sent();
		// Transition away from Stopped without passing through
		// EndOfTransaction -> Idle or Idle -> Authorized/Calling.
		fsm.process_hardware_status(HardwareState::Stopped, 1);
		assert!(fsm.tu_latched());
		assert!(fsm.c0_latched());
	}

	#[test]
	fn idle_to_authorized_clears_latches_and_counter() {
		let mut fsm = Fsm::new();
		for _ in 0..5 {
			fsm.process_hardware_status(HardwareState::Idle, 0);
		}
		fsm.process_hardware_status(HardwareState::Stopped, 1);
		fsm.mark_tu_sent();
		fsm.process_hardware_status(HardwareState::Idle, 0);
		assert!(fsm.process_hardware_status(HardwareState::Authorized, 1) == Action::PollSR);
		assert!(!fsm.tu_latched());
	}

	#[test]
	fn idle_poll_c0_fires_once_per_interval() {
		let mut fsm = Fsm::with_idle_c0_interval(3);
		let actions: Vec<_> = (0..9).map(|_| fsm.process_hardware_status(HardwareState::Idle, 0)).collect();
		let idle_polls = actions.iter().filter(|a| **a == Action::IdlePollC0).count();
		assert!(idle_polls == 3);
		assert!(actions[2] == Action::IdlePollC0);
		assert!(actions[5] == Action::IdlePollC0);
		assert!(actions[8] == Action::IdlePollC0);
	}

	#[test]
	fn fuelling_variants_poll_sr_lm_rs() {
		let mut fsm = Fsm::new();
		for state in [HardwareState::Fuelling, HardwareState::SuspendedFuelling, HardwareState::SuspendedStarted] {
			assert!(fsm.process_hardware_status(state, 1) == Action::PollSrLmRs);
		}
	}

	#[test]
	fn error_state_polls_sr() {
		let mut fsm = Fsm::new();
		assert!(fsm.process_hardware_status(HardwareState::Error, 0) == Action::PollSR);
	}

	#[test]
	fn hardware_state_code_round_trips() {
		for code in 0..=9u8 {
			let state = HardwareState::from_code(code).unwrap();
			assert!(state.code() == code);
		}
		assert!(HardwareState::from_code(10).is_none());
	}
}
