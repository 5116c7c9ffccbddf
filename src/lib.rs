//! Serial-line driver and controller for the GasKitLink fuel dispenser
//! protocol: frame codec, resync scanner, retry engine, hardware-state
//! FSM and a non-blocking polling orchestrator, built on top of
//! [`serial2`].
//!
//! The entry point for most callers is [`Controller`]: `connect` a
//! dispenser address over a serial port, register callbacks, queue
//! commands, and read the atomic observable fields from any thread.

#[macro_use]
mod log;

pub mod checksum;
pub mod codec;
pub mod controller;
pub mod error;
pub mod frame;
pub mod fsm;
pub mod observables;
pub mod resync;
pub mod retry;
pub mod timing;
pub mod transport;

pub use controller::Controller;
pub use error::OpenError;
pub use frame::Frame;
pub use fsm::{Action, Fsm, HardwareState};
pub use observables::Observables;
pub use timing::TimingParams;
pub use transport::{SerialPort, Transport};
