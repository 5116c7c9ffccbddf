//! Error types for the parts of the stack that still need to report failure
//! out-of-band from the controller's return-value/counter/callback scheme:
//! currently just opening the transport.

/// Failure to open or configure the underlying serial transport.
#[derive(Debug)]
pub struct OpenError<E> {
	pub port_name: String,
	pub cause: E,
}

impl<E> OpenError<E> {
	pub fn new(port_name: impl Into<String>, cause: E) -> Self {
		Self { port_name: port_name.into(), cause }
	}
}

impl<E: std::fmt::Display> std::fmt::Display for OpenError<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "failed to open serial port {}: {}", self.port_name, self.cause)
	}
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for OpenError<E> {}
