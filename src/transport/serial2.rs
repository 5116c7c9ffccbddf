//! [`SerialPort`] implementation backed by the `serial2` crate.

use std::path::Path;
use std::time::Duration;

use crate::error::OpenError;
use crate::transport::Transport;

impl super::SerialPort for serial2::SerialPort {
	type Error = std::io::Error;

	fn discard_buffers(&mut self) -> Result<(), Self::Error> {
		self.discard_input_buffer()?;
		self.discard_output_buffer()
	}

	fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize, Self::Error> {
		self.set_read_timeout(timeout)?;
		match serial2::SerialPort::read(self, buffer) {
			Ok(n) => Ok(n),
			Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
			Err(e) => Err(e),
		}
	}

	fn write_all(&mut self, buffer: &[u8]) -> Result<(), Self::Error> {
		serial2::SerialPort::write_all(self, buffer)
	}
}

impl Transport<serial2::SerialPort> {
	/// Open a serial endpoint at 9600 8N1, no flow control, with DTR/RTS
	/// asserted, and purge any stale data in the RX/TX buffers.
	pub fn open(port_name: impl AsRef<Path>, baud_rate: u32) -> Result<Self, OpenError<std::io::Error>> {
		let port_name = port_name.as_ref();
		let port = serial2::SerialPort::open(port_name, baud_rate).map_err(|e| OpenError::new(port_name.to_string_lossy(), e))?;

		let mut settings = port.get_configuration().map_err(|e| OpenError::new(port_name.to_string_lossy(), e))?;
		settings.set_char_size(serial2::CharSize::Bits8);
		settings.set_stop_bits(serial2::StopBits::One);
		settings.set_parity(serial2::Parity::None);
		settings.set_flow_control(serial2::FlowControl::None);
		port.set_configuration(&settings).map_err(|e| OpenError::new(port_name.to_string_lossy(), e))?;
		port.set_dtr(true).map_err(|e| OpenError::new(port_name.to_string_lossy(), e))?;
		port.set_rts(true).map_err(|e| OpenError::new(port_name.to_string_lossy(), e))?;

		let mut transport = Transport::new(port);
		if let Err(e) = transport.port.discard_buffers() {
			warn!("failed to purge buffers on open: {}", e);
		}
		Ok(transport)
	}
}
