//! Frame layout: `STX | addr_hi | addr_lo | payload... | crc`.

use crate::checksum::calculate_checksum;

/// Start-of-text sentinel byte that opens every frame.
pub const STX: u8 = 0x02;

/// Shortest possible frame: STX, two address bytes, a one-byte payload, CRC.
pub const MIN_FRAME_SIZE: usize = 5;

/// Longest frame this protocol ever produces (the `T` response).
pub const MAX_FRAME_SIZE: usize = 27;

/// An immutable, already-framed GasKitLink message.
///
/// Built by [`build`] or recovered by the resync scanner; never mutated
/// in place once constructed.
#[derive(Clone, Eq, PartialEq)]
pub struct Frame(Vec<u8>);

impl Frame {
	/// Wrap raw bytes as a frame without checking them.
	///
	/// Used internally once a candidate range has already passed
	/// [`validate_crc`]; prefer [`build`] to construct a frame from scratch.
	pub(crate) fn from_raw(bytes: Vec<u8>) -> Self {
		Self(bytes)
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// The payload: everything between the address bytes and the checksum.
	pub fn payload(&self) -> &[u8] {
		&self.0[3..self.0.len() - 1]
	}
}

impl std::ops::Deref for Frame {
	type Target = [u8];

	fn deref(&self) -> &[u8] {
		&self.0
	}
}

impl std::fmt::Debug for Frame {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Frame({})", self)
	}
}

impl std::fmt::Display for Frame {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		for (i, byte) in self.0.iter().enumerate() {
			if i > 0 {
				write!(f, " ")?;
			}
			write!(f, "{byte:02X}")?;
		}
		Ok(())
	}
}

/// Build a request frame for dispenser `(addr_hi, addr_lo)` carrying `payload`.
///
/// The checksum covers everything from `addr_hi` through the last payload
/// byte, inclusive.
pub fn build(addr: (u8, u8), payload: &[u8]) -> Frame {
	let mut bytes = Vec::with_capacity(MIN_FRAME_SIZE + payload.len());
	bytes.push(STX);
	bytes.push(addr.0);
	bytes.push(addr.1);
	bytes.extend_from_slice(payload);
	let crc = calculate_checksum(0, &bytes[1..]);
	bytes.push(crc);
	Frame(bytes)
}

/// Validate the checksum (and minimum shape) of a raw candidate frame.
///
/// Requires `raw.len() >= MIN_FRAME_SIZE`, `raw[0] == STX`, and the XOR of
/// `raw[1..len-1]` to equal the trailing checksum byte.
pub fn validate_crc(raw: &[u8]) -> bool {
	if raw.len() < MIN_FRAME_SIZE {
		return false;
	}
	if raw[0] != STX {
		return false;
	}
	let crc = calculate_checksum(0, &raw[1..raw.len() - 1]);
	crc == raw[raw.len() - 1]
}
