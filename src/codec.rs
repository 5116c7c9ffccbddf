//! Builds request frames and parses response frames for every GasKitLink
//! command kind.

use crate::fsm::HardwareState;
use crate::frame::{self, Frame};

/// `S` response: `S{state:1}{nozzle:1}`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct StatusResponse {
	pub state: HardwareState,
	pub nozzle: u8,
}

/// `L` response: `L{nozzle}{txid}{state};{volume_cl:6}`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct VolumeResponse {
	pub nozzle: u8,
	pub txid: u8,
	pub state: HardwareState,
	pub volume_cl: u32,
}

/// `R` response: `R{nozzle}{txid}{state};{money:6}`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MoneyResponse {
	pub nozzle: u8,
	pub txid: u8,
	pub state: HardwareState,
	pub money: u32,
}

/// `T` response: `T{nozzle}{txid}{state};{money:6};{volume_cl:6};{price:4}`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TransactionResponse {
	pub nozzle: u8,
	pub txid: u8,
	pub state: HardwareState,
	pub money: u32,
	pub volume_cl: u32,
	pub price: u32,
}

/// `C` response: `C{nozzle};{total_cl:9}`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TotalCounterResponse {
	pub nozzle: u8,
	pub total_cl: u32,
}

// --- Request builders --------------------------------------------------

pub fn build_status_request(addr: (u8, u8)) -> Frame {
	frame::build(addr, b"S")
}

pub fn build_stop_request(addr: (u8, u8)) -> Frame {
	frame::build(addr, b"B")
}

pub fn build_resume_request(addr: (u8, u8)) -> Frame {
	frame::build(addr, b"G")
}

pub fn build_volume_readback_request(addr: (u8, u8)) -> Frame {
	frame::build(addr, b"L")
}

pub fn build_money_readback_request(addr: (u8, u8)) -> Frame {
	frame::build(addr, b"R")
}

pub fn build_transaction_request(addr: (u8, u8)) -> Frame {
	frame::build(addr, b"T")
}

pub fn build_total_counter_request(addr: (u8, u8), nozzle: u8) -> Frame {
	frame::build(addr, format!("C{nozzle}").as_bytes())
}

pub fn build_end_transaction_request(addr: (u8, u8)) -> Frame {
	frame::build(addr, b"N")
}

/// `V{nozzle};{volume_cl:6};{price:4}` — volume preset.
pub fn build_volume_preset_request(addr: (u8, u8), nozzle: u8, volume_cl: u32, price: u32) -> Frame {
	let payload = format!("V{nozzle};{volume_cl:06};{price:04}");
	frame::build(addr, payload.as_bytes())
}

/// `M{nozzle};{money:6};{price:4}` — money preset.
pub fn build_money_preset_request(addr: (u8, u8), nozzle: u8, money: u32, price: u32) -> Frame {
	let payload = format!("M{nozzle};{money:06};{price:04}");
	frame::build(addr, payload.as_bytes())
}

// --- Response parsers ----------------------------------------------------

/// Minimum frame length for each response letter.
pub fn min_len_for(letter: u8) -> usize {
	match letter {
		b'S' => 7,
		b'L' => 15,
		b'R' => 15,
		b'T' => 27,
		b'C' => 16,
		_ => 7,
	}
}

fn parse_decimal(digits: &[u8]) -> Option<u32> {
	if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
		return None;
	}
	std::str::from_utf8(digits).ok()?.parse().ok()
}

fn parse_digit(byte: u8) -> Option<u8> {
	if byte.is_ascii_digit() {
		Some(byte - b'0')
	} else {
		None
	}
}

pub fn parse_status(raw: &[u8]) -> Option<StatusResponse> {
	if !frame::validate_crc(raw) {
		return None;
	}
	let payload = &raw[3..raw.len() - 1];
	if payload.len() != 3 || payload[0] != b'S' {
		return None;
	}
	let state = HardwareState::from_code(parse_digit(payload[1])?)?;
	let nozzle = parse_digit(payload[2])?;
	if nozzle > 6 {
		return None;
	}
	Some(StatusResponse { state, nozzle })
}

pub fn parse_volume(raw: &[u8]) -> Option<VolumeResponse> {
	if !frame::validate_crc(raw) {
		return None;
	}
	let payload = &raw[3..raw.len() - 1];
	if payload.len() != 11 || payload[0] != b'L' || payload[4] != b';' {
		return None;
	}
	let nozzle = parse_digit(payload[1])?;
	let txid = parse_digit(payload[2])?;
	let state = HardwareState::from_code(parse_digit(payload[3])?)?;
	let volume_cl = parse_decimal(&payload[5..11])?;
	if nozzle > 6 {
		return None;
	}
	Some(VolumeResponse { nozzle, txid, state, volume_cl })
}

pub fn parse_money(raw: &[u8]) -> Option<MoneyResponse> {
	if !frame::validate_crc(raw) {
		return None;
	}
	let payload = &raw[3..raw.len() - 1];
	if payload.len() != 11 || payload[0] != b'R' || payload[4] != b';' {
		return None;
	}
	let nozzle = parse_digit(payload[1])?;
	let txid = parse_digit(payload[2])?;
	let state = HardwareState::from_code(parse_digit(payload[3])?)?;
	let money = parse_decimal(&payload[5..11])?;
	if nozzle > 6 {
		return None;
	}
	Some(MoneyResponse { nozzle, txid, state, money })
}

pub fn parse_transaction(raw: &[u8]) -> Option<TransactionResponse> {
	if !frame::validate_crc(raw) {
		return None;
	}
	let payload = &raw[3..raw.len() - 1];
	if payload.len() != 23 || payload[0] != b'T' || payload[4] != b';' || payload[11] != b';' || payload[18] != b';' {
		return None;
	}
	let nozzle = parse_digit(payload[1])?;
	let txid = parse_digit(payload[2])?;
	let state = HardwareState::from_code(parse_digit(payload[3])?)?;
	let money = parse_decimal(&payload[5..11])?;
	let volume_cl = parse_decimal(&payload[12..18])?;
	let price = parse_decimal(&payload[19..23])?;
	if nozzle > 6 {
		return None;
	}
	Some(TransactionResponse { nozzle, txid, state, money, volume_cl, price })
}

pub fn parse_total_counter(raw: &[u8]) -> Option<TotalCounterResponse> {
	if !frame::validate_crc(raw) {
		return None;
	}
	let payload = &raw[3..raw.len() - 1];
	if payload.len() != 12 || payload[0] != b'C' || payload[2] != b';' {
		return None;
	}
	let nozzle = parse_digit(payload[1])?;
	let total_cl = parse_decimal(&payload[3..12])?;
	if nozzle > 6 {
		return None;
	}
	Some(TotalCounterResponse { nozzle, total_cl })
}
