use std::{convert::TryFrom, io};
use byteorder::{LittleEndian, WriteBytesExt};

use crate::{error::DecodeError, read_write::LittleEndianWriter};

/// The power level of a bulb.
///
/// Only two values are meaningful on the wire: zero (standby) and 0xFFFF
/// (enabled) — see `SetPower`/`LightStatus` in spec §4.A.
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PowerLevel {
	Standby = 0,
	Enabled = 65535,
}

impl<T> LittleEndianWriter<PowerLevel> for T
where
	T: WriteBytesExt,
{
	fn write_val(&mut self, v: PowerLevel) -> Result<(), io::Error> {
		self.write_u16::<LittleEndian>(v as u16)
	}
}

impl TryFrom<u16> for PowerLevel {
	type Error = DecodeError;
	fn try_from(val: u16) -> Result<PowerLevel, DecodeError> {
		match val {
			x if x == PowerLevel::Enabled as u16 => Ok(PowerLevel::Enabled),
			x if x == PowerLevel::Standby as u16 => Ok(PowerLevel::Standby),
			x => Err(DecodeError::ProtocolError(format!("unknown power level {}", x))),
		}
	}
}

/// What service a `PanGateway` reply advertises. LIFX gateways of this
/// protocol generation only ever advertise UDP.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Service {
	Udp = 1,
}

impl TryFrom<u8> for Service {
	type Error = DecodeError;
	fn try_from(val: u8) -> Result<Service, DecodeError> {
		if val != Service::Udp as u8 {
			Err(DecodeError::ProtocolError(format!("unknown service value {}", val)))
		} else {
			Ok(Service::Udp)
		}
	}
}
