use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Cursor;

use crate::{
	error::DecodeError,
	ids::{DeviceId, SiteId},
	read_write::LittleEndianReader,
};

/// Protocol version encoded in the low 12 bits of `protocol_flags`. Must be
/// 1024 on every frame this library builds or accepts.
pub const LIFX_PROTOCOL_VERSION: u16 = 1024;

/// The fixed 36-byte header prefixing every LIFX PAN-gateway packet.
///
/// All multi-byte fields are little-endian on the wire; this struct holds
/// them in host order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
	/// Size of the entire message (header + payload), in bytes.
	pub size: u16,
	/// `addressable` (bit 12), `tagged` (bit 13) and the 12-bit protocol
	/// version packed together, as found on the wire.
	pub addressable: bool,
	pub tagged: bool,
	pub protocol_version: u16,
	pub reserved1: u32,
	/// Device this packet addresses, or all-zero/ignored when `tagged`.
	pub target: DeviceId,
	pub reserved2: u16,
	/// The LIFX site (gateway-bulb bus) this packet belongs to.
	pub site: SiteId,
	pub reserved3: u16,
	pub timestamp: u64,
	/// Selects the payload's type; see the packet-info registry in `packet`.
	pub packet_type: u16,
	pub reserved4: u16,
}

impl PacketHeader {
	pub const SIZE: usize = 36;

	/// When `tagged` is set, the 8 contiguous bytes normally holding `target`
	/// (6 bytes) and `reserved2` (2 bytes) are instead a little-endian 64-bit
	/// tag bitmap. These two helpers convert between that bitmap and the
	/// field pair so the struct can keep `target`/`reserved2` as named,
	/// spec-shaped fields either way.
	pub fn tag_bitmap(&self) -> u64 {
		let mut bytes = [0u8; 8];
		bytes[..6].copy_from_slice(&self.target.0);
		bytes[6..].copy_from_slice(&self.reserved2.to_le_bytes());
		u64::from_le_bytes(bytes)
	}

	pub fn set_tag_bitmap(&mut self, bitmap: u64) {
		let bytes = bitmap.to_le_bytes();
		let mut target = [0u8; 6];
		target.copy_from_slice(&bytes[..6]);
		self.target = DeviceId(target);
		self.reserved2 = u16::from_le_bytes([bytes[6], bytes[7]]);
	}

	pub(crate) fn validate(&self) -> Result<(), DecodeError> {
		if self.protocol_version != LIFX_PROTOCOL_VERSION {
			return Err(DecodeError::ProtocolVersionMismatch(self.protocol_version));
		}
		Ok(())
	}

	pub(crate) fn pack(&self) -> Result<Vec<u8>, DecodeError> {
		let mut v = Vec::with_capacity(Self::SIZE);

		v.write_u16::<LittleEndian>(self.size)?;

		let mut flags: u16 = self.protocol_version & 0b0000_1111_1111_1111;
		if self.addressable {
			flags |= 1 << 12;
		}
		if self.tagged {
			flags |= 1 << 13;
		}
		v.write_u16::<LittleEndian>(flags)?;

		v.write_u32::<LittleEndian>(self.reserved1)?;
		v.write_val(self.target)?;
		v.write_u16::<LittleEndian>(self.reserved2)?;
		v.write_val(self.site)?;
		v.write_u16::<LittleEndian>(self.reserved3)?;
		v.write_u64::<LittleEndian>(self.timestamp)?;
		v.write_u16::<LittleEndian>(self.packet_type)?;
		v.write_u16::<LittleEndian>(self.reserved4)?;

		Ok(v)
	}

	pub(crate) fn unpack(v: &[u8]) -> Result<PacketHeader, DecodeError> {
		if v.len() < Self::SIZE {
			return Err(DecodeError::ShortFrame {
				got: v.len(),
				needed: Self::SIZE,
			});
		}

		let mut c = Cursor::new(v);

		let size = c.read_val()?;

		let flags: u16 = c.read_val()?;
		let addressable = (flags & (1 << 12)) != 0;
		let tagged = (flags & (1 << 13)) != 0;
		let protocol_version = flags & 0b0000_1111_1111_1111;

		let reserved1 = c.read_val()?;
		let target: DeviceId = c.read_val()?;
		let reserved2 = c.read_val()?;
		let site: SiteId = c.read_val()?;
		let reserved3 = c.read_val()?;
		let timestamp = c.read_val()?;
		let packet_type = c.read_val()?;
		let reserved4 = c.read_val()?;

		let header = PacketHeader {
			size,
			addressable,
			tagged,
			protocol_version,
			reserved1,
			target,
			reserved2,
			site,
			reserved3,
			timestamp,
			packet_type,
			reserved4,
		};
		header.validate()?;
		Ok(header)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> PacketHeader {
		PacketHeader {
			size: 0,
			addressable: true,
			tagged: false,
			protocol_version: LIFX_PROTOCOL_VERSION,
			reserved1: 0,
			target: DeviceId([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
			reserved2: 0,
			site: SiteId([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]),
			reserved3: 0,
			timestamp: 0x0102030405060708,
			packet_type: 0x65,
			reserved4: 0,
		}
	}

	#[test]
	fn round_trips() {
		let mut header = sample();
		header.size = PacketHeader::SIZE as u16;
		let packed = header.pack().unwrap();
		assert_eq!(packed.len(), PacketHeader::SIZE);

		let unpacked = PacketHeader::unpack(&packed).unwrap();
		assert_eq!(unpacked, header);
	}

	#[test]
	fn rejects_bad_protocol_version() {
		let mut header = sample();
		header.protocol_version = 42;
		let mut packed = header.pack().unwrap();
		// force-fix the size field so only the version is wrong
		packed[0] = PacketHeader::SIZE as u8;
		let err = PacketHeader::unpack(&packed).unwrap_err();
		assert!(matches!(err, DecodeError::ProtocolVersionMismatch(42)));
	}

	#[test]
	fn rejects_short_frame() {
		let err = PacketHeader::unpack(&[0u8; 10]).unwrap_err();
		assert!(matches!(err, DecodeError::ShortFrame { got: 10, needed: 36 }));
	}
}
