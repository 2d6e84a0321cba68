use std::io::Cursor;

use crate::{
	color::HSBK,
	error::DecodeError,
	header::{PacketHeader, LIFX_PROTOCOL_VERSION},
	ids::{DeviceId, SiteId},
	label::LifxLabel,
	misc::{PowerLevel, Service},
	read_write::{LittleEndianReader, LittleEndianWriter},
};

/// Either a single device, or (when `tagged`) a 64-bit tag bitmap naming a
/// group of devices.
#[derive(Debug, Clone, Copy)]
pub enum Target {
	Device(DeviceId),
	Tags(u64),
}

/// Options used to build a [RawPacket].
#[derive(Debug, Clone)]
pub struct BuildOptions {
	pub target: Target,
	pub site: SiteId,
	pub ack_required: bool,
	pub res_required: bool,
	pub sequence: u8,
	pub timestamp: u64,
}

impl Default for BuildOptions {
	fn default() -> BuildOptions {
		BuildOptions {
			target: Target::Tags(0),
			site: SiteId::default(),
			ack_required: false,
			res_required: false,
			sequence: 0,
			timestamp: 0,
		}
	}
}

/// The decoded LIFX PAN-gateway packets this daemon understands.
///
/// This is the subset enumerated in spec §4.A; other packet types
/// (undocumented or out of scope) decode to [DecodeError::UnknownPacketType]
/// rather than panicking, since bulbs are known to send packets outside the
/// documented set.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
	/// GetPanGateway - 0x02. Broadcast to discover gateways; no payload.
	GetPanGateway,
	/// PanGateway - 0x03. Reply to `GetPanGateway`: the service + port a
	/// gateway can be reached on.
	PanGateway { service: Service, port: u32 },
	/// GetLightState - 0x65. No payload; requests a `LightStatus` reply.
	GetLightState,
	/// SetLightColor - 0x66.
	SetLightColor { color: HSBK, transition_ms: u32 },
	/// SetPower - 0x15.
	SetPower { level: PowerLevel },
	/// LightStatus - 0x6B. A device's full current state.
	LightStatus {
		color: HSBK,
		dim: u16,
		power: PowerLevel,
		label: LifxLabel,
		tags: u64,
	},
	/// GetTagLabels - 0x1F. Requests the labels for the tag bits set in
	/// `tags`.
	GetTagLabels { tags: u64 },
	/// TagLabels - 0x20. Reply to `GetTagLabels`/`SetTagLabels`.
	TagLabels { tags: u64, label: LifxLabel },
	/// SetTags - 0x1D. Sets a bulb's tag membership bitmap.
	SetTags { tags: u64 },
	/// SetTagLabels - 0x1E. Assigns a label to one or more gateway-local tag
	/// slots.
	SetTagLabels { tags: u64, label: LifxLabel },
	/// GetMeshInfo - 0x0C. No payload.
	GetMeshInfo,
	/// MeshInfo - 0x0D. Reply to `GetMeshInfo`.
	MeshInfo {
		signal: f32,
		tx: u32,
		rx: u32,
		mcu_temperature: u16,
	},
	/// SetBulbLabel - 0x18. Sets a device's own label directly (distinct
	/// from a gateway-local tag's label, see `SetTagLabels`).
	SetBulbLabel { label: LifxLabel },
}

impl Packet {
	pub fn packet_type(&self) -> u16 {
		match self {
			Packet::GetPanGateway => 0x02,
			Packet::PanGateway { .. } => 0x03,
			Packet::GetLightState => 0x65,
			Packet::SetLightColor { .. } => 0x66,
			Packet::SetPower { .. } => 0x15,
			Packet::LightStatus { .. } => 0x6B,
			Packet::GetTagLabels { .. } => 0x1F,
			Packet::TagLabels { .. } => 0x20,
			Packet::SetTags { .. } => 0x1D,
			Packet::SetTagLabels { .. } => 0x1E,
			Packet::GetMeshInfo => 0x0C,
			Packet::MeshInfo { .. } => 0x0D,
			Packet::SetBulbLabel { .. } => 0x18,
		}
	}

	/// True if this is a reply a client is expected to receive rather than
	/// send, i.e. a `State*`/`*Labels`/`*Info` message.
	pub fn is_reply(&self) -> bool {
		matches!(
			self,
			Packet::PanGateway { .. }
				| Packet::LightStatus { .. }
				| Packet::TagLabels { .. }
				| Packet::MeshInfo { .. }
		)
	}

	fn encode_payload(&self) -> Result<Vec<u8>, DecodeError> {
		let mut v = Vec::new();
		match self.clone() {
			Packet::GetPanGateway | Packet::GetLightState | Packet::GetMeshInfo => {}
			Packet::PanGateway { service, port } => {
				v.write_val(service as u8)?;
				v.write_val(port)?;
			}
			Packet::SetLightColor { color, transition_ms } => {
				v.write_val(0u8)?; // reserved stream field
				v.write_val(color)?;
				v.write_val(transition_ms)?;
			}
			Packet::SetPower { level } => v.write_val(level)?,
			Packet::LightStatus {
				color,
				dim,
				power,
				label,
				tags,
			} => {
				v.write_val(color)?;
				v.write_val(dim)?;
				v.write_val(power)?;
				v.write_val(label)?;
				v.write_val(tags)?;
			}
			Packet::GetTagLabels { tags } => v.write_val(tags)?,
			Packet::TagLabels { tags, label } => {
				v.write_val(tags)?;
				v.write_val(label)?;
			}
			Packet::SetTags { tags } => v.write_val(tags)?,
			Packet::SetTagLabels { tags, label } => {
				v.write_val(tags)?;
				v.write_val(label)?;
			}
			Packet::MeshInfo {
				signal,
				tx,
				rx,
				mcu_temperature,
			} => {
				v.write_val(signal)?;
				v.write_val(tx)?;
				v.write_val(rx)?;
				v.write_val(mcu_temperature)?;
			}
			Packet::SetBulbLabel { label } => v.write_val(label)?,
		}
		Ok(v)
	}

	fn decode_payload(packet_type: u16, payload: &[u8]) -> Result<Packet, DecodeError> {
		let mut c = Cursor::new(payload);
		Ok(match packet_type {
			0x02 => Packet::GetPanGateway,
			0x03 => {
				let service_byte: u8 = c.read_val()?;
				let service = std::convert::TryFrom::try_from(service_byte)?;
				let port = c.read_val()?;
				Packet::PanGateway { service, port }
			}
			0x65 => Packet::GetLightState,
			0x66 => {
				let _reserved: u8 = c.read_val()?;
				let color = c.read_val()?;
				let transition_ms = c.read_val()?;
				Packet::SetLightColor { color, transition_ms }
			}
			0x15 => {
				let level_raw: u16 = c.read_val()?;
				let level = std::convert::TryFrom::try_from(level_raw)?;
				Packet::SetPower { level }
			}
			0x6B => {
				let color = c.read_val()?;
				let dim = c.read_val()?;
				let power_raw: u16 = c.read_val()?;
				let power = std::convert::TryFrom::try_from(power_raw)?;
				let label = c.read_val()?;
				let tags = c.read_val()?;
				Packet::LightStatus {
					color,
					dim,
					power,
					label,
					tags,
				}
			}
			0x1F => Packet::GetTagLabels { tags: c.read_val()? },
			0x20 => {
				let tags = c.read_val()?;
				let label = c.read_val()?;
				Packet::TagLabels { tags, label }
			}
			0x1D => Packet::SetTags { tags: c.read_val()? },
			0x1E => {
				let tags = c.read_val()?;
				let label = c.read_val()?;
				Packet::SetTagLabels { tags, label }
			}
			0x0C => Packet::GetMeshInfo,
			0x0D => {
				let signal = c.read_val()?;
				let tx = c.read_val()?;
				let rx = c.read_val()?;
				let mcu_temperature = c.read_val()?;
				Packet::MeshInfo {
					signal,
					tx,
					rx,
					mcu_temperature,
				}
			}
			0x18 => Packet::SetBulbLabel { label: c.read_val()? },
			other => return Err(DecodeError::UnknownPacketType(other)),
		})
	}
}

/// A packet together with its header, ready to send or just received.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPacket {
	pub header: PacketHeader,
	pub packet: Packet,
}

impl RawPacket {
	pub fn build(options: &BuildOptions, packet: Packet) -> Result<RawPacket, DecodeError> {
		let tagged = matches!(options.target, Target::Tags(_));

		let mut header = PacketHeader {
			size: 0,
			addressable: true,
			tagged,
			protocol_version: LIFX_PROTOCOL_VERSION,
			reserved1: 0,
			target: DeviceId::default(),
			reserved2: 0,
			site: options.site,
			reserved3: 0,
			timestamp: options.timestamp,
			packet_type: packet.packet_type(),
			reserved4: 0,
		};
		match options.target {
			Target::Device(id) => header.target = id,
			Target::Tags(bitmap) => header.set_tag_bitmap(bitmap),
		}
		// ack_required/res_required/sequence ride in reserved3 in this
		// encoding: bit0 ack_required, bit1 res_required, bits 8-15 sequence.
		let mut flags: u16 = options.sequence as u16 & 0x00FF;
		flags <<= 8;
		if options.ack_required {
			flags |= 0b01;
		}
		if options.res_required {
			flags |= 0b10;
		}
		header.reserved3 = flags;

		let mut raw = RawPacket { header, packet };
		raw.header.size = raw.packed_size() as u16;
		Ok(raw)
	}

	pub fn sequence(&self) -> u8 {
		(self.header.reserved3 >> 8) as u8
	}

	pub fn ack_required(&self) -> bool {
		self.header.reserved3 & 0b01 != 0
	}

	pub fn res_required(&self) -> bool {
		self.header.reserved3 & 0b10 != 0
	}

	pub fn packed_size(&self) -> usize {
		PacketHeader::SIZE + self.packet.encode_payload().map(|p| p.len()).unwrap_or(0)
	}

	pub fn pack(&self) -> Result<Vec<u8>, DecodeError> {
		let mut v = self.header.pack()?;
		v.extend(self.packet.encode_payload()?);
		Ok(v)
	}

	pub fn unpack(v: &[u8]) -> Result<RawPacket, DecodeError> {
		let header = PacketHeader::unpack(v)?;
		let declared_size = header.size as usize;
		if declared_size != v.len() {
			return Err(DecodeError::OversizedFrame {
				header_size: declared_size,
				slice_len: v.len(),
			});
		}
		let payload = &v[PacketHeader::SIZE..declared_size];
		let packet = Packet::decode_payload(header.packet_type, payload)?;
		Ok(RawPacket { header, packet })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn roundtrip(packet: Packet) {
		let options = BuildOptions {
			target: Target::Device(DeviceId([0, 0x11, 0x22, 0x33, 0x44, 0x55])),
			site: SiteId([0xde, 0xad, 0xbe, 0xef, 0, 1]),
			ack_required: false,
			res_required: true,
			sequence: 7,
			timestamp: 0,
		};
		let raw = RawPacket::build(&options, packet.clone()).unwrap();
		let bytes = raw.pack().unwrap();
		assert_eq!(bytes.len(), raw.packed_size());
		assert_eq!(raw.header.size as usize, bytes.len());

		let decoded = RawPacket::unpack(&bytes).unwrap();
		assert_eq!(decoded.packet, packet);
		assert_eq!(decoded.sequence(), 7);
		assert!(decoded.res_required());
		assert!(!decoded.ack_required());
	}

	#[test]
	fn round_trips_every_registered_packet_type() {
		roundtrip(Packet::GetPanGateway);
		roundtrip(Packet::PanGateway {
			service: Service::Udp,
			port: 56700,
		});
		roundtrip(Packet::GetLightState);
		roundtrip(Packet::SetLightColor {
			color: HSBK {
				hue: 21845,
				saturation: 0xffff,
				brightness: 0xffff,
				kelvin: 3500,
			},
			transition_ms: 1024,
		});
		roundtrip(Packet::SetPower {
			level: PowerLevel::Enabled,
		});
		roundtrip(Packet::LightStatus {
			color: HSBK {
				hue: 0,
				saturation: 0,
				brightness: 0xb80b,
				kelvin: 0,
			},
			dim: 0,
			power: PowerLevel::Enabled,
			label: LifxLabel::new("kitchen"),
			tags: 1 << 42,
		});
		roundtrip(Packet::GetTagLabels { tags: 1 << 2 });
		roundtrip(Packet::TagLabels {
			tags: 1 << 2,
			label: LifxLabel::new("toto"),
		});
		roundtrip(Packet::SetTags { tags: 1 << 4 });
		roundtrip(Packet::SetTagLabels {
			tags: 1 << 4,
			label: LifxLabel::new("test"),
		});
		roundtrip(Packet::GetMeshInfo);
		roundtrip(Packet::MeshInfo {
			signal: 1.5,
			tx: 100,
			rx: 200,
			mcu_temperature: 42,
		});
		roundtrip(Packet::SetBulbLabel {
			label: LifxLabel::new("office"),
		});
	}

	#[test]
	fn tagged_target_round_trips_through_the_bitmap_fields() {
		let options = BuildOptions {
			target: Target::Tags(1 << 42),
			..Default::default()
		};
		let raw = RawPacket::build(&options, Packet::GetLightState).unwrap();
		assert!(raw.header.tagged);
		assert_eq!(raw.header.tag_bitmap(), 1 << 42);

		let bytes = raw.pack().unwrap();
		let decoded = RawPacket::unpack(&bytes).unwrap();
		assert_eq!(decoded.header.tag_bitmap(), 1 << 42);
	}

	#[test]
	fn rejects_size_field_disagreeing_with_slice_length() {
		let options = BuildOptions::default();
		let raw = RawPacket::build(&options, Packet::GetLightState).unwrap();
		let mut bytes = raw.pack().unwrap();
		bytes.push(0xFF); // trailing garbage byte not accounted for in `size`
		let err = RawPacket::unpack(&bytes).unwrap_err();
		assert!(matches!(err, DecodeError::OversizedFrame { .. }));
	}

	#[test]
	fn rejects_unknown_packet_type() {
		let mut options = BuildOptions::default();
		options.target = Target::Device(DeviceId::default());
		let mut raw = RawPacket::build(&options, Packet::GetLightState).unwrap();
		raw.header.packet_type = 0xFFFF;
		// Rebuild the bytes by hand since `pack` would still encode the
		// (now stale) `Packet::GetLightState` payload shape.
		let mut bytes = raw.header.pack().unwrap();
		bytes[0] = bytes.len() as u8;
		let err = RawPacket::unpack(&bytes).unwrap_err();
		assert!(matches!(err, DecodeError::UnknownPacketType(0xFFFF)));
	}
}
