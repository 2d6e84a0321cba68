//! Low-level message types and structures for the original LIFX PAN-gateway
//! LAN protocol (the generation documented by `lifxd`/`lifx-cli`, predating
//! the modern LIFX LAN protocol's per-device service discovery).
//!
//! This is a pure wire codec: it does not talk to the network, cache light
//! state, or wait for replies. That belongs to the daemon built on top of
//! this crate.
//!
//! # Reserved fields
//! When *constructing* packets, always set every reserved field to zero.
//! However, it's possible to receive packets with these fields set to
//! non-zero values. Be conservative in what you send, and liberal in what
//! you accept.
//!
//! # Unknown values
//! It's common to see packets for LIFX bulbs that don't match the documented
//! protocol. These are suspected to be internal messages used by official
//! LIFX apps but never documented; they decode to
//! [error::DecodeError::UnknownPacketType] rather than panicking.

#![allow(clippy::bool_assert_comparison)]

mod color;
mod error;
mod header;
mod ids;
mod label;
mod misc;
mod packet;
mod read_write;

pub use color::{describe_kelvin, HSBK};
pub use error::DecodeError;
pub use header::{PacketHeader, LIFX_PROTOCOL_VERSION};
pub use ids::{DeviceId, SiteId};
pub use label::LifxLabel;
pub use misc::{PowerLevel, Service};
pub use packet::{BuildOptions, Packet, RawPacket, Target};
pub use read_write::{LittleEndianReader, LittleEndianWriter};
