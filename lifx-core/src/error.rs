use std::io;
use thiserror::Error;

/// Errors produced while decoding or encoding a wire frame.
///
/// Every variant here is recoverable: the caller is expected to drop the
/// offending frame and keep the connection/gateway open.
#[derive(Error, Debug)]
pub enum DecodeError {
	/// The byte slice was too short to contain a full header or the payload
	/// its header claims to have.
	#[error("short frame: got {got} bytes, needed at least {needed}")]
	ShortFrame { got: usize, needed: usize },

	/// `packet_type` does not appear in the packet-info registry.
	#[error("unknown packet type: `{0:#06x}`")]
	UnknownPacketType(u16),

	/// `protocol_flags`'s 12-bit version field was not 1024.
	#[error("protocol version mismatch: got `{0}`, expected 1024")]
	ProtocolVersionMismatch(u16),

	/// The header's `size` field disagreed with the actual slice length.
	#[error("oversized or inconsistent frame: header said {header_size}, slice was {slice_len}")]
	OversizedFrame { header_size: usize, slice_len: usize },

	/// A field inside a known payload held a value this library doesn't
	/// understand (e.g. an out-of-range enum discriminant).
	#[error("protocol error: `{0}`")]
	ProtocolError(String),

	#[error("i/o error")]
	Io(#[from] io::Error),
}

impl From<std::convert::Infallible> for DecodeError {
	fn from(_: std::convert::Infallible) -> Self {
		unreachable!()
	}
}
