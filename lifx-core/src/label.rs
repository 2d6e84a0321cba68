use std::io;
use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::read_write::{LittleEndianReader, LittleEndianWriter};

/// A bulb or tag label: a fixed 32-byte field on the wire, NUL-padded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LifxLabel(pub String);

impl LifxLabel {
	/// Constructs a new label, truncating to 32 characters.
	pub fn new(s: &str) -> LifxLabel {
		LifxLabel(if s.len() > 32 {
			s[..32].to_owned()
		} else {
			s.to_owned()
		})
	}
}

impl std::fmt::Display for LifxLabel {
	fn fmt(&self, fmt: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
		write!(fmt, "{}", self.0)
	}
}

impl std::cmp::PartialEq<str> for LifxLabel {
	fn eq(&self, other: &str) -> bool {
		self.0 == other
	}
}

impl<R: ReadBytesExt> LittleEndianReader<LifxLabel> for R {
	fn read_val(&mut self) -> Result<LifxLabel, io::Error> {
		let mut label = String::with_capacity(32);
		for _ in 0..32 {
			let c: u8 = self.read_val()?;
			if c > 0 {
				label.push(c as char);
			}
		}
		Ok(LifxLabel(label))
	}
}

impl<T> LittleEndianWriter<LifxLabel> for T
where
	T: WriteBytesExt,
{
	fn write_val(&mut self, v: LifxLabel) -> Result<(), io::Error> {
		for idx in 0..32 {
			if idx >= v.0.len() {
				self.write_u8(0)?;
			} else {
				self.write_u8(v.0.chars().nth(idx).unwrap() as u8)?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn round_trips_through_32_bytes() {
		let label = LifxLabel::new("kitchen");
		let mut buf = Vec::new();
		buf.write_val(label.clone()).unwrap();
		assert_eq!(buf.len(), 32);

		let mut c = Cursor::new(buf);
		let back: LifxLabel = c.read_val().unwrap();
		assert_eq!(back, label);
	}

	#[test]
	fn truncates_long_labels() {
		let label = LifxLabel::new(&"x".repeat(40));
		assert_eq!(label.0.len(), 32);
	}
}
