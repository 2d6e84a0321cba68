use std::io;
use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::read_write::{LittleEndianReader, LittleEndianWriter};

/// Bulb color (Hue-Saturation-Brightness-Kelvin)
///
/// # Notes:
///
/// Colors are represented as Hue-Saturation-Brightness-Kelvin, or HSBK.
///
/// When a light is displaying whites, saturation will be zero, hue will be
/// ignored, and only brightness and kelvin will matter.
///
/// Normal values for "kelvin" are from 2500 (warm/yellow) to 9000 (cool/blue).
///
/// When a light is displaying colors, kelvin is ignored. To display "pure"
/// colors, set saturation to full (65535).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct HSBK {
	pub hue: u16,
	pub saturation: u16,
	pub brightness: u16,
	pub kelvin: u16,
}

impl HSBK {
	pub fn describe(&self, short: bool) -> String {
		match short {
			true if self.saturation == 0 => format!("{}K", self.kelvin),
			true => format!(
				"{:.0}/{:.0}",
				(self.hue as f32 / 65535.0) * 360.0,
				self.saturation as f32 / 655.35
			),
			false if self.saturation == 0 => format!(
				"{:<3.0}% White ({})",
				self.brightness as f32 / 655.35,
				describe_kelvin(self.kelvin)
			),
			false => format!(
				"{:<3.0}% hue: {:<3.0} sat: {:<3.0}%",
				self.brightness as f32 / 655.35,
				(self.hue as f32 / 65535.0) * 360.0,
				self.saturation as f32 / 655.35
			),
		}
	}

	pub fn white(kelvin: u16, brightness: f32) -> HSBK {
		HSBK {
			hue: 0,
			saturation: 0,
			kelvin,
			brightness: (brightness * u16::MAX as f32) as u16,
		}
	}

	pub fn color(hue: u16, saturation: f32, brightness: f32) -> HSBK {
		HSBK {
			hue: ((hue as f32 / 360.0) * (u16::MAX as f32)) as u16,
			saturation: (saturation * u16::MAX as f32) as u16,
			brightness: (brightness * u16::MAX as f32) as u16,
			kelvin: 0,
		}
	}
}

/// Describe (in english words) the color temperature as given in kelvin.
///
/// These descriptions match the values shown in the LIFX mobile app.
pub fn describe_kelvin(k: u16) -> &'static str {
	match k {
		0..=1999 => "Candlelight",
		2000..=2499 => "Sunset",
		2500..=2699 => "Ultra Warm",
		2700..=2999 => "Incandescent",
		3000..=3499 => "Warm",
		3500..=3999 => "Neutral",
		4000..=4499 => "Cool",
		4500..=4999 => "Cool Daylight",
		5000..=5599 => "Soft Daylight",
		5600..=5999 => "Daylight",
		6000..=6499 => "Noon Daylight",
		6500..=6999 => "Bright Daylight",
		7000..=7499 => "Cloudy Daylight",
		7500..=7999 => "Blue Daylight",
		8000..=8999 => "Blue Overcast",
		9000..=u16::MAX => "Blue Ice",
	}
}

impl<R: ReadBytesExt> LittleEndianReader<HSBK> for R {
	fn read_val(&mut self) -> Result<HSBK, io::Error> {
		let hue = self.read_val()?;
		let saturation = self.read_val()?;
		let brightness = self.read_val()?;
		let kelvin = self.read_val()?;
		Ok(HSBK {
			hue,
			saturation,
			brightness,
			kelvin,
		})
	}
}

impl<T> LittleEndianWriter<HSBK> for T
where
	T: WriteBytesExt,
{
	fn write_val(&mut self, v: HSBK) -> Result<(), io::Error> {
		self.write_val(v.hue)?;
		self.write_val(v.saturation)?;
		self.write_val(v.brightness)?;
		self.write_val(v.kelvin)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn round_trips() {
		let c = HSBK {
			hue: 21845,
			saturation: 0xffff,
			brightness: 0xffff,
			kelvin: 3500,
		};
		let mut buf = Vec::new();
		buf.write_val(c).unwrap();
		assert_eq!(buf.len(), 8);

		let mut cur = Cursor::new(buf);
		let back: HSBK = cur.read_val().unwrap();
		assert_eq!(back, c);
	}
}
