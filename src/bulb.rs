use tokio::time::Instant;

use lifx_core::{DeviceId, LifxLabel, PowerLevel, SiteId};

/// A bulb's latest known light state, as last reported by a `LightStatus`
/// packet.
#[derive(Debug, Clone)]
pub struct BulbState {
	pub label: LifxLabel,
	pub power: PowerLevel,
	pub hue: u16,
	pub saturation: u16,
	pub brightness: u16,
	pub kelvin: u16,
	pub dim: u16,
}

/// One addressable LIFX device. Created on first observed `LightStatus`;
/// mutated only by its owning gateway session; destroyed by the watchdog or
/// when its gateway closes.
#[derive(Debug, Clone)]
pub struct Bulb {
	pub device_id: DeviceId,
	pub site_id: SiteId,
	pub last_light_state_at: Instant,
	pub state: Option<BulbState>,
	pub tag_ids: u64,
	pub owning_gateway: SiteId,
}

impl Bulb {
	pub fn new(device_id: DeviceId, site_id: SiteId, owning_gateway: SiteId) -> Bulb {
		Bulb {
			device_id,
			site_id,
			last_light_state_at: Instant::now(),
			state: None,
			tag_ids: 0,
			owning_gateway,
		}
	}

	/// Applies a decoded `LightStatus`. Idempotent: repeated identical
	/// packets still bump `last_light_state_at` (spec §4.C.5).
	pub fn apply_light_status(&mut self, state: BulbState, tag_ids: u64) {
		self.state = Some(state);
		self.tag_ids = tag_ids;
		self.last_light_state_at = Instant::now();
	}

	pub fn is_stale(&self, now: Instant, device_timeout_ms: u64) -> bool {
		now.saturating_duration_since(self.last_light_state_at).as_millis() as u64 >= device_timeout_ms
	}
}
