use std::collections::HashMap;
use std::time::Duration;

use lifx_core::SiteId;
use tokio::time::Instant;

use crate::gateway::Gateway;
use crate::registry::BulbRegistry;

/// Adaptive broadcast timer (spec §4.E). `on_fire` both decides the next
/// interval and reports whether a broadcast should go out this tick — the
/// two are the same decision in this protocol, but kept separate so tests
/// can observe the interval sequence without a real socket.
pub struct DiscoveryTimer {
	active_ms: u64,
	passive_ms: u64,
	interval_ms: u64,
}

impl DiscoveryTimer {
	pub fn new(active_ms: u64, passive_ms: u64) -> DiscoveryTimer {
		DiscoveryTimer {
			active_ms,
			passive_ms,
			interval_ms: active_ms,
		}
	}

	pub fn current_interval(&self) -> Duration {
		Duration::from_millis(self.interval_ms)
	}

	/// Rearms for the next cycle. Must be called with the gateway count as
	/// of this tick; resets to `ACTIVE_INTERVAL_MS` when empty, otherwise
	/// doubles up to `PASSIVE_INTERVAL_MS` (spec §4.E, invariant in §3: the
	/// sequence is monotone non-decreasing while gateways remain present).
	pub fn on_fire(&mut self, gateway_count: usize) -> Duration {
		if gateway_count == 0 {
			self.interval_ms = self.active_ms;
		} else {
			self.interval_ms = (self.interval_ms * 2).min(self.passive_ms);
		}
		self.current_interval()
	}

	/// Resets to the active interval without changing any armed timer —
	/// used when the gateway set becomes empty outside of a regular fire
	/// (spec §3's reset invariant; spec §8 boundary behaviour).
	pub fn reset_to_active(&mut self) {
		self.interval_ms = self.active_ms;
	}
}

/// What the watchdog sweep decided should happen. Mutation of the registry
/// and gateway table happens in `core`, which owns them; this module only
/// makes the decision (spec §4.E rationale: convert silent failure into a
/// clean re-discovery cycle).
#[derive(Debug, Default)]
pub struct WatchdogActions {
	pub stale_bulbs: Vec<lifx_core::DeviceId>,
	pub stale_gateways: Vec<SiteId>,
	pub force_refresh_gateways: Vec<SiteId>,
	pub start_discovery: bool,
}

/// One watchdog sweep (spec §4.E). Finds bulbs past `device_timeout_ms`,
/// gateways past `device_timeout_ms` (closed) or `force_refresh_ms` (forced
/// refresh fan-out), and whether anything warrants an immediate broadcast.
pub fn sweep(
	now: Instant,
	bulbs: &BulbRegistry,
	gateways: &HashMap<SiteId, Gateway>,
	device_timeout_ms: u64,
	force_refresh_ms: u64,
) -> WatchdogActions {
	let mut actions = WatchdogActions::default();

	for (device_id, bulb) in bulbs.iterate() {
		if bulb.is_stale(now, device_timeout_ms) {
			actions.stale_bulbs.push(*device_id);
			actions.start_discovery = true;
		}
	}

	for (site_id, gateway) in gateways {
		let gw_lag = gateway.msecs_since_last_update(now);
		if gw_lag >= device_timeout_ms {
			actions.stale_gateways.push(*site_id);
			actions.start_discovery = true;
		} else if gw_lag >= force_refresh_ms {
			actions.force_refresh_gateways.push(*site_id);
		}
	}

	actions
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn discovery_interval_doubles_while_gateways_remain() {
		let mut timer = DiscoveryTimer::new(2_000, 60_000);
		assert_eq!(timer.current_interval(), Duration::from_millis(2_000));
		assert_eq!(timer.on_fire(1), Duration::from_millis(4_000));
		assert_eq!(timer.on_fire(1), Duration::from_millis(8_000));
	}

	#[test]
	fn discovery_interval_caps_at_passive() {
		let mut timer = DiscoveryTimer::new(2_000, 5_000);
		timer.on_fire(1);
		let capped = timer.on_fire(1);
		assert_eq!(capped, Duration::from_millis(5_000));
	}

	#[test]
	fn discovery_interval_resets_when_gateways_disappear() {
		let mut timer = DiscoveryTimer::new(2_000, 60_000);
		timer.on_fire(1);
		timer.on_fire(1);
		let reset = timer.on_fire(0);
		assert_eq!(reset, Duration::from_millis(2_000));
	}
}
