use std::collections::HashMap;
use std::time::Duration;

use lifx_core::DeviceId;

/// Where a command's packets should be addressed (spec §4.F).
#[derive(Debug, Clone)]
pub enum TargetSpec {
	/// `#<device_id>`
	Device(DeviceId),
	/// `#<tag_label>`
	Tag(String),
	/// `*`
	All,
}

/// HSBK fields as validated per spec §6: `h ∈ [0, 65535]`, `s, b ∈ [0,
/// 65535]`, `k ∈ [2500, 9000]`, `transition_ms ≥ 0`.
#[derive(Debug, Clone, Copy)]
pub struct HsbkArgs {
	pub hue: u16,
	pub saturation: u16,
	pub brightness: u16,
	pub kelvin: u16,
	pub transition_ms: u32,
}

impl HsbkArgs {
	pub fn validate(&self) -> Result<(), crate::error::CoreError> {
		if !(2500..=9000).contains(&self.kelvin) {
			return Err(crate::error::CoreError::InvalidCommand(format!(
				"kelvin {} out of range [2500, 9000]",
				self.kelvin
			)));
		}
		Ok(())
	}
}

/// The command grammar exposed to the excluded JSON-RPC front end (spec
/// §6).
#[derive(Debug, Clone)]
pub enum Verb {
	PowerOn,
	PowerOff,
	SetLightFromHsbk(HsbkArgs),
	GetLightState,
	Tag { label: String },
	Untag { label: String },
	SetLabel { label: String },
}

#[derive(Debug, Clone)]
pub struct Command {
	pub target: TargetSpec,
	pub verb: Verb,
}

/// Default per spec §4.F / §6.
pub const QUERY_TIMEOUT_MS: u64 = 2_000;

/// Per-target status for a query command's partial results (spec §4.F,
/// §8 scenario 6).
#[derive(Debug, Clone)]
pub enum TargetStatus {
	Ok(crate::bulb::BulbState),
	Timeout,
}

/// Result of a `get_light_state` query once the collector resolves, either
/// because every target replied or `QUERY_TIMEOUT_MS` elapsed.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
	pub by_device: HashMap<DeviceId, TargetStatus>,
}

/// Outcome of `dispatch()`: a command verb returns immediately once its
/// packets are written; a query verb returns once its collector resolves.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
	Dispatched,
	Query(QueryResult),
}

/// Collects replies for a query command across one or more gateways,
/// resolving at `QUERY_TIMEOUT_MS` even if some targets never answered
/// (spec §4.F, §5 cancellation & timeouts).
pub struct QueryCollector {
	targets: Vec<DeviceId>,
	received: HashMap<DeviceId, crate::bulb::BulbState>,
	deadline: tokio::time::Instant,
}

impl QueryCollector {
	pub fn new(targets: Vec<DeviceId>, timeout: Duration) -> QueryCollector {
		QueryCollector {
			targets,
			received: HashMap::new(),
			deadline: tokio::time::Instant::now() + timeout,
		}
	}

	pub fn record(&mut self, device_id: DeviceId, state: crate::bulb::BulbState) {
		self.received.insert(device_id, state);
	}

	pub fn is_complete(&self) -> bool {
		self.targets.iter().all(|t| self.received.contains_key(t))
	}

	pub fn deadline(&self) -> tokio::time::Instant {
		self.deadline
	}

	/// Finalizes into a [QueryResult], marking every target that never
	/// replied as `Timeout`. Late replies arriving after this point still
	/// update bulb state in the registry, just not this collector (spec §5).
	pub fn into_result(self) -> QueryResult {
		let mut by_device = HashMap::new();
		for target in self.targets {
			let status = match self.received.get(&target) {
				Some(state) => TargetStatus::Ok(state.clone()),
				None => TargetStatus::Timeout,
			};
			by_device.insert(target, status);
		}
		QueryResult { by_device }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn device(n: u8) -> DeviceId {
		DeviceId([0, 0, 0, 0, 0, n])
	}

	fn state() -> crate::bulb::BulbState {
		crate::bulb::BulbState {
			label: lifx_core::LifxLabel::new("x"),
			power: lifx_core::PowerLevel::Enabled,
			hue: 0,
			saturation: 0,
			brightness: 0,
			kelvin: 3500,
			dim: 0,
		}
	}

	#[test]
	fn hsbk_rejects_out_of_range_kelvin() {
		let args = HsbkArgs {
			hue: 0,
			saturation: 0,
			brightness: 0,
			kelvin: 9001,
			transition_ms: 0,
		};
		assert!(args.validate().is_err());
	}

	#[test]
	fn collector_reports_partial_results_on_timeout() {
		let mut collector = QueryCollector::new(vec![device(1), device(2), device(3)], Duration::from_millis(2_000));
		collector.record(device(1), state());
		collector.record(device(2), state());
		assert!(!collector.is_complete());

		let result = collector.into_result();
		assert!(matches!(result.by_device[&device(1)], TargetStatus::Ok(_)));
		assert!(matches!(result.by_device[&device(2)], TargetStatus::Ok(_)));
		assert!(matches!(result.by_device[&device(3)], TargetStatus::Timeout));
	}

	#[test]
	fn collector_is_complete_once_every_target_replies() {
		let mut collector = QueryCollector::new(vec![device(1)], Duration::from_millis(2_000));
		assert!(!collector.is_complete());
		collector.record(device(1), state());
		assert!(collector.is_complete());
	}
}
