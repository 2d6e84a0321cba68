use std::collections::BTreeMap;

use lifx_core::DeviceId;

use crate::bulb::Bulb;

/// Ordered map `device_id → Bulb`, keyed lexicographically on the 6-byte
/// id (`BTreeMap` gives this for free, and `iterate()` its determinism).
#[derive(Debug, Default)]
pub struct BulbRegistry {
	bulbs: BTreeMap<DeviceId, Bulb>,
}

impl BulbRegistry {
	pub fn new() -> BulbRegistry {
		BulbRegistry::default()
	}

	/// Inserts a bulb if absent, binding its owning gateway; returns a
	/// mutable reference either way.
	pub fn upsert(&mut self, bulb_factory: impl FnOnce() -> Bulb) -> &mut Bulb {
		let device_id = {
			let probe = bulb_factory();
			let id = probe.device_id;
			self.bulbs.entry(id).or_insert(probe);
			id
		};
		self.bulbs.get_mut(&device_id).expect("just inserted")
	}

	pub fn get(&self, device_id: &DeviceId) -> Option<&Bulb> {
		self.bulbs.get(device_id)
	}

	pub fn get_mut(&mut self, device_id: &DeviceId) -> Option<&mut Bulb> {
		self.bulbs.get_mut(device_id)
	}

	/// Idempotent removal. Returns the removed bulb, if any, so the caller
	/// (the watchdog or a closing gateway) can run its `on_removed`
	/// behavior — rescinding dispatcher-collector interest in its replies.
	pub fn remove(&mut self, device_id: &DeviceId) -> Option<Bulb> {
		self.bulbs.remove(device_id)
	}

	pub fn remove_owned_by(&mut self, owning_gateway: lifx_core::SiteId) -> Vec<Bulb> {
		let to_remove: Vec<DeviceId> = self
			.bulbs
			.iter()
			.filter(|(_, bulb)| bulb.owning_gateway == owning_gateway)
			.map(|(id, _)| *id)
			.collect();
		to_remove.iter().filter_map(|id| self.bulbs.remove(id)).collect()
	}

	pub fn iterate(&self) -> impl Iterator<Item = (&DeviceId, &Bulb)> {
		self.bulbs.iter()
	}

	pub fn len(&self) -> usize {
		self.bulbs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.bulbs.is_empty()
	}
}
