use std::collections::{HashMap, HashSet};

use lifx_core::{DeviceId, SiteId};

/// A single gateway-local tag slot: `{id: 0..63, label}`.
#[derive(Debug, Clone)]
pub struct Tag {
	pub id: u8,
	pub label: String,
}

/// A gateway's 64-slot sparse tag table, indexed by tag id.
#[derive(Debug, Clone)]
pub struct TagTable {
	slots: [Option<Tag>; 64],
}

impl Default for TagTable {
	fn default() -> TagTable {
		TagTable {
			slots: std::array::from_fn(|_| None),
		}
	}
}

impl TagTable {
	pub fn new() -> TagTable {
		TagTable::default()
	}

	pub fn get(&self, id: u8) -> Option<&Tag> {
		self.slots[id as usize].as_ref()
	}

	pub fn set(&mut self, id: u8, label: String) {
		self.slots[id as usize] = Some(Tag { id, label });
	}

	/// Tag ids referenced by `bitmap` that have no known label yet.
	pub fn unknown_ids(&self, bitmap: u64) -> Vec<u8> {
		(0u8..64)
			.filter(|&id| bitmap & (1 << id) != 0 && self.slots[id as usize].is_none())
			.collect()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Tag> {
		self.slots.iter().filter_map(|t| t.as_ref())
	}
}

/// The global aggregation of every gateway's tag table: `label → set<(site,
/// tag_id)>`. Resolution of a `#label` target walks this index.
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
	by_label: HashMap<String, HashSet<(SiteId, u8)>>,
}

impl TagIndex {
	pub fn new() -> TagIndex {
		TagIndex::default()
	}

	/// Called whenever a gateway's tag table changes (a slot gains or
	/// changes its label).
	pub fn set(&mut self, site: SiteId, tag_id: u8, label: &str) {
		self.remove_slot(site, tag_id);
		self.by_label.entry(label.to_owned()).or_default().insert((site, tag_id));
	}

	/// Removes every `(site, tag_id)` mapping, e.g. when a gateway closes.
	pub fn remove_gateway(&mut self, site: SiteId) {
		self.by_label.retain(|_, slots| {
			slots.retain(|&(s, _)| s != site);
			!slots.is_empty()
		});
	}

	fn remove_slot(&mut self, site: SiteId, tag_id: u8) {
		for slots in self.by_label.values_mut() {
			slots.remove(&(site, tag_id));
		}
		self.by_label.retain(|_, slots| !slots.is_empty());
	}

	/// All `(site, tag_id)` pairs a label currently maps to.
	pub fn slots_for(&self, label: &str) -> Option<&HashSet<(SiteId, u8)>> {
		self.by_label.get(label)
	}

	/// Resolves `#label` to a deduplicated device list by intersecting each
	/// matching `(site, tag_id)` with the bulbs currently known to carry
	/// that bit, as reported by `tag_ids_of`.
	pub fn resolve<'a>(
		&self,
		label: &str,
		tag_ids_of: impl Fn(SiteId) -> Vec<(DeviceId, u64)> + 'a,
	) -> Vec<DeviceId> {
		let mut out = HashSet::new();
		if let Some(slots) = self.slots_for(label) {
			for &(site, tag_id) in slots {
				for (device, bits) in tag_ids_of(site) {
					if bits & (1 << tag_id) != 0 {
						out.insert(device);
					}
				}
			}
		}
		out.into_iter().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn site(n: u8) -> SiteId {
		SiteId([0, 0, 0, 0, 0, n])
	}

	fn device(n: u8) -> DeviceId {
		DeviceId([0, 0, 0, 0, 0, n])
	}

	#[test]
	fn unknown_ids_reports_only_unlabelled_bits() {
		let mut table = TagTable::new();
		table.set(2, "toto".into());
		let unknown = table.unknown_ids((1 << 2) | (1 << 4));
		assert_eq!(unknown, vec![4]);
	}

	#[test]
	fn multiple_tag_aggregation_resolves_disjoint_device_sets() {
		let mut index = TagIndex::new();
		index.set(site(1), 2, "toto");
		index.set(site(1), 4, "toto");
		index.set(site(1), 42, "test");

		let tag_ids_of = |_site| {
			vec![
				(device(1), (1u64 << 2) | (1u64 << 4)),
				(device(2), 1u64 << 42),
			]
		};

		let mut toto = index.resolve("toto", tag_ids_of);
		toto.sort();
		assert_eq!(toto, vec![device(1)]);

		let test_devices = index.resolve("test", tag_ids_of);
		assert_eq!(test_devices, vec![device(2)]);
	}

	#[test]
	fn removing_gateway_drops_its_slots_but_not_others() {
		let mut index = TagIndex::new();
		index.set(site(1), 2, "toto");
		index.set(site(2), 2, "toto");
		index.remove_gateway(site(1));

		assert_eq!(index.slots_for("toto").unwrap().len(), 1);
		assert!(index.slots_for("toto").unwrap().contains(&(site(2), 2)));
	}
}
