use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lifx_core::{DeviceId, LifxLabel, Packet, PowerLevel, RawPacket, SiteId};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::bulb::{Bulb, BulbState};
use crate::broadcast::BroadcastSocket;
use crate::config::Config;
use crate::discovery::{self, DiscoveryTimer};
use crate::dispatch::{Command, DispatchOutcome, QueryCollector, QueryResult, TargetSpec, TargetStatus, Verb};
use crate::error::CoreError;
use crate::gateway::Gateway;
use crate::registry::BulbRegistry;
use crate::tag::TagIndex;

/// What a gateway's recv task reports back to the central loop (spec §10.E:
/// the only concurrency boundary in this reactor is this channel). `Closed`
/// is reported once, when the socket read loop dies, so `Core` learns of the
/// failure instead of leaving a dead gateway `Open` forever.
enum GatewayEvent {
	Datagram(Vec<u8>),
	Closed,
}

struct GatewayMessage {
	site_id: SiteId,
	event: GatewayEvent,
}

/// An in-flight `GetTagLabels` request: the bits of `bitmap` that hadn't
/// been labelled yet when it was sent. Retried against whichever of those
/// bits are still unlabelled once `tag_label_timeout_ms` elapses (spec §3:
/// a tag bit implies its slot is populated within `TAG_LABEL_TIMEOUT`).
struct PendingTagRequest {
	site_id: SiteId,
	device_id: DeviceId,
	bitmap: u64,
	issued_at: Instant,
}

type CommandReply = oneshot::Sender<Result<DispatchOutcome, CoreError>>;

/// A cheaply-cloneable handle client code (the excluded JSON-RPC front end)
/// uses to submit commands to a running [Core] without sharing its state
/// directly — mirrors spec §6's `dispatch(command) → result | error`.
#[derive(Clone)]
pub struct CoreHandle {
	command_tx: mpsc::UnboundedSender<(Command, CommandReply)>,
}

impl CoreHandle {
	pub async fn dispatch(&self, command: Command) -> Result<DispatchOutcome, CoreError> {
		let (tx, rx) = oneshot::channel();
		self.command_tx
			.send((command, tx))
			.map_err(|_| CoreError::InvalidCommand("core has shut down".into()))?;
		rx.await.map_err(|_| CoreError::InvalidCommand("core dropped the reply channel".into()))?
	}
}

/// The long-lived context threading the bulb registry, gateway table, tag
/// index, and reactor handles together (spec §9 design notes: "thread them
/// through an explicit `Core` value rather than using process-wide
/// singletons").
pub struct Core {
	config: Config,
	broadcast: BroadcastSocket,
	gateways: HashMap<SiteId, Gateway>,
	registry: BulbRegistry,
	tag_index: TagIndex,
	discovery_timer: DiscoveryTimer,
	gateway_rx: mpsc::UnboundedReceiver<GatewayMessage>,
	gateway_tx: mpsc::UnboundedSender<GatewayMessage>,
	command_rx: mpsc::UnboundedReceiver<(Command, CommandReply)>,
	closing_gateways: Vec<SiteId>,
	active_collectors: Vec<(QueryCollector, oneshot::Sender<QueryResult>)>,
	pending_tag_requests: Vec<PendingTagRequest>,
}

impl Core {
	/// `init` per spec §9 lifecycle (`init → run → shutdown`). Binding
	/// failures map to exit code 1 at the `main.rs` boundary (spec §6).
	pub async fn init(config: Config) -> Result<(Core, CoreHandle), std::io::Error> {
		let broadcast = BroadcastSocket::bind().await?;
		let discovery_timer = DiscoveryTimer::new(config.active_discovery_interval_ms, config.passive_discovery_interval_ms);
		let (gateway_tx, gateway_rx) = mpsc::unbounded_channel();
		let (command_tx, command_rx) = mpsc::unbounded_channel();

		let core = Core {
			config,
			broadcast,
			gateways: HashMap::new(),
			registry: BulbRegistry::new(),
			tag_index: TagIndex::new(),
			discovery_timer,
			gateway_rx,
			gateway_tx,
			command_rx,
			closing_gateways: Vec::new(),
			active_collectors: Vec::new(),
			pending_tag_requests: Vec::new(),
		};
		let handle = CoreHandle { command_tx };
		Ok((core, handle))
	}

	/// Runs the single-threaded cooperative reactor until the process is
	/// torn down (spec §4.G / §5). Never blocks: every branch below is a
	/// non-blocking wait on a socket, timer, or channel.
	pub async fn run(mut self) -> ! {
		self.discovery_timer.reset_to_active();
		if let Err(e) = self.broadcast.broadcast_discovery().await {
			log::warn!("initial discovery broadcast failed: {}", e);
		}

		let mut discovery_deadline = Instant::now() + self.discovery_timer.current_interval();
		let mut watchdog_interval = tokio::time::interval(Duration::from_millis(self.config.watchdog_interval_ms));
		let mut refresh_tick = tokio::time::interval(Duration::from_millis(50));
		let mut collector_sweep = tokio::time::interval(Duration::from_millis(100));

		let mut broadcast_buf = [0u8; 1024];

		loop {
			tokio::select! {
				recv = self.broadcast.recv_from(&mut broadcast_buf) => {
					match recv {
						Ok((n, src)) => self.handle_broadcast_reply(&broadcast_buf[..n], src).await,
						Err(e) => log::warn!("broadcast socket recv error: {}", e),
					}
				}
				Some(message) = self.gateway_rx.recv() => {
					match message.event {
						GatewayEvent::Datagram(bytes) => self.handle_gateway_datagram(message.site_id, bytes).await,
						GatewayEvent::Closed => self.close_gateway_on_error(message.site_id).await,
					}
				}
				Some((command, reply)) = self.command_rx.recv() => {
					let outcome = self.dispatch(command).await;
					let _ = reply.send(outcome);
				}
				_ = tokio::time::sleep_until(discovery_deadline) => {
					let interval = self.discovery_timer.on_fire(self.gateways.len());
					discovery_deadline = Instant::now() + interval;
					if let Err(e) = self.broadcast.broadcast_discovery().await {
						log::warn!("discovery broadcast failed: {}", e);
					}
				}
				_ = watchdog_interval.tick() => {
					self.run_watchdog_sweep().await;
				}
				_ = refresh_tick.tick() => {
					self.run_refresh_tick().await;
				}
				_ = collector_sweep.tick() => {
					self.resolve_expired_collectors();
				}
			}
		}
	}

	async fn handle_broadcast_reply(&mut self, bytes: &[u8], src: SocketAddr) {
		let raw = match RawPacket::unpack(bytes) {
			Ok(raw) => raw,
			Err(e) => {
				log::debug!("dropping broadcast frame: {}", e);
				return;
			}
		};
		if let Packet::PanGateway { port, .. } = raw.packet {
			let site_id = raw.header.site;
			if self.gateways.contains_key(&site_id) {
				return;
			}
			let gateway_addr = SocketAddr::new(src.ip(), port as u16);
			match self.open_gateway(site_id, gateway_addr).await {
				Ok(()) => log::info!("opened gateway {} at {}", site_id, gateway_addr),
				Err(e) => log::warn!("could not open gateway {} at {}: {}", site_id, gateway_addr, e),
			}
		}
	}

	/// Opens a new gateway socket and spawns its recv task. Declines on
	/// file-descriptor exhaustion, per spec §5's socket budget tolerance.
	async fn open_gateway(&mut self, site_id: SiteId, addr: SocketAddr) -> Result<(), std::io::Error> {
		let socket = match UdpSocket::bind(("0.0.0.0", 0)).await {
			Ok(s) => s,
			Err(e) => {
				log::warn!("declining new gateway, socket budget exhausted: {}", e);
				return Err(e);
			}
		};
		socket.connect(addr).await?;
		let gateway = Gateway::new(site_id, addr, Arc::new(socket));
		let recv_socket = gateway.socket_handle();
		self.gateways.insert(site_id, gateway);

		let tx = self.gateway_tx.clone();
		tokio::spawn(async move {
			let mut buf = [0u8; 1024];
			loop {
				match recv_socket.recv(&mut buf).await {
					Ok(n) => {
						let message = GatewayMessage { site_id, event: GatewayEvent::Datagram(buf[..n].to_vec()) };
						if tx.send(message).is_err() {
							return;
						}
					}
					Err(e) => {
						log::debug!("gateway {} recv task exiting: {}", site_id, e);
						let _ = tx.send(GatewayMessage { site_id, event: GatewayEvent::Closed });
						return;
					}
				}
			}
		});

		Ok(())
	}

	async fn handle_gateway_datagram(&mut self, site_id: SiteId, bytes: Vec<u8>) {
		let raw = match RawPacket::unpack(&bytes) {
			Ok(raw) => raw,
			Err(e) => {
				log::debug!("dropping frame from gateway {}: {}", site_id, e);
				return;
			}
		};
		let source = raw.header.target;
		let packet_type = raw.packet.packet_type();

		if let Some(gateway) = self.gateways.get_mut(&site_id) {
			if let Some(pending) = gateway.on_reply(source, packet_type) {
				if let Some(handler) = pending.reply_handler {
					let _ = handler.send(raw.clone());
				}
			}
		}

		match raw.packet {
			Packet::LightStatus {
				color,
				dim,
				power,
				label,
				tags,
			} => self.apply_light_status(site_id, source, color, dim, power, label, tags).await,
			Packet::TagLabels { tags, label } => self.apply_tag_labels(site_id, tags, label),
			_ => {}
		}
	}

	/// Marks a gateway `Closing` after an I/O failure invalidates its session
	/// (spec §4.C/§7: anything that invalidates a gateway's assumptions closes
	/// that gateway) and fires an immediate broadcast so it can be
	/// rediscovered.
	async fn close_gateway_on_error(&mut self, site_id: SiteId) {
		let should_broadcast = if let Some(gateway) = self.gateways.get_mut(&site_id) {
			if gateway.state == crate::gateway::GatewayState::Open {
				log::warn!("gateway {} failed, closing and triggering re-discovery", site_id);
				gateway.begin_closing();
				true
			} else {
				false
			}
		} else {
			false
		};
		if should_broadcast {
			self.closing_gateways.push(site_id);
			if let Err(e) = self.broadcast.broadcast_discovery().await {
				log::warn!("re-discovery broadcast after gateway failure failed: {}", e);
			}
		}
	}

	async fn apply_light_status(
		&mut self,
		site_id: SiteId,
		device_id: DeviceId,
		color: lifx_core::HSBK,
		dim: u16,
		power: PowerLevel,
		label: LifxLabel,
		tags: u64,
	) {
		let bulb = self.registry.upsert(|| Bulb::new(device_id, site_id, site_id));
		bulb.apply_light_status(
			BulbState {
				label,
				power,
				hue: color.hue,
				saturation: color.saturation,
				brightness: color.brightness,
				kelvin: color.kelvin,
				dim,
			},
			tags,
		);

		let unknown = self.gateways.get(&site_id).map(|g| g.tags.unknown_ids(tags)).unwrap_or_default();
		if let Some(gateway) = self.gateways.get_mut(&site_id) {
			gateway.bulbs.insert(device_id);
		}
		if !unknown.is_empty() {
			let bitmap: u64 = unknown.iter().fold(0u64, |acc, &id| acc | (1 << id));
			if let Some(gateway) = self.gateways.get_mut(&site_id) {
				match gateway.send(device_id, Packet::GetTagLabels { tags: bitmap }, Some(0x20), None).await {
					Ok(()) => self.pending_tag_requests.push(PendingTagRequest {
						site_id,
						device_id,
						bitmap,
						issued_at: Instant::now(),
					}),
					Err(e) => {
						log::debug!("failed to request tag labels from gateway {}: {}", site_id, e);
						self.close_gateway_on_error(site_id).await;
					}
				}
			}
		}

		self.resolve_collectors_for(device_id);
	}

	fn apply_tag_labels(&mut self, site_id: SiteId, tags: u64, label: LifxLabel) {
		let Some(gateway) = self.gateways.get_mut(&site_id) else { return };
		for id in 0u8..64 {
			if tags & (1 << id) != 0 {
				gateway.tags.set(id, label.0.clone());
				self.tag_index.set(site_id, id, &label.0);
			}
		}
	}

	fn resolve_collectors_for(&mut self, device_id: DeviceId) {
		if let Some(bulb) = self.registry.get(&device_id) {
			if let Some(state) = &bulb.state {
				for (collector, _) in self.active_collectors.iter_mut() {
					collector.record(device_id, state.clone());
				}
			}
		}
		self.drain_complete_collectors();
	}

	fn drain_complete_collectors(&mut self) {
		let mut i = 0;
		while i < self.active_collectors.len() {
			if self.active_collectors[i].0.is_complete() {
				let (collector, reply) = self.active_collectors.remove(i);
				let _ = reply.send(collector.into_result());
			} else {
				i += 1;
			}
		}
	}

	fn resolve_expired_collectors(&mut self) {
		let now = Instant::now();
		let mut i = 0;
		while i < self.active_collectors.len() {
			if now >= self.active_collectors[i].0.deadline() {
				let (collector, reply) = self.active_collectors.remove(i);
				let _ = reply.send(collector.into_result());
			} else {
				i += 1;
			}
		}
	}

	/// Retries or drops in-flight `GetTagLabels` requests against
	/// `tag_label_timeout_ms` (spec §3: a tag bit implies its slot is
	/// populated within `TAG_LABEL_TIMEOUT`). A request is dropped once every
	/// bit it asked about has since been labelled, even before the deadline.
	async fn run_tag_label_retry_sweep(&mut self, now: Instant) {
		let pending = std::mem::take(&mut self.pending_tag_requests);
		for req in pending {
			let still_unknown = match self.gateways.get(&req.site_id) {
				Some(gateway) => gateway.tags.unknown_ids(req.bitmap),
				None => continue,
			};
			if still_unknown.is_empty() {
				continue;
			}
			let elapsed_ms = now.saturating_duration_since(req.issued_at).as_millis() as u64;
			if elapsed_ms < self.config.tag_label_timeout_ms {
				self.pending_tag_requests.push(req);
				continue;
			}
			let bitmap: u64 = still_unknown.iter().fold(0u64, |acc, &id| acc | (1 << id));
			if let Some(gateway) = self.gateways.get_mut(&req.site_id) {
				match gateway.send(req.device_id, Packet::GetTagLabels { tags: bitmap }, Some(0x20), None).await {
					Ok(()) => self.pending_tag_requests.push(PendingTagRequest {
						site_id: req.site_id,
						device_id: req.device_id,
						bitmap,
						issued_at: now,
					}),
					Err(e) => {
						log::debug!("tag label retry to gateway {} failed: {}", req.site_id, e);
						self.close_gateway_on_error(req.site_id).await;
					}
				}
			}
		}
	}

	async fn run_watchdog_sweep(&mut self) {
		let now = Instant::now();
		self.run_tag_label_retry_sweep(now).await;
		let actions = discovery::sweep(now, &self.registry, &self.gateways, self.config.device_timeout_ms, self.config.force_refresh_ms);

		for device_id in &actions.stale_bulbs {
			if let Some(bulb) = self.registry.remove(device_id) {
				log::info!("closing stale bulb {}", bulb.device_id);
			}
		}
		for site_id in &actions.stale_gateways {
			if let Some(gateway) = self.gateways.get_mut(site_id) {
				if gateway.state == crate::gateway::GatewayState::Open {
					log::info!("closing stale gateway {}, draining pending writes", site_id);
					gateway.begin_closing();
					self.closing_gateways.push(*site_id);
				}
			}
		}
		self.finalize_closing_gateways(now);
		for site_id in &actions.force_refresh_gateways {
			if let Some(gateway) = self.gateways.get(site_id) {
				let bulbs = gateway.bulbs_for_forced_refresh();
				for device_id in bulbs {
					if let Some(gateway) = self.gateways.get_mut(site_id) {
						let _ = gateway.send(device_id, Packet::GetLightState, Some(0x6B), None).await;
					}
				}
			}
		}

		if actions.start_discovery {
			if let Err(e) = self.broadcast.broadcast_discovery().await {
				log::warn!("watchdog-triggered discovery broadcast failed: {}", e);
			}
		}
	}

	/// Finishes the `Closing → Closed` transition for any gateway whose
	/// 500ms drain window has elapsed, removing its owned bulbs and its tag
	/// slots from the global index (spec §4.C state machine).
	fn finalize_closing_gateways(&mut self, now: Instant) {
		let mut still_closing = Vec::new();
		for site_id in self.closing_gateways.drain(..) {
			let expired = self.gateways.get(&site_id).map(|g| g.is_drain_expired(now)).unwrap_or(true);
			if expired {
				if let Some(mut gateway) = self.gateways.remove(&site_id) {
					for pending in gateway.cancel_pending() {
						drop(pending.reply_handler);
					}
				}
				self.registry.remove_owned_by(site_id);
				self.tag_index.remove_gateway(site_id);
				self.pending_tag_requests.retain(|r| r.site_id != site_id);
				log::info!("gateway {} closed", site_id);
			} else {
				still_closing.push(site_id);
			}
		}
		self.closing_gateways = still_closing;
	}

	async fn run_refresh_tick(&mut self) {
		let now = Instant::now();
		let refresh_period_ms = self.config.refresh_period_ms;
		let max_packets_per_sec = self.config.max_packets_per_sec;

		let site_ids: Vec<SiteId> = self.gateways.keys().copied().collect();
		for site_id in site_ids {
			let due = {
				let gateway = self.gateways.get_mut(&site_id).expect("iterated from live keys");
				gateway.tick_refresh(now, refresh_period_ms, max_packets_per_sec)
			};
			if let Some(device_id) = due {
				if let Some(gateway) = self.gateways.get_mut(&site_id) {
					let _ = gateway.send(device_id, Packet::GetLightState, Some(0x6B), None).await;
				}
			}
		}
	}

	/// `dispatch(command) → result | error` (spec §6).
	async fn dispatch(&mut self, command: Command) -> Result<DispatchOutcome, CoreError> {
		let targets = self.resolve_targets(&command.target);
		if targets.is_empty() {
			return Err(CoreError::TargetNotFound);
		}

		match command.verb {
			Verb::PowerOn => self.fan_out(&targets, |_| Packet::SetPower { level: PowerLevel::Enabled }, None).await,
			Verb::PowerOff => self.fan_out(&targets, |_| Packet::SetPower { level: PowerLevel::Standby }, None).await,
			Verb::SetLabel { label } => {
				let label = LifxLabel::new(&label);
				self.fan_out(&targets, move |_| Packet::SetBulbLabel { label: label.clone() }, None).await
			}
			Verb::SetLightFromHsbk(args) => {
				args.validate()?;
				self.fan_out(
					&targets,
					move |_| Packet::SetLightColor {
						color: lifx_core::HSBK {
							hue: args.hue,
							saturation: args.saturation,
							brightness: args.brightness,
							kelvin: args.kelvin,
						},
						transition_ms: args.transition_ms,
					},
					None,
				)
				.await
			}
			Verb::GetLightState => self.query_light_state(targets).await,
			Verb::Tag { label } => self.apply_tag_command(targets, label, true).await,
			Verb::Untag { label } => self.apply_tag_command(targets, label, false).await,
		}
	}

    fn resolve_targets(&self, spec: &TargetSpec) -> Vec<DeviceId> {
		match spec {
			TargetSpec::Device(id) => {
				if self.registry.get(id).is_some() {
					vec![*id]
				} else {
					vec![]
				}
			}
			TargetSpec::All => self.registry.iterate().map(|(id, _)| *id).collect(),
			TargetSpec::Tag(label) => {
				let registry = &self.registry;
				self.tag_index.resolve(label, |site_id| {
					registry
						.iterate()
						.filter(|(_, bulb)| bulb.owning_gateway == site_id)
						.map(|(id, bulb)| (*id, bulb.tag_ids))
						.collect()
				})
			}
		}
	}

	async fn fan_out(
		&mut self,
		targets: &[DeviceId],
		mut build: impl FnMut(DeviceId) -> Packet,
		expects_reply: Option<u16>,
	) -> Result<DispatchOutcome, CoreError> {
		for &device_id in targets {
			let Some(site_id) = self.registry.get(&device_id).map(|b| b.owning_gateway) else { continue };
			if let Some(gateway) = self.gateways.get_mut(&site_id) {
				if let Err(e) = gateway.send(device_id, build(device_id), expects_reply, None).await {
					self.close_gateway_on_error(site_id).await;
					return Err(CoreError::GatewayIo(e));
				}
			}
		}
		Ok(DispatchOutcome::Dispatched)
	}

	async fn query_light_state(&mut self, targets: Vec<DeviceId>) -> Result<DispatchOutcome, CoreError> {
		for &device_id in &targets {
			let Some(site_id) = self.registry.get(&device_id).map(|b| b.owning_gateway) else { continue };
			if let Some(gateway) = self.gateways.get_mut(&site_id) {
				if let Err(e) = gateway.send(device_id, Packet::GetLightState, Some(0x6B), None).await {
					self.close_gateway_on_error(site_id).await;
					return Err(CoreError::GatewayIo(e));
				}
			}
		}

		let (tx, rx) = oneshot::channel();
		let collector = QueryCollector::new(targets, Duration::from_millis(self.config.query_timeout_ms));
		self.active_collectors.push((collector, tx));
		self.drain_complete_collectors();

		match rx.await {
			Ok(result) => Ok(DispatchOutcome::Query(result)),
			Err(_) => Ok(DispatchOutcome::Query(QueryResult::default())),
		}
	}

	async fn apply_tag_command(&mut self, targets: Vec<DeviceId>, label: String, set: bool) -> Result<DispatchOutcome, CoreError> {
		for device_id in targets {
			let Some(site_id) = self.registry.get(&device_id).map(|b| b.owning_gateway) else { continue };
			let Some(gateway) = self.gateways.get_mut(&site_id) else { continue };

			let existing_slot = gateway.tags.iter().find(|t| t.label == label).map(|t| t.id);

			let slot_id = if let Some(id) = existing_slot {
				id
			} else if !set {
				continue; // untagging a label never applied to this gateway is a no-op
			} else {
				match (0u8..64).find(|id| gateway.tags.get(*id).is_none()) {
					Some(id) => id,
					None => return Err(CoreError::ResourceExhausted("no free tag slot on gateway".into())),
				}
			};

			gateway.tags.set(slot_id, label.clone());
			self.tag_index.set(site_id, slot_id, &label);
			if let Err(e) = gateway
				.send(device_id, Packet::SetTagLabels { tags: 1 << slot_id, label: LifxLabel::new(&label) }, None, None)
				.await
			{
				self.close_gateway_on_error(site_id).await;
				return Err(CoreError::GatewayIo(e));
			}

			let current_tags = self.registry.get(&device_id).map(|b| b.tag_ids).unwrap_or(0);
			let new_tags = if set { current_tags | (1 << slot_id) } else { current_tags & !(1 << slot_id) };
			if let Some(bulb) = self.registry.get_mut(&device_id) {
				bulb.tag_ids = new_tags;
			}
			if let Some(site_id2) = self.registry.get(&device_id).map(|b| b.owning_gateway) {
				if let Some(gateway) = self.gateways.get_mut(&site_id2) {
					if let Err(e) = gateway.send(device_id, Packet::SetTags { tags: new_tags }, None, None).await {
						self.close_gateway_on_error(site_id2).await;
						return Err(CoreError::GatewayIo(e));
					}
				}
			}
		}
		Ok(DispatchOutcome::Dispatched)
	}
}

/// Surfaces a per-target query result as an ok/timeout pair, for callers
/// that want to render spec §8 scenario 6's partial-result shape directly.
pub fn summarize(result: &QueryResult) -> (usize, usize) {
	let ok = result.by_device.values().filter(|s| matches!(s, TargetStatus::Ok(_))).count();
	let timeout = result.by_device.values().filter(|s| matches!(s, TargetStatus::Timeout)).count();
	(ok, timeout)
}

#[cfg(test)]
mod tests {
	use super::*;
	use lifx_core::{BuildOptions, Service, Target};

	fn site(n: u8) -> SiteId {
		SiteId([0, 0, 0, 0, 0, n])
	}

	fn device(n: u8) -> DeviceId {
		DeviceId([0, 0, 0, 0, 0, n])
	}

	async fn test_core(config: Config) -> Core {
		let broadcast = BroadcastSocket::bind_ephemeral().await.unwrap();
		let discovery_timer = DiscoveryTimer::new(config.active_discovery_interval_ms, config.passive_discovery_interval_ms);
		let (gateway_tx, gateway_rx) = mpsc::unbounded_channel();
		let (_command_tx, command_rx) = mpsc::unbounded_channel();
		Core {
			config,
			broadcast,
			gateways: HashMap::new(),
			registry: BulbRegistry::new(),
			tag_index: TagIndex::new(),
			discovery_timer,
			gateway_rx,
			gateway_tx,
			command_rx,
			closing_gateways: Vec::new(),
			active_collectors: Vec::new(),
			pending_tag_requests: Vec::new(),
		}
	}

	/// A gateway whose socket is connected to a real loopback peer, so
	/// outbound sends in these tests can be read back and decoded.
	async fn paired_gateway(site_id: SiteId) -> (Gateway, UdpSocket) {
		let peer = UdpSocket::bind(("127.0.0.1", 0)).await.unwrap();
		let peer_addr = peer.local_addr().unwrap();
		let socket = UdpSocket::bind(("127.0.0.1", 0)).await.unwrap();
		socket.connect(peer_addr).await.unwrap();
		(Gateway::new(site_id, peer_addr, Arc::new(socket)), peer)
	}

	/// Spec §8 scenario 1: a `PanGateway` reply to a broadcast opens a new
	/// `Open` gateway keyed by site id.
	#[tokio::test]
	async fn cold_discovery_opens_a_gateway_from_a_pangateway_reply() {
		let mut core = test_core(Config::default()).await;
		let peer = UdpSocket::bind(("127.0.0.1", 0)).await.unwrap();
		let peer_addr = peer.local_addr().unwrap();
		let site_id = site(1);

		let options = BuildOptions {
			target: Target::Tags(0),
			site: site_id,
			..Default::default()
		};
		let raw = RawPacket::build(
			&options,
			Packet::PanGateway {
				service: Service::Udp,
				port: peer_addr.port() as u32,
			},
		)
		.unwrap();

		core.handle_broadcast_reply(&raw.pack().unwrap(), SocketAddr::new(peer_addr.ip(), 0)).await;

		let gateway = core.gateways.get(&site_id).expect("gateway opened");
		assert_eq!(gateway.state, crate::gateway::GatewayState::Open);
		assert_eq!(gateway.peer_addr, peer_addr);
	}

	/// Spec §8 scenario: an unlabelled tag bit on a `LightStatus` triggers a
	/// `GetTagLabels` request, and the eventual `TagLabels` reply populates
	/// the global tag index.
	#[tokio::test]
	async fn unknown_tag_bits_trigger_a_request_and_the_reply_populates_the_index() {
		let mut core = test_core(Config::default()).await;
		let site_id = site(1);
		let (gateway, peer) = paired_gateway(site_id).await;
		core.gateways.insert(site_id, gateway);

		let device_id = device(1);
		core.apply_light_status(site_id, device_id, lifx_core::HSBK::default(), 0, PowerLevel::Enabled, LifxLabel::new("lamp"), 1 << 5)
			.await;
		assert!(core.registry.get(&device_id).is_some());

		let mut buf = [0u8; 1024];
		let (n, _) = peer.recv_from(&mut buf).await.unwrap();
		match RawPacket::unpack(&buf[..n]).unwrap().packet {
			Packet::GetTagLabels { tags } => assert_eq!(tags, 1 << 5),
			other => panic!("expected GetTagLabels, got {:?}", other),
		}

		let reply_options = BuildOptions {
			target: Target::Device(device_id),
			site: site_id,
			..Default::default()
		};
		let reply = RawPacket::build(
			&reply_options,
			Packet::TagLabels {
				tags: 1 << 5,
				label: LifxLabel::new("upstairs"),
			},
		)
		.unwrap();
		core.handle_gateway_datagram(site_id, reply.pack().unwrap()).await;

		let slots = core.tag_index.slots_for("upstairs").expect("label indexed");
		assert!(slots.contains(&(site_id, 5)));
	}

	/// Spec §8 scenario: the watchdog retires a stale bulb immediately, then
	/// drains a stale gateway through `Closing` for `CLOSING_DRAIN_MS` before
	/// finally removing it.
	#[tokio::test(start_paused = true)]
	async fn watchdog_sweep_retires_stale_bulbs_and_drains_gateways_before_closing() {
		let config = Config {
			device_timeout_ms: 1_000,
			force_refresh_ms: 1_000_000,
			..Config::default()
		};
		let mut core = test_core(config).await;
		let site_id = site(1);
		let (gateway, _peer) = paired_gateway(site_id).await;
		core.gateways.insert(site_id, gateway);
		core.registry.upsert(|| Bulb::new(device(1), site_id, site_id));

		tokio::time::advance(Duration::from_millis(1_100)).await;
		core.run_watchdog_sweep().await;

		assert!(core.registry.get(&device(1)).is_none());
		let gateway = core.gateways.get(&site_id).expect("gateway still draining");
		assert_eq!(gateway.state, crate::gateway::GatewayState::Closing);

		tokio::time::advance(Duration::from_millis(600)).await;
		core.run_watchdog_sweep().await;
		assert!(core.gateways.get(&site_id).is_none());
	}

	/// Spec §8 scenario 6: a query command whose targets never all reply
	/// resolves at the collector's deadline with partial results.
	#[tokio::test(start_paused = true)]
	async fn expired_query_collectors_resolve_with_timeouts() {
		let mut core = test_core(Config::default()).await;
		let (tx, rx) = oneshot::channel();
		let collector = QueryCollector::new(vec![device(1), device(2)], Duration::from_millis(2_000));
		core.active_collectors.push((collector, tx));

		tokio::time::advance(Duration::from_millis(2_001)).await;
		core.resolve_expired_collectors();

		let result = rx.await.unwrap();
		assert!(matches!(result.by_device[&device(1)], TargetStatus::Timeout));
		assert!(matches!(result.by_device[&device(2)], TargetStatus::Timeout));
	}

	#[tokio::test]
	async fn dispatching_power_on_sends_set_power_enabled_to_the_owning_gateway() {
		let mut core = test_core(Config::default()).await;
		let site_id = site(1);
		let (gateway, peer) = paired_gateway(site_id).await;
		core.gateways.insert(site_id, gateway);
		core.registry.upsert(|| Bulb::new(device(1), site_id, site_id));

		let outcome = core
			.dispatch(Command {
				target: TargetSpec::Device(device(1)),
				verb: Verb::PowerOn,
			})
			.await
			.unwrap();
		assert!(matches!(outcome, DispatchOutcome::Dispatched));

		let mut buf = [0u8; 1024];
		let (n, _) = peer.recv_from(&mut buf).await.unwrap();
		assert!(matches!(
			RawPacket::unpack(&buf[..n]).unwrap().packet,
			Packet::SetPower { level: PowerLevel::Enabled }
		));
	}

	#[tokio::test]
	async fn dispatching_to_an_unknown_device_is_rejected() {
		let mut core = test_core(Config::default()).await;
		let err = core
			.dispatch(Command {
				target: TargetSpec::Device(device(9)),
				verb: Verb::PowerOff,
			})
			.await
			.unwrap_err();
		assert!(matches!(err, CoreError::TargetNotFound));
	}
}
