use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lifx_core::{BuildOptions, DeviceId, Packet, RawPacket, SiteId, Target};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::tag::TagTable;

/// Gateway session lifecycle (spec §4.C): `Opening` collapses into `Open`
/// immediately here, because this implementation only creates a `Gateway`
/// once a `PanGateway` reply has already confirmed the peer — there is no
/// separate UDP handshake step to wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
	Open,
	Closing,
	Closed,
}

/// `{packet_type_expected_in_reply, target, issued_at, reply_handler}`,
/// kept in arrival order per gateway. `reply_handler` is `None` for
/// fire-and-forget commands and refresh fan-out; `Some` for a dispatcher
/// query awaiting a specific reply.
pub struct PendingRequest {
	pub packet_type_expected_in_reply: u16,
	pub target: DeviceId,
	pub issued_at: Instant,
	pub reply_handler: Option<oneshot::Sender<RawPacket>>,
}

/// How long a `Closing` gateway is given to drain pending writes before
/// forcing `Closed` (spec §4.C).
pub const CLOSING_DRAIN_MS: u64 = 500;

/// One LIFX gateway session: owns its UDP socket, outbound pipeline,
/// latency estimate, per-bulb refresh stagger, and gateway-local tag table.
pub struct Gateway {
	pub site_id: SiteId,
	pub peer_addr: SocketAddr,
	socket: Arc<UdpSocket>,
	pub state: GatewayState,
	pending_requests: VecDeque<PendingRequest>,
	pub tags: TagTable,
	pub bulbs: HashSet<DeviceId>,
	pub last_pkt_at: Instant,
	pub next_refresh_at: Instant,
	pub latency_estimate_ms: f64,
	refresh_cursor: usize,
	closing_since: Option<Instant>,
}

impl Gateway {
	pub fn new(site_id: SiteId, peer_addr: SocketAddr, socket: Arc<UdpSocket>) -> Gateway {
		let now = Instant::now();
		Gateway {
			site_id,
			peer_addr,
			socket,
			state: GatewayState::Open,
			pending_requests: VecDeque::new(),
			tags: TagTable::new(),
			bulbs: HashSet::new(),
			last_pkt_at: now,
			next_refresh_at: now,
			latency_estimate_ms: 0.0,
			refresh_cursor: 0,
			closing_since: None,
		}
	}

	/// Shared handle to this gateway's socket, for the recv task `core`
	/// spawns alongside each new gateway (spec §10.E: real concurrency only
	/// at the channel boundary, never over shared state).
	pub fn socket_handle(&self) -> Arc<UdpSocket> {
		self.socket.clone()
	}

	/// Builds, enqueues (if a reply is expected), and writes a packet to
	/// this gateway's peer. Outbound packets are emitted in the order
	/// they're enqueued (spec §5 ordering guarantee).
	pub async fn send(
		&mut self,
		target: DeviceId,
		packet: Packet,
		expects_reply: Option<u16>,
		reply_handler: Option<oneshot::Sender<RawPacket>>,
	) -> Result<(), std::io::Error> {
		let options = BuildOptions {
			target: Target::Device(target),
			site: self.site_id,
			ack_required: false,
			res_required: expects_reply.is_some(),
			sequence: 0,
			timestamp: 0,
		};
		let raw = RawPacket::build(&options, packet).map_err(|e| {
			std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
		})?;
		let bytes = raw.pack().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

		if let Some(packet_type_expected_in_reply) = expects_reply {
			self.pending_requests.push_back(PendingRequest {
				packet_type_expected_in_reply,
				target,
				issued_at: Instant::now(),
				reply_handler,
			});
		}

		self.socket.send_to(&bytes, self.peer_addr).await?;
		Ok(())
	}

	/// Resolves the oldest pending request matching `(target,
	/// reply_packet_type)` FIFO, per spec §4.C.1. Updates the latency EWMA
	/// from the resolved request's round-trip time.
	pub fn on_reply(&mut self, source: DeviceId, reply_packet_type: u16) -> Option<PendingRequest> {
		self.last_pkt_at = Instant::now();
		let position = self.pending_requests.iter().position(|req| {
			req.target == source && req.packet_type_expected_in_reply == reply_packet_type
		})?;
		let request = self.pending_requests.remove(position)?;
		let sample_ms = self.last_pkt_at.saturating_duration_since(request.issued_at).as_secs_f64() * 1000.0;
		self.record_latency(sample_ms);
		Some(request)
	}

	/// `latency_estimate_ms = 0.125 × sample + 0.875 × previous` (spec
	/// §4.C.2).
	fn record_latency(&mut self, sample_ms: f64) {
		self.latency_estimate_ms = 0.125 * sample_ms + 0.875 * self.latency_estimate_ms;
	}

	pub fn pending_count(&self) -> usize {
		self.pending_requests.len()
	}

	/// Begins the `Closing` state: pending writes are allowed to drain for
	/// up to [CLOSING_DRAIN_MS] before [Gateway::is_drain_expired] reports
	/// true and the gateway transitions to `Closed`.
	pub fn begin_closing(&mut self) {
		if self.state == GatewayState::Open {
			self.state = GatewayState::Closing;
			self.closing_since = Some(Instant::now());
		}
	}

	pub fn is_drain_expired(&self, now: Instant) -> bool {
		match self.closing_since {
			Some(since) => now.saturating_duration_since(since) >= Duration::from_millis(CLOSING_DRAIN_MS),
			None => true,
		}
	}

	/// Cancels every pending request: dropping the reply sender wakes any
	/// waiting collector with a cancellation (spec §5 cancellation model).
	pub fn cancel_pending(&mut self) -> Vec<PendingRequest> {
		self.pending_requests.drain(..).collect()
	}

	/// Advances the refresh stagger cursor and returns the next bulb (if
	/// any) due for a `GetLightState`, rescheduling `next_refresh_at` so the
	/// per-gateway outbound rate stays within `max_packets_per_sec` while
	/// still refreshing every bulb roughly every `refresh_period_ms` (spec
	/// §4.C.3).
	pub fn tick_refresh(
		&mut self,
		now: Instant,
		refresh_period_ms: u64,
		max_packets_per_sec: u32,
	) -> Option<DeviceId> {
		if now < self.next_refresh_at || self.bulbs.is_empty() {
			return None;
		}
		let mut sorted: Vec<DeviceId> = self.bulbs.iter().copied().collect();
		sorted.sort();
		let idx = self.refresh_cursor % sorted.len();
		self.refresh_cursor = (self.refresh_cursor + 1) % sorted.len();
		let bulb = sorted[idx];

		let per_bulb_interval_ms = refresh_period_ms as f64 / sorted.len() as f64;
		let min_interval_ms = 1000.0 / max_packets_per_sec as f64;
		let interval_ms = per_bulb_interval_ms.max(min_interval_ms);
		self.next_refresh_at = now + Duration::from_millis(interval_ms.round() as u64);

		Some(bulb)
	}

	/// Forces an immediate `GetLightState` fan-out to every bulb, used by
	/// the watchdog when a gateway has gone quiet past `FORCE_REFRESH_MS`
	/// (spec §4.E).
	pub fn bulbs_for_forced_refresh(&self) -> Vec<DeviceId> {
		let mut v: Vec<DeviceId> = self.bulbs.iter().copied().collect();
		v.sort();
		v
	}

	pub fn msecs_since_last_update(&self, now: Instant) -> u64 {
		now.saturating_duration_since(self.last_pkt_at).as_millis() as u64
	}
}
