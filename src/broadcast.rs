use std::net::{IpAddr, SocketAddr};

use get_if_addrs::{get_if_addrs, IfAddr, Ifv4Addr};
use lifx_core::{BuildOptions, Packet, RawPacket};
use tokio::net::UdpSocket;

/// LIFX's well-known discovery port. The broadcast socket binds here and
/// gateways reply with their own service port (spec §4.D).
pub const LIFX_PORT: u16 = 56700;

/// The single shared UDP broadcast endpoint used to emit `GetPanGateway`
/// discovery packets and receive gateways' initial replies.
pub struct BroadcastSocket {
	socket: UdpSocket,
}

impl BroadcastSocket {
	pub async fn bind() -> Result<BroadcastSocket, std::io::Error> {
		let socket = UdpSocket::bind(("0.0.0.0", LIFX_PORT)).await?;
		socket.set_broadcast(true)?;
		Ok(BroadcastSocket { socket })
	}

	/// Sends a `GetPanGateway` to the directed broadcast address of every
	/// non-loopback IPv4 interface.
	pub async fn broadcast_discovery(&self) -> Result<(), std::io::Error> {
		let raw = RawPacket::build(&BuildOptions::default(), Packet::GetPanGateway)
			.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
		let bytes = raw
			.pack()
			.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

		for iface in get_if_addrs()? {
			if let IfAddr::V4(Ifv4Addr {
				broadcast: Some(bcast),
				..
			}) = iface.addr
			{
				if iface.ip().is_loopback() {
					continue;
				}
				let addr = SocketAddr::new(IpAddr::V4(bcast), LIFX_PORT);
				log::debug!("broadcasting discovery to {}", addr);
				self.socket.send_to(&bytes, addr).await?;
			}
		}
		Ok(())
	}

	pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), std::io::Error> {
		self.socket.recv_from(buf).await
	}

	/// Binds to an OS-assigned port instead of [LIFX_PORT], so unit tests
	/// that exercise `Core` don't fight over the well-known port.
	#[cfg(test)]
	pub async fn bind_ephemeral() -> Result<BroadcastSocket, std::io::Error> {
		let socket = UdpSocket::bind(("127.0.0.1", 0)).await?;
		socket.set_broadcast(true)?;
		Ok(BroadcastSocket { socket })
	}
}
