use std::{
    io::{self, ErrorKind},
    net::{SocketAddr, UdpSocket},
};

use log::{debug, trace};

use crate::face::{Face, FaceError, FacePersistency, FaceReceiver, FaceScope, FaceSender, MAX_PACKET_SIZE};

// One datagram carries exactly one packet, so no reassembly is needed.
// The socket stays unconnected: a peer that is not listening yet only
//  costs us the datagram, it never takes the face down.

pub struct UdpSender {
    socket: UdpSocket,
    remote: SocketAddr,
}

pub struct UdpReceiver {
    socket: UdpSocket,
    remote: SocketAddr,
    buffer: Vec<u8>,
}

// ICMP errors for earlier datagrams, reported by some platforms on the next call
fn is_unreachable(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset)
}

impl FaceSender for UdpSender {
    fn send(&mut self, packet: &[u8]) -> Result<(), FaceError> {
        match self.socket.send_to(packet, self.remote) {
            Ok(_) => Ok(()),
            Err(io_err) => match io_err.kind() {
                // Datagrams may be lost anyway
                ErrorKind::WouldBlock => {
                    trace!("UDP send buffer full, dropped {} bytes", packet.len());
                    Ok(())
                }
                kind if is_unreachable(kind) => {
                    debug!("{} unreachable, dropped {} bytes", self.remote, packet.len());
                    Ok(())
                }
                _ => Err(FaceError::Disconnected),
            },
        }
    }
}

impl FaceReceiver for UdpReceiver {
    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, FaceError> {
        loop {
            match self.socket.recv_from(&mut self.buffer) {
                Ok((len, from)) if from == self.remote => {
                    return Ok(Some(self.buffer[..len].to_vec()))
                }
                Ok((len, from)) => trace!("Ignored {} bytes from {}", len, from),
                Err(io_err) => match io_err.kind() {
                    ErrorKind::WouldBlock => return Ok(None),
                    kind if is_unreachable(kind) => {
                        debug!("{} unreachable", self.remote);
                    }
                    _ => return Err(FaceError::Disconnected),
                },
            }
        }
    }
}

fn udp_uri(addr: &SocketAddr) -> String {
    match addr {
        SocketAddr::V4(addr) => format!("udp4://{}", addr),
        SocketAddr::V6(addr) => format!("udp6://{}", addr),
    }
}

/// Creates a non-blocking face talking to one remote peer over `socket`.
///
/// Datagrams from any other address are ignored. The returned socket refers
///  to the same endpoint and is meant for registration with a poller.
pub fn udp_face(socket: UdpSocket, remote: SocketAddr) -> io::Result<(Face, UdpSocket)> {
    socket.set_nonblocking(true)?;
    let local = socket.local_addr()?;

    let sender = UdpSender {
        socket: socket.try_clone()?,
        remote,
    };
    let receiver = UdpReceiver {
        socket: socket.try_clone()?,
        remote,
        buffer: vec![0; MAX_PACKET_SIZE],
    };

    let face = Face::new(sender, receiver)
        .with_uris(udp_uri(&remote), udp_uri(&local))
        .with_scope(FaceScope::NonLocal)
        .with_persistency(FacePersistency::Persistent);
    Ok((face, socket))
}
