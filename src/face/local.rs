use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use log::warn;

use crate::{
    face::{Face, FaceError, FacePersistency, FaceReceiver, FaceScope, FaceSender},
    packet::{Data, Interest, Packet},
};

// In-process transports. Both halves share one queue of whole packets,
//  and once either half is dropped the other one reports a disconnect.

type Queue = Rc<RefCell<VecDeque<Vec<u8>>>>;

pub struct LocalSender {
    inner: Queue,
}

pub struct LocalReceiver {
    inner: Queue,
}

pub fn local_channel() -> (LocalSender, LocalReceiver) {
    let inner = Rc::new(RefCell::new(VecDeque::new()));

    let sender = LocalSender {
        inner: Rc::clone(&inner),
    };
    let receiver = LocalReceiver { inner };

    (sender, receiver)
}

impl FaceSender for LocalSender {
    fn send(&mut self, packet: &[u8]) -> Result<(), FaceError> {
        if Rc::strong_count(&self.inner) <= 1 {
            return Err(FaceError::Disconnected);
        }

        self.inner.borrow_mut().push_back(packet.to_vec());
        Ok(())
    }
}

impl FaceReceiver for LocalReceiver {
    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, FaceError> {
        let packet = self.inner.borrow_mut().pop_front();

        // We only report the disconnect after draining the available packets
        if packet.is_none() && Rc::strong_count(&self.inner) <= 1 {
            return Err(FaceError::Disconnected);
        }

        Ok(packet)
    }
}

/// The application side of an in-process face.
pub struct AppEndpoint {
    sender: LocalSender,
    receiver: LocalReceiver,
}

impl AppEndpoint {
    pub fn express_interest(&mut self, interest: &Interest) -> Result<(), FaceError> {
        self.sender.send(&Packet::encode_interest(interest))
    }

    pub fn put_data(&mut self, data: &Data) -> Result<(), FaceError> {
        self.sender.send(&Packet::encode_data(data))
    }

    pub fn send_raw(&mut self, wire: &[u8]) -> Result<(), FaceError> {
        self.sender.send(wire)
    }

    pub fn try_recv_raw(&mut self) -> Result<Option<Vec<u8>>, FaceError> {
        self.receiver.try_recv()
    }

    /// Drains everything the forwarder delivered so far, skipping what cannot be decoded.
    pub fn recv_packets(&mut self) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Ok(Some(wire)) = self.receiver.try_recv() {
            match Packet::decode(&wire) {
                Ok(packet) => packets.push(packet),
                Err(err) => warn!("Application dropped a malformed packet: {}", err),
            }
        }
        packets
    }
}

/// Creates a face for an application living in the same process.
pub fn app_face(uri: &str) -> (Face, AppEndpoint) {
    let (to_app, from_forwarder) = local_channel();
    let (to_forwarder, from_app) = local_channel();

    let face = Face::new(to_app, from_app)
        .with_uris(uri, uri)
        .with_scope(FaceScope::Local)
        .with_persistency(FacePersistency::Persistent);
    let endpoint = AppEndpoint {
        sender: to_forwarder,
        receiver: from_forwarder,
    };

    (face, endpoint)
}

/// Creates both ends of a point-to-point link, e.g. between two forwarders.
pub fn link(uri_a: &str, uri_b: &str) -> (Face, Face) {
    let (a_to_b, b_from_a) = local_channel();
    let (b_to_a, a_from_b) = local_channel();

    let a = Face::new(a_to_b, a_from_b)
        .with_uris(uri_b, uri_a)
        .with_scope(FaceScope::NonLocal);
    let b = Face::new(b_to_a, b_from_a)
        .with_uris(uri_a, uri_b)
        .with_scope(FaceScope::NonLocal);

    (a, b)
}
