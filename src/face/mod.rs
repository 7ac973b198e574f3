pub mod local;
pub mod null;
mod table;
pub use table::FaceTable;

use core::fmt;
use std::{
    collections::VecDeque,
    sync::mpsc::{channel, Receiver, Sender},
};

use log::{debug, info, trace};
use serde::Serialize;
use thiserror::Error;

use crate::packet::{Data, DecodeError, Interest, Packet};

// The Face abstracts away the underlying data transfer protocols.

// Packets handed to a face are encoded and queued right away, but only reach
//  the transport when the face is flushed, which the forwarder schedules as a
//  separate event. This keeps one face's send from running inside another's receive.

// The transport is split into a sender and a receiver half such that we can
//  drive them separately inside the forwarder.
// Conceptually they still jointly refer to the same interface.

pub const MAX_PACKET_SIZE: usize = 8800;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FaceId(pub(crate) u64);

impl FaceId {
    /// The id of a face that has not been added to a table yet.
    pub const INVALID: FaceId = FaceId(0);

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaceState {
    Down,
    Up,
    Failed,
}

impl fmt::Display for FaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FaceState::Down => "down",
            FaceState::Up => "up",
            FaceState::Failed => "failed",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaceScope {
    Local,
    NonLocal,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FacePersistency {
    OnDemand,
    Persistent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FaceError {
    #[error("transport disconnected")]
    Disconnected,
    #[error("face is {0}")]
    NotUp(FaceState),
    #[error("packet of {len} bytes exceeds the {limit} byte limit")]
    TooLarge { len: usize, limit: usize },
    #[error("face ids exhausted")]
    IdsExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceNotification {
    Failed { face: FaceId, reason: String },
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FaceCounters {
    pub n_in_interests: u64,
    pub n_in_data: u64,
    pub n_out_interests: u64,
    pub n_out_data: u64,
}

/// A read-only view of a face for status reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FaceStatus {
    pub face_id: FaceId,
    pub remote_uri: String,
    pub local_uri: String,
    pub scope: FaceScope,
    pub persistency: FacePersistency,
    pub state: FaceState,
    #[serde(flatten)]
    pub counters: FaceCounters,
}

pub trait FaceSender {
    /// Hands one complete packet to the transport without blocking.
    fn send(&mut self, packet: &[u8]) -> Result<(), FaceError>;
}

pub trait FaceReceiver {
    /// Returns the next complete packet, if one has arrived.
    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, FaceError>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PacketKind {
    Interest,
    Data,
}

pub struct Face {
    id: FaceId,
    remote_uri: String,
    local_uri: String,
    scope: FaceScope,
    persistency: FacePersistency,
    state: FaceState,
    counters: FaceCounters,
    mtu: usize,
    sender: Box<dyn FaceSender>,
    receiver: Box<dyn FaceReceiver>,
    outgoing: VecDeque<(PacketKind, Vec<u8>)>,
    subscribers: Vec<Sender<FaceNotification>>,
}

impl Face {
    pub fn new<FS, FR>(sender: FS, receiver: FR) -> Self
    where
        FS: FaceSender + 'static,
        FR: FaceReceiver + 'static,
    {
        Self {
            id: FaceId::INVALID,
            remote_uri: String::new(),
            local_uri: String::new(),
            scope: FaceScope::NonLocal,
            persistency: FacePersistency::Persistent,
            state: FaceState::Down,
            counters: FaceCounters::default(),
            mtu: MAX_PACKET_SIZE,
            sender: Box::new(sender),
            receiver: Box::new(receiver),
            outgoing: VecDeque::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn with_uris(mut self, remote_uri: impl Into<String>, local_uri: impl Into<String>) -> Self {
        self.remote_uri = remote_uri.into();
        self.local_uri = local_uri.into();
        self
    }

    pub fn with_scope(mut self, scope: FaceScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_persistency(mut self, persistency: FacePersistency) -> Self {
        self.persistency = persistency;
        self
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn id(&self) -> FaceId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: FaceId) {
        self.id = id;
    }

    pub fn remote_uri(&self) -> &str {
        &self.remote_uri
    }

    pub fn local_uri(&self) -> &str {
        &self.local_uri
    }

    pub fn scope(&self) -> FaceScope {
        self.scope
    }

    pub fn is_local(&self) -> bool {
        self.scope == FaceScope::Local
    }

    pub fn persistency(&self) -> FacePersistency {
        self.persistency
    }

    pub fn state(&self) -> FaceState {
        self.state
    }

    pub fn is_up(&self) -> bool {
        self.state == FaceState::Up
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    pub fn counters(&self) -> &FaceCounters {
        &self.counters
    }

    pub fn status(&self) -> FaceStatus {
        FaceStatus {
            face_id: self.id,
            remote_uri: self.remote_uri.clone(),
            local_uri: self.local_uri.clone(),
            scope: self.scope,
            persistency: self.persistency,
            state: self.state,
            counters: self.counters,
        }
    }

    /// Toggles between up and down. A failed face stays failed and `false` is returned.
    pub fn set_up(&mut self, up: bool) -> bool {
        if self.state == FaceState::Failed {
            return false;
        }
        let state = if up { FaceState::Up } else { FaceState::Down };
        if self.state != state {
            debug!("Face {} is now {}", self.id, state);
            self.state = state;
        }
        if !up {
            self.outgoing.clear();
        }
        true
    }

    /// Moves the face to the terminal failed state.
    ///
    /// Subscribers are told exactly once, after which they are dropped.
    /// Returns whether this call did the transition.
    pub fn fail(&mut self, reason: &str) -> bool {
        if self.state == FaceState::Failed {
            return false;
        }
        info!("Face {} ({}) failed: {}", self.id, self.remote_uri, reason);
        self.state = FaceState::Failed;
        self.outgoing.clear();

        for subscriber in self.subscribers.drain(..) {
            // A subscriber that went away does not care
            let _ = subscriber.send(FaceNotification::Failed {
                face: self.id,
                reason: reason.to_string(),
            });
        }
        true
    }

    /// Registers for notifications; the channel closes once the face has failed.
    pub fn subscribe(&mut self) -> Receiver<FaceNotification> {
        let (sender, receiver) = channel();
        if self.state != FaceState::Failed {
            self.subscribers.push(sender);
        }
        receiver
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn send_interest(&mut self, interest: &Interest) -> Result<(), FaceError> {
        self.enqueue(PacketKind::Interest, Packet::encode_interest(interest))
    }

    pub fn send_data(&mut self, data: &Data) -> Result<(), FaceError> {
        self.enqueue(PacketKind::Data, Packet::encode_data(data))
    }

    fn enqueue(&mut self, kind: PacketKind, wire: Vec<u8>) -> Result<(), FaceError> {
        if self.state != FaceState::Up {
            return Err(FaceError::NotUp(self.state));
        }
        if wire.len() > self.mtu {
            return Err(FaceError::TooLarge {
                len: wire.len(),
                limit: self.mtu,
            });
        }
        self.outgoing.push_back((kind, wire));
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Hands every queued packet to the transport, returning how many were sent.
    pub fn flush(&mut self) -> Result<usize, FaceError> {
        if self.state != FaceState::Up {
            self.outgoing.clear();
            return Err(FaceError::NotUp(self.state));
        }

        let mut sent = 0;
        while let Some((kind, wire)) = self.outgoing.front() {
            self.sender.send(wire)?;
            trace!("Face {} sent {} bytes", self.id, wire.len());
            match kind {
                PacketKind::Interest => self.counters.n_out_interests += 1,
                PacketKind::Data => self.counters.n_out_data += 1,
            }
            self.outgoing.pop_front();
            sent += 1;
        }
        Ok(sent)
    }

    /// Decodes a packet that arrived on this face.
    pub fn receive(&mut self, wire: &[u8]) -> Result<Packet, DecodeError> {
        let packet = Packet::decode(wire)?;
        match &packet {
            Packet::Interest(_) => self.counters.n_in_interests += 1,
            Packet::Data(_) => self.counters.n_in_data += 1,
        }
        trace!("Face {} received {}", self.id, packet.name());
        Ok(packet)
    }

    pub fn try_recv(&mut self) -> Result<Option<Vec<u8>>, FaceError> {
        if self.state == FaceState::Failed {
            return Ok(None);
        }
        self.receiver.try_recv()
    }
}

impl fmt::Debug for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Face")
            .field("id", &self.id)
            .field("remote_uri", &self.remote_uri)
            .field("local_uri", &self.local_uri)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::TryRecvError;

    use super::*;
    use crate::{face::local::app_face, name::Name};

    fn interest(uri: &str) -> Interest {
        Interest::new(uri.parse::<Name>().unwrap()).with_nonce([0, 0, 0, 1])
    }

    #[test]
    fn test_state_machine() {
        let (mut face, _app) = app_face("app://test");
        assert_eq!(face.state(), FaceState::Down);

        assert!(face.set_up(true));
        assert!(face.is_up());
        assert!(face.set_up(false));
        assert_eq!(face.state(), FaceState::Down);

        // Down -> Failed is allowed, and there is no way back
        assert!(face.fail("gone"));
        assert_eq!(face.state(), FaceState::Failed);
        assert!(!face.set_up(true));
        assert_eq!(face.state(), FaceState::Failed);
    }

    #[test]
    fn test_fail_notifies_once() {
        let (mut face, _app) = app_face("app://test");
        face.set_up(true);
        let first = face.subscribe();
        let second = face.subscribe();
        assert_eq!(face.subscriber_count(), 2);

        assert!(face.fail("transport closed"));
        assert!(!face.fail("again"));
        assert_eq!(face.subscriber_count(), 0);

        for receiver in [first, second] {
            assert_eq!(
                receiver.try_recv(),
                Ok(FaceNotification::Failed {
                    face: FaceId::INVALID,
                    reason: "transport closed".to_string()
                })
            );
            // The subscription is released after the single notification
            assert_eq!(receiver.try_recv(), Err(TryRecvError::Disconnected));
        }

        let late = face.subscribe();
        assert_eq!(late.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn test_send_is_deferred_until_flush() {
        let (mut face, mut app) = app_face("app://test");
        assert_eq!(
            face.send_interest(&interest("/a")),
            Err(FaceError::NotUp(FaceState::Down))
        );

        face.set_up(true);
        face.send_interest(&interest("/a")).unwrap();
        face.send_interest(&interest("/b")).unwrap();
        assert!(face.has_pending());
        assert!(app.recv_packets().is_empty());
        assert_eq!(face.counters().n_out_interests, 0);

        assert_eq!(face.flush(), Ok(2));
        assert!(!face.has_pending());
        assert_eq!(face.counters().n_out_interests, 2);

        let received = app.recv_packets();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].name().to_string(), "/a");
        assert_eq!(received[1].name().to_string(), "/b");
    }

    #[test]
    fn test_receive_counts_only_valid_packets() {
        let (mut face, _app) = app_face("app://test");
        let wire = Packet::encode_interest(&interest("/a"));

        assert!(face.receive(&wire).is_ok());
        assert!(face.receive(&[5, 1]).is_err());
        assert!(face.receive(&[]).is_err());

        let data = Data::new("/a".parse().unwrap(), vec![1]);
        assert!(face.receive(&Packet::encode_data(&data)).is_ok());

        assert_eq!(
            *face.counters(),
            FaceCounters {
                n_in_interests: 1,
                n_in_data: 1,
                n_out_interests: 0,
                n_out_data: 0,
            }
        );
    }

    #[test]
    fn test_flush_reports_disconnect() {
        let (mut face, app) = app_face("app://test");
        face.set_up(true);
        drop(app);
        face.send_interest(&interest("/a")).unwrap();
        assert_eq!(face.flush(), Err(FaceError::Disconnected));
        assert_eq!(face.counters().n_out_interests, 0);
    }

    #[test]
    fn test_mtu() {
        let (face, _app) = app_face("app://test");
        let mut face = face.with_mtu(16);
        face.set_up(true);
        let data = Data::new("/a".parse().unwrap(), vec![0; 64]);
        assert!(matches!(
            face.send_data(&data),
            Err(FaceError::TooLarge { limit: 16, .. })
        ));
    }

    #[test]
    fn test_status_snapshot() {
        let (face, _app) = app_face("app://consumer");
        let status = face.status();
        assert_eq!(status.remote_uri, "app://consumer");
        assert_eq!(status.scope, FaceScope::Local);
        assert_eq!(status.persistency, FacePersistency::Persistent);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["scope"], "local");
        assert_eq!(json["persistency"], "persistent");
        assert_eq!(json["state"], "down");
        assert_eq!(json["n_in_interests"], 0);
    }
}
