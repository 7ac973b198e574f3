use std::{collections::BTreeSet, sync::mpsc::Receiver};

use log::{debug, error, info, trace, warn};
use serde::Serialize;
use thiserror::Error;

use crate::{
    clock::Timestamp,
    config::ForwarderConfig,
    cs::ContentStore,
    face::{Face, FaceError, FaceId, FaceNotification, FaceStatus, FaceTable},
    fib::Fib,
    name::Name,
    packet::{Data, Interest, Packet},
    pit::{Pit, PitKey},
    scheduler::Scheduler,
    sequence::SequenceGenerator,
    strategy::{Action, RejectReason, Strategy, StrategyChoice, StrategyContext},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForwarderError {
    #[error("face {0} is not registered")]
    UnknownFace(FaceId),
    #[error(transparent)]
    Face(#[from] FaceError),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    FaceNotUp,
    /// A `/localhost` packet arrived on a non-local face.
    ScopeViolation,
    HopLimitExceeded,
    /// The strategy chose to drop the Interest.
    Strategy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterestOutcome {
    Forwarded(Vec<FaceId>),
    Suppressed,
    /// The pending Interest was given up on. These faces were still waiting for it.
    Rejected {
        reason: RejectReason,
        in_faces: Vec<FaceId>,
    },
    Dropped(DropReason),
    SatisfiedFromCache,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataOutcome {
    Satisfied { faces: Vec<FaceId> },
    Unsolicited,
    Dropped(DropReason),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ForwarderCounters {
    pub n_in_interests: u64,
    pub n_in_data: u64,
    pub n_out_interests: u64,
    pub n_out_data: u64,
    pub n_unsolicited_data: u64,
    pub n_cs_hits: u64,
    pub n_suppressed_interests: u64,
    pub n_rejected_interests: u64,
    pub n_decode_errors: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwarderEvent {
    /// A packet handed over by a transport.
    Receive { face: FaceId, wire: Vec<u8> },
    /// Hands a face's queued packets to its transport.
    Flush { face: FaceId },
}

pub struct Forwarder {
    config: ForwarderConfig,
    faces: FaceTable,
    fib: Fib,
    pit: Pit,
    content_store: ContentStore,
    strategy_choice: StrategyChoice,
    scheduler: Scheduler<ForwarderEvent>,
    pending_flushes: BTreeSet<FaceId>,
    nonces: SequenceGenerator,
    counters: ForwarderCounters,
    now: Timestamp,
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new(ForwarderConfig::default())
    }
}

impl Forwarder {
    pub fn new(config: ForwarderConfig) -> Self {
        Self {
            faces: FaceTable::new(),
            fib: Fib::new(),
            pit: Pit::new(config.default_interest_lifetime_ms),
            content_store: ContentStore::new(config.content_store_capacity),
            strategy_choice: StrategyChoice::new(config.default_strategy.build()),
            scheduler: Scheduler::new(),
            pending_flushes: BTreeSet::new(),
            nonces: SequenceGenerator::new(),
            counters: ForwarderCounters::default(),
            now: Timestamp::ZERO,
            config,
        }
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn faces(&self) -> &FaceTable {
        &self.faces
    }

    pub fn fib(&self) -> &Fib {
        &self.fib
    }

    pub fn pit(&self) -> &Pit {
        &self.pit
    }

    pub fn content_store(&self) -> &ContentStore {
        &self.content_store
    }

    pub fn strategy_choice(&self) -> &StrategyChoice {
        &self.strategy_choice
    }

    pub fn counters(&self) -> &ForwarderCounters {
        &self.counters
    }

    pub fn face_status(&self, id: FaceId) -> Option<FaceStatus> {
        self.faces.get(id).map(Face::status)
    }

    /// Registers a face and brings it up.
    pub fn add_face(&mut self, face: Face) -> Result<FaceId, ForwarderError> {
        let mtu = face.mtu().min(self.config.max_packet_size);
        let id = self.faces.add(face.with_mtu(mtu))?;
        if let Some(face) = self.faces.get_mut(id) {
            face.set_up(true);
        }
        Ok(id)
    }

    /// Fails the face and forgets it. Routes and pending Interest records that
    ///  refer to it are removed before the face leaves the table.
    pub fn remove_face(&mut self, id: FaceId, reason: &str) -> Result<Face, ForwarderError> {
        let face = self
            .faces
            .get_mut(id)
            .ok_or(ForwarderError::UnknownFace(id))?;
        face.fail(reason);

        let routes = self.fib.remove_next_hop_from_all_entries(id);
        let pending = self.pit.remove_face(id);
        let face = self
            .faces
            .remove(id)
            .ok_or(ForwarderError::UnknownFace(id))?;
        self.pending_flushes.remove(&id);

        info!(
            "Face {} gone ({}), erased {} routes and {} pending Interests",
            id, reason, routes, pending
        );
        Ok(face)
    }

    pub fn set_face_up(&mut self, id: FaceId, up: bool) -> Result<bool, ForwarderError> {
        let face = self
            .faces
            .get_mut(id)
            .ok_or(ForwarderError::UnknownFace(id))?;
        Ok(face.set_up(up))
    }

    pub fn subscribe_face(&mut self, id: FaceId) -> Result<Receiver<FaceNotification>, ForwarderError> {
        let face = self
            .faces
            .get_mut(id)
            .ok_or(ForwarderError::UnknownFace(id))?;
        Ok(face.subscribe())
    }

    pub fn register_prefix(&mut self, prefix: &Name, face: FaceId, cost: u64) -> Result<(), ForwarderError> {
        if !self.faces.contains(face) {
            return Err(ForwarderError::UnknownFace(face));
        }
        info!("Route {} via face {} cost {}", prefix, face, cost);
        self.fib.add_next_hop(prefix, face, cost);
        Ok(())
    }

    pub fn unregister_prefix(&mut self, prefix: &Name, face: FaceId) -> bool {
        let removed = self.fib.remove_next_hop(prefix, face);
        if removed {
            info!("Route {} via face {} removed", prefix, face);
        }
        removed
    }

    pub fn set_strategy(&mut self, prefix: &Name, strategy: Box<dyn Strategy>) {
        self.strategy_choice.insert(prefix, strategy);
    }

    pub fn unset_strategy(&mut self, prefix: &Name) -> bool {
        self.strategy_choice.erase(prefix)
    }

    fn next_nonce(&mut self) -> [u8; 4] {
        (self.nonces.next() as u32).to_be_bytes()
    }

    pub fn on_interest(&mut self, in_face: FaceId, mut interest: Interest) -> Result<InterestOutcome, ForwarderError> {
        let now = self.now;
        let face = self
            .faces
            .get(in_face)
            .ok_or(ForwarderError::UnknownFace(in_face))?;
        self.counters.n_in_interests += 1;

        if !face.is_up() {
            warn!("Dropped Interest {} from face {} which is {}", interest.name, in_face, face.state());
            return Ok(InterestOutcome::Dropped(DropReason::FaceNotUp));
        }

        if interest.name.is_localhost() && !face.is_local() {
            warn!("Dropped Interest {} from non-local face {}", interest.name, in_face);
            return Ok(InterestOutcome::Dropped(DropReason::ScopeViolation));
        }

        if interest.hop_limit == Some(0) {
            debug!("Dropped Interest {} with exhausted hop limit", interest.name);
            return Ok(InterestOutcome::Dropped(DropReason::HopLimitExceeded));
        }

        if interest.nonce.is_none() {
            interest.nonce = Some(self.next_nonce());
        }

        let (pit_entry, is_new) = self.pit.find_or_insert(&interest, now);
        pit_entry.insert_or_update_in_record(in_face, &interest, now);
        let key = pit_entry.key().clone();

        if is_new {
            if let Some(data) = self.content_store.find(&interest, now) {
                let data = data.clone();
                self.pit.erase(&key);
                self.counters.n_cs_hits += 1;
                debug!("Interest {} satisfied from the content store", interest.name);
                self.send_data_to(in_face, &data);
                return Ok(InterestOutcome::SatisfiedFromCache);
            }
        }

        let Some(fib_entry) = self.fib.find_longest_prefix_match(&interest.name) else {
            return Ok(self.reject(&key, RejectReason::NoRoute));
        };
        let Some(pit_entry) = self.pit.get(&key) else {
            error!("PIT entry for {} vanished while processing", key.name);
            return Ok(InterestOutcome::Dropped(DropReason::Strategy));
        };

        let context = StrategyContext {
            faces: &self.faces,
            now,
        };
        let action = self
            .strategy_choice
            .find_effective_strategy_mut(fib_entry.prefix())
            .after_receive_interest(in_face, &interest, fib_entry, pit_entry, &context);

        Ok(match action {
            Action::Forward(out_faces) => {
                InterestOutcome::Forwarded(self.forward_interest(&key, &interest, &out_faces))
            }
            Action::Reject(reason) => self.reject(&key, reason),
            Action::Suppress => {
                self.counters.n_suppressed_interests += 1;
                InterestOutcome::Suppressed
            }
            Action::Drop => {
                debug!("Strategy dropped Interest {}", interest.name);
                InterestOutcome::Dropped(DropReason::Strategy)
            }
        })
    }

    fn forward_interest(&mut self, key: &PitKey, interest: &Interest, out_faces: &[FaceId]) -> Vec<FaceId> {
        let mut outgoing = interest.clone();
        outgoing.hop_limit = interest.hop_limit.map(|hops| hops.saturating_sub(1));

        let mut sent = Vec::with_capacity(out_faces.len());
        for &out_face in out_faces {
            let Some(face) = self.faces.get_mut(out_face) else {
                error!("Strategy chose unknown face {}", out_face);
                continue;
            };
            if let Err(err) = face.send_interest(&outgoing) {
                warn!("Cannot forward {} to face {}: {}", outgoing.name, out_face, err);
                continue;
            }

            if let Some(entry) = self.pit.get_mut(key) {
                entry.insert_or_update_out_record(out_face, &outgoing, self.now);
            }
            self.counters.n_out_interests += 1;
            self.schedule_flush(out_face);
            sent.push(out_face);
        }

        debug!("Forwarded {} to {:?}", outgoing.name, sent);
        sent
    }

    fn reject(&mut self, key: &PitKey, reason: RejectReason) -> InterestOutcome {
        let in_faces: Vec<FaceId> = self
            .pit
            .erase(key)
            .map(|entry| entry.in_records().iter().map(|r| r.face()).collect())
            .unwrap_or_default();
        self.counters.n_rejected_interests += 1;
        debug!("Rejected {} ({}), faces {:?} were waiting", key.name, reason, in_faces);
        InterestOutcome::Rejected { reason, in_faces }
    }

    pub fn on_data(&mut self, in_face: FaceId, data: Data) -> Result<DataOutcome, ForwarderError> {
        let now = self.now;
        let face = self
            .faces
            .get(in_face)
            .ok_or(ForwarderError::UnknownFace(in_face))?;
        self.counters.n_in_data += 1;

        if !face.is_up() {
            warn!("Dropped Data {} from face {} which is {}", data.name, in_face, face.state());
            return Ok(DataOutcome::Dropped(DropReason::FaceNotUp));
        }

        if data.name.is_localhost() && !face.is_local() {
            warn!("Dropped Data {} from non-local face {}", data.name, in_face);
            return Ok(DataOutcome::Dropped(DropReason::ScopeViolation));
        }

        let digest = data.implicit_digest();
        let matches = self.pit.find_all_data_matches(&data, digest.as_ref());
        if matches.is_empty() {
            self.counters.n_unsolicited_data += 1;
            warn!("Dropped unsolicited Data {} from face {}", data.name, in_face);
            return Ok(DataOutcome::Unsolicited);
        }

        self.content_store.insert(data.clone(), digest, now);

        let mut downstream: Vec<FaceId> = Vec::new();
        for key in matches {
            let Some(entry) = self.pit.erase(&key) else {
                continue;
            };
            self.strategy_choice
                .find_effective_strategy_mut(entry.name())
                .before_satisfy_interest(&entry, in_face, &data);

            for record in entry.in_records() {
                let face = record.face();
                if !record.is_expired(now) && face != in_face && !downstream.contains(&face) {
                    downstream.push(face);
                }
            }
        }

        let faces: Vec<FaceId> = downstream
            .into_iter()
            .filter(|face| self.send_data_to(*face, &data))
            .collect();
        debug!("Data {} satisfied faces {:?}", data.name, faces);
        Ok(DataOutcome::Satisfied { faces })
    }

    fn send_data_to(&mut self, out_face: FaceId, data: &Data) -> bool {
        let Some(face) = self.faces.get_mut(out_face) else {
            error!("Cannot send Data {} to unknown face {}", data.name, out_face);
            return false;
        };
        if !face.is_up() {
            debug!("Not sending Data {} to face {} which is {}", data.name, out_face, face.state());
            return false;
        }

        match face.send_data(data) {
            Ok(()) => {
                self.counters.n_out_data += 1;
                self.schedule_flush(out_face);
                true
            }
            Err(err) => {
                warn!("Cannot send Data {} to face {}: {}", data.name, out_face, err);
                false
            }
        }
    }

    fn schedule_flush(&mut self, face: FaceId) {
        if self.pending_flushes.insert(face) {
            self.scheduler
                .schedule(self.now, ForwarderEvent::Flush { face });
        }
    }

    /// Queues a packet that arrived on a face for processing.
    pub fn receive(&mut self, face: FaceId, wire: Vec<u8>) {
        self.scheduler
            .schedule(self.now, ForwarderEvent::Receive { face, wire });
    }

    /// Collects whatever the faces' transports have received, returning how many packets.
    pub fn poll_faces(&mut self) -> usize {
        let now = self.now;
        let mut received = 0;
        let mut disconnected = Vec::new();

        for face in self.faces.iter_mut() {
            loop {
                match face.try_recv() {
                    Ok(Some(wire)) => {
                        self.scheduler.schedule(
                            now,
                            ForwarderEvent::Receive {
                                face: face.id(),
                                wire,
                            },
                        );
                        received += 1;
                    }
                    Ok(None) => break,
                    Err(err) => {
                        disconnected.push((face.id(), err));
                        break;
                    }
                }
            }
        }

        for (face, err) in disconnected {
            self.on_face_failure(face, &err.to_string());
        }
        received
    }

    /// Runs every event that is due now.
    pub fn process_pending(&mut self) -> usize {
        self.advance_to(self.now)
    }

    /// Moves the clock forward, running events and Interest expiries in time order.
    /// Events go before expiries that fall on the same instant.
    pub fn advance_to(&mut self, until: Timestamp) -> usize {
        let mut processed = 0;

        loop {
            let next_event = self.scheduler.next_time().filter(|at| *at <= until);
            let next_expiry = self.pit.next_expiry().filter(|at| *at <= until);

            match (next_event, next_expiry) {
                (Some(event_at), expiry_at) if expiry_at.map_or(true, |e| event_at <= e) => {
                    self.now = self.now.max(event_at);
                    if let Some((_, event)) = self.scheduler.pop_due(event_at) {
                        self.handle_event(event);
                        processed += 1;
                    }
                }
                (_, Some(expiry_at)) => {
                    self.now = self.now.max(expiry_at);
                    self.expire_pending_interests();
                }
                _ => break,
            }
        }

        self.now = self.now.max(until);
        processed
    }

    /// When something next needs to happen, if anything.
    pub fn next_wakeup(&self) -> Option<Timestamp> {
        match (self.scheduler.next_time(), self.pit.next_expiry()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn expire_pending_interests(&mut self) {
        for entry in self.pit.expire(self.now) {
            self.strategy_choice
                .find_effective_strategy_mut(entry.name())
                .before_expire_pending_interest(&entry);
        }
    }

    fn handle_event(&mut self, event: ForwarderEvent) {
        match event {
            ForwarderEvent::Receive { face, wire } => self.handle_receive(face, &wire),
            ForwarderEvent::Flush { face } => self.handle_flush(face),
        }
    }

    fn handle_receive(&mut self, face_id: FaceId, wire: &[u8]) {
        let Some(face) = self.faces.get_mut(face_id) else {
            debug!("Dropped a packet from removed face {}", face_id);
            return;
        };

        let packet = match face.receive(wire) {
            Ok(packet) => packet,
            Err(err) => {
                self.counters.n_decode_errors += 1;
                warn!("Dropped malformed packet from face {}: {}", face_id, err);
                return;
            }
        };

        let result = match packet {
            Packet::Interest(interest) => self
                .on_interest(face_id, interest)
                .map(|outcome| trace!("Interest from face {}: {:?}", face_id, outcome)),
            Packet::Data(data) => self
                .on_data(face_id, data)
                .map(|outcome| trace!("Data from face {}: {:?}", face_id, outcome)),
        };

        if let Err(err) = result {
            error!("Aborted processing a packet from face {}: {}", face_id, err);
        }
    }

    fn handle_flush(&mut self, face_id: FaceId) {
        self.pending_flushes.remove(&face_id);
        let Some(face) = self.faces.get_mut(face_id) else {
            debug!("Skipped flushing removed face {}", face_id);
            return;
        };

        match face.flush() {
            Ok(sent) => trace!("Face {} flushed {} packets", face_id, sent),
            Err(FaceError::Disconnected) => self.on_face_failure(face_id, "transport disconnected"),
            Err(err) => debug!("Face {} discarded its queue: {}", face_id, err),
        }
    }

    fn on_face_failure(&mut self, face: FaceId, reason: &str) {
        if let Err(err) = self.remove_face(face, reason) {
            error!("Cannot remove failed face {}: {}", face, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        face::{
            local::{app_face, link, AppEndpoint},
            FaceState,
        },
        fib::FibEntry,
        pit::PitEntry,
        strategy::BestRouteStrategy,
    };

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn interest(uri: &str) -> Interest {
        Interest::new(name(uri)).with_nonce([0, 0, 0, 7])
    }

    fn app(forwarder: &mut Forwarder, uri: &str) -> (FaceId, AppEndpoint) {
        let (face, endpoint) = app_face(uri);
        (forwarder.add_face(face).unwrap(), endpoint)
    }

    fn interests(endpoint: &mut AppEndpoint) -> Vec<Interest> {
        endpoint
            .recv_packets()
            .into_iter()
            .filter_map(|packet| match packet {
                Packet::Interest(interest) => Some(interest),
                Packet::Data(_) => None,
            })
            .collect()
    }

    fn data(endpoint: &mut AppEndpoint) -> Vec<Data> {
        endpoint
            .recv_packets()
            .into_iter()
            .filter_map(|packet| match packet {
                Packet::Data(data) => Some(data),
                Packet::Interest(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_unknown_face() {
        let mut forwarder = Forwarder::default();
        assert_eq!(
            forwarder.on_interest(FaceId(42), interest("/a")),
            Err(ForwarderError::UnknownFace(FaceId(42)))
        );
        assert_eq!(
            forwarder.register_prefix(&name("/a"), FaceId(42), 0),
            Err(ForwarderError::UnknownFace(FaceId(42)))
        );
    }

    #[test]
    fn test_drops() {
        init_logger();
        let mut forwarder = Forwarder::default();
        let (consumer, _app) = app(&mut forwarder, "app://consumer");
        let (remote, _) = link("dev://0", "dev://1");
        let remote = forwarder.add_face(remote).unwrap();

        assert_eq!(
            forwarder.on_interest(remote, interest("/localhost/nfd/faces")),
            Ok(InterestOutcome::Dropped(DropReason::ScopeViolation))
        );
        assert_eq!(
            forwarder.on_interest(consumer, interest("/a").with_hop_limit(0)),
            Ok(InterestOutcome::Dropped(DropReason::HopLimitExceeded))
        );

        forwarder.set_face_up(consumer, false).unwrap();
        assert_eq!(
            forwarder.on_interest(consumer, interest("/a")),
            Ok(InterestOutcome::Dropped(DropReason::FaceNotUp))
        );
        assert!(forwarder.pit().is_empty());
    }

    #[test]
    fn test_no_route_rejects() {
        let mut forwarder = Forwarder::default();
        let (consumer, _app) = app(&mut forwarder, "app://consumer");

        assert_eq!(
            forwarder.on_interest(consumer, interest("/nowhere")),
            Ok(InterestOutcome::Rejected {
                reason: RejectReason::NoRoute,
                in_faces: vec![consumer],
            })
        );
        assert!(forwarder.pit().is_empty());
        assert_eq!(forwarder.counters().n_rejected_interests, 1);
    }

    #[test]
    fn test_forward_is_deferred() {
        init_logger();
        let mut forwarder = Forwarder::default();
        let (consumer, _consumer_app) = app(&mut forwarder, "app://consumer");
        let (producer, mut producer_app) = app(&mut forwarder, "app://producer");
        forwarder.register_prefix(&name("/p"), producer, 0).unwrap();

        let outcome = forwarder
            .on_interest(consumer, Interest::new(name("/p/1")).with_hop_limit(3))
            .unwrap();
        assert_eq!(outcome, InterestOutcome::Forwarded(vec![producer]));

        // Nothing reaches the transport before the flush event runs
        assert!(producer_app.recv_packets().is_empty());
        assert_eq!(forwarder.process_pending(), 1);

        let received = interests(&mut producer_app);
        assert_eq!(received.len(), 1);
        assert!(received[0].nonce.is_some());
        assert_eq!(received[0].hop_limit, Some(2));
        assert_eq!(forwarder.face_status(producer).unwrap().counters.n_out_interests, 1);
    }

    #[test]
    fn test_duplicate_suppression() {
        let mut forwarder = Forwarder::default();
        let (first, _first_app) = app(&mut forwarder, "app://first");
        let (second, _second_app) = app(&mut forwarder, "app://second");
        let (producer, mut producer_app) = app(&mut forwarder, "app://producer");
        forwarder.register_prefix(&name("/p"), producer, 0).unwrap();

        forwarder.on_interest(first, interest("/p")).unwrap();
        assert_eq!(
            forwarder.on_interest(second, interest("/p")),
            Ok(InterestOutcome::Suppressed)
        );
        forwarder.process_pending();

        assert_eq!(interests(&mut producer_app).len(), 1);
        let key = PitKey::from_interest(&interest("/p"));
        assert_eq!(forwarder.pit().get(&key).unwrap().in_records().len(), 2);
        assert_eq!(forwarder.counters().n_suppressed_interests, 1);
    }

    #[test]
    fn test_data_satisfies_every_requester_once() {
        init_logger();
        let mut forwarder = Forwarder::default();
        let (x, mut x_app) = app(&mut forwarder, "app://x");
        let (y, mut y_app) = app(&mut forwarder, "app://y");
        let (producer, _producer_app) = app(&mut forwarder, "app://producer");
        forwarder.register_prefix(&name("/p"), producer, 0).unwrap();

        forwarder.on_interest(x, interest("/p/1")).unwrap();
        forwarder.on_interest(y, interest("/p/1")).unwrap();
        // An exact Interest from x again must not produce a second copy
        forwarder.on_interest(x, interest("/p/1")).unwrap();

        let reply = Data::new(name("/p/1"), b"hello".to_vec());
        assert_eq!(
            forwarder.on_data(producer, reply.clone()),
            Ok(DataOutcome::Satisfied { faces: vec![x, y] })
        );
        forwarder.process_pending();

        assert_eq!(data(&mut x_app), vec![reply.clone()]);
        assert_eq!(data(&mut y_app), vec![reply]);
        assert!(forwarder.pit().is_empty());
        assert_eq!(forwarder.content_store().len(), 1);
    }

    #[test]
    fn test_prefix_interests_and_unsolicited_data() {
        let mut forwarder = Forwarder::default();
        let (consumer, mut consumer_app) = app(&mut forwarder, "app://consumer");
        let (producer, _producer_app) = app(&mut forwarder, "app://producer");
        forwarder.register_prefix(&name("/p"), producer, 0).unwrap();

        assert_eq!(
            forwarder.on_data(producer, Data::new(name("/p/0"), vec![])),
            Ok(DataOutcome::Unsolicited)
        );
        assert!(forwarder.content_store().is_empty());

        forwarder
            .on_interest(consumer, interest("/p").with_can_be_prefix(true))
            .unwrap();
        assert_eq!(
            forwarder.on_data(producer, Data::new(name("/p/0/1"), vec![])),
            Ok(DataOutcome::Satisfied {
                faces: vec![consumer]
            })
        );
        forwarder.process_pending();
        assert_eq!(data(&mut consumer_app).len(), 1);
        assert_eq!(forwarder.counters().n_unsolicited_data, 1);
    }

    #[test]
    fn test_content_store_hit() {
        let mut forwarder = Forwarder::default();
        let (consumer, mut consumer_app) = app(&mut forwarder, "app://consumer");
        let (producer, mut producer_app) = app(&mut forwarder, "app://producer");
        forwarder.register_prefix(&name("/p"), producer, 0).unwrap();

        forwarder.on_interest(consumer, interest("/p/1")).unwrap();
        forwarder
            .on_data(producer, Data::new(name("/p/1"), vec![1]))
            .unwrap();
        forwarder.process_pending();
        producer_app.recv_packets();
        consumer_app.recv_packets();

        assert_eq!(
            forwarder.on_interest(consumer, interest("/p/1")),
            Ok(InterestOutcome::SatisfiedFromCache)
        );
        forwarder.process_pending();
        assert_eq!(data(&mut consumer_app).len(), 1);
        assert!(producer_app.recv_packets().is_empty());
        assert!(forwarder.pit().is_empty());
        assert_eq!(forwarder.counters().n_cs_hits, 1);
    }

    #[test]
    fn test_decode_errors_are_absorbed() {
        init_logger();
        let mut forwarder = Forwarder::default();
        let (consumer, mut consumer_app) = app(&mut forwarder, "app://consumer");

        consumer_app.send_raw(&[5, 3, 7, 1]).unwrap();
        forwarder.poll_faces();
        forwarder.receive(consumer, vec![0xFF]);
        forwarder.process_pending();

        assert_eq!(forwarder.counters().n_decode_errors, 2);
        assert_eq!(forwarder.counters().n_in_interests, 0);
        assert_eq!(forwarder.face_status(consumer).unwrap().counters.n_in_interests, 0);
    }

    #[test]
    fn test_remove_face_cleans_up() {
        let mut forwarder = Forwarder::default();
        let (consumer, _consumer_app) = app(&mut forwarder, "app://consumer");
        let (producer, _producer_app) = app(&mut forwarder, "app://producer");
        forwarder.register_prefix(&name("/p"), producer, 0).unwrap();
        forwarder.register_prefix(&name("/q"), producer, 0).unwrap();
        forwarder.on_interest(consumer, interest("/p")).unwrap();

        let notifications = forwarder.subscribe_face(producer).unwrap();
        let face = forwarder.remove_face(producer, "shutdown").unwrap();
        assert_eq!(face.state(), FaceState::Failed);
        assert_eq!(
            notifications.try_recv(),
            Ok(FaceNotification::Failed {
                face: producer,
                reason: "shutdown".to_string()
            })
        );

        assert!(forwarder.fib().is_empty());
        // The consumer is still waiting, only the out-record is gone
        let key = PitKey::from_interest(&interest("/p"));
        assert!(forwarder.pit().get(&key).unwrap().out_records().is_empty());
        assert!(forwarder.face_status(producer).is_none());
        assert_eq!(
            forwarder.remove_face(producer, "again").err(),
            Some(ForwarderError::UnknownFace(producer))
        );

        // A flush scheduled before the removal is skipped
        forwarder.process_pending();
    }

    #[test]
    fn test_disconnect_removes_face() {
        init_logger();
        let mut forwarder = Forwarder::default();
        let (consumer, _consumer_app) = app(&mut forwarder, "app://consumer");
        let (producer, producer_app) = app(&mut forwarder, "app://producer");
        forwarder.register_prefix(&name("/p"), producer, 0).unwrap();

        drop(producer_app);
        forwarder.on_interest(consumer, interest("/p")).unwrap();
        forwarder.process_pending();

        assert!(!forwarder.faces().contains(producer));
        assert!(forwarder.fib().is_empty());
    }

    #[derive(Default)]
    struct Recorded {
        satisfied: Vec<Name>,
        expired: Vec<Name>,
    }

    struct RecordingStrategy {
        name: Name,
        inner: BestRouteStrategy,
        recorded: Rc<RefCell<Recorded>>,
    }

    impl Strategy for RecordingStrategy {
        fn name(&self) -> &Name {
            &self.name
        }

        fn after_receive_interest(
            &mut self,
            in_face: FaceId,
            interest: &Interest,
            fib_entry: &FibEntry,
            pit_entry: &PitEntry,
            context: &StrategyContext<'_>,
        ) -> Action {
            self.inner
                .after_receive_interest(in_face, interest, fib_entry, pit_entry, context)
        }

        fn before_satisfy_interest(&mut self, pit_entry: &PitEntry, _in_face: FaceId, _data: &Data) {
            self.recorded
                .borrow_mut()
                .satisfied
                .push(pit_entry.name().clone());
        }

        fn before_expire_pending_interest(&mut self, pit_entry: &PitEntry) {
            self.recorded
                .borrow_mut()
                .expired
                .push(pit_entry.name().clone());
        }
    }

    #[test]
    fn test_expiry_and_strategy_hooks() {
        init_logger();
        let mut forwarder = Forwarder::default();
        let (consumer, _consumer_app) = app(&mut forwarder, "app://consumer");
        let (producer, _producer_app) = app(&mut forwarder, "app://producer");
        forwarder.register_prefix(&name("/p"), producer, 0).unwrap();

        let recorded = Rc::new(RefCell::new(Recorded::default()));
        forwarder.set_strategy(
            &name("/p"),
            Box::new(RecordingStrategy {
                name: name("/localhost/test/recording"),
                inner: BestRouteStrategy::new(),
                recorded: Rc::clone(&recorded),
            }),
        );

        forwarder
            .on_interest(consumer, interest("/p/slow").with_lifetime(100))
            .unwrap();
        forwarder.on_interest(consumer, interest("/p/fast")).unwrap();
        forwarder
            .on_data(producer, Data::new(name("/p/fast"), vec![]))
            .unwrap();
        assert_eq!(forwarder.next_wakeup(), Some(Timestamp::ZERO));

        forwarder.advance_to(Timestamp::from_millis(99));
        assert_eq!(forwarder.pit().len(), 1);
        assert_eq!(forwarder.next_wakeup(), Some(Timestamp::from_millis(100)));

        forwarder.advance_to(Timestamp::from_millis(100));
        assert!(forwarder.pit().is_empty());
        assert_eq!(forwarder.now(), Timestamp::from_millis(100));

        let recorded = recorded.borrow();
        assert_eq!(recorded.satisfied, vec![name("/p/fast")]);
        assert_eq!(recorded.expired, vec![name("/p/slow")]);
    }

    #[test]
    fn test_retransmission_after_expiry_is_forwarded_again() {
        let mut forwarder = Forwarder::default();
        let (consumer, _consumer_app) = app(&mut forwarder, "app://consumer");
        let (producer, mut producer_app) = app(&mut forwarder, "app://producer");
        forwarder.register_prefix(&name("/p"), producer, 0).unwrap();

        let request = interest("/p").with_lifetime(50);
        forwarder.on_interest(consumer, request.clone()).unwrap();
        forwarder.advance_to(Timestamp::from_millis(60));

        assert_eq!(
            forwarder.on_interest(consumer, request),
            Ok(InterestOutcome::Forwarded(vec![producer]))
        );
        forwarder.process_pending();
        assert_eq!(interests(&mut producer_app).len(), 2);
    }
}
