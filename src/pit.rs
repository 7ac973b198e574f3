use core::cmp::{Ordering, Reverse};
use std::collections::{btree_map, BTreeMap, BinaryHeap};

use log::{debug, trace};

use crate::{
    clock::Timestamp,
    face::{Face, FaceId},
    hash::Sha256Digest,
    name::{Name, NameComponent},
    packet::{Data, Interest},
    sequence::SequenceGenerator,
};

pub const DEFAULT_INTEREST_LIFETIME_MS: u64 = 4000; // 4 sec

/// Interests are aggregated by name together with the selectors that change what they match.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PitKey {
    pub name: Name,
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
}

impl PitKey {
    pub fn from_interest(interest: &Interest) -> Self {
        Self {
            name: interest.name.clone(),
            can_be_prefix: interest.can_be_prefix,
            must_be_fresh: interest.must_be_fresh,
        }
    }

    // The selectors sort after the name, so these bound every key with this name
    fn lowest(name: &Name) -> Self {
        Self {
            name: name.clone(),
            can_be_prefix: false,
            must_be_fresh: false,
        }
    }

    fn highest(name: &Name) -> Self {
        Self {
            name: name.clone(),
            can_be_prefix: true,
            must_be_fresh: true,
        }
    }
}

/// A face waiting for Data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InRecord {
    face: FaceId,
    last_nonce: Option<[u8; 4]>,
    last_renewed: Timestamp,
    expiry: Timestamp,
}

/// A face the Interest was forwarded to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutRecord {
    face: FaceId,
    last_nonce: Option<[u8; 4]>,
    last_renewed: Timestamp,
    expiry: Timestamp,
}

macro_rules! record_accessors {
    ($record:ty) => {
        impl $record {
            pub fn face(&self) -> FaceId {
                self.face
            }

            pub fn last_nonce(&self) -> Option<[u8; 4]> {
                self.last_nonce
            }

            pub fn last_renewed(&self) -> Timestamp {
                self.last_renewed
            }

            pub fn expiry(&self) -> Timestamp {
                self.expiry
            }

            /// A record is live for `[last_renewed, expiry)`.
            pub fn is_expired(&self, now: Timestamp) -> bool {
                self.expiry <= now
            }
        }
    };
}

record_accessors!(InRecord);
record_accessors!(OutRecord);

#[derive(Clone, Debug)]
pub struct PitEntry {
    key: PitKey,
    interest: Interest,
    in_records: Vec<InRecord>,
    out_records: Vec<OutRecord>,
    default_lifetime_ms: u64,
    timer: u64,
}

impl PitEntry {
    fn new(key: PitKey, interest: Interest, default_lifetime_ms: u64, timer: u64) -> Self {
        Self {
            key,
            interest,
            in_records: Vec::new(),
            out_records: Vec::new(),
            default_lifetime_ms,
            timer,
        }
    }

    pub fn key(&self) -> &PitKey {
        &self.key
    }

    pub fn name(&self) -> &Name {
        &self.key.name
    }

    /// The latest Interest that arrived for this entry.
    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    pub fn in_records(&self) -> &[InRecord] {
        &self.in_records
    }

    pub fn out_records(&self) -> &[OutRecord] {
        &self.out_records
    }

    fn lifetime(&self, interest: &Interest) -> u64 {
        interest
            .interest_lifetime
            .unwrap_or(self.default_lifetime_ms)
    }

    /// Records (or refreshes) a face waiting for Data; one record per face.
    pub fn insert_or_update_in_record(&mut self, face: FaceId, interest: &Interest, now: Timestamp) {
        let expiry = now.adding(self.lifetime(interest));
        let record = InRecord {
            face,
            last_nonce: interest.nonce,
            last_renewed: now,
            expiry,
        };
        match self.in_records.iter_mut().find(|r| r.face == face) {
            Some(existing) => *existing = record,
            None => self.in_records.push(record),
        }
        self.interest = interest.clone();
    }

    /// Records (or refreshes) that the Interest went out on a face.
    pub fn insert_or_update_out_record(&mut self, face: FaceId, interest: &Interest, now: Timestamp) {
        let expiry = now.adding(self.lifetime(interest));
        let record = OutRecord {
            face,
            last_nonce: interest.nonce,
            last_renewed: now,
            expiry,
        };
        match self.out_records.iter_mut().find(|r| r.face == face) {
            Some(existing) => *existing = record,
            None => self.out_records.push(record),
        }
    }

    pub fn delete_in_record(&mut self, face: FaceId) {
        self.in_records.retain(|r| r.face != face);
    }

    pub fn delete_out_record(&mut self, face: FaceId) {
        self.out_records.retain(|r| r.face != face);
    }

    pub fn clear_in_records(&mut self) {
        self.in_records.clear();
    }

    pub fn has_unexpired_in_records(&self, now: Timestamp) -> bool {
        self.in_records.iter().any(|r| !r.is_expired(now))
    }

    pub fn has_unexpired_out_records(&self, now: Timestamp) -> bool {
        self.out_records.iter().any(|r| !r.is_expired(now))
    }

    /// Whether the Interest may go out on `face` now.
    ///
    /// Not if the face is down, already has a live out-record, is the only one
    ///  waiting for the Data, or is non-local while the name is under `/localhost`.
    pub fn can_forward_to(&self, face: &Face, now: Timestamp) -> bool {
        if !face.is_up() {
            return false;
        }

        let id = face.id();
        if self
            .out_records
            .iter()
            .any(|r| r.face == id && !r.is_expired(now))
        {
            return false;
        }

        if self.key.name.is_localhost() && !face.is_local() {
            return false;
        }

        self.in_records
            .iter()
            .any(|r| r.face != id && !r.is_expired(now))
    }

    pub fn latest_expiry(&self) -> Option<Timestamp> {
        let in_expiry = self.in_records.iter().map(|r| r.expiry);
        let out_expiry = self.out_records.iter().map(|r| r.expiry);
        in_expiry.chain(out_expiry).max()
    }

    fn remove_expired(&mut self, now: Timestamp) {
        self.in_records.retain(|r| !r.is_expired(now));
        self.out_records.retain(|r| !r.is_expired(now));
    }

    fn is_empty(&self) -> bool {
        self.in_records.is_empty() && self.out_records.is_empty()
    }
}

// Every entry has exactly one live timer, set for when its records would run out.
// When it fires early because records were refreshed it is re-armed at the new
//  time, and timers for entries that are already gone are simply skipped.
#[derive(Debug, PartialEq, Eq)]
struct ExpiryTimer {
    at: Timestamp,
    token: u64,
    key: PitKey,
}

impl Ord for ExpiryTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .cmp(&other.at)
            .then(self.token.cmp(&other.token))
    }
}

impl PartialOrd for ExpiryTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct Pit {
    entries: BTreeMap<PitKey, PitEntry>,
    timers: BinaryHeap<Reverse<ExpiryTimer>>,
    tokens: SequenceGenerator,
    default_lifetime_ms: u64,
}

impl Default for Pit {
    fn default() -> Self {
        Self::new(DEFAULT_INTEREST_LIFETIME_MS)
    }
}

impl Pit {
    pub fn new(default_lifetime_ms: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            timers: BinaryHeap::new(),
            tokens: SequenceGenerator::new(),
            default_lifetime_ms,
        }
    }

    /// Finds the entry aggregating this Interest, creating it if there is none.
    pub fn find_or_insert(&mut self, interest: &Interest, now: Timestamp) -> (&mut PitEntry, bool) {
        match self.entries.entry(PitKey::from_interest(interest)) {
            btree_map::Entry::Occupied(occupied) => (occupied.into_mut(), false),
            btree_map::Entry::Vacant(vacant) => {
                let token = self.tokens.next();
                let lifetime = interest
                    .interest_lifetime
                    .unwrap_or(self.default_lifetime_ms);
                self.timers.push(Reverse(ExpiryTimer {
                    at: now.adding(lifetime),
                    token,
                    key: vacant.key().clone(),
                }));
                trace!("New PIT entry {}", vacant.key().name);
                let entry = PitEntry::new(
                    vacant.key().clone(),
                    interest.clone(),
                    self.default_lifetime_ms,
                    token,
                );
                (vacant.insert(entry), true)
            }
        }
    }

    pub fn get(&self, key: &PitKey) -> Option<&PitEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &PitKey) -> Option<&mut PitEntry> {
        self.entries.get_mut(key)
    }

    pub fn erase(&mut self, key: &PitKey) -> Option<PitEntry> {
        // The timer stays in the heap and is skipped when it fires
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PitEntry> {
        self.entries.values()
    }

    /// Collects every entry the Data satisfies: the ones with exactly its name,
    ///  the ones under its prefixes that allow prefix matches, and the ones
    ///  naming it with its implicit digest.
    pub fn find_all_data_matches(&self, data: &Data, digest: Option<&Sha256Digest>) -> Vec<PitKey> {
        let mut matches = Vec::new();
        let name = &data.name;
        let count = name.component_count();

        for len in 1..=count {
            let prefix = name.get_prefix(len);
            let range = PitKey::lowest(&prefix)..=PitKey::highest(&prefix);
            for key in self.entries.range(range).map(|(key, _)| key) {
                if len == count || key.can_be_prefix {
                    matches.push(key.clone());
                }
            }
        }

        if let Some(digest) = digest {
            let full_name = name.adding_component(NameComponent::implicit_digest(&digest.0));
            let range = PitKey::lowest(&full_name)..=PitKey::highest(&full_name);
            matches.extend(self.entries.range(range).map(|(key, _)| key.clone()));
        }

        matches
    }

    /// Forgets a face everywhere, erasing entries that are left without records.
    pub fn remove_face(&mut self, face: FaceId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            entry.delete_in_record(face);
            entry.delete_out_record(face);
            !entry.is_empty()
        });
        before - self.entries.len()
    }

    pub fn next_expiry(&self) -> Option<Timestamp> {
        self.timers.peek().map(|Reverse(timer)| timer.at)
    }

    /// Fires due timers, returning the entries that ran out of live records.
    pub fn expire(&mut self, now: Timestamp) -> Vec<PitEntry> {
        let mut expired = Vec::new();

        loop {
            let timer = match self.timers.peek() {
                Some(Reverse(timer)) if timer.at <= now => match self.timers.pop() {
                    Some(Reverse(timer)) => timer,
                    None => break,
                },
                _ => break,
            };

            let rearm_at = match self.entries.get_mut(&timer.key) {
                Some(entry) if entry.timer == timer.token => {
                    entry.remove_expired(now);
                    entry.latest_expiry()
                }
                _ => continue, // The entry was satisfied or replaced in the meantime
            };

            match rearm_at {
                Some(at) => self.timers.push(Reverse(ExpiryTimer { at, ..timer })),
                None => {
                    if let Some(entry) = self.entries.remove(&timer.key) {
                        debug!("PIT entry {} expired", entry.name());
                        expired.push(entry);
                    }
                }
            }
        }

        expired
    }
}
