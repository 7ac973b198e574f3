use std::collections::BTreeMap;

use log::trace;

use crate::{
    clock::Timestamp,
    hash::Sha256Digest,
    name::Name,
    packet::{Data, Interest},
};

// Least recently used eviction: every insert and every hit moves the entry to the
//  back of the eviction order.

#[derive(Clone, Debug)]
struct CsEntry {
    data: Data,
    digest: Option<Sha256Digest>,
    fresh_until: Option<Timestamp>,
    last_used: u64,
}

impl CsEntry {
    fn is_fresh(&self, now: Timestamp) -> bool {
        self.fresh_until.map_or(false, |until| now < until)
    }
}

pub struct ContentStore {
    entries: BTreeMap<Name, CsEntry>,
    eviction_order: BTreeMap<u64, Name>,
    use_counter: u64,
    capacity: usize,
}

impl ContentStore {
    /// A capacity of zero disables caching altogether.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            eviction_order: BTreeMap::new(),
            use_counter: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, data: Data, digest: Option<Sha256Digest>, now: Timestamp) {
        if self.capacity == 0 {
            return;
        }

        let fresh_until = data
            .freshness_period
            .filter(|period| *period > 0)
            .map(|period| now.adding(period));
        let name = data.name.clone();

        self.use_counter += 1;
        let entry = CsEntry {
            data,
            digest,
            fresh_until,
            last_used: self.use_counter,
        };
        if let Some(old) = self.entries.insert(name.clone(), entry) {
            self.eviction_order.remove(&old.last_used);
        }
        trace!("Cached {}", name);
        self.eviction_order.insert(self.use_counter, name);

        while self.entries.len() > self.capacity {
            match self.eviction_order.pop_first() {
                Some((_, evicted)) => {
                    trace!("Evicted {}", evicted);
                    self.entries.remove(&evicted);
                }
                None => break,
            }
        }
    }

    pub fn erase(&mut self, name: &Name) -> bool {
        match self.entries.remove(name) {
            Some(entry) => {
                self.eviction_order.remove(&entry.last_used);
                true
            }
            None => false,
        }
    }

    /// Looks for a cached Data packet that satisfies the Interest.
    pub fn find(&mut self, interest: &Interest, now: Timestamp) -> Option<&Data> {
        let acceptable = |entry: &CsEntry| !interest.must_be_fresh || entry.is_fresh(now);

        let found = if interest.has_full_name() {
            let digest = interest.name.last_component()?;
            let name = interest.name.dropping_last_component()?;
            self.entries
                .get(&name)
                .filter(|entry| entry.digest.map_or(false, |d| d.0[..] == digest.bytes[..]))
                .filter(|entry| acceptable(entry))
                .map(|_| name)
        } else if interest.can_be_prefix {
            // Everything under a prefix follows it directly in canonical order
            self.entries
                .range(interest.name.clone()..)
                .take_while(|(name, _)| interest.name.is_prefix_of(name))
                .find(|(_, entry)| acceptable(entry))
                .map(|(name, _)| name.clone())
        } else {
            self.entries
                .get(&interest.name)
                .filter(|entry| acceptable(entry))
                .map(|_| interest.name.clone())
        }?;

        self.touch(&found);
        self.entries.get(&found).map(|entry| &entry.data)
    }

    fn touch(&mut self, name: &Name) {
        if let Some(entry) = self.entries.get_mut(name) {
            self.eviction_order.remove(&entry.last_used);
            self.use_counter += 1;
            entry.last_used = self.use_counter;
            self.eviction_order.insert(self.use_counter, name.clone());
        }
    }
}
