mod best_route;
mod multicast;

pub use best_route::BestRouteStrategy;
pub use multicast::MulticastStrategy;

use core::fmt;
use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    clock::Timestamp,
    face::{FaceId, FaceTable},
    fib::FibEntry,
    name::{Name, NameComponent},
    packet::{Data, Interest},
    pit::PitEntry,
};

/// What the forwarder should do with an incoming Interest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Send the Interest out on these faces, recording an out-record for each.
    Forward(Vec<FaceId>),
    /// Give up on the pending Interest.
    Reject(RejectReason),
    /// The Interest is already being forwarded upstream.
    Suppress,
    Drop,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    NoRoute,
    NoViableNextHop,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RejectReason::NoRoute => "no route",
            RejectReason::NoViableNextHop => "no viable next hop",
        })
    }
}

/// Read-only view of the forwarder a strategy decides with.
pub struct StrategyContext<'a> {
    pub faces: &'a FaceTable,
    pub now: Timestamp,
}

pub trait Strategy {
    fn name(&self) -> &Name;

    fn after_receive_interest(
        &mut self,
        in_face: FaceId,
        interest: &Interest,
        fib_entry: &FibEntry,
        pit_entry: &PitEntry,
        context: &StrategyContext<'_>,
    ) -> Action;

    fn before_satisfy_interest(&mut self, _pit_entry: &PitEntry, _in_face: FaceId, _data: &Data) {}

    fn before_expire_pending_interest(&mut self, _pit_entry: &PitEntry) {}
}

// Strategies are named /localhost/nfd/strategy/<label>/<version>
fn strategy_name(label: &str, version: u8) -> Name {
    Name::from_components(
        ["localhost", "nfd", "strategy", label]
            .iter()
            .map(|c| NameComponent::generic(c.as_bytes()))
            .chain(core::iter::once(NameComponent::generic(&[0xFD, version]))),
    )
}

/// The built-in strategies, as they are named in configuration.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    BestRoute,
    Multicast,
}

impl StrategyKind {
    pub fn build(&self) -> Box<dyn Strategy> {
        match self {
            StrategyKind::BestRoute => Box::new(BestRouteStrategy::new()),
            StrategyKind::Multicast => Box::new(MulticastStrategy::new()),
        }
    }
}

/// Binds strategies to namespaces. The root namespace is always bound.
pub struct StrategyChoice {
    root: Box<dyn Strategy>,
    strategies: BTreeMap<Name, Box<dyn Strategy>>,
}

impl Default for StrategyChoice {
    fn default() -> Self {
        Self::new(StrategyKind::default().build())
    }
}

impl StrategyChoice {
    pub fn new(root: Box<dyn Strategy>) -> Self {
        Self {
            root,
            strategies: BTreeMap::new(),
        }
    }

    /// Binds a strategy to a namespace, replacing what was there.
    pub fn insert(&mut self, prefix: &Name, strategy: Box<dyn Strategy>) {
        info!("Strategy for {} is now {}", prefix, strategy.name());
        if prefix.is_empty() {
            self.root = strategy;
        } else {
            self.strategies.insert(prefix.clone(), strategy);
        }
    }

    /// Unbinds a namespace, which then falls back to its parent's strategy.
    /// The root binding cannot be erased.
    pub fn erase(&mut self, prefix: &Name) -> bool {
        self.strategies.remove(prefix).is_some()
    }

    pub fn len(&self) -> usize {
        self.strategies.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    fn find_effective_prefix(&self, name: &Name) -> Option<Name> {
        (1..=name.component_count())
            .rev()
            .map(|len| name.get_prefix(len))
            .find(|prefix| self.strategies.contains_key(prefix))
    }

    pub fn find_effective_strategy(&self, name: &Name) -> &dyn Strategy {
        match self
            .find_effective_prefix(name)
            .and_then(|prefix| self.strategies.get(&prefix))
        {
            Some(strategy) => strategy.as_ref(),
            None => self.root.as_ref(),
        }
    }

    pub fn find_effective_strategy_mut(&mut self, name: &Name) -> &mut dyn Strategy {
        let prefix = self.find_effective_prefix(name);
        match prefix.and_then(|prefix| self.strategies.get_mut(&prefix)) {
            Some(strategy) => strategy.as_mut(),
            None => self.root.as_mut(),
        }
    }

    /// Every binding as (namespace, strategy name), the root first.
    pub fn iter(&self) -> impl Iterator<Item = (Name, &Name)> {
        core::iter::once((Name::new(), self.root.name())).chain(
            self.strategies
                .iter()
                .map(|(prefix, strategy)| (prefix.clone(), strategy.name())),
        )
    }
}
