use log::debug;

use crate::{
    face::FaceId,
    fib::FibEntry,
    name::Name,
    packet::Interest,
    pit::PitEntry,
    strategy::{strategy_name, Action, RejectReason, Strategy, StrategyContext},
};

/// Floods a new Interest to every usable next hop except the one it came from.
pub struct MulticastStrategy {
    name: Name,
}

impl MulticastStrategy {
    pub fn new() -> Self {
        Self {
            name: strategy_name("multicast", 1),
        }
    }
}

impl Default for MulticastStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for MulticastStrategy {
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
        if pit_entry.has_unexpired_out_records(context.now) {
            debug!("{} is already pending upstream", interest.name);
            return Action::Suppress;
        }

        if !fib_entry.has_next_hops() {
            return Action::Reject(RejectReason::NoRoute);
        }

        let out_faces: Vec<FaceId> = fib_entry
            .next_hops()
            .iter()
            .map(|hop| hop.face())
            .filter(|face| *face != in_face)
            .filter(|face| {
                context
                    .faces
                    .get(*face)
                    .map_or(false, |face| pit_entry.can_forward_to(face, context.now))
            })
            .collect();

        if out_faces.is_empty() {
            Action::Reject(RejectReason::NoViableNextHop)
        } else {
            Action::Forward(out_faces)
        }
    }
}
