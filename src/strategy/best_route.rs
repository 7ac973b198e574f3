use log::debug;

use crate::{
    face::FaceId,
    fib::FibEntry,
    name::Name,
    packet::Interest,
    pit::PitEntry,
    strategy::{strategy_name, Action, RejectReason, Strategy, StrategyContext},
};

/// Forwards a new Interest to the cheapest next hop that can take it.
///
/// Retransmissions are suppressed for as long as an earlier forwarding
///  attempt is still pending.
pub struct BestRouteStrategy {
    name: Name,
}

impl BestRouteStrategy {
    pub fn new() -> Self {
        Self {
            name: strategy_name("best-route", 1),
        }
    }
}

impl Default for BestRouteStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for BestRouteStrategy {
    fn name(&self) -> &Name {
        &self.name
    }

    fn after_receive_interest(
        &mut self,
        _in_face: FaceId,
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

        // Next hops are sorted by cost
        let next_hop = fib_entry.next_hops().iter().find(|hop| {
            context
                .faces
                .get(hop.face())
                .map_or(false, |face| pit_entry.can_forward_to(face, context.now))
        });

        match next_hop {
            Some(hop) => Action::Forward(vec![hop.face()]),
            None => Action::Reject(RejectReason::NoViableNextHop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::Timestamp,
        face::{null::null_face, FaceTable},
        fib::Fib,
        name::Name,
        pit::Pit,
    };

    struct Setup {
        faces: FaceTable,
        fib: Fib,
        pit: Pit,
        consumer: FaceId,
        a: FaceId,
        b: FaceId,
        prefix: Name,
        interest: Interest,
    }

    // faceA costs 10 and faceB costs 5, all faces up
    fn setup() -> Setup {
        let mut faces = FaceTable::new();
        let consumer = faces.add(null_face()).unwrap();
        let a = faces.add(null_face()).unwrap();
        let b = faces.add(null_face()).unwrap();
        for id in [consumer, a, b] {
            faces.get_mut(id).unwrap().set_up(true);
        }

        let prefix: Name = "/p".parse().unwrap();
        let mut fib = Fib::new();
        fib.add_next_hop(&prefix, a, 10);
        fib.add_next_hop(&prefix, b, 5);

        let interest = Interest::new("/p/x".parse().unwrap()).with_nonce([9, 9, 9, 9]);
        let mut pit = Pit::default();
        let (entry, _) = pit.find_or_insert(&interest, Timestamp::ZERO);
        entry.insert_or_update_in_record(consumer, &interest, Timestamp::ZERO);

        Setup {
            faces,
            fib,
            pit,
            consumer,
            a,
            b,
            prefix,
            interest,
        }
    }

    fn decide(setup: &Setup) -> Action {
        let mut strategy = BestRouteStrategy::new();
        let fib_entry = setup.fib.find_exact_match(&setup.prefix).unwrap();
        let pit_entry = setup.pit.iter().next().unwrap();
        let context = StrategyContext {
            faces: &setup.faces,
            now: Timestamp::ZERO,
        };
        strategy.after_receive_interest(setup.consumer, &setup.interest, fib_entry, pit_entry, &context)
    }

    #[test]
    fn test_lowest_cost_first() {
        let setup = setup();
        assert_eq!(decide(&setup), Action::Forward(vec![setup.b]));
    }

    #[test]
    fn test_skips_faces_that_are_down() {
        let mut setup = setup();
        setup.faces.get_mut(setup.b).unwrap().set_up(false);
        assert_eq!(decide(&setup), Action::Forward(vec![setup.a]));

        setup.faces.get_mut(setup.a).unwrap().set_up(false);
        assert_eq!(
            decide(&setup),
            Action::Reject(RejectReason::NoViableNextHop)
        );
    }

    #[test]
    fn test_suppresses_while_pending() {
        let mut setup = setup();
        let key = crate::pit::PitKey::from_interest(&setup.interest);
        setup
            .pit
            .get_mut(&key)
            .unwrap()
            .insert_or_update_out_record(setup.b, &setup.interest, Timestamp::ZERO);
        assert_eq!(decide(&setup), Action::Suppress);
    }

    #[test]
    fn test_never_back_to_the_requester() {
        let mut setup = setup();
        // The only next hop is where the Interest came from
        setup.fib.remove_next_hop(&setup.prefix, setup.a);
        setup.fib.add_next_hop(&setup.prefix, setup.consumer, 1);
        setup.fib.remove_next_hop(&setup.prefix, setup.b);
        assert_eq!(
            decide(&setup),
            Action::Reject(RejectReason::NoViableNextHop)
        );
    }

    #[test]
    fn test_empty_entry_is_no_route() {
        let mut setup = setup();
        setup.fib.insert(&"/q".parse().unwrap());
        setup.prefix = "/q".parse().unwrap();
        assert_eq!(decide(&setup), Action::Reject(RejectReason::NoRoute));
    }
}
