use core::time::Duration;
use std::{
    io,
    net::{SocketAddr, UdpSocket},
};

use log::{debug, info};
use polling::{Event, Events, PollMode, Poller};
use thiserror::Error;

use crate::{
    clock::Clock,
    face::{Face, FaceId},
    forwarder::{Forwarder, ForwarderError},
    platform::udp::udp_face,
};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Forwarder(#[from] ForwarderError),
}

/// Drives a forwarder from real sockets and a real clock.
///
/// Sleeps until a socket becomes readable or the forwarder has something
///  scheduled, whichever comes first.
pub struct PollingForwarder<C: Clock> {
    forwarder: Forwarder,
    clock: C,
    poller: Poller,
    events: Events,
    // Sorted by face id
    sockets: Vec<(FaceId, UdpSocket)>,
    should_re_add: bool,
}

impl<C: Clock> PollingForwarder<C> {
    pub fn new(forwarder: Forwarder, clock: C) -> io::Result<Self> {
        let poller = Poller::new()?;
        let should_re_add = !poller.supports_level();
        Ok(Self {
            forwarder,
            clock,
            poller,
            events: Events::new(),
            sockets: Vec::new(),
            should_re_add,
        })
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    pub fn forwarder_mut(&mut self) -> &mut Forwarder {
        &mut self.forwarder
    }

    pub fn add_udp_face(&mut self, socket: UdpSocket, remote: SocketAddr) -> Result<FaceId, DriverError> {
        let (face, registration) = udp_face(socket, remote)?;
        let id = self.forwarder.add_face(face)?;

        let mode = if self.should_re_add {
            PollMode::Oneshot
        } else {
            PollMode::Level
        };
        // The socket is deleted from the poller before it is dropped,
        //  either when the face goes away or when we do.
        let added = unsafe {
            self.poller
                .add_with_mode(&registration, Event::readable(id.get() as usize), mode)
        };
        if let Err(err) = added {
            self.forwarder.remove_face(id, "cannot poll socket")?;
            return Err(err.into());
        }

        self.sockets.push((id, registration));
        info!("Polling UDP face {} to {}", id, remote);
        Ok(id)
    }

    pub fn remove_face(&mut self, id: FaceId, reason: &str) -> Result<Face, DriverError> {
        self.unregister(id);
        Ok(self.forwarder.remove_face(id, reason)?)
    }

    fn unregister(&mut self, id: FaceId) {
        if let Ok(idx) = self.sockets.binary_search_by_key(&id, |(f, _)| *f) {
            let (_, socket) = self.sockets.remove(idx);
            let _ = self.poller.delete(&socket);
        }
    }

    // Faces the forwarder dropped on its own, e.g. because their transport failed
    fn forget_removed_faces(&mut self) {
        let removed: Vec<FaceId> = self
            .sockets
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| !self.forwarder.faces().contains(*id))
            .collect();
        for id in removed {
            debug!("Stopped polling removed face {}", id);
            self.unregister(id);
        }
    }

    fn timeout(&mut self, max_wait: Option<Duration>) -> Option<Duration> {
        let now = self.clock.now();
        let until_wakeup = self
            .forwarder
            .next_wakeup()
            .map(|at| Duration::from_millis(at.difference(&now).unwrap_or(0)));
        match (until_wakeup, max_wait) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Waits for at most `max_wait` (forever if `None` and nothing is scheduled),
    ///  then handles everything that is due. Returns how many events ran.
    pub fn run_once(&mut self, max_wait: Option<Duration>) -> io::Result<usize> {
        let timeout = self.timeout(max_wait);

        self.events.clear();
        self.poller.wait(&mut self.events, timeout)?;

        if self.should_re_add {
            for event in self.events.iter().filter(|event| event.readable) {
                let key = event.key as u64;
                if let Ok(idx) = self.sockets.binary_search_by_key(&key, |(f, _)| f.get()) {
                    self.poller
                        .modify(&self.sockets[idx].1, Event::readable(event.key))?;
                }
            }
        }

        let now = self.clock.now();
        let mut processed = self.forwarder.advance_to(now);
        self.forwarder.poll_faces();
        processed += self.forwarder.process_pending();
        self.forget_removed_faces();
        Ok(processed)
    }
}

impl<C: Clock> Drop for PollingForwarder<C> {
    fn drop(&mut self) {
        for (_, socket) in self.sockets.drain(..) {
            let _ = self.poller.delete(&socket);
        }
    }
}
