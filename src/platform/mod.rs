mod clock;
#[cfg(feature = "poller")]
mod poller;
mod udp;

pub use clock::MonotonicClock;
#[cfg(feature = "poller")]
pub use poller::{DriverError, PollingForwarder};
pub use udp::{udp_face, UdpReceiver, UdpSender};
