//! Position diffing, leader polling, and signal fan-out.

mod bus;
mod diff;
mod poller;

pub use bus::SignalBus;
pub use poller::LeaderPoller;
