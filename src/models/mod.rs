//! Data models for leaders, position snapshots, and copy signals.

mod leader;
mod signal;
mod snapshot;

pub use leader::{AccountIndex, CopyDefaults, CopyMode, LeaderConfig, TraderStats};
pub use signal::{client_ref, Signal, SignalSide, SignalType};
pub use snapshot::PositionSnapshot;
