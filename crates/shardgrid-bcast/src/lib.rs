//! shardgrid-bcast — configuration change fan-out.
//!
//! Each subsystem that publishes configuration changes owns one
//! [`BroadcastGroup`]. Readers join the group and receive every message
//! sent after they joined, through a bounded per-reader buffer.
//!
//! # Delivery semantics
//!
//! - `send` never blocks. A reader that stops draining loses its oldest
//!   buffered messages; the next message it reads reports how many were
//!   skipped so it can resync from the publisher's current state.
//! - Every message carries a monotonic generation number. A reader that
//!   joins late can compare the group generation at join time against
//!   zero to learn that it missed earlier epochs.
//! - After `close`, existing readers drain and then see end-of-stream, and
//!   new joins return a reader that is already at end-of-stream.
//!
//! [`DrainLatch`] is the companion counter used to tell a publisher when
//! every consumer has finished reacting to a change.

pub mod error;
pub mod group;
pub mod latch;
pub mod registry;

pub use error::BroadcastError;
pub use group::{BroadcastGroup, Envelope, Subscription};
pub use latch::DrainLatch;
