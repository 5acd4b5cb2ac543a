//! shardgrid-watch — watch streams, fan-in, and shared informers.
//!
//! # Components
//!
//! - **`interface`** — the [`WatchInterface`] trait and a channel-backed
//!   implementation
//! - **`aggregated`** — [`AggregatedWatcher`], which merges N watch streams
//!   (one per partition) into one
//! - **`handler`** — [`ResourceEventHandler`] callbacks and tombstones
//! - **`informer`** — [`SharedInformer`], list-then-watch with a local cache
//! - **`factory`** — [`InformerFactory`], one informer per kind, shared
//! - **`fake`** — in-memory lister/watcher for tests

pub mod aggregated;
pub mod error;
pub mod factory;
pub mod fake;
pub mod handler;
pub mod informer;
pub mod interface;

use std::future::Future;
use std::pin::Pin;

pub use aggregated::{AggregatedReceiver, AggregatedWatch, AggregatedWatcher};
pub use error::{WatchError, WatchResult};
pub use factory::InformerFactory;
pub use fake::FakeListerWatcher;
pub use handler::{DeletedObject, FnHandler, ResourceEventHandler};
pub use informer::{ListerWatcher, ObjectList, SharedInformer};
pub use interface::{BoxWatch, ChannelWatcher, WatchInterface, WatchSender, channel_watch};

/// Boxed, sendable future used at trait-object seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
