//! shardgrid-client — REST clients for a partitioned API server.
//!
//! # Components
//!
//! - **`rest`** — the [`RestClient`] trait, one client per API-server group
//! - **`http`** — [`HttpRestClient`], hyper over plain HTTP/1.1 with a
//!   newline-delimited JSON watch decoder
//! - **`pool`** — [`ClientPool`], rebuilt on API-server config updates;
//!   random pick for writes, fan-out list and watch for reads
//! - **`lister`** — typed [`ListerWatcher`](shardgrid_watch::ListerWatcher)
//!   over a pool, for shared informers
//! - **`fake`** — scripted client for tests

pub mod error;
pub mod fake;
pub mod http;
pub mod lister;
pub mod pool;
pub mod request;
pub mod rest;

pub use error::{ClientError, ClientResult, NOT_MY_SHARD_MARKER};
pub use fake::{FakeRestClient, RecordedWrite};
pub use http::{EventDecoder, HttpRestClient};
pub use lister::{PoolListerWatcher, TypedWatch};
pub use pool::{BOOTSTRAP_GROUP, ClientFactory, ClientPool, PoolSettings};
pub use request::{ListOptions, ResourcePath};
pub use rest::RestClient;
