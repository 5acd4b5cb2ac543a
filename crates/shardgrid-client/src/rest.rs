//! The REST client seam.
//!
//! One implementation talks to a single API-server group. The pool holds
//! one per group and decides which to call.

use std::future::Future;

use serde_json::Value;
use shardgrid_watch::{BoxWatch, ObjectList};

use crate::error::ClientResult;
use crate::request::{ListOptions, ResourcePath};

pub trait RestClient: Send + Sync + 'static {
    /// Base URL this client targets, e.g. `http://10.0.0.1:8080`.
    fn base_url(&self) -> &str;

    fn list(
        &self,
        path: &ResourcePath,
        opts: &ListOptions,
    ) -> impl Future<Output = ClientResult<ObjectList<Value>>> + Send;

    fn watch(
        &self,
        path: &ResourcePath,
        opts: &ListOptions,
    ) -> impl Future<Output = ClientResult<BoxWatch<Value>>> + Send;

    fn get(&self, path: &ResourcePath, name: &str) -> impl Future<Output = ClientResult<Value>> + Send;

    fn create(&self, path: &ResourcePath, body: &Value) -> impl Future<Output = ClientResult<Value>> + Send;

    fn update(
        &self,
        path: &ResourcePath,
        name: &str,
        body: &Value,
    ) -> impl Future<Output = ClientResult<Value>> + Send;

    /// JSON merge patch.
    fn patch(
        &self,
        path: &ResourcePath,
        name: &str,
        body: &Value,
    ) -> impl Future<Output = ClientResult<Value>> + Send;

    fn delete(&self, path: &ResourcePath, name: &str) -> impl Future<Output = ClientResult<Value>> + Send;
}
