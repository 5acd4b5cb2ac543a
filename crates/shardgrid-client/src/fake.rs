//! Scripted in-memory [`RestClient`] for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use shardgrid_watch::{BoxWatch, ObjectList, WatchSender, channel_watch};

use crate::error::{ClientError, ClientResult};
use crate::request::{ListOptions, ResourcePath};
use crate::rest::RestClient;

/// A write observed by a [`FakeRestClient`]: method and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub method: &'static str,
    pub path: String,
}

pub struct FakeRestClient {
    base_url: String,
    lists: Mutex<VecDeque<ClientResult<ObjectList<Value>>>>,
    default_list: Mutex<ClientResult<ObjectList<Value>>>,
    watch_error: Mutex<Option<ClientError>>,
    watchers: Mutex<Vec<WatchSender<Value>>>,
    watch_options: Mutex<Vec<ListOptions>>,
    writes: Mutex<Vec<RecordedWrite>>,
    list_calls: AtomicUsize,
}

impl FakeRestClient {
    /// A client whose lists return an empty list at version "0".
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            lists: Mutex::new(VecDeque::new()),
            default_list: Mutex::new(Ok(ObjectList {
                items: Vec::new(),
                resource_version: "0".to_string(),
            })),
            watch_error: Mutex::new(None),
            watchers: Mutex::new(Vec::new()),
            watch_options: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Queue a one-shot list response.
    pub fn push_list(&self, result: ClientResult<ObjectList<Value>>) {
        self.lists.lock().expect("fake lists lock").push_back(result);
    }

    /// Response for every list once the queue is empty.
    pub fn set_default_list(&self, result: ClientResult<ObjectList<Value>>) {
        *self.default_list.lock().expect("fake lists lock") = result;
    }

    /// Make every following watch call fail with `err`.
    pub fn fail_watches(&self, err: ClientError) {
        *self.watch_error.lock().expect("fake watch lock") = Some(err);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Producer halves of every watch opened so far, oldest first.
    pub fn watch_senders(&self) -> Vec<WatchSender<Value>> {
        self.watchers.lock().expect("fake watch lock").clone()
    }

    pub fn watch_options(&self) -> Vec<ListOptions> {
        self.watch_options.lock().expect("fake watch lock").clone()
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().expect("fake writes lock").clone()
    }

    fn record(&self, method: &'static str, path: String) -> ClientResult<Value> {
        self.writes
            .lock()
            .expect("fake writes lock")
            .push(RecordedWrite { method, path });
        Ok(Value::Null)
    }
}

impl RestClient for FakeRestClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list(&self, _path: &ResourcePath, _opts: &ListOptions) -> ClientResult<ObjectList<Value>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.lists.lock().expect("fake lists lock").pop_front();
        match queued {
            Some(result) => result,
            None => self.default_list.lock().expect("fake lists lock").clone(),
        }
    }

    async fn watch(&self, _path: &ResourcePath, opts: &ListOptions) -> ClientResult<BoxWatch<Value>> {
        if let Some(err) = self.watch_error.lock().expect("fake watch lock").clone() {
            return Err(err);
        }
        let (watcher, tx) = channel_watch(16);
        self.watchers.lock().expect("fake watch lock").push(tx);
        self.watch_options.lock().expect("fake watch lock").push(opts.clone());
        Ok(Box::new(watcher))
    }

    async fn get(&self, path: &ResourcePath, name: &str) -> ClientResult<Value> {
        self.record("GET", path.item(name))
    }

    async fn create(&self, path: &ResourcePath, _body: &Value) -> ClientResult<Value> {
        self.record("POST", path.collection())
    }

    async fn update(&self, path: &ResourcePath, name: &str, _body: &Value) -> ClientResult<Value> {
        self.record("PUT", path.item(name))
    }

    async fn patch(&self, path: &ResourcePath, name: &str, _body: &Value) -> ClientResult<Value> {
        self.record("PATCH", path.item(name))
    }

    async fn delete(&self, path: &ResourcePath, name: &str) -> ClientResult<Value> {
        self.record("DELETE", path.item(name))
    }
}
