//! Watch events.
//!
//! The wire shape is `{"type": "ADDED", "object": {...}}`, which maps
//! directly onto an adjacently tagged enum.

use serde::{Deserialize, Serialize};

/// Status payload carried by `ERROR` events and failed API responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiStatus {
    pub code: u16,
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
            EventType::Bookmark => "BOOKMARK",
            EventType::Error => "ERROR",
        }
    }
}

/// A single change notification from a watch stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "object", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
    Bookmark(T),
    Error(ApiStatus),
}

impl<T> WatchEvent<T> {
    pub fn event_type(&self) -> EventType {
        match self {
            WatchEvent::Added(_) => EventType::Added,
            WatchEvent::Modified(_) => EventType::Modified,
            WatchEvent::Deleted(_) => EventType::Deleted,
            WatchEvent::Bookmark(_) => EventType::Bookmark,
            WatchEvent::Error(_) => EventType::Error,
        }
    }

    /// The carried object, if this is not an error event.
    pub fn object(&self) -> Option<&T> {
        match self {
            WatchEvent::Added(o)
            | WatchEvent::Modified(o)
            | WatchEvent::Deleted(o)
            | WatchEvent::Bookmark(o) => Some(o),
            WatchEvent::Error(_) => None,
        }
    }

    /// Convert the carried object, keeping the event type.
    pub fn map<U, F>(self, f: F) -> WatchEvent<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            WatchEvent::Added(o) => WatchEvent::Added(f(o)),
            WatchEvent::Modified(o) => WatchEvent::Modified(f(o)),
            WatchEvent::Deleted(o) => WatchEvent::Deleted(f(o)),
            WatchEvent::Bookmark(o) => WatchEvent::Bookmark(f(o)),
            WatchEvent::Error(s) => WatchEvent::Error(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::StorageCluster;

    #[test]
    fn decodes_wire_events() {
        let line = r#"{"type":"MODIFIED","object":{"metadata":{"name":"c1","resourceVersion":"5"},"storageClusterId":"1","serviceAddress":"10.0.0.1:2379"}}"#;
        let ev: WatchEvent<StorageCluster> = serde_json::from_str(line).unwrap();
        assert_eq!(ev.event_type(), EventType::Modified);
        assert_eq!(ev.object().unwrap().storage_cluster_id, "1");
    }

    #[test]
    fn decodes_error_events() {
        let line = r#"{"type":"ERROR","object":{"code":410,"reason":"Gone","message":"too old resource version"}}"#;
        let ev: WatchEvent<StorageCluster> = serde_json::from_str(line).unwrap();
        match ev {
            WatchEvent::Error(status) => assert_eq!(status.code, 410),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
