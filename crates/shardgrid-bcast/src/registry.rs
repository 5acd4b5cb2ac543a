//! Process-wide named groups.
//!
//! Libraries receive their groups explicitly; only the composition root
//! should reach for this registry, so every subsystem in one process ends
//! up sharing the same group instance per name.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::BroadcastError;
use crate::group::BroadcastGroup;

type Entry = Arc<dyn Any + Send + Sync>;

fn groups() -> &'static Mutex<HashMap<String, Entry>> {
    static GROUPS: OnceLock<Mutex<HashMap<String, Entry>>> = OnceLock::new();
    GROUPS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Get the group registered under `name`, creating it on first use.
///
/// Fails if the name is already taken by a group of another message type.
pub fn group<T>(name: &str, capacity: usize) -> Result<Arc<BroadcastGroup<T>>, BroadcastError>
where
    T: Clone + Send + Sync + 'static,
{
    let mut groups = groups().lock().expect("registry lock");
    let entry = groups
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(BroadcastGroup::<T>::new(name, capacity)) as Entry)
        .clone();
    entry
        .downcast::<BroadcastGroup<T>>()
        .map_err(|_| BroadcastError::TypeMismatch {
            name: name.to_string(),
        })
}

/// Forget the group registered under `name`; existing handles keep working.
pub fn remove(name: &str) -> bool {
    let mut groups = groups().lock().expect("registry lock");
    groups.remove(name).is_some()
}
