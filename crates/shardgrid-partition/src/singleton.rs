//! Process-wide singleton claims.
//!
//! Managers are ordinary values; the composition root claims a name for
//! each one it builds so a second construction in the same process is
//! caught instead of silently splitting state.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use crate::error::{PartitionError, PartitionResult};

fn claimed() -> &'static Mutex<HashSet<&'static str>> {
    static CLAIMED: OnceLock<Mutex<HashSet<&'static str>>> = OnceLock::new();
    CLAIMED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Held for as long as the named singleton is alive.
#[derive(Debug)]
pub struct SingletonGuard {
    name: &'static str,
}

impl SingletonGuard {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for SingletonGuard {
    fn drop(&mut self) {
        claimed().lock().expect("singleton lock").remove(self.name);
    }
}

/// Claim `name` for this process. Fails if it is already held.
pub fn claim(name: &'static str) -> PartitionResult<SingletonGuard> {
    let mut claimed = claimed().lock().expect("singleton lock");
    if !claimed.insert(name) {
        return Err(PartitionError::SingletonViolation(name));
    }
    Ok(SingletonGuard { name })
}
