//! What to do when a manager hits an unrecoverable invariant violation.

use std::sync::{Arc, Mutex};

use tracing::error;

use crate::error::PartitionError;

/// Called with the error that made the process state unrecoverable.
pub type FatalHook = Arc<dyn Fn(&PartitionError) + Send + Sync>;

/// Log the error and terminate the process with exit code 1.
pub fn exit_process() -> FatalHook {
    Arc::new(|err: &PartitionError| {
        error!(error = %err, "fatal partition invariant violated, exiting");
        std::process::exit(1);
    })
}

/// A hook that records errors instead of exiting. For tests.
#[derive(Clone, Default)]
pub struct RecordingHook {
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook(&self) -> FatalHook {
        let calls = self.calls.clone();
        Arc::new(move |err: &PartitionError| {
            error!(error = %err, "fatal partition invariant violated");
            calls.lock().expect("recording hook lock").push(err.to_string());
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("recording hook lock").clone()
    }

    pub fn fired(&self) -> bool {
        !self.calls.lock().expect("recording hook lock").is_empty()
    }
}

/// Route the outcome of an informer callback: fatal errors go to the hook,
/// anything else is logged and dropped.
pub(crate) fn report<T>(hook: &FatalHook, kind: &'static str, result: Result<T, PartitionError>) {
    if let Err(err) = result {
        if err.is_fatal() {
            hook(&err);
        } else {
            tracing::warn!(kind, error = %err, "event rejected");
        }
    }
}
