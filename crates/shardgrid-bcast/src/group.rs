//! Broadcast group and its readers.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

use crate::error::BroadcastError;

/// A message as seen by one reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<T> {
    /// Group generation assigned when the message was sent (starts at 1).
    pub generation: u64,
    /// Messages this reader lost to buffer overflow just before this one.
    pub missed: u64,
    pub message: T,
}

impl<T> Envelope<T> {
    /// Whether the reader must resync from the publisher's state.
    pub fn lagged(&self) -> bool {
        self.missed > 0
    }
}

/// One-writer, many-reader notification channel.
pub struct BroadcastGroup<T> {
    name: String,
    capacity: usize,
    sender: Mutex<Option<broadcast::Sender<(u64, T)>>>,
    generation: AtomicU64,
}

impl<T: Clone + Send + 'static> BroadcastGroup<T> {
    /// Create a group whose readers buffer up to `capacity` messages.
    pub fn new(name: &str, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            name: name.to_string(),
            capacity: capacity.max(1),
            sender: Mutex::new(Some(tx)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Generation of the last message sent (0 if none yet).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Publish a message to every joined reader. Never blocks.
    ///
    /// Returns the generation assigned to the message. Sending with no
    /// readers joined is not an error; the message is simply not retained.
    pub fn send(&self, message: T) -> Result<u64, BroadcastError> {
        let sender = self.sender.lock().expect("broadcast lock");
        let Some(tx) = sender.as_ref() else {
            return Err(BroadcastError::Closed(self.name.clone()));
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        match tx.send((generation, message)) {
            Ok(readers) => debug!(group = %self.name, generation, readers, "broadcast sent"),
            Err(_) => debug!(group = %self.name, generation, "broadcast sent with no readers"),
        }
        Ok(generation)
    }

    /// Join the group. Only messages sent after this call are delivered.
    pub fn join(&self) -> Subscription<T> {
        let sender = self.sender.lock().expect("broadcast lock");
        Subscription {
            group: self.name.clone(),
            rx: sender.as_ref().map(|tx| tx.subscribe()),
            joined_generation: self.generation.load(Ordering::SeqCst),
            last_generation: 0,
        }
    }

    /// Close the group. Idempotent.
    pub fn close(&self) {
        let mut sender = self.sender.lock().expect("broadcast lock");
        if sender.take().is_some() {
            debug!(group = %self.name, "broadcast group closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().expect("broadcast lock").is_none()
    }

    /// Number of readers currently joined.
    pub fn reader_count(&self) -> usize {
        self.sender
            .lock()
            .expect("broadcast lock")
            .as_ref()
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

/// A reader joined to a [`BroadcastGroup`].
pub struct Subscription<T> {
    group: String,
    rx: Option<broadcast::Receiver<(u64, T)>>,
    joined_generation: u64,
    last_generation: u64,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Group generation at the moment this reader joined.
    ///
    /// Non-zero means earlier messages exist that this reader never saw.
    pub fn joined_generation(&self) -> u64 {
        self.joined_generation
    }

    /// Generation of the last message read.
    pub fn last_generation(&self) -> u64 {
        self.last_generation
    }

    /// Wait for the next message. `None` once the group is closed and drained.
    pub async fn read(&mut self) -> Option<Envelope<T>> {
        let rx = self.rx.as_mut()?;
        let mut missed = 0;
        loop {
            match rx.recv().await {
                Ok((generation, message)) => {
                    self.last_generation = generation;
                    return Some(Envelope {
                        generation,
                        missed,
                        message,
                    });
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(group = %self.group, skipped, "reader fell behind, oldest messages dropped");
                    missed += skipped;
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Non-blocking read. `None` when nothing is buffered or the group is closed.
    pub fn try_read(&mut self) -> Option<Envelope<T>> {
        let rx = self.rx.as_mut()?;
        let mut missed = 0;
        loop {
            match rx.try_recv() {
                Ok((generation, message)) => {
                    self.last_generation = generation;
                    return Some(Envelope {
                        generation,
                        missed,
                        message,
                    });
                }
                Err(TryRecvError::Lagged(skipped)) => missed += skipped,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Whether the group has been closed and this reader fully drained.
    pub fn is_terminated(&self) -> bool {
        self.rx.is_none()
    }
}
