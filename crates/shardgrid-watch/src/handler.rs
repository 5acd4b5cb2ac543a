//! Informer event callbacks.

/// A deleted object as seen by a handler. When the informer missed the
/// delete itself (it found out on relist), it only has the last state it
/// knew about.
#[derive(Debug, Clone, PartialEq)]
pub enum DeletedObject<T> {
    Object(T),
    Tombstone { key: String, last_known: T },
}

impl<T> DeletedObject<T> {
    pub fn object(&self) -> &T {
        match self {
            DeletedObject::Object(obj) => obj,
            DeletedObject::Tombstone { last_known, .. } => last_known,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, DeletedObject::Tombstone { .. })
    }
}

/// Callbacks invoked by a [`SharedInformer`](crate::SharedInformer).
///
/// Calls for one informer are made sequentially from its run task, in the
/// order the underlying events were observed.
pub trait ResourceEventHandler<T>: Send + Sync {
    fn on_add(&self, obj: &T);
    fn on_update(&self, old: &T, new: &T);
    fn on_delete(&self, obj: &DeletedObject<T>);
}

type AddFn<T> = Box<dyn Fn(&T) + Send + Sync>;
type UpdateFn<T> = Box<dyn Fn(&T, &T) + Send + Sync>;
type DeleteFn<T> = Box<dyn Fn(&DeletedObject<T>) + Send + Sync>;

/// Closure-backed handler. Unset callbacks are no-ops.
pub struct FnHandler<T> {
    add: Option<AddFn<T>>,
    update: Option<UpdateFn<T>>,
    delete: Option<DeleteFn<T>>,
}

impl<T> FnHandler<T> {
    pub fn new() -> Self {
        Self {
            add: None,
            update: None,
            delete: None,
        }
    }

    pub fn with_add(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.add = Some(Box::new(f));
        self
    }

    pub fn with_update(mut self, f: impl Fn(&T, &T) + Send + Sync + 'static) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    pub fn with_delete(mut self, f: impl Fn(&DeletedObject<T>) + Send + Sync + 'static) -> Self {
        self.delete = Some(Box::new(f));
        self
    }
}

impl<T> Default for FnHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResourceEventHandler<T> for FnHandler<T> {
    fn on_add(&self, obj: &T) {
        if let Some(f) = &self.add {
            f(obj);
        }
    }

    fn on_update(&self, old: &T, new: &T) {
        if let Some(f) = &self.update {
            f(old, new);
        }
    }

    fn on_delete(&self, obj: &DeletedObject<T>) {
        if let Some(f) = &self.delete {
            f(obj);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn fn_handler_dispatches_set_callbacks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2) = (log.clone(), log.clone());
        let handler = FnHandler::new()
            .with_add(move |v: &u32| l1.lock().unwrap().push(format!("add {v}")))
            .with_delete(move |d: &DeletedObject<u32>| {
                l2.lock().unwrap().push(format!("delete {} {}", d.object(), d.is_tombstone()))
            });

        handler.on_add(&1);
        handler.on_update(&1, &2);
        handler.on_delete(&DeletedObject::Tombstone {
            key: "a".into(),
            last_known: 2,
        });

        assert_eq!(*log.lock().unwrap(), vec!["add 1", "delete 2 true"]);
    }
}
