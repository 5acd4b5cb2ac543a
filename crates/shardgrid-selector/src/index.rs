//! Indexed object store.
//!
//! Objects are keyed by their tenant-aware cache key and can be looked up
//! through named index functions or filtered with a field selector.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use shard_core::{Resource, meta_tenant_namespace_key};

use crate::error::{SelectorError, SelectorResult};
use crate::fields::Selector;
use crate::meta_fields::{normalized_tenant, object_meta_field_set};

pub const TENANT_INDEX: &str = "tenant";
pub const NAMESPACE_INDEX: &str = "namespace";
pub const HASHKEY_INDEX: &str = "hashkey";

/// Computes the index values of an object.
pub type IndexFunc<T> = Arc<dyn Fn(&T) -> Vec<String> + Send + Sync>;

/// Objects by tenant; the empty tenant indexes as `system`.
pub fn tenant_index<T: Resource>() -> IndexFunc<T> {
    Arc::new(|obj: &T| vec![normalized_tenant(&obj.meta().tenant).to_string()])
}

/// Objects by `tenant/namespace`, or `namespace` in the system tenant.
pub fn namespace_index<T: Resource>() -> IndexFunc<T> {
    Arc::new(|obj: &T| {
        let meta = obj.meta();
        if meta.namespace.is_empty() {
            return Vec::new();
        }
        let tenant = normalized_tenant(&meta.tenant);
        if tenant == shard_core::TENANT_SYSTEM {
            vec![meta.namespace.clone()]
        } else {
            vec![format!("{tenant}/{}", meta.namespace)]
        }
    })
}

pub fn hashkey_index<T: Resource>() -> IndexFunc<T> {
    Arc::new(|obj: &T| vec![obj.meta().hash_key.to_string()])
}

struct State<T> {
    items: BTreeMap<String, T>,
    /// index name → value → object keys
    indices: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

pub struct Indexer<T> {
    namespaced: bool,
    funcs: BTreeMap<String, IndexFunc<T>>,
    state: RwLock<State<T>>,
}

impl<T: Resource> Indexer<T> {
    pub fn new(namespaced: bool) -> Self {
        Self {
            namespaced,
            funcs: BTreeMap::new(),
            state: RwLock::new(State {
                items: BTreeMap::new(),
                indices: BTreeMap::new(),
            }),
        }
    }

    /// The tenant, namespace and hash-key indexes.
    pub fn with_default_indexes(self) -> Self {
        let indexer = self
            .with_index(TENANT_INDEX, tenant_index())
            .with_index(HASHKEY_INDEX, hashkey_index());
        if indexer.namespaced {
            indexer.with_index(NAMESPACE_INDEX, namespace_index())
        } else {
            indexer
        }
    }

    pub fn with_index(mut self, name: &str, func: IndexFunc<T>) -> Self {
        self.funcs.insert(name.to_string(), func);
        self
    }

    /// Insert or replace an object.
    pub fn upsert(&self, obj: T) {
        let key = meta_tenant_namespace_key(obj.meta());
        let mut state = self.state.write().expect("indexer lock");
        if let Some(old) = state.items.remove(&key) {
            self.unindex(&mut state, &key, &old);
        }
        self.index(&mut state, &key, &obj);
        state.items.insert(key, obj);
    }

    pub fn delete(&self, obj: &T) -> Option<T> {
        let key = meta_tenant_namespace_key(obj.meta());
        let mut state = self.state.write().expect("indexer lock");
        let old = state.items.remove(&key)?;
        self.unindex(&mut state, &key, &old);
        Some(old)
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.state.read().expect("indexer lock").items.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.read().expect("indexer lock").items.keys().cloned().collect()
    }

    pub fn list(&self) -> Vec<T> {
        self.state.read().expect("indexer lock").items.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().expect("indexer lock").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Objects whose `index` function produced `value`.
    pub fn by_index(&self, index: &str, value: &str) -> SelectorResult<Vec<T>> {
        if !self.funcs.contains_key(index) {
            return Err(SelectorError::UnknownIndex(index.to_string()));
        }
        let state = self.state.read().expect("indexer lock");
        let objects: Vec<T> = state
            .indices
            .get(index)
            .and_then(|values| values.get(value))
            .map(|keys| keys.iter().filter_map(|k| state.items.get(k).cloned()).collect())
            .unwrap_or_default();
        Ok(objects)
    }

    /// Every value currently present in `index`.
    pub fn index_values(&self, index: &str) -> SelectorResult<Vec<String>> {
        if !self.funcs.contains_key(index) {
            return Err(SelectorError::UnknownIndex(index.to_string()));
        }
        let state = self.state.read().expect("indexer lock");
        Ok(state
            .indices
            .get(index)
            .map(|values| values.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Objects whose metadata fields satisfy `selector`.
    pub fn select(&self, selector: &Selector) -> Vec<T> {
        let state = self.state.read().expect("indexer lock");
        state
            .items
            .values()
            .filter(|obj| selector.matches(&object_meta_field_set(obj.meta(), self.namespaced)))
            .cloned()
            .collect()
    }

    fn index(&self, state: &mut State<T>, key: &str, obj: &T) {
        for (name, func) in &self.funcs {
            let values = state.indices.entry(name.clone()).or_default();
            for value in func(obj) {
                values.entry(value).or_default().insert(key.to_string());
            }
        }
    }

    fn unindex(&self, state: &mut State<T>, key: &str, obj: &T) {
        for (name, func) in &self.funcs {
            let Some(values) = state.indices.get_mut(name) else {
                continue;
            };
            for value in func(obj) {
                if let Some(keys) = values.get_mut(&value) {
                    keys.remove(key);
                    if keys.is_empty() {
                        values.remove(&value);
                    }
                }
            }
        }
    }
}
