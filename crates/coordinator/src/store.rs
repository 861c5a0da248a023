//! In-memory key-value store

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::Value;

/// Hook invoked after every `set`, outside the store lock
pub type UpdateHook = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Shared name → value map
///
/// Cloning yields another handle to the same entries. Only the last written
/// value is kept.
#[derive(Clone, Default)]
pub struct KvStore {
    entries: Arc<Mutex<BTreeMap<String, Value>>>,
    hook: Arc<Mutex<Option<UpdateHook>>>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        lock(&self.entries).get(name).cloned()
    }

    /// Current value, `Null` when missing
    pub fn get_or_null(&self, name: &str) -> Value {
        self.get(name).unwrap_or(Value::Null)
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        lock(&self.entries).insert(name.clone(), value.clone());

        let hook = lock(&self.hook).clone();
        if let Some(hook) = hook {
            hook(&name, &value);
        }
    }

    /// Replace the on-update hook
    pub fn on_update(&self, hook: UpdateHook) {
        *lock(&self.hook) = Some(hook);
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        lock(&self.entries).clone()
    }
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore").field("len", &self.len()).finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
