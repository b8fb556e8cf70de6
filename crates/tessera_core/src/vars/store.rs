//! # Entity Variable Store
//!
//! Per-entity, versioned array of [`Value`]s.
//!
//! ## Read / Write Protocol
//!
//! ```text
//! reader:  load() ──> Arc<Vec<Value>>   (clone of a pointer, never waits on copy work)
//!
//! writer:  lock ─> clone current ─> mutate ─> publish ─> version += 1 ─> unlock
//!                   (skipped entirely when the value is unchanged)
//! ```
//!
//! Arrays are never mutated after publication, so a reader holding a snapshot
//! sees exactly one write boundary's worth of state. The overflow name table
//! is published the same way and only changes under the array's writer lock,
//! so no read path takes a lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::types::{BuiltinVar, ObjectType};
use super::value::Value;
use crate::ecs::Component;
use crate::sync::{PublishGuard, Published};

/// Variables of one entity.
pub struct VariableStore {
    ty: Option<Arc<ObjectType>>,
    values: Published<Vec<Value>>,
    version: AtomicU64,
    /// Named variables outside the type layout.
    overflow: Published<HashMap<String, usize>>,
}

impl VariableStore {
    /// Store initialized with the defaults of `ty`.
    #[must_use]
    pub fn new(ty: Arc<ObjectType>) -> Self {
        let values = ty.defaults().to_vec();
        Self {
            ty: Some(ty),
            values: Published::new(values),
            version: AtomicU64::new(0),
            overflow: Published::default(),
        }
    }

    /// Untyped store: no layout, every name goes through the overflow table.
    #[must_use]
    pub fn untyped() -> Self {
        Self {
            ty: None,
            values: Published::new(Vec::new()),
            version: AtomicU64::new(0),
            overflow: Published::default(),
        }
    }

    /// The layout this store was built from.
    #[must_use]
    pub fn object_type(&self) -> Option<&Arc<ObjectType>> {
        self.ty.as_ref()
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Value at `index`; `Null` past the end.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Value {
        self.values.load().get(index).cloned().unwrap_or_default()
    }

    /// Built-in variable.
    #[inline]
    #[must_use]
    pub fn get_builtin(&self, var: BuiltinVar) -> Value {
        self.get(var.index())
    }

    /// Variable by name; `Null` if the name is unknown.
    #[must_use]
    pub fn get_named(&self, name: &str) -> Value {
        self.index_of(name).map_or(Value::Null, |i| self.get(i))
    }

    /// Resolves a name against the layout, then the overflow table.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.ty
            .as_ref()
            .and_then(|t| t.index_of(name))
            .or_else(|| self.overflow.load().get(name).copied())
    }

    /// The whole current array.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Value>> {
        self.values.load()
    }

    /// Number of variables currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.load().len()
    }

    /// Checks if no variables are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Monotonic change counter. Bumped once per effective write.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Writes `value` at `index`, growing the array with `Null` if needed.
    ///
    /// Returns `true` if the stored value changed.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> bool {
        let guard = self.values.write();
        self.set_locked(&guard, index, value.into())
    }

    /// Writes a built-in variable.
    pub fn set_builtin(&self, var: BuiltinVar, value: impl Into<Value>) -> bool {
        self.set(var.index(), value)
    }

    /// Writes a variable by name, allocating an overflow slot for names the
    /// layout does not declare.
    pub fn set_named(&self, name: &str, value: impl Into<Value>) -> bool {
        let guard = self.values.write();
        let index = match self.index_of(name) {
            Some(index) => index,
            None => {
                let layout = self.ty.as_ref().map_or(0, |t| t.var_count());
                let mut overflow = HashMap::clone(&self.overflow.load());
                let index = guard
                    .current()
                    .len()
                    .max(layout)
                    .max(overflow.values().max().map_or(0, |m| m + 1));
                overflow.insert(name.to_owned(), index);
                // Writers to this table already hold the array's writer lock.
                self.overflow.write().publish(overflow);
                index
            }
        };
        self.set_locked(&guard, index, value.into())
    }

    fn set_locked(&self, guard: &PublishGuard<'_, Vec<Value>>, index: usize, value: Value) -> bool {
        let current = guard.current();
        match current.get(index) {
            Some(existing) if existing.same_as(&value) => return false,
            None if value.is_null() => return false,
            _ => {}
        }

        let mut next = Vec::clone(&current);
        if index >= next.len() {
            next.resize(index + 1, Value::Null);
        }
        next[index] = value;
        guard.publish(next);
        self.version.fetch_add(1, Ordering::Release);
        true
    }
}

impl Component for VariableStore {}

impl std::fmt::Debug for VariableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableStore")
            .field("type", &self.ty.as_ref().map(|t| t.path()))
            .field("version", &self.version())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::{ObjectTypeRegistry, TypeDef};

    fn mob() -> Arc<ObjectType> {
        let mut reg = ObjectTypeRegistry::new();
        reg.register(TypeDef::new("/mob").var("health", 100)).unwrap();
        reg.finalize().unwrap();
        reg.get("/mob").unwrap()
    }

    #[test]
    fn test_defaults_and_builtins() {
        let store = VariableStore::new(mob());
        assert_eq!(store.get_builtin(BuiltinVar::Alpha), Value::Num(255.0));
        assert_eq!(store.get_named("health"), Value::Num(100.0));
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_version_bumps_only_on_change() {
        let store = VariableStore::new(mob());
        assert!(store.set_builtin(BuiltinVar::X, 5));
        assert_eq!(store.version(), 1);
        assert!(!store.set_builtin(BuiltinVar::X, 5));
        assert_eq!(store.version(), 1);
        assert!(store.set_named("health", 90));
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn test_growth_pads_with_null() {
        let store = VariableStore::untyped();
        assert!(!store.set(3, Value::Null));
        assert!(store.is_empty());

        assert!(store.set(3, "hello"));
        assert_eq!(store.len(), 4);
        assert!(store.get(1).is_null());
        assert_eq!(store.get(3).as_text(), Some("hello"));
        assert!(store.get(99).is_null());
    }

    #[test]
    fn test_overflow_names() {
        let store = VariableStore::new(mob());
        let layout = store.object_type().unwrap().var_count();

        assert!(store.set_named("mood", "grumpy"));
        assert!(store.set_named("quest", 3));
        assert_eq!(store.index_of("mood"), Some(layout));
        assert_eq!(store.index_of("quest"), Some(layout + 1));
        assert_eq!(store.get_named("mood").as_text(), Some("grumpy"));
        assert!(store.get_named("unknown").is_null());
    }

    #[test]
    fn test_snapshot_is_stable() {
        let store = VariableStore::new(mob());
        let before = store.snapshot();
        store.set_builtin(BuiltinVar::Y, 9);
        assert_eq!(before[BuiltinVar::Y.index()], Value::Num(0.0));
        assert_eq!(store.snapshot()[BuiltinVar::Y.index()], Value::Num(9.0));
    }

    #[test]
    fn test_reads_proceed_while_writer_holds_lock() {
        let store = Arc::new(VariableStore::new(mob()));
        store.set_named("mood", "calm");
        let guard = store.values.write();

        let reader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                (
                    store.get_builtin(BuiltinVar::X),
                    store.get_named("health"),
                    store.get_named("mood"),
                )
            })
        };
        let (x, health, mood) = reader.join().unwrap();
        assert_eq!(x, Value::Num(0.0));
        assert_eq!(health, Value::Num(100.0));
        assert_eq!(mood.as_text(), Some("calm"));
        drop(guard);
    }
}
