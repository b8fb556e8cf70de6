//! # Published Snapshots
//!
//! A value that is never mutated in place. Writers build a replacement and
//! publish it; readers grab the current `Arc` and keep using it for as long
//! as they like.
//!
//! ```text
//! reader:  slot ──load──> Arc<T>          (one atomic pointer read, no lock)
//! writer:  lock writer ──> build T ──> slot.swap(Arc<T>) ──> unlock
//! ```

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard};

/// Atomically replaceable, immutable snapshot.
///
/// ## Thread Safety
///
/// - `load`: lock-free. Follows the slot's atomic pointer and bumps the
///   `Arc` count; a concurrent `publish` never blocks it.
/// - `write`: serializes writers on a mutex. Readers never touch it.
///
/// ## Usage
///
/// ```rust
/// use tessera_core::Published;
///
/// let workers = Published::new(vec![1, 2, 3]);
/// let before = workers.load();
///
/// workers.update(|old| {
///     let mut next = old.clone();
///     next.push(4);
///     next
/// });
///
/// assert_eq!(before.len(), 3);     // old snapshot is untouched
/// assert_eq!(workers.load().len(), 4);
/// ```
pub struct Published<T> {
    slot: ArcSwap<T>,
    writer: Mutex<()>,
}

impl<T> Published<T> {
    /// Publishes `value` as the initial snapshot.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            slot: ArcSwap::from_pointee(value),
            writer: Mutex::new(()),
        }
    }

    /// Current snapshot.
    #[inline]
    #[must_use]
    pub fn load(&self) -> Arc<T> {
        self.slot.load_full()
    }

    /// Acquires the writer lock.
    ///
    /// While the guard lives no other writer can publish, so
    /// read-modify-publish sequences are race free.
    pub fn write(&self) -> PublishGuard<'_, T> {
        PublishGuard {
            cell: self,
            _writer: self.writer.lock(),
        }
    }

    /// Clone-mutate-publish in one step. Returns the new snapshot.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Arc<T> {
        let guard = self.write();
        let next = f(&guard.current());
        guard.publish(next)
    }

    fn swap(&self, next: Arc<T>) -> Arc<T> {
        self.slot.swap(next)
    }
}

impl<T: Default> Default for Published<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Published<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Published").field(&self.load()).finish()
    }
}

/// Exclusive writer access to a [`Published`] cell.
pub struct PublishGuard<'a, T> {
    cell: &'a Published<T>,
    _writer: MutexGuard<'a, ()>,
}

impl<T> PublishGuard<'_, T> {
    /// Snapshot that the next `publish` will replace.
    #[must_use]
    pub fn current(&self) -> Arc<T> {
        self.cell.load()
    }

    /// Installs `value`; returns the new snapshot.
    ///
    /// The guard stays usable, so a writer may publish several times.
    pub fn publish(&self, value: T) -> Arc<T> {
        let next = Arc::new(value);
        self.cell.swap(Arc::clone(&next));
        next
    }
}
