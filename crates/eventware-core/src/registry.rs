//! Handler registry.
//!
//! The [`HandlerRegistry`] is an unordered collection of [`HandlerEntry`]s.
//! Ordering is never stored; the chain builder computes it per fire from
//! priority and registration sequence.
//!
//! Readers take a cheap [`RegistrySnapshot`] (an `Arc` clone under a read
//! lock) and match against it without holding any lock. Writers copy the
//! entry list on write, so snapshots already handed out stay valid.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::context::EventContext;
use crate::handler::{Callback, HandlerResult, Role};
use crate::pattern::{EventName, Pattern};

/// Unique identifier of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

/// Identifies the instance a group of handlers belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

impl OwnerId {
    /// Owner of handlers registered without an explicit owner.
    pub const ANONYMOUS: Self = Self(0);

    /// Allocates a fresh, process-unique owner id.
    pub fn next() -> Self {
        Self(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

// =============================================================================
// Registration input
// =============================================================================

/// A handler waiting to be registered.
///
/// # Example
///
/// ```rust,ignore
/// let id = registry.register(
///     Registration::primary(Pattern::parse("a.b.c")?, 200, |arg: &String| {
///         Ok(format!("X{arg}"))
///     })
///     .label("main"),
/// );
/// ```
pub struct Registration {
    pattern: Pattern,
    priority: i32,
    callback: Callback,
    owner: OwnerId,
    binding: Option<Weak<dyn Any + Send + Sync>>,
    label: Option<String>,
}

impl Registration {
    /// Creates a registration from an already-erased callback.
    pub fn new(pattern: Pattern, priority: i32, callback: Callback) -> Self {
        Self {
            pattern,
            priority,
            callback,
            owner: OwnerId::ANONYMOUS,
            binding: None,
            label: None,
        }
    }

    /// Registers a typed primary handler.
    pub fn primary<F, A, R>(pattern: Pattern, priority: i32, f: F) -> Self
    where
        F: Fn(&A) -> HandlerResult<R> + Send + Sync + 'static,
        A: Any,
        R: Any,
    {
        Self::new(pattern, priority, Callback::primary(f))
    }

    /// Registers a typed observer.
    pub fn observer<F, A>(pattern: Pattern, priority: i32, f: F) -> Self
    where
        F: Fn(&mut EventContext, &A) -> HandlerResult + Send + Sync + 'static,
        A: Any,
    {
        Self::new(pattern, priority, Callback::observer(f))
    }

    /// Registers an observer that accepts arguments of any type.
    pub fn observer_any<F>(pattern: Pattern, priority: i32, f: F) -> Self
    where
        F: Fn(&mut EventContext, &dyn Any) -> HandlerResult + Send + Sync + 'static,
    {
        Self::new(pattern, priority, Callback::observer_any(f))
    }

    /// Sets the owner used by [`HandlerRegistry::unregister`].
    pub fn owner(mut self, owner: OwnerId) -> Self {
        self.owner = owner;
        self
    }

    /// Binds the handler to `instance` without keeping it alive.
    ///
    /// Firing a chain that contains this handler after `instance` has been
    /// dropped fails with [`DispatchError::OwnerDropped`](crate::DispatchError::OwnerDropped).
    pub fn bind<T: Any + Send + Sync>(mut self, instance: &Arc<T>) -> Self {
        let instance: Arc<dyn Any + Send + Sync> = instance.clone();
        self.binding = Some(Arc::downgrade(&instance));
        self
    }

    /// Sets the human-readable label used in logs and errors.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

// =============================================================================
// HandlerEntry
// =============================================================================

/// A registered handler.
pub struct HandlerEntry {
    id: HandlerId,
    sequence: u64,
    pattern: Pattern,
    priority: i32,
    callback: Callback,
    owner: OwnerId,
    binding: Option<Weak<dyn Any + Send + Sync>>,
    label: String,
}

impl HandlerEntry {
    /// Returns the handler id.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Returns the registration sequence number, the tie-breaker for equal
    /// priorities.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the pattern this handler was registered under.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Returns the priority. Lower values run earlier.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns the handler's role.
    pub fn role(&self) -> Role {
        self.callback.role()
    }

    /// Returns the callable.
    pub fn callback(&self) -> &Callback {
        &self.callback
    }

    /// Returns the owning instance id.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Returns the label used in logs and errors.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns `true` if the handler is bound to an instance.
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Upgrades the bound instance, if any.
    ///
    /// Returns `Err(())` when the handler is bound and the instance is gone.
    pub(crate) fn pin_owner(&self) -> Result<Option<Arc<dyn Any + Send + Sync>>, ()> {
        match &self.binding {
            None => Ok(None),
            Some(weak) => weak.upgrade().map(Some).ok_or(()),
        }
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("pattern", &self.pattern.as_str())
            .field("priority", &self.priority)
            .field("role", &self.role())
            .field("owner", &self.owner)
            .finish()
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// An immutable view of the registry at one point in time.
#[derive(Clone)]
pub struct RegistrySnapshot {
    generation: u64,
    entries: Arc<Vec<Arc<HandlerEntry>>>,
}

impl RegistrySnapshot {
    /// Returns the registry generation this snapshot was taken at.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns every entry in insertion order.
    pub fn entries(&self) -> &[Arc<HandlerEntry>] {
        &self.entries
    }

    /// Returns every entry whose pattern matches `name`, in insertion order.
    pub fn entries_matching(&self, name: &EventName) -> Vec<Arc<HandlerEntry>> {
        self.entries
            .iter()
            .filter(|entry| entry.pattern.matches(name))
            .cloned()
            .collect()
    }
}

// =============================================================================
// HandlerRegistry
// =============================================================================

/// Thread-safe store of handler entries.
///
/// # Thread Safety
///
/// Mutation takes an exclusive lock. Lookups clone the current `Arc` snapshot
/// under a read lock and match without holding it.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: RwLock<Arc<Vec<Arc<HandlerEntry>>>>,
    generation: AtomicU64,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler. Never rejects; duplicate patterns are allowed.
    pub fn register(&self, registration: Registration) -> HandlerId {
        let mut entries = self.entries.write();

        let sequence = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = HandlerId(sequence);
        let label = registration.label.unwrap_or_else(|| id.to_string());

        debug!(
            handler = %label,
            pattern = %registration.pattern,
            priority = registration.priority,
            role = %registration.callback.role(),
            owner = %registration.owner,
            "Registering handler"
        );

        Arc::make_mut(&mut entries).push(Arc::new(HandlerEntry {
            id,
            sequence,
            pattern: registration.pattern,
            priority: registration.priority,
            callback: registration.callback,
            owner: registration.owner,
            binding: registration.binding,
            label,
        }));
        self.generation.fetch_add(1, Ordering::Release);

        id
    }

    /// Removes every entry owned by `owner`, returning how many were removed.
    pub fn unregister(&self, owner: OwnerId) -> usize {
        self.remove_where(|entry| entry.owner == owner)
    }

    /// Removes a single entry. Returns `false` if it was not registered.
    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        self.remove_where(|entry| entry.id == id) > 0
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.remove_where(|_| true);
    }

    fn remove_where(&self, predicate: impl Fn(&HandlerEntry) -> bool) -> usize {
        let mut entries = self.entries.write();
        if !entries.iter().any(|entry| predicate(&**entry)) {
            return 0;
        }

        let before = entries.len();
        Arc::make_mut(&mut entries).retain(|entry| !predicate(&**entry));
        let removed = before - entries.len();
        self.generation.fetch_add(1, Ordering::Release);

        trace!(removed, remaining = entries.len(), "Removed handlers");
        removed
    }

    /// Returns every entry matching `name`, in insertion order.
    pub fn entries_matching(&self, name: &EventName) -> Vec<Arc<HandlerEntry>> {
        self.snapshot().entries_matching(name)
    }

    /// Returns the ids of every entry owned by `owner`.
    pub fn handlers_of(&self, owner: OwnerId) -> Vec<HandlerId> {
        self.snapshot()
            .entries()
            .iter()
            .filter(|entry| entry.owner == owner)
            .map(|entry| entry.id)
            .collect()
    }

    /// Takes a consistent snapshot of the entries and generation.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let entries = self.entries.read();
        RegistrySnapshot {
            generation: self.generation.load(Ordering::Acquire),
            entries: Arc::clone(&entries),
        }
    }

    /// Returns a counter bumped by every mutation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handler_count", &self.len())
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(s: &str) -> Pattern {
        Pattern::parse(s).unwrap()
    }

    fn name(s: &str) -> EventName {
        EventName::parse(s).unwrap()
    }

    fn noop(p: &str, priority: i32) -> Registration {
        Registration::observer(pattern(p), priority, |_: &mut EventContext, _: &()| Ok(()))
    }

    #[test]
    fn test_register_and_match() {
        let registry = HandlerRegistry::new();
        let a = registry.register(noop("a.b", 0));
        let b = registry.register(noop("*.b", 0));
        registry.register(noop("a.c", 0));

        let matched: Vec<_> = registry
            .entries_matching(&name("a.b"))
            .iter()
            .map(|e| e.id())
            .collect();
        assert_eq!(matched, [a, b]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicates_allowed() {
        let registry = HandlerRegistry::new();
        registry.register(noop("x", 1));
        registry.register(noop("x", 1));
        assert_eq!(registry.entries_matching(&name("x")).len(), 2);
    }

    #[test]
    fn test_unregister_by_owner() {
        let registry = HandlerRegistry::new();
        let first = OwnerId::next();
        let second = OwnerId::next();

        registry.register(noop("a", 0).owner(first));
        registry.register(noop("b", 0).owner(first));
        let kept = registry.register(noop("a", 0).owner(second));

        assert_eq!(registry.unregister(first), 2);
        assert_eq!(registry.unregister(first), 0);
        assert_eq!(registry.handlers_of(second), [kept]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_single_handler() {
        let registry = HandlerRegistry::new();
        let id = registry.register(noop("a", 0));
        assert!(registry.unregister_handler(id));
        assert!(!registry.unregister_handler(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_generation_tracks_mutations() {
        let registry = HandlerRegistry::new();
        let g0 = registry.generation();
        registry.register(noop("a", 0));
        let g1 = registry.generation();
        assert!(g1 > g0);

        // Removing nothing leaves the generation untouched.
        registry.unregister(OwnerId::next());
        assert_eq!(registry.generation(), g1);
    }

    #[test]
    fn test_snapshot_is_stable() {
        let registry = HandlerRegistry::new();
        registry.register(noop("a", 0));
        let snapshot = registry.snapshot();

        registry.clear();
        assert_eq!(snapshot.entries().len(), 1);
        assert!(registry.is_empty());
        assert!(registry.generation() > snapshot.generation());
    }

    #[test]
    fn test_default_label_and_binding() {
        let registry = HandlerRegistry::new();
        let instance = Arc::new(5u32);
        registry.register(noop("a", 0).bind(&instance));
        registry.register(noop("b", 0).label("named"));

        let snapshot = registry.snapshot();
        let bound = &snapshot.entries()[0];
        assert!(bound.label().starts_with("handler#"));
        assert!(bound.pin_owner().unwrap().is_some());
        assert_eq!(snapshot.entries()[1].label(), "named");

        drop(instance);
        assert!(bound.pin_owner().is_err());
    }

    #[test]
    fn test_concurrent_register_and_lookup() {
        let registry = HandlerRegistry::new();
        std::thread::scope(|scope| {
            for t in 0..4 {
                let registry = &registry;
                scope.spawn(move || {
                    for i in 0..50 {
                        registry.register(noop("a.*", t * 100 + i));
                        let _ = registry.entries_matching(&name("a.b"));
                    }
                });
            }
        });
        assert_eq!(registry.entries_matching(&name("a.b")).len(), 200);
    }
}
