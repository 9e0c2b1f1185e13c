//! Middleware lifecycle management.
//!
//! [`MiddlewareManager`] owns one [`HandlerRegistry`] and the
//! [`EventDispatcher`] reading from it. It:
//!
//! - Scans a middleware's [`HandlerTable`](crate::HandlerTable) on
//!   [`add`](MiddlewareManager::add), rejects the whole middleware if a
//!   pattern is malformed or a wildcard-free primary is already taken, and
//!   registers every row bound weakly to the instance.
//! - Removes all and only a middleware's handlers on
//!   [`remove`](MiddlewareManager::remove).
//! - Hands out [`Proxy`] handles that route method calls through the
//!   dispatcher.
//!
//! # Example
//!
//! ```rust,ignore
//! use eventware_framework::MiddlewareManager;
//!
//! let manager = MiddlewareManager::new();
//! let calculator = Arc::new(Calculator::default());
//!
//! let id = manager.add(&calculator)?;
//! let add = manager.proxy::<(i64, i64), i64>(id, "add")?;
//! assert_eq!(add.call((2, 3))?, 5);
//!
//! manager.remove(id);
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use eventware_core::{
    Chain, DispatchOptions, DispatchResult, EventDispatcher, EventName, HandlerId,
    HandlerRegistry, OwnerId, Pattern, Registration, Role, TypeInfo,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{MiddlewareError, MiddlewareResult};
use crate::middleware::{self, HandlerRow, Middleware};
use crate::proxy::Proxy;

/// Identifies a middleware instance added to a [`MiddlewareManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MiddlewareId(OwnerId);

impl MiddlewareId {
    /// Returns the registry owner id of this middleware's handlers.
    pub fn owner(self) -> OwnerId {
        self.0
    }
}

impl fmt::Display for MiddlewareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "middleware#{}", self.0.get())
    }
}

/// A registered handler method.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// Method name as declared in the handler table.
    pub method: &'static str,
    /// `<middleware>::<method>`.
    pub label: String,
    /// Pattern the method was registered under.
    pub pattern: Pattern,
    /// Priority; lower runs earlier.
    pub priority: i32,
    /// Primary or observer.
    pub role: Role,
    /// Id of the registry entry.
    pub handler: HandlerId,
    /// Declared argument type, `None` for untyped observers.
    pub argument: Option<TypeInfo>,
    /// Declared result type, primaries only.
    pub output: Option<TypeInfo>,
}

// =============================================================================
// MiddlewareEntry (internal)
// =============================================================================

struct MiddlewareEntry {
    id: MiddlewareId,
    name: String,
    instance: Weak<dyn Middleware>,
    methods: Vec<MethodInfo>,
}

// =============================================================================
// MiddlewareManager
// =============================================================================

/// Central manager for middleware registration and dispatch.
///
/// # Ownership
///
/// The manager never keeps a middleware alive. The application owns each
/// instance through an `Arc`; once the last `Arc` is dropped, fires that reach
/// its handlers fail with
/// [`DispatchError::OwnerDropped`](eventware_core::DispatchError::OwnerDropped).
///
/// Dropping the manager unregisters every handler it added, so proxies that
/// outlive it resolve no handlers.
pub struct MiddlewareManager {
    registry: Arc<HandlerRegistry>,
    dispatcher: Arc<EventDispatcher>,
    middlewares: RwLock<Vec<MiddlewareEntry>>,
}

impl Default for MiddlewareManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MiddlewareManager {
    /// Creates a manager with default dispatch options.
    pub fn new() -> Self {
        Self::with_options(DispatchOptions::default())
    }

    /// Creates a manager whose dispatcher uses `options`.
    pub fn with_options(options: DispatchOptions) -> Self {
        let registry = Arc::new(HandlerRegistry::new());
        let dispatcher = Arc::new(EventDispatcher::with_options(
            Arc::clone(&registry),
            options,
        ));
        Self {
            registry,
            dispatcher,
            middlewares: RwLock::new(Vec::new()),
        }
    }

    // ─── Registration ───────────────────────────────────────────────────────

    /// Registers every handler `instance` declares.
    ///
    /// Nothing is registered if any declared pattern is malformed, or if a
    /// primary is declared for a wildcard-free pattern that another primary
    /// (of this or an installed middleware) already uses. Overlaps involving
    /// wildcards are only detected when an event is fired.
    pub fn add<M: Middleware>(&self, instance: &Arc<M>) -> MiddlewareResult<MiddlewareId> {
        let name = instance.name().to_owned();

        let mut parsed = Vec::new();
        for row in middleware::scan::<M>() {
            let pattern =
                Pattern::parse(&row.pattern).map_err(|source| MiddlewareError::InvalidPattern {
                    middleware: name.clone(),
                    method: row.method,
                    source,
                })?;
            parsed.push((pattern, row));
        }

        let mut middlewares = self.middlewares.write();
        Self::check_duplicate_primaries(&name, &parsed, &middlewares)?;

        let id = MiddlewareId(OwnerId::next());
        let mut methods = Vec::with_capacity(parsed.len());
        for (pattern, row) in parsed {
            let label = format!("{name}::{}", row.method);
            let callback = middleware::bind_row(row.bind, instance);
            let handler = self.registry.register(
                Registration::new(pattern.clone(), row.priority, callback)
                    .owner(id.owner())
                    .bind(instance)
                    .label(label.clone()),
            );
            methods.push(MethodInfo {
                method: row.method,
                label,
                pattern,
                priority: row.priority,
                role: row.role,
                handler,
                argument: row.argument,
                output: row.output,
            });
        }

        let handler_count = methods.len();
        let erased: Arc<dyn Middleware> = instance.clone();
        middlewares.push(MiddlewareEntry {
            id,
            name: name.clone(),
            instance: Arc::downgrade(&erased),
            methods,
        });
        drop(middlewares);

        info!(middleware = %name, id = %id, handlers = handler_count, "Middleware added");
        instance.on_add();
        Ok(id)
    }

    fn check_duplicate_primaries<M>(
        name: &str,
        parsed: &[(Pattern, HandlerRow<M>)],
        installed: &[MiddlewareEntry],
    ) -> MiddlewareResult<()> {
        let mut taken: HashMap<&str, String> = installed
            .iter()
            .flat_map(|entry| &entry.methods)
            .filter(|method| method.role == Role::Primary && method.pattern.is_concrete())
            .map(|method| (method.pattern.as_str(), method.label.clone()))
            .collect();

        for (pattern, row) in parsed {
            if row.role != Role::Primary || !pattern.is_concrete() {
                continue;
            }
            let label = format!("{name}::{}", row.method);
            if let Some(first) = taken.get(pattern.as_str()) {
                warn!(
                    pattern = %pattern,
                    first = %first,
                    second = %label,
                    "Duplicate primary handler rejected"
                );
                return Err(MiddlewareError::DuplicatePrimary {
                    pattern: pattern.to_string(),
                    first: first.clone(),
                    second: label,
                });
            }
            taken.insert(pattern.as_str(), label);
        }
        Ok(())
    }

    /// Unregisters every handler of the middleware and calls its
    /// [`on_remove`](Middleware::on_remove) hook if it is still alive.
    ///
    /// Returns `false` if `id` is not installed.
    pub fn remove(&self, id: MiddlewareId) -> bool {
        let entry = {
            let mut middlewares = self.middlewares.write();
            match middlewares.iter().position(|entry| entry.id == id) {
                Some(pos) => middlewares.remove(pos),
                None => return false,
            }
        };

        let removed = self.registry.unregister(id.owner());
        info!(middleware = %entry.name, id = %id, handlers = removed, "Middleware removed");

        if let Some(instance) = entry.instance.upgrade() {
            instance.on_remove();
        }
        true
    }

    /// Removes the middleware previously added as `instance`.
    pub fn remove_instance<M: Middleware>(&self, instance: &Arc<M>) -> bool {
        match self.id_of(instance) {
            Some(id) => self.remove(id),
            None => false,
        }
    }

    /// Unregisters a single handler method.
    pub fn remove_handler(&self, handler: HandlerId) -> bool {
        let mut middlewares = self.middlewares.write();
        for entry in middlewares.iter_mut() {
            if let Some(pos) = entry.methods.iter().position(|m| m.handler == handler) {
                let method = entry.methods.remove(pos);
                debug!(handler = %method.label, "Handler removed");
                return self.registry.unregister_handler(handler);
            }
        }
        false
    }

    // ─── Introspection ──────────────────────────────────────────────────────

    /// Returns the id under which `instance` was added.
    pub fn id_of<M: Middleware>(&self, instance: &Arc<M>) -> Option<MiddlewareId> {
        let target = Arc::as_ptr(instance).cast::<()>();
        self.middlewares
            .read()
            .iter()
            .find(|entry| entry.instance.as_ptr().cast::<()>() == target)
            .map(|entry| entry.id)
    }

    /// Returns `true` if `id` is installed.
    pub fn contains(&self, id: MiddlewareId) -> bool {
        self.middlewares.read().iter().any(|entry| entry.id == id)
    }

    /// Returns the number of installed middleware.
    pub fn middleware_count(&self) -> usize {
        self.middlewares.read().len()
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.registry.len()
    }

    /// Returns the names of installed middleware in installation order.
    pub fn middleware_names(&self) -> Vec<String> {
        self.middlewares
            .read()
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Returns the handler methods registered for `id`.
    pub fn methods_of(&self, id: MiddlewareId) -> Option<Vec<MethodInfo>> {
        self.middlewares
            .read()
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.methods.clone())
    }

    /// Returns the registry ids of the handlers registered for `id`.
    pub fn handlers_of(&self, id: MiddlewareId) -> Vec<HandlerId> {
        self.registry.handlers_of(id.owner())
    }

    /// Resolves the chain `event` would execute, without running it.
    pub fn chain_for(&self, event: &str) -> DispatchResult<Arc<Chain>> {
        self.dispatcher.chain_for(event)
    }

    /// Returns the underlying registry.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Returns the underlying dispatcher.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    // ─── Dispatch ───────────────────────────────────────────────────────────

    /// Fires `event`; see [`EventDispatcher::fire`].
    pub fn fire<A: Any, R: Any>(&self, event: &str, args: A) -> DispatchResult<R> {
        self.dispatcher.fire(event, args)
    }

    /// Fires `event` for observation only; see [`EventDispatcher::notify`].
    pub fn notify<A: Any>(&self, event: &str, args: A) -> DispatchResult<()> {
        self.dispatcher.notify(event, args)
    }

    /// Returns a proxy for the handler method `method` of middleware `id`.
    ///
    /// The method must be registered under a wildcard-free pattern, and `A`
    /// (and `R`, for primaries) must match its declared types.
    pub fn proxy<A: Any, R: Any>(
        &self,
        id: MiddlewareId,
        method: &str,
    ) -> MiddlewareResult<Proxy<A, R>> {
        let middlewares = self.middlewares.read();
        let entry = middlewares
            .iter()
            .find(|entry| entry.id == id)
            .ok_or(MiddlewareError::NotInstalled(id))?;
        let info = entry
            .methods
            .iter()
            .find(|m| m.method == method)
            .ok_or_else(|| MiddlewareError::UnknownMethod {
                middleware: entry.name.clone(),
                method: method.to_owned(),
            })?;

        let event = info
            .pattern
            .to_event_name()
            .ok_or_else(|| MiddlewareError::WildcardMethod {
                method: info.label.clone(),
                pattern: info.pattern.to_string(),
            })?;

        let checks = [
            (info.argument, TypeId::of::<A>(), type_name::<A>()),
            (info.output, TypeId::of::<R>(), type_name::<R>()),
        ];
        for (declared, requested, requested_name) in checks {
            if let Some(declared) = declared {
                if declared.id != requested {
                    return Err(MiddlewareError::ProxySignature {
                        method: info.label.clone(),
                        expected: declared.name,
                        found: requested_name,
                    });
                }
            }
        }

        Ok(Proxy::new(
            Arc::clone(&self.dispatcher),
            event,
            Some(info.label.clone()),
        ))
    }

    /// Returns a proxy that fires `event` directly.
    pub fn event_proxy<A: Any, R: Any>(&self, event: &str) -> DispatchResult<Proxy<A, R>> {
        let event = EventName::parse(event)?;
        Ok(Proxy::new(Arc::clone(&self.dispatcher), event, None))
    }
}

impl Drop for MiddlewareManager {
    fn drop(&mut self) {
        for entry in std::mem::take(self.middlewares.get_mut()) {
            self.registry.unregister(entry.id.owner());
            if let Some(instance) = entry.instance.upgrade() {
                instance.on_remove();
            }
        }
        debug!("Middleware manager dropped");
    }
}

impl fmt::Debug for MiddlewareManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareManager")
            .field("middleware", &self.middleware_names())
            .field("handler_count", &self.handler_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::HandlerTable;
    use eventware_core::{DispatchError, EventContext, HandlerResult};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ─── Fixtures ───────────────────────────────────────────────────────────

    #[derive(Default)]
    struct Tracer {
        log: Mutex<Vec<String>>,
        removed: AtomicUsize,
    }

    impl Tracer {
        fn pre(&self, ctx: &mut EventContext, _: &String) -> HandlerResult {
            self.log.lock().push(format!("pre:{}", ctx.has_result()));
            Ok(())
        }

        fn main(&self, arg: &String) -> HandlerResult<String> {
            self.log.lock().push("main".into());
            Ok(format!("X{arg}"))
        }

        fn post(&self, ctx: &mut EventContext, _: &String) -> HandlerResult {
            let seen = ctx.result::<String>().cloned().unwrap_or_default();
            self.log.lock().push(format!("post:{seen}"));
            Ok(())
        }
    }

    impl Middleware for Tracer {
        fn register(table: &mut HandlerTable<Self>) {
            table
                .observe("post", "*.b.c", 300, Self::post)
                .implement("main", "a.b.c", 200, Self::main)
                .observe("pre", "a.b.c", 100, Self::pre);
        }

        fn on_remove(&self) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Doubler;

    impl Middleware for Doubler {
        fn name(&self) -> &str {
            "doubler"
        }

        fn register(table: &mut HandlerTable<Self>) {
            table
                .implement("double", "num.double", 0, |_, n: &i64| Ok(n * 2))
                .implement("any", "num.*", 0, |_, n: &i64| Ok(*n));
        }
    }

    struct Rival;

    impl Middleware for Rival {
        fn register(table: &mut HandlerTable<Self>) {
            table.implement("double", "num.double", 5, |_, n: &i64| Ok(n * 3));
        }
    }

    struct Broken;

    impl Middleware for Broken {
        fn register(table: &mut HandlerTable<Self>) {
            table
                .observe_any("ok", "fine", 0, |_, _, _| Ok(()))
                .observe_any("bad", "a..b", 0, |_, _, _| Ok(()));
        }
    }

    // ─── Tests ──────────────────────────────────────────────────────────────

    #[test]
    fn test_pre_main_post_through_proxy() {
        let manager = MiddlewareManager::new();
        let tracer = Arc::new(Tracer::default());
        let id = manager.add(&tracer).unwrap();
        assert_eq!(manager.handler_count(), 3);

        let main = manager.proxy::<String, String>(id, "main").unwrap();
        assert_eq!(main.call("y".into()).unwrap(), "Xy");
        assert_eq!(*tracer.log.lock(), ["pre:false", "main", "post:Xy"]);
    }

    #[test]
    fn test_static_duplicate_primary_rejected() {
        let manager = MiddlewareManager::new();
        let doubler = Arc::new(Doubler);
        manager.add(&doubler).unwrap();

        let err = manager.add(&Arc::new(Rival)).unwrap_err();
        match err {
            MiddlewareError::DuplicatePrimary {
                pattern,
                first,
                second,
            } => {
                assert_eq!(pattern, "num.double");
                assert_eq!(first, "doubler::double");
                assert_eq!(second, "Rival::double");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(manager.middleware_count(), 1);
        assert_eq!(manager.handler_count(), 2);
    }

    #[test]
    fn test_wildcard_overlap_detected_at_fire_time() {
        let manager = MiddlewareManager::new();
        let doubler = Arc::new(Doubler);
        manager.add(&doubler).unwrap();

        assert!(matches!(
            manager.fire::<i64, i64>("num.double", 4),
            Err(DispatchError::ConflictingPrimary { .. })
        ));
        assert_eq!(manager.fire::<i64, i64>("num.other", 4).unwrap(), 4);
    }

    #[test]
    fn test_invalid_pattern_registers_nothing() {
        let manager = MiddlewareManager::new();
        let err = manager.add(&Arc::new(Broken)).unwrap_err();
        assert!(matches!(
            err,
            MiddlewareError::InvalidPattern { method: "bad", .. }
        ));
        assert_eq!(manager.handler_count(), 0);
        assert_eq!(manager.middleware_count(), 0);
    }

    #[test]
    fn test_remove_only_own_handlers() {
        let manager = MiddlewareManager::new();
        let tracer = Arc::new(Tracer::default());
        let doubler = Arc::new(Doubler);
        let tracer_id = manager.add(&tracer).unwrap();
        let doubler_id = manager.add(&doubler).unwrap();
        assert_eq!(manager.handler_count(), 5);

        assert!(manager.remove(tracer_id));
        assert!(!manager.remove(tracer_id));
        assert_eq!(tracer.removed.load(Ordering::SeqCst), 1);
        assert_eq!(manager.handler_count(), 2);
        assert_eq!(manager.handlers_of(doubler_id).len(), 2);
        assert!(!manager.contains(tracer_id));

        assert!(manager.remove_instance(&doubler));
        assert_eq!(manager.handler_count(), 0);
    }

    #[test]
    fn test_remove_single_handler() {
        let manager = MiddlewareManager::new();
        let doubler = Arc::new(Doubler);
        let id = manager.add(&doubler).unwrap();

        let methods = manager.methods_of(id).unwrap();
        let any = methods.iter().find(|m| m.method == "any").unwrap();
        assert!(manager.remove_handler(any.handler));
        assert!(!manager.remove_handler(any.handler));

        assert_eq!(manager.fire::<i64, i64>("num.double", 4).unwrap(), 8);
        assert_eq!(manager.methods_of(id).unwrap().len(), 1);
    }

    #[test]
    fn test_proxy_checks() {
        let manager = MiddlewareManager::new();
        let doubler = Arc::new(Doubler);
        let id = manager.add(&doubler).unwrap();

        assert!(matches!(
            manager.proxy::<i64, i64>(id, "missing"),
            Err(MiddlewareError::UnknownMethod { .. })
        ));
        assert!(matches!(
            manager.proxy::<i64, i64>(id, "any"),
            Err(MiddlewareError::WildcardMethod { .. })
        ));
        assert!(matches!(
            manager.proxy::<i32, i64>(id, "double"),
            Err(MiddlewareError::ProxySignature { .. })
        ));
        assert!(matches!(
            manager.proxy::<i64, String>(id, "double"),
            Err(MiddlewareError::ProxySignature { .. })
        ));

        manager.remove(id);
        assert!(matches!(
            manager.proxy::<i64, i64>(id, "double"),
            Err(MiddlewareError::NotInstalled(_))
        ));
    }

    #[test]
    fn test_dropped_instance() {
        let manager = MiddlewareManager::new();
        let tracer = Arc::new(Tracer::default());
        manager.add(&tracer).unwrap();
        drop(tracer);

        assert!(matches!(
            manager.fire::<String, String>("a.b.c", "y".into()),
            Err(DispatchError::OwnerDropped { .. })
        ));
    }

    #[test]
    fn test_tie_order_across_middleware() {
        struct Tag(&'static str, Arc<Mutex<Vec<&'static str>>>);

        impl Middleware for Tag {
            fn name(&self) -> &str {
                self.0
            }

            fn register(table: &mut HandlerTable<Self>) {
                table.observe("tag", "tie", 7, |this: &Tag, _, _: &()| {
                    this.1.lock().push(this.0);
                    Ok(())
                });
            }
        }

        let manager = MiddlewareManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let tags: Vec<_> = ["b", "a", "c"]
            .into_iter()
            .map(|t| Arc::new(Tag(t, Arc::clone(&log))))
            .collect();
        for tag in &tags {
            manager.add(tag).unwrap();
        }

        manager.notify("tie", ()).unwrap();
        manager.notify("tie", ()).unwrap();
        assert_eq!(*log.lock(), ["b", "a", "c", "b", "a", "c"]);

        let chain = manager.chain_for("tie").unwrap();
        let labels: Vec<_> = chain.entries().iter().map(|e| e.label()).collect();
        assert_eq!(labels, ["b::tag", "a::tag", "c::tag"]);
    }

    #[test]
    fn test_drop_unregisters_everything() {
        let tracer = Arc::new(Tracer::default());
        let proxy = {
            let manager = MiddlewareManager::new();
            let id = manager.add(&tracer).unwrap();
            manager.proxy::<String, String>(id, "main").unwrap()
        };

        assert_eq!(tracer.removed.load(Ordering::SeqCst), 1);
        assert!(matches!(
            proxy.call("y".into()),
            Err(DispatchError::NoPrimary { .. })
        ));
    }
}
