//! Event dispatcher for eventware.
//!
//! This module provides the [`EventDispatcher`], the firing entry point. A
//! fire goes through four steps:
//!
//! 1. The event name is validated
//! 2. The chain is resolved from the registry (or the chain cache)
//! 3. Every precondition is checked before any handler runs: primary count,
//!    argument and result types (including typed observers on concrete
//!    patterns), and that bound owners are still alive
//! 4. Entries run strictly in chain order on the calling thread
//!
//! Observers receive `(&mut EventContext, &args)`; their return values are
//! discarded. The primary receives `&args` only and its value becomes both
//! `ctx.result` for later observers and the return value of the fire. The
//! first error aborts the rest of the chain.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use eventware_core::{EventDispatcher, HandlerRegistry, Pattern, Registration};
//!
//! let registry = Arc::new(HandlerRegistry::new());
//! registry.register(Registration::primary(
//!     Pattern::parse("greet")?,
//!     0,
//!     |name: &String| Ok(format!("hello, {name}")),
//! ));
//!
//! let dispatcher = EventDispatcher::new(Arc::clone(&registry));
//! let greeting: String = dispatcher.fire("greet", String::from("world"))?;
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{Level, debug, span, trace, warn};

use crate::chain::{Chain, ChainBuilder, FireMode};
use crate::context::EventContext;
use crate::error::{DispatchError, DispatchResult};
use crate::handler::{Callback, Observed, TypeInfo};
use crate::pattern::EventName;
use crate::registry::HandlerRegistry;

/// Tunables for an [`EventDispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Cache built chains per event name until the registry changes.
    pub cache_chains: bool,
    /// Reject chains in which two handlers share a priority.
    pub strict_priorities: bool,
    /// Emit a warning when a fire matches no handler at all.
    pub log_unmatched: bool,
    /// Upper bound on cached chains; the cache is cleared when it is full.
    /// `0` leaves it unbounded.
    pub max_cached_chains: usize,
}

/// Default for [`DispatchOptions::max_cached_chains`].
pub const DEFAULT_MAX_CACHED_CHAINS: usize = 1024;

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            cache_chains: true,
            strict_priorities: false,
            log_unmatched: true,
            max_cached_chains: DEFAULT_MAX_CACHED_CHAINS,
        }
    }
}

/// Progress of a single fire.
///
/// ```text
/// Idle ──► ChainBuilt ──► Running(0) ──► Running(1) ──► … ──► Completed
///   │           │              │
///   └───────────┴──────────────┴──► Failed
/// ```
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireState {
    /// Nothing has happened yet.
    Idle,
    /// The chain was resolved and all preconditions hold.
    ChainBuilt,
    /// The entry at this chain index is executing.
    Running(usize),
    /// Every entry ran.
    Completed,
    /// A precondition or a handler failed.
    Failed,
}

impl FireState {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Tracks the state of one fire and logs transitions.
struct FireRun {
    state: FireState,
}

impl FireRun {
    fn new() -> Self {
        Self {
            state: FireState::Idle,
        }
    }

    fn advance(&mut self, next: FireState) {
        debug_assert!(
            !self.state.is_terminal(),
            "fire already finished in {:?}",
            self.state
        );
        trace!(from = ?self.state, to = ?next, "Fire state transition");
        self.state = next;
    }

    fn fail(&mut self, error: DispatchError) -> DispatchError {
        self.advance(FireState::Failed);
        error
    }
}

struct CachedChain {
    generation: u64,
    chain: Arc<Chain>,
}

/// The firing entry point.
///
/// # Thread Safety
///
/// `EventDispatcher` is `Send + Sync`. Concurrent fires share the registry
/// snapshot and the chain cache; each fire owns its own [`EventContext`].
pub struct EventDispatcher {
    registry: Arc<HandlerRegistry>,
    builder: ChainBuilder,
    options: DispatchOptions,
    cache: Mutex<HashMap<String, CachedChain>>,
}

impl EventDispatcher {
    /// Creates a dispatcher with default options.
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self::with_options(registry, DispatchOptions::default())
    }

    /// Creates a dispatcher with explicit options.
    pub fn with_options(registry: Arc<HandlerRegistry>, options: DispatchOptions) -> Self {
        Self {
            registry,
            builder: ChainBuilder::new().strict_priorities(options.strict_priorities),
            options,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the registry this dispatcher reads from.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Returns the options in effect.
    pub fn options(&self) -> DispatchOptions {
        self.options
    }

    /// Fires `event` and returns the primary handler's result.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidName`] if `event` is malformed
    /// - [`DispatchError::NoPrimary`] / [`DispatchError::ConflictingPrimary`]
    ///   if not exactly one primary matches
    /// - [`DispatchError::ArgumentType`] / [`DispatchError::ResultType`] if
    ///   the primary's signature does not fit `A` and `R`, or a typed
    ///   observer on a concrete pattern does not accept `A`
    /// - [`DispatchError::OwnerDropped`] if a bound owner is gone
    /// - [`DispatchError::Handler`] if any handler returns an error
    ///
    /// Only the last one can happen after a handler has started running.
    pub fn fire<A: Any, R: Any>(&self, event: &str, args: A) -> DispatchResult<R> {
        let name = EventName::parse(event)?;
        self.fire_event(&name, args)
    }

    /// Like [`fire`](Self::fire), for an already validated name.
    pub fn fire_event<A: Any, R: Any>(&self, name: &EventName, args: A) -> DispatchResult<R> {
        let expected = TypeInfo::of::<R>();
        let value = self.run(name, FireMode::Call, &args, TypeInfo::of::<A>(), Some(expected))?;

        let Some(value) = value else {
            return Err(DispatchError::NoPrimary {
                event: name.to_string(),
            });
        };
        value
            .downcast::<R>()
            .map(|value| *value)
            .map_err(|_| DispatchError::ResultType {
                event: name.to_string(),
                handler: String::new(),
                expected: expected.name,
                found: "<unknown>",
            })
    }

    /// Fires `event` for observation only.
    ///
    /// Unlike [`fire`](Self::fire), a missing primary is not an error. If a
    /// primary does match it runs normally and later observers can read its
    /// result; the value itself is dropped.
    pub fn notify<A: Any>(&self, event: &str, args: A) -> DispatchResult<()> {
        let name = EventName::parse(event)?;
        self.notify_event(&name, args)
    }

    /// Like [`notify`](Self::notify), for an already validated name.
    pub fn notify_event<A: Any>(&self, name: &EventName, args: A) -> DispatchResult<()> {
        self.run(name, FireMode::Notify, &args, TypeInfo::of::<A>(), None)?;
        Ok(())
    }

    /// Resolves the chain `event` would execute, without running it.
    pub fn chain_for(&self, event: &str) -> DispatchResult<Arc<Chain>> {
        let name = EventName::parse(event)?;
        self.resolve(&name)
    }

    /// Drops every cached chain.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Returns the number of cached chains.
    pub fn cached_chains(&self) -> usize {
        self.cache.lock().len()
    }

    fn resolve(&self, name: &EventName) -> DispatchResult<Arc<Chain>> {
        let snapshot = self.registry.snapshot();

        if self.options.cache_chains {
            let cache = self.cache.lock();
            if let Some(cached) = cache.get(name.as_str()) {
                if cached.generation == snapshot.generation() {
                    trace!(event = %name, "Chain cache hit");
                    return Ok(Arc::clone(&cached.chain));
                }
            }
        }

        let chain = Arc::new(
            self.builder
                .order(name, snapshot.entries_matching(name))?,
        );

        // Unmatched names are not cached.
        if self.options.cache_chains && !chain.is_empty() {
            let generation = snapshot.generation();
            let mut cache = self.cache.lock();
            cache.retain(|_, cached| cached.generation == generation);
            let max = self.options.max_cached_chains;
            if max > 0 && cache.len() >= max {
                debug!(evicted = cache.len(), max, "Chain cache full, clearing");
                cache.clear();
            }
            cache.insert(
                name.as_str().to_owned(),
                CachedChain {
                    generation,
                    chain: Arc::clone(&chain),
                },
            );
        }

        Ok(chain)
    }

    fn run(
        &self,
        name: &EventName,
        mode: FireMode,
        args: &dyn Any,
        argument: TypeInfo,
        expected: Option<TypeInfo>,
    ) -> DispatchResult<Option<Box<dyn Any>>> {
        let span = span!(Level::DEBUG, "fire", event = %name, mode = %mode);
        let _enter = span.enter();

        let mut run = FireRun::new();

        let chain = self.resolve(name).map_err(|e| run.fail(e))?;
        if chain.is_empty() && self.options.log_unmatched {
            warn!(event = %name, "No handlers registered for event");
        }
        chain.check_mode(mode).map_err(|e| run.fail(e))?;

        // Held until the fire returns so bound owners cannot drop mid-chain.
        let _owners = self
            .preflight(name, &chain, argument, expected)
            .map_err(|e| run.fail(e))?;
        run.advance(FireState::ChainBuilt);

        let mut ctx = EventContext::new(name.clone());

        for (index, entry) in chain.entries().iter().enumerate() {
            run.advance(FireState::Running(index));

            match entry.callback() {
                Callback::Observer(observer) => match observer.observe(&mut ctx, args) {
                    Ok(Observed::Ran) => {
                        trace!(handler = entry.label(), priority = entry.priority(), "Observer ran");
                    }
                    Ok(Observed::Skipped) => {
                        debug!(
                            handler = entry.label(),
                            argument = argument.name,
                            "Observer skipped, argument type differs"
                        );
                    }
                    Err(source) => {
                        debug!(handler = entry.label(), error = %source, "Observer failed");
                        return Err(run.fail(DispatchError::handler(
                            name.as_str(),
                            entry.label(),
                            source,
                        )));
                    }
                },
                Callback::Primary(primary) => match primary.invoke(args) {
                    Ok(value) => {
                        trace!(handler = entry.label(), priority = entry.priority(), "Primary ran");
                        ctx.set_result(value);
                    }
                    Err(source) => {
                        debug!(handler = entry.label(), error = %source, "Primary failed");
                        return Err(run.fail(DispatchError::handler(
                            name.as_str(),
                            entry.label(),
                            source,
                        )));
                    }
                },
            }
        }

        run.advance(FireState::Completed);
        debug!(handlers = chain.len(), "Fire completed");

        Ok(ctx.take_result())
    }

    /// Checks everything that must hold before the first handler runs and
    /// pins every bound owner.
    fn preflight(
        &self,
        name: &EventName,
        chain: &Chain,
        argument: TypeInfo,
        expected: Option<TypeInfo>,
    ) -> DispatchResult<Vec<Arc<dyn Any + Send + Sync>>> {
        if let Some(entry) = chain.primary() {
            if let Callback::Primary(primary) = entry.callback() {
                let accepts = primary.argument();
                if accepts.id != argument.id {
                    return Err(DispatchError::ArgumentType {
                        event: name.to_string(),
                        handler: entry.label().to_owned(),
                        expected: accepts.name,
                        found: argument.name,
                    });
                }

                let output = primary.output();
                if let Some(expected) = expected {
                    if output.id != expected.id {
                        return Err(DispatchError::ResultType {
                            event: name.to_string(),
                            handler: entry.label().to_owned(),
                            expected: expected.name,
                            found: output.name,
                        });
                    }
                }
            }
        }

        for entry in chain.entries() {
            let Callback::Observer(observer) = entry.callback() else {
                continue;
            };
            if let Some(accepts) = observer.argument() {
                if entry.pattern().is_concrete() && accepts.id != argument.id {
                    return Err(DispatchError::ArgumentType {
                        event: name.to_string(),
                        handler: entry.label().to_owned(),
                        expected: accepts.name,
                        found: argument.name,
                    });
                }
            }
        }

        let mut owners = Vec::new();
        for entry in chain.entries() {
            match entry.pin_owner() {
                Ok(Some(owner)) => owners.push(owner),
                Ok(None) => {}
                Err(()) => {
                    return Err(DispatchError::OwnerDropped {
                        event: name.to_string(),
                        handler: entry.label().to_owned(),
                    });
                }
            }
        }
        Ok(owners)
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("cached_chains", &self.cached_chains())
            .finish()
    }
}
