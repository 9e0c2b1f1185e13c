//! Method proxies.
//!
//! A [`Proxy`] stands in for a handler method. Calling it never runs the
//! method body directly; the arguments are forwarded to the dispatcher under
//! the method's event name, and whatever the resulting fire returns is handed
//! back unchanged.
//!
//! ```rust,ignore
//! let add: Proxy<(i64, i64), i64> = manager.proxy(calculator_id, "add")?;
//! assert_eq!(add.call((2, 3))?, 5);
//! ```

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use eventware_core::{DispatchResult, EventDispatcher, EventName};
use tracing::trace;

/// Typed call handle routing through [`EventDispatcher::fire`].
pub struct Proxy<A, R> {
    dispatcher: Arc<EventDispatcher>,
    event: EventName,
    label: Option<String>,
    _marker: PhantomData<fn(A) -> R>,
}

impl<A: Any, R: Any> Proxy<A, R> {
    pub(crate) fn new(
        dispatcher: Arc<EventDispatcher>,
        event: EventName,
        label: Option<String>,
    ) -> Self {
        Self {
            dispatcher,
            event,
            label,
            _marker: PhantomData,
        }
    }

    /// Fires the proxied event with `args` and returns the chain's result.
    pub fn call(&self, args: A) -> DispatchResult<R> {
        trace!(
            event = %self.event,
            method = self.label.as_deref().unwrap_or("<event>"),
            "Routing call through dispatcher"
        );
        self.dispatcher.fire_event(&self.event, args)
    }

    /// Returns the event name calls are routed to.
    pub fn event(&self) -> &EventName {
        &self.event
    }

    /// Returns the label of the proxied method, if the proxy was created for
    /// a method.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl<A, R> Clone for Proxy<A, R> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            event: self.event.clone(),
            label: self.label.clone(),
            _marker: PhantomData,
        }
    }
}

impl<A, R> fmt::Debug for Proxy<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("event", &self.event.as_str())
            .field("label", &self.label)
            .field("args", &std::any::type_name::<A>())
            .field("output", &std::any::type_name::<R>())
            .finish()
    }
}
