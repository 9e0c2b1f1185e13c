//! Middleware trait and handler registration tables.
//!
//! A middleware declares its handler methods by filling a [`HandlerTable`]
//! once, when it is added to a [`MiddlewareManager`](crate::MiddlewareManager).
//! Each row maps one method to a pattern, a priority and a role. Rows keep
//! their declaration order, which is also the tie-break order for equal
//! priorities.
//!
//! # Example
//!
//! ```rust,ignore
//! use eventware_framework::{HandlerTable, Middleware};
//! use eventware_core::{EventContext, HandlerResult};
//!
//! struct Greeter;
//!
//! impl Greeter {
//!     fn greet(&self, name: &String) -> HandlerResult<String> {
//!         Ok(format!("hello, {name}"))
//!     }
//!
//!     fn audit(&self, ctx: &mut EventContext, _name: &String) -> HandlerResult {
//!         tracing::info!(result = ?ctx.result::<String>(), "greeted");
//!         Ok(())
//!     }
//! }
//!
//! impl Middleware for Greeter {
//!     fn register(table: &mut HandlerTable<Self>) {
//!         table
//!             .implement("greet", "greeter.greet", 0, Self::greet)
//!             .observe("audit", "greeter.*", 10, Self::audit);
//!     }
//! }
//! ```

use std::any::{Any, type_name};
use std::sync::{Arc, Weak};

use eventware_core::{Callback, EventContext, HandlerResult, Role, TypeInfo};

use crate::error::InstanceDropped;

/// A component whose methods are registered as event handlers.
///
/// The manager never owns a middleware: handlers hold a weak reference to the
/// instance, and firing a chain that reaches a dropped instance fails.
pub trait Middleware: Any + Send + Sync {
    /// Name used in logs and handler labels.
    fn name(&self) -> &str {
        let full = type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Declares the handler methods of this middleware.
    fn register(table: &mut HandlerTable<Self>)
    where
        Self: Sized;

    /// Called after every handler of this instance has been registered.
    fn on_add(&self) {}

    /// Called after every handler of this instance has been unregistered.
    fn on_remove(&self) {}
}

type Binder<M> = Box<dyn FnOnce(Weak<M>) -> Callback>;

/// One declared handler method.
pub(crate) struct HandlerRow<M> {
    pub(crate) method: &'static str,
    pub(crate) pattern: String,
    pub(crate) priority: i32,
    pub(crate) role: Role,
    pub(crate) argument: Option<TypeInfo>,
    pub(crate) output: Option<TypeInfo>,
    pub(crate) bind: Binder<M>,
}

/// Registration table filled by [`Middleware::register`].
pub struct HandlerTable<M> {
    middleware: &'static str,
    rows: Vec<HandlerRow<M>>,
}

impl<M: Send + Sync + 'static> HandlerTable<M> {
    pub(crate) fn new() -> Self {
        Self {
            middleware: type_name::<M>(),
            rows: Vec::new(),
        }
    }

    pub(crate) fn into_rows(self) -> Vec<HandlerRow<M>> {
        self.rows
    }

    /// Declares `method` as the primary handler for `pattern`.
    ///
    /// The method receives the fired arguments and its return value becomes
    /// the result of the fire.
    pub fn implement<A, R, F>(
        &mut self,
        method: &'static str,
        pattern: &str,
        priority: i32,
        f: F,
    ) -> &mut Self
    where
        F: Fn(&M, &A) -> HandlerResult<R> + Send + Sync + 'static,
        A: Any,
        R: Any,
    {
        let middleware = self.middleware;
        self.rows.push(HandlerRow {
            method,
            pattern: pattern.to_owned(),
            priority,
            role: Role::Primary,
            argument: Some(TypeInfo::of::<A>()),
            output: Some(TypeInfo::of::<R>()),
            bind: Box::new(move |instance: Weak<M>| {
                Callback::primary(move |args: &A| {
                    let this = instance.upgrade().ok_or(InstanceDropped { middleware })?;
                    f(&*this, args)
                })
            }),
        });
        self
    }

    /// Declares `method` as an observer of `pattern` for arguments of type `A`.
    ///
    /// Fires with other argument types skip this observer.
    pub fn observe<A, F>(
        &mut self,
        method: &'static str,
        pattern: &str,
        priority: i32,
        f: F,
    ) -> &mut Self
    where
        F: Fn(&M, &mut EventContext, &A) -> HandlerResult + Send + Sync + 'static,
        A: Any,
    {
        let middleware = self.middleware;
        self.rows.push(HandlerRow {
            method,
            pattern: pattern.to_owned(),
            priority,
            role: Role::Observer,
            argument: Some(TypeInfo::of::<A>()),
            output: None,
            bind: Box::new(move |instance: Weak<M>| {
                Callback::observer(move |ctx: &mut EventContext, args: &A| {
                    let this = instance.upgrade().ok_or(InstanceDropped { middleware })?;
                    f(&*this, ctx, args)
                })
            }),
        });
        self
    }

    /// Declares `method` as an observer of `pattern` for every argument type.
    pub fn observe_any<F>(
        &mut self,
        method: &'static str,
        pattern: &str,
        priority: i32,
        f: F,
    ) -> &mut Self
    where
        F: Fn(&M, &mut EventContext, &dyn Any) -> HandlerResult + Send + Sync + 'static,
    {
        let middleware = self.middleware;
        self.rows.push(HandlerRow {
            method,
            pattern: pattern.to_owned(),
            priority,
            role: Role::Observer,
            argument: None,
            output: None,
            bind: Box::new(move |instance: Weak<M>| {
                Callback::observer_any(move |ctx: &mut EventContext, args: &dyn Any| {
                    let this = instance.upgrade().ok_or(InstanceDropped { middleware })?;
                    f(&*this, ctx, args)
                })
            }),
        });
        self
    }

    /// Returns the number of declared rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if nothing has been declared.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Collects the handler rows `M` declares.
pub(crate) fn scan<M: Middleware>() -> Vec<HandlerRow<M>> {
    let mut table = HandlerTable::new();
    M::register(&mut table);
    table.into_rows()
}

/// Binds a row to `instance`.
pub(crate) fn bind_row<M: Middleware>(bind: Binder<M>, instance: &Arc<M>) -> Callback {
    bind(Arc::downgrade(instance))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Echo {
        fn echo(&self, s: &String) -> HandlerResult<String> {
            Ok(s.clone())
        }

        fn watch(&self, ctx: &mut EventContext, _: &String) -> HandlerResult {
            ctx.insert("watched", true);
            Ok(())
        }
    }

    impl Middleware for Echo {
        fn register(table: &mut HandlerTable<Self>) {
            table
                .implement("echo", "echo.say", 10, Self::echo)
                .observe("watch", "echo.*", 20, Self::watch)
                .observe_any("trace", "*.*", 30, |_, _, _| Ok(()));
        }
    }

    #[test]
    fn test_default_name_is_short_type_name() {
        assert_eq!(Echo.name(), "Echo");
    }

    #[test]
    fn test_scan_preserves_declaration_order() {
        let rows = scan::<Echo>();
        let methods: Vec<_> = rows.iter().map(|r| r.method).collect();
        assert_eq!(methods, ["echo", "watch", "trace"]);

        assert_eq!(rows[0].role, Role::Primary);
        assert_eq!(rows[0].output, Some(TypeInfo::of::<String>()));
        assert_eq!(rows[1].role, Role::Observer);
        assert_eq!(rows[1].argument, Some(TypeInfo::of::<String>()));
        assert_eq!(rows[2].argument, None);
    }

    #[test]
    fn test_bound_callback_fails_after_drop() {
        let instance = Arc::new(Echo);
        let mut rows = scan::<Echo>();
        let row = rows.remove(0);
        let Callback::Primary(primary) = bind_row(row.bind, &instance) else {
            panic!("expected primary");
        };

        let out = primary.invoke(&String::from("hi")).unwrap();
        assert_eq!(out.downcast_ref::<String>().map(String::as_str), Some("hi"));

        drop(instance);
        let err = primary.invoke(&String::from("hi")).unwrap_err();
        assert!(err.downcast_ref::<InstanceDropped>().is_some());
    }
}
