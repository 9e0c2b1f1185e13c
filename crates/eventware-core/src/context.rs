//! Per-fire event context.
//!
//! An [`EventContext`] is created fresh for every fire and dropped when the
//! fire returns. Observers receive it by mutable reference; the primary
//! handler never sees it. Its `result` slot stays empty until the primary has
//! run, so only observers ordered after the primary can read it.

use std::any::Any;
use std::collections::HashMap;

use crate::pattern::EventName;

/// Mutable state carried through one chain execution.
///
/// # Example
///
/// ```rust,ignore
/// fn audit(ctx: &mut EventContext, _args: &String) -> HandlerResult {
///     if let Some(total) = ctx.result::<String>() {
///         ctx.insert("audited", total.len());
///     }
///     Ok(())
/// }
/// ```
pub struct EventContext {
    event: EventName,
    result: Option<Box<dyn Any>>,
    values: HashMap<String, Box<dyn Any>>,
}

impl EventContext {
    /// Creates an empty context for `event`.
    pub fn new(event: EventName) -> Self {
        Self {
            event,
            result: None,
            values: HashMap::new(),
        }
    }

    /// Returns the name of the event being fired.
    pub fn event(&self) -> &EventName {
        &self.event
    }

    /// Returns `true` once the primary handler has produced a result.
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    /// Returns the primary's result if it has run and is of type `R`.
    pub fn result<R: Any>(&self) -> Option<&R> {
        self.result
            .as_deref()
            .and_then(|value| value.downcast_ref())
    }

    /// Returns the primary's result without a type check.
    pub fn result_any(&self) -> Option<&dyn Any> {
        self.result.as_deref()
    }

    pub(crate) fn set_result(&mut self, value: Box<dyn Any>) {
        self.result = Some(value);
    }

    pub(crate) fn take_result(&mut self) -> Option<Box<dyn Any>> {
        self.result.take()
    }

    /// Stores a value for handlers further down the chain.
    ///
    /// Returns `true` if an existing value under `key` was replaced.
    pub fn insert<T: Any>(&mut self, key: impl Into<String>, value: T) -> bool {
        self.values.insert(key.into(), Box::new(value)).is_some()
    }

    /// Returns the value stored under `key` if it has type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|value| value.downcast_ref())
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|value| value.downcast_mut())
    }

    /// Removes and returns the value under `key` if it has type `T`.
    ///
    /// A value of a different type is left in place.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        if !self.values.get(key)?.is::<T>() {
            return None;
        }
        self.values
            .remove(key)
            .and_then(|value| value.downcast().ok())
            .map(|value| *value)
    }

    /// Returns `true` if a value is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

impl std::fmt::Debug for EventContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventContext")
            .field("event", &self.event.as_str())
            .field("has_result", &self.result.is_some())
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> EventContext {
        EventContext::new(EventName::parse("a.b").unwrap())
    }

    #[test]
    fn test_result_slot_starts_empty() {
        let mut ctx = ctx();
        assert!(!ctx.has_result());
        assert!(ctx.result::<String>().is_none());

        ctx.set_result(Box::new(String::from("Xy")));
        assert!(ctx.has_result());
        assert_eq!(ctx.result::<String>().map(String::as_str), Some("Xy"));
        assert!(ctx.result::<i32>().is_none());
    }

    #[test]
    fn test_values_are_typed() {
        let mut ctx = ctx();
        assert!(!ctx.insert("count", 1u32));
        assert!(ctx.insert("count", 2u32));

        assert_eq!(ctx.get::<u32>("count"), Some(&2));
        assert_eq!(ctx.get::<i64>("count"), None);

        *ctx.get_mut::<u32>("count").unwrap() += 1;
        assert_eq!(ctx.remove::<i64>("count"), None);
        assert!(ctx.contains("count"));
        assert_eq!(ctx.remove::<u32>("count"), Some(3));
        assert!(!ctx.contains("count"));
    }
}
