//! Dispatch chain construction.
//!
//! Given the entries matching a fired event, the [`ChainBuilder`] validates
//! the single-primary rule and orders the entries into the [`Chain`] the
//! dispatcher executes.
//!
//! # Ordering
//!
//! All entries, primary and observers alike, are sorted by
//! `(priority, sequence)` ascending. Observers whose priority is below the
//! primary's therefore run before it and observers above it run after it.
//! Equal priorities keep registration order.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{DispatchError, DispatchResult};
use crate::handler::Role;
use crate::pattern::EventName;
use crate::registry::HandlerEntry;

/// How a fire treats a missing primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FireMode {
    /// Function-replacement style: exactly one primary is required.
    Call,
    /// Pure observation: the primary is optional.
    Notify,
}

impl FireMode {
    /// Returns the lowercase mode name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Notify => "notify",
        }
    }
}

impl fmt::Display for FireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered, validated execution chain for one event name.
#[derive(Debug, Clone)]
pub struct Chain {
    event: EventName,
    entries: Vec<Arc<HandlerEntry>>,
    primary: Option<usize>,
}

impl Chain {
    /// Returns the event name this chain was built for.
    pub fn event(&self) -> &EventName {
        &self.event
    }

    /// Returns the entries in execution order.
    pub fn entries(&self) -> &[Arc<HandlerEntry>] {
        &self.entries
    }

    /// Returns the primary entry, if any.
    pub fn primary(&self) -> Option<&Arc<HandlerEntry>> {
        self.primary.map(|index| &self.entries[index])
    }

    /// Returns the position of the primary within the chain.
    pub fn primary_index(&self) -> Option<usize> {
        self.primary
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entry matched.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks the chain against the requirements of `mode`.
    pub fn check_mode(&self, mode: FireMode) -> DispatchResult<()> {
        if mode == FireMode::Call && self.primary.is_none() {
            return Err(DispatchError::NoPrimary {
                event: self.event.to_string(),
            });
        }
        Ok(())
    }
}

/// Builds [`Chain`]s from matching entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainBuilder {
    strict_priorities: bool,
}

impl ChainBuilder {
    /// Creates a builder that allows equal priorities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects chains in which two entries share a priority.
    pub fn strict_priorities(mut self, strict: bool) -> Self {
        self.strict_priorities = strict;
        self
    }

    /// Orders and validates `matching` for a fire in `mode`.
    pub fn build(
        &self,
        event: &EventName,
        matching: Vec<Arc<HandlerEntry>>,
        mode: FireMode,
    ) -> DispatchResult<Chain> {
        let chain = self.order(event, matching)?;
        chain.check_mode(mode)?;
        Ok(chain)
    }

    /// Orders `matching` and validates everything that does not depend on
    /// the fire mode.
    pub fn order(
        &self,
        event: &EventName,
        mut matching: Vec<Arc<HandlerEntry>>,
    ) -> DispatchResult<Chain> {
        let primaries: Vec<&Arc<HandlerEntry>> = matching
            .iter()
            .filter(|entry| entry.role() == Role::Primary)
            .collect();

        if primaries.len() > 1 {
            return Err(DispatchError::ConflictingPrimary {
                event: event.to_string(),
                handlers: primaries
                    .iter()
                    .map(|entry| entry.label().to_owned())
                    .collect(),
            });
        }

        matching.sort_by_key(|entry| (entry.priority(), entry.sequence()));

        if self.strict_priorities {
            Self::check_unique_priorities(event, &matching)?;
        }

        let primary = matching
            .iter()
            .position(|entry| entry.role() == Role::Primary);

        debug!(
            event = %event,
            handlers = matching.len(),
            primary = primary.map(|i| matching[i].label()),
            "Built dispatch chain"
        );

        Ok(Chain {
            event: event.clone(),
            entries: matching,
            primary,
        })
    }

    fn check_unique_priorities(
        event: &EventName,
        sorted: &[Arc<HandlerEntry>],
    ) -> DispatchResult<()> {
        for window in sorted.windows(2) {
            let priority = window[0].priority();
            if window[1].priority() == priority {
                return Err(DispatchError::DuplicatePriority {
                    event: event.to_string(),
                    priority,
                    handlers: sorted
                        .iter()
                        .filter(|entry| entry.priority() == priority)
                        .map(|entry| entry.label().to_owned())
                        .collect(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EventContext;
    use crate::pattern::Pattern;
    use crate::registry::{HandlerRegistry, Registration};

    fn name(s: &str) -> EventName {
        EventName::parse(s).unwrap()
    }

    fn observer(registry: &HandlerRegistry, pattern: &str, priority: i32, label: &str) {
        registry.register(
            Registration::observer(
                Pattern::parse(pattern).unwrap(),
                priority,
                |_: &mut EventContext, _: &()| Ok(()),
            )
            .label(label),
        );
    }

    fn primary(registry: &HandlerRegistry, pattern: &str, priority: i32, label: &str) {
        registry.register(
            Registration::primary(Pattern::parse(pattern).unwrap(), priority, |_: &()| Ok(()))
                .label(label),
        );
    }

    fn labels(chain: &Chain) -> Vec<&str> {
        chain.entries().iter().map(|e| e.label()).collect()
    }

    fn build(registry: &HandlerRegistry, event: &str, mode: FireMode) -> DispatchResult<Chain> {
        let event = name(event);
        ChainBuilder::new().build(&event, registry.entries_matching(&event), mode)
    }

    #[test]
    fn test_sorted_by_priority() {
        let registry = HandlerRegistry::new();
        observer(&registry, "*.b.c", 300, "post");
        primary(&registry, "a.b.c", 200, "main");
        observer(&registry, "a.b.c", 100, "pre");

        let chain = build(&registry, "a.b.c", FireMode::Call).unwrap();
        assert_eq!(labels(&chain), ["pre", "main", "post"]);
        assert_eq!(chain.primary_index(), Some(1));
        assert_eq!(chain.primary().map(|e| e.label()), Some("main"));
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let registry = HandlerRegistry::new();
        observer(&registry, "e", 5, "first");
        primary(&registry, "e", 5, "main");
        observer(&registry, "e", 5, "third");
        observer(&registry, "e", 1, "early");

        let chain = build(&registry, "e", FireMode::Call).unwrap();
        assert_eq!(labels(&chain), ["early", "first", "main", "third"]);
    }

    #[test]
    fn test_deterministic() {
        let registry = HandlerRegistry::new();
        for (i, p) in [3, 1, 2, 1, 3, 0].into_iter().enumerate() {
            observer(&registry, "*", p, &format!("o{i}"));
        }
        primary(&registry, "x", 2, "main");

        let first = build(&registry, "x", FireMode::Call).unwrap();
        let second = build(&registry, "x", FireMode::Call).unwrap();
        assert_eq!(labels(&first), labels(&second));

        let priorities: Vec<_> = first.entries().iter().map(|e| e.priority()).collect();
        assert!(priorities.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_conflicting_primary() {
        let registry = HandlerRegistry::new();
        primary(&registry, "m.n", 1, "one");
        primary(&registry, "m.*", 2, "two");

        let err = build(&registry, "m.n", FireMode::Call).unwrap_err();
        match err {
            DispatchError::ConflictingPrimary { event, handlers } => {
                assert_eq!(event, "m.n");
                assert_eq!(handlers, ["one", "two"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        // Conflicts are an error even when observing.
        assert!(build(&registry, "m.n", FireMode::Notify).is_err());
        // Only one primary matches `m.x`.
        assert!(build(&registry, "m.x", FireMode::Call).is_ok());
    }

    #[test]
    fn test_no_primary_depends_on_mode() {
        let registry = HandlerRegistry::new();
        observer(&registry, "only.observers", 0, "watch");

        assert!(matches!(
            build(&registry, "only.observers", FireMode::Call),
            Err(DispatchError::NoPrimary { .. })
        ));

        let chain = build(&registry, "only.observers", FireMode::Notify).unwrap();
        assert!(chain.primary().is_none());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_strict_priorities() {
        let registry = HandlerRegistry::new();
        observer(&registry, "s", 10, "a");
        primary(&registry, "s", 10, "b");
        observer(&registry, "s", 20, "c");

        let event = name("s");
        let strict = ChainBuilder::new().strict_priorities(true);
        let err = strict
            .build(&event, registry.entries_matching(&event), FireMode::Call)
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::DuplicatePriority { priority: 10, ref handlers, .. } if handlers == &["a", "b"]
        ));

        let relaxed = ChainBuilder::new();
        assert!(relaxed
            .build(&event, registry.entries_matching(&event), FireMode::Call)
            .is_ok());
    }
}
