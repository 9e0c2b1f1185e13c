//! Handler roles and type-erased callbacks.
//!
//! A handler is either the single **primary** of an event, whose return value
//! becomes the result of the fire, or one of any number of **observers** that
//! run before or after it.
//!
//! Typed closures are wrapped into [`PrimaryFn`] / [`ObserverFn`] and stored
//! behind the [`ErasedPrimary`] / [`ErasedObserver`] traits so entries for
//! different argument types can live in one registry.
//!
//! ```rust,ignore
//! // Primary: receives the arguments only.
//! let main = Callback::primary(|arg: &String| Ok(format!("X{arg}")));
//!
//! // Observer: receives the context and the arguments.
//! let post = Callback::observer(|ctx: &mut EventContext, _arg: &String| {
//!     println!("result = {:?}", ctx.result::<String>());
//!     Ok(())
//! });
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::EventContext;

/// Boxed error returned by handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by handler closures.
pub type HandlerResult<T = ()> = Result<T, BoxError>;

/// The part a handler plays in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Produces the result of the fire.
    Primary,
    /// Runs before or after the primary; its return value is discarded.
    Observer,
}

impl Role {
    /// Returns the lowercase role name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Observer => "observer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime identity of a Rust type, with its name for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfo {
    /// The type's [`TypeId`].
    pub id: TypeId,
    /// The type's name as reported by [`type_name`].
    pub name: &'static str,
}

impl TypeInfo {
    /// Returns the type info of `T`.
    pub fn of<T: Any + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

// ============================================================================
// Erased traits
// ============================================================================

/// Type-erased primary handler.
pub trait ErasedPrimary: Send + Sync {
    /// The argument type this handler accepts.
    fn argument(&self) -> TypeInfo;

    /// The result type this handler produces.
    fn output(&self) -> TypeInfo;

    /// Invokes the handler. `args` must be of type [`argument`](Self::argument).
    fn invoke(&self, args: &dyn Any) -> HandlerResult<Box<dyn Any>>;
}

/// Whether an observer actually ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    /// The observer body was executed.
    Ran,
    /// The fired arguments were not of the observer's argument type.
    Skipped,
}

/// Type-erased observer handler.
pub trait ErasedObserver: Send + Sync {
    /// The argument type this observer accepts, or `None` if it accepts any.
    fn argument(&self) -> Option<TypeInfo>;

    /// Invokes the observer with the shared context and the fired arguments.
    fn observe(&self, ctx: &mut EventContext, args: &dyn Any) -> HandlerResult<Observed>;
}

// ============================================================================
// Typed wrappers
// ============================================================================

/// Wraps a typed closure `Fn(&A) -> HandlerResult<R>` as a primary.
pub struct PrimaryFn<F, A, R> {
    f: F,
    _marker: PhantomData<fn(&A) -> R>,
}

impl<F, A, R> PrimaryFn<F, A, R>
where
    F: Fn(&A) -> HandlerResult<R> + Send + Sync,
{
    /// Creates a new primary wrapper.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F, A, R> ErasedPrimary for PrimaryFn<F, A, R>
where
    F: Fn(&A) -> HandlerResult<R> + Send + Sync,
    A: Any,
    R: Any,
{
    fn argument(&self) -> TypeInfo {
        TypeInfo::of::<A>()
    }

    fn output(&self) -> TypeInfo {
        TypeInfo::of::<R>()
    }

    fn invoke(&self, args: &dyn Any) -> HandlerResult<Box<dyn Any>> {
        let args = args
            .downcast_ref::<A>()
            .ok_or_else(|| format!("primary expects arguments of type {}", type_name::<A>()))?;
        let value = (self.f)(args)?;
        Ok(Box::new(value))
    }
}

/// Wraps a typed closure `Fn(&mut EventContext, &A) -> HandlerResult` as an
/// observer.
///
/// Fires whose arguments are not an `A` skip this observer, so a wildcard
/// observer can coexist with events of other argument types. The dispatcher
/// rejects such a fire up front when the observer's pattern is concrete.
pub struct ObserverFn<F, A> {
    f: F,
    _marker: PhantomData<fn(&A)>,
}

impl<F, A> ObserverFn<F, A>
where
    F: Fn(&mut EventContext, &A) -> HandlerResult + Send + Sync,
{
    /// Creates a new observer wrapper.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F, A> ErasedObserver for ObserverFn<F, A>
where
    F: Fn(&mut EventContext, &A) -> HandlerResult + Send + Sync,
    A: Any,
{
    fn argument(&self) -> Option<TypeInfo> {
        Some(TypeInfo::of::<A>())
    }

    fn observe(&self, ctx: &mut EventContext, args: &dyn Any) -> HandlerResult<Observed> {
        match args.downcast_ref::<A>() {
            Some(args) => (self.f)(ctx, args).map(|()| Observed::Ran),
            None => Ok(Observed::Skipped),
        }
    }
}

/// Observer over untyped arguments; sees every fire.
pub struct AnyObserverFn<F> {
    f: F,
}

impl<F> AnyObserverFn<F>
where
    F: Fn(&mut EventContext, &dyn Any) -> HandlerResult + Send + Sync,
{
    /// Creates a new untyped observer wrapper.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> ErasedObserver for AnyObserverFn<F>
where
    F: Fn(&mut EventContext, &dyn Any) -> HandlerResult + Send + Sync,
{
    fn argument(&self) -> Option<TypeInfo> {
        None
    }

    fn observe(&self, ctx: &mut EventContext, args: &dyn Any) -> HandlerResult<Observed> {
        (self.f)(ctx, args).map(|()| Observed::Ran)
    }
}

// ============================================================================
// Callback
// ============================================================================

/// A stored handler callable; the variant determines the handler's [`Role`].
#[derive(Clone)]
pub enum Callback {
    /// A primary handler.
    Primary(Arc<dyn ErasedPrimary>),
    /// An observer handler.
    Observer(Arc<dyn ErasedObserver>),
}

impl Callback {
    /// Wraps a typed primary closure.
    pub fn primary<F, A, R>(f: F) -> Self
    where
        F: Fn(&A) -> HandlerResult<R> + Send + Sync + 'static,
        A: Any,
        R: Any,
    {
        Self::Primary(Arc::new(PrimaryFn::new(f)))
    }

    /// Wraps a typed observer closure.
    pub fn observer<F, A>(f: F) -> Self
    where
        F: Fn(&mut EventContext, &A) -> HandlerResult + Send + Sync + 'static,
        A: Any,
    {
        Self::Observer(Arc::new(ObserverFn::new(f)))
    }

    /// Wraps an observer closure that accepts arguments of any type.
    pub fn observer_any<F>(f: F) -> Self
    where
        F: Fn(&mut EventContext, &dyn Any) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Observer(Arc::new(AnyObserverFn::new(f)))
    }

    /// Returns the role implied by this callback.
    pub fn role(&self) -> Role {
        match self {
            Self::Primary(_) => Role::Primary,
            Self::Observer(_) => Role::Observer,
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary(p) => f
                .debug_struct("Primary")
                .field("argument", &p.argument().name)
                .field("output", &p.output().name)
                .finish(),
            Self::Observer(o) => f
                .debug_struct("Observer")
                .field("argument", &o.argument().map(|t| t.name))
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::EventName;

    fn ctx() -> EventContext {
        EventContext::new(EventName::parse("t").unwrap())
    }

    #[test]
    fn test_primary_roundtrip() {
        let callback = Callback::primary(|arg: &String| Ok(format!("X{arg}")));
        assert_eq!(callback.role(), Role::Primary);

        let Callback::Primary(primary) = callback else {
            panic!("expected primary");
        };
        assert_eq!(primary.argument(), TypeInfo::of::<String>());
        assert_eq!(primary.output(), TypeInfo::of::<String>());

        let out = primary.invoke(&String::from("y")).unwrap();
        assert_eq!(out.downcast_ref::<String>().map(String::as_str), Some("Xy"));
    }

    #[test]
    fn test_primary_wrong_argument_is_error() {
        let primary = PrimaryFn::new(|n: &i32| Ok(n + 1));
        assert!(primary.invoke(&"nope").is_err());
    }

    #[test]
    fn test_typed_observer_skips_other_types() {
        let observer = ObserverFn::new(|ctx: &mut EventContext, n: &i32| {
            ctx.insert("seen", *n);
            Ok(())
        });
        let mut ctx = ctx();

        assert_eq!(observer.observe(&mut ctx, &"text").unwrap(), Observed::Skipped);
        assert!(!ctx.contains("seen"));

        assert_eq!(observer.observe(&mut ctx, &7i32).unwrap(), Observed::Ran);
        assert_eq!(ctx.get::<i32>("seen"), Some(&7));
    }

    #[test]
    fn test_any_observer_sees_everything() {
        let observer = AnyObserverFn::new(|ctx: &mut EventContext, args: &dyn Any| {
            ctx.insert("is_i32", args.is::<i32>());
            Ok(())
        });
        let mut ctx = ctx();
        assert_eq!(observer.argument(), None);
        assert_eq!(observer.observe(&mut ctx, &1u8).unwrap(), Observed::Ran);
        assert_eq!(ctx.get::<bool>("is_i32"), Some(&false));
    }

    #[test]
    fn test_observer_error_propagates() {
        let observer = ObserverFn::new(|_: &mut EventContext, _: &()| Err("boom".into()));
        let err = observer.observe(&mut ctx(), &()).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
