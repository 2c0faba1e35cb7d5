//! Deferred values
//!
//! A [`DeferredValue`] is a write-once placeholder for a value that is only
//! known once some provisioning call has completed (a CDN hostname, a storage
//! endpoint, a zone's name servers). Values are composed with [`map`] and
//! friends, which register a continuation instead of blocking. The only
//! waiting operations are [`get`] and [`blocking_get`], meant for the
//! reporting boundary.
//!
//! [`map`]: DeferredValue::map
//! [`get`]: DeferredValue::get
//! [`blocking_get`]: DeferredValue::blocking_get

use crate::error::CloudError;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

/// Settled state of a deferred value. Failures are shared so that every
/// downstream consumer observes the same error.
pub type Outcome<T> = std::result::Result<T, Arc<CloudError>>;

type Continuation<T> = Box<dyn FnOnce(Outcome<T>) + Send + 'static>;

/// Runs a user transform. A panic becomes a [`CloudError::Transform`]
/// instead of unwinding into whoever settled the source.
fn run_transform<T, U>(f: impl FnOnce(T) -> U, value: T) -> Outcome<U> {
    catch_unwind(AssertUnwindSafe(move || f(value))).map_err(|payload| {
        Arc::new(CloudError::Transform(anyhow::anyhow!(
            "transform panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

enum Slot<T> {
    Pending(Vec<Continuation<T>>),
    Settled(Outcome<T>),
}

struct Cell<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> Cell<T> {
    fn new(slot: Slot<T>) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(slot),
        })
    }

    // Continuations never run under the lock, so poisoning only happens if
    // a clone of T panics; the slot is still consistent in that case.
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + 'static> Cell<T> {
    fn settle(&self, outcome: Outcome<T>) {
        let mut slot = self.lock();
        if let Slot::Settled(_) = &*slot {
            return;
        }
        let previous = std::mem::replace(&mut *slot, Slot::Settled(outcome.clone()));
        drop(slot);

        if let Slot::Pending(continuations) = previous {
            for continuation in continuations {
                continuation(outcome.clone());
            }
        }
    }

    fn subscribe(&self, continuation: Continuation<T>) {
        let settled = {
            let mut slot = self.lock();
            match &mut *slot {
                Slot::Pending(pending) => {
                    pending.push(continuation);
                    return;
                }
                Slot::Settled(outcome) => outcome.clone(),
            }
        };
        continuation(settled);
    }
}

/// A value that is pending, resolved or failed. Cloning shares the same cell.
pub struct DeferredValue<T> {
    cell: Arc<Cell<T>>,
}

impl<T> Clone for DeferredValue<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DeferredValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.cell.lock() {
            Slot::Pending(_) => write!(f, "DeferredValue(<pending>)"),
            Slot::Settled(Ok(value)) => f.debug_tuple("DeferredValue").field(value).finish(),
            Slot::Settled(Err(error)) => write!(f, "DeferredValue(<failed: {}>)", error),
        }
    }
}

impl<T: Clone + Send + 'static> DeferredValue<T> {
    /// Creates a pending value together with the only handle able to settle it
    pub fn pending() -> (Self, Resolver<T>) {
        let cell = Cell::new(Slot::Pending(Vec::new()));
        let resolver = Resolver {
            cell: Some(Arc::clone(&cell)),
        };
        (Self { cell }, resolver)
    }

    /// Wraps a value already known at graph-construction time
    pub fn resolved(value: T) -> Self {
        Self::settled(Ok(value))
    }

    pub fn failed(error: CloudError) -> Self {
        Self::settled(Err(Arc::new(error)))
    }

    pub fn settled(outcome: Outcome<T>) -> Self {
        Self {
            cell: Cell::new(Slot::Settled(outcome)),
        }
    }

    /// Registers a continuation run exactly once with the outcome.
    /// Runs immediately when the value has already settled.
    pub fn on_settled<F>(&self, continuation: F)
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        self.cell.subscribe(Box::new(continuation));
    }

    /// Derives a value by applying `f` once the source resolves.
    /// A failed source propagates its error without calling `f`; a panic in
    /// `f` fails the derived value with [`CloudError::Transform`].
    pub fn map<U, F>(&self, f: F) -> DeferredValue<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let (derived, resolver) = DeferredValue::pending();
        self.on_settled(move |outcome| {
            resolver.settle(outcome.and_then(|value| run_transform(f, value)))
        });
        derived
    }

    /// Like [`map`](Self::map) for fallible transforms; an error from `f`
    /// fails the derived value with [`CloudError::Transform`].
    pub fn try_map<U, F>(&self, f: F) -> DeferredValue<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> anyhow::Result<U> + Send + 'static,
    {
        let (derived, resolver) = DeferredValue::pending();
        self.on_settled(move |outcome| {
            resolver.settle(outcome.and_then(|value| {
                run_transform(f, value)?.map_err(|e| Arc::new(CloudError::Transform(e)))
            }))
        });
        derived
    }

    /// Chains a transform that itself produces a deferred value
    pub fn and_then<U, F>(&self, f: F) -> DeferredValue<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> DeferredValue<U> + Send + 'static,
    {
        let (derived, resolver) = DeferredValue::pending();
        self.on_settled(move |outcome| match outcome.and_then(|value| run_transform(f, value)) {
            Ok(inner) => inner.on_settled(move |settled| resolver.settle(settled)),
            Err(error) => resolver.settle(Err(error)),
        });
        derived
    }

    /// Pairs two values positionally
    pub fn zip<U>(&self, other: &DeferredValue<U>) -> DeferredValue<(T, U)>
    where
        U: Clone + Send + 'static,
    {
        let other = other.clone();
        self.and_then(move |left| other.map(move |right| (left, right)))
    }

    /// Collects values in order. Resolves once all of them have resolved and
    /// fails with the first failure in positional order.
    pub fn all<I>(values: I) -> DeferredValue<Vec<T>>
    where
        I: IntoIterator<Item = DeferredValue<T>>,
    {
        values
            .into_iter()
            .fold(DeferredValue::resolved(Vec::new()), |acc, next| {
                acc.zip(&next).map(|(mut items, item)| {
                    items.push(item);
                    items
                })
            })
    }

    /// Waits for the outcome.
    pub async fn get(&self) -> Outcome<T> {
        let (tx, rx) = oneshot::channel();
        self.on_settled(move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await.unwrap_or_else(|_| Err(Arc::new(CloudError::Abandoned)))
    }

    /// Blocks the current thread until the value settles.
    ///
    /// Must not be called from inside a continuation or an async runtime
    /// worker: a continuation on the path to this value would never run.
    pub fn blocking_get(&self) -> Outcome<T> {
        let (tx, rx) = oneshot::channel();
        self.on_settled(move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.blocking_recv()
            .unwrap_or_else(|_| Err(Arc::new(CloudError::Abandoned)))
    }

    /// Returns the outcome without waiting
    pub fn peek(&self) -> Option<Outcome<T>> {
        match &*self.cell.lock() {
            Slot::Pending(_) => None,
            Slot::Settled(outcome) => Some(outcome.clone()),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(&*self.cell.lock(), Slot::Pending(_))
    }
}

impl<T: Serialize + Clone + Send + 'static> DeferredValue<T> {
    /// Untyped view used for resource inputs and stack outputs
    pub fn to_json(&self) -> DeferredValue<serde_json::Value> {
        self.try_map(|value| Ok(serde_json::to_value(value)?))
    }
}

/// Write handle of a pending [`DeferredValue`].
///
/// Consumed by settling, so a value is settled at most once. Dropping an
/// unsettled resolver fails the value with [`CloudError::Abandoned`].
pub struct Resolver<T: Clone + Send + 'static> {
    cell: Option<Arc<Cell<T>>>,
}

impl<T: Clone + Send + 'static> Resolver<T> {
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    pub fn fail(self, error: CloudError) {
        self.settle(Err(Arc::new(error)));
    }

    pub fn settle(mut self, outcome: Outcome<T>) {
        if let Some(cell) = self.cell.take() {
            cell.settle(outcome);
        }
    }
}

impl<T: Clone + Send + 'static> Drop for Resolver<T> {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.take() {
            cell.settle(Err(Arc::new(CloudError::Abandoned)));
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("settled", &self.cell.is_none())
            .finish()
    }
}

/// A component argument that is either known now or produced by another
/// component. Normalized with [`Input::into_deferred`] at constructor
/// boundaries so component internals only handle [`DeferredValue`].
#[derive(Debug, Clone)]
pub enum Input<T> {
    Literal(T),
    Deferred(DeferredValue<T>),
}

impl<T: Clone + Send + 'static> Input<T> {
    pub fn into_deferred(self) -> DeferredValue<T> {
        match self {
            Input::Literal(value) => DeferredValue::resolved(value),
            Input::Deferred(value) => value,
        }
    }

    pub fn as_literal(&self) -> Option<&T> {
        match self {
            Input::Literal(value) => Some(value),
            Input::Deferred(_) => None,
        }
    }
}

impl<T> From<DeferredValue<T>> for Input<T> {
    fn from(value: DeferredValue<T>) -> Self {
        Input::Deferred(value)
    }
}

impl<T> From<&DeferredValue<T>> for Input<T> {
    fn from(value: &DeferredValue<T>) -> Self {
        Input::Deferred(value.clone())
    }
}

impl From<String> for Input<String> {
    fn from(value: String) -> Self {
        Input::Literal(value)
    }
}

impl From<&str> for Input<String> {
    fn from(value: &str) -> Self {
        Input::Literal(value.to_string())
    }
}

impl From<Vec<String>> for Input<Vec<String>> {
    fn from(value: Vec<String>) -> Self {
        Input::Literal(value)
    }
}

impl From<bool> for Input<bool> {
    fn from(value: bool) -> Self {
        Input::Literal(value)
    }
}

impl From<i64> for Input<i64> {
    fn from(value: i64) -> Self {
        Input::Literal(value)
    }
}

impl From<serde_json::Value> for Input<serde_json::Value> {
    fn from(value: serde_json::Value) -> Self {
        Input::Literal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_resolved_map_blocking_get() {
        let value = DeferredValue::resolved(5).map(|x| x + 1);
        assert_eq!(value.blocking_get().unwrap(), 6);
    }

    #[tokio::test]
    async fn test_resolved_map_get() {
        let value = DeferredValue::resolved(5).map(|x| x + 1);
        assert_eq!(value.get().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_failure_skips_every_map() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source: DeferredValue<i32> =
            DeferredValue::failed(CloudError::provisioning("cdn", "boom"));

        let mut chained = source.clone();
        for _ in 0..5 {
            let calls = Arc::clone(&calls);
            chained = chained.map(move |x| {
                calls.fetch_add(1, Ordering::SeqCst);
                x + 1
            });
        }

        let error = chained.get().await.unwrap_err();
        let original = source.peek().unwrap().unwrap_err();
        assert!(Arc::ptr_eq(&error, &original));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pending_runs_continuation_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (source, resolver) = DeferredValue::<String>::pending();

        let counted = Arc::clone(&calls);
        let upper = source.map(move |s| {
            counted.fetch_add(1, Ordering::SeqCst);
            s.to_uppercase()
        });
        assert!(upper.is_pending());
        assert!(upper.peek().is_none());

        resolver.resolve("cdn.example.net".to_string());

        assert_eq!(upper.get().await.unwrap(), "CDN.EXAMPLE.NET");
        assert_eq!(upper.get().await.unwrap(), "CDN.EXAMPLE.NET");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_two_maps_are_independent() {
        let (source, resolver) = DeferredValue::pending();
        let doubled = source.map(|x: i32| x * 2);
        let negated = source.map(|x: i32| -x);

        resolver.resolve(21);

        assert_eq!(doubled.peek().unwrap().unwrap(), 42);
        assert_eq!(negated.peek().unwrap().unwrap(), -21);
    }

    #[test]
    fn test_continuations_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (source, resolver) = DeferredValue::pending();

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            source.on_settled(move |_: Outcome<u8>| seen.lock().unwrap().push(tag));
        }
        resolver.resolve(1);

        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_try_map_error_becomes_transform_failure() {
        let value = DeferredValue::resolved("not a number".to_string())
            .try_map(|s| Ok(s.parse::<u32>()?));

        let error = value.peek().unwrap().unwrap_err();
        assert!(matches!(*error, CloudError::Transform(_)));
    }

    #[test]
    fn test_dropped_resolver_fails_value() {
        let (value, resolver) = DeferredValue::<u8>::pending();
        drop(resolver);

        let error = tokio_test::block_on(value.get()).unwrap_err();
        assert!(matches!(*error, CloudError::Abandoned));
    }

    #[test]
    fn test_panicking_map_fails_derived_value() {
        let derived: DeferredValue<u8> = DeferredValue::resolved(5_u8).map(|_| panic!("bad host"));

        let error = derived.peek().unwrap().unwrap_err();
        assert!(matches!(*error, CloudError::Transform(_)));
        assert!(error.to_string().contains("bad host"));
    }

    #[test]
    fn test_panicking_map_does_not_unwind_into_resolver() {
        let (source, resolver) = DeferredValue::<String>::pending();
        let broken: DeferredValue<String> = source.map(|_| panic!("boom"));
        let healthy = source.map(|s| s.len());

        resolver.resolve("site-dev".to_string());

        assert!(broken.peek().unwrap().is_err());
        assert_eq!(healthy.peek().unwrap().unwrap(), 8);
    }

    #[test]
    fn test_panicking_and_then_fails_derived_value() {
        let derived: DeferredValue<u8> =
            DeferredValue::resolved(1_u8).and_then(|_| -> DeferredValue<u8> { panic!("nope") });

        let error = derived.peek().unwrap().unwrap_err();
        assert!(matches!(*error, CloudError::Transform(_)));
    }

    #[test]
    fn test_resolver_fail() {
        let (value, resolver) = DeferredValue::<u8>::pending();
        resolver.fail(CloudError::provisioning("zone", "quota exceeded"));

        let error = value.peek().unwrap().unwrap_err();
        assert!(error.is_provisioning());
    }

    #[test]
    fn test_zip_and_all() {
        let (host, resolver) = DeferredValue::pending();
        let pair = DeferredValue::resolved(300_u32).zip(&host);
        let all = DeferredValue::all(vec![
            DeferredValue::resolved("a".to_string()),
            host.clone(),
            DeferredValue::resolved("c".to_string()),
        ]);
        assert!(pair.is_pending());
        assert!(all.is_pending());

        resolver.resolve("b".to_string());

        assert_eq!(pair.peek().unwrap().unwrap(), (300, "b".to_string()));
        assert_eq!(all.peek().unwrap().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_all_reports_first_positional_failure() {
        let all = DeferredValue::all(vec![
            DeferredValue::resolved(1),
            DeferredValue::failed(CloudError::provisioning("first", "x")),
            DeferredValue::failed(CloudError::provisioning("second", "y")),
        ]);

        let error = all.peek().unwrap().unwrap_err();
        assert!(error.to_string().contains("first"));
    }

    #[test]
    fn test_all_of_nothing_resolves_empty() {
        let all = DeferredValue::<u8>::all(Vec::new());
        assert!(all.peek().unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_input_normalization() {
        let literal: Input<String> = "cdn.example.com".into();
        assert_eq!(literal.as_literal().map(String::as_str), Some("cdn.example.com"));
        assert_eq!(
            literal.into_deferred().peek().unwrap().unwrap(),
            "cdn.example.com"
        );

        let (source, resolver) = DeferredValue::pending();
        let deferred: Input<String> = (&source).into();
        assert!(deferred.as_literal().is_none());
        let normalized = deferred.into_deferred();
        resolver.resolve("acct.blob.core.windows.net".to_string());
        assert_eq!(
            normalized.peek().unwrap().unwrap(),
            "acct.blob.core.windows.net"
        );
    }

    #[test]
    fn test_to_json() {
        let value = DeferredValue::resolved(vec!["ns1.".to_string()]).to_json();
        assert_eq!(
            value.peek().unwrap().unwrap(),
            serde_json::json!(["ns1."])
        );
    }

    #[test]
    fn test_debug_shows_state() {
        let (pending, resolver) = DeferredValue::<u8>::pending();
        assert_eq!(format!("{:?}", pending), "DeferredValue(<pending>)");
        resolver.resolve(7);
        assert_eq!(format!("{:?}", pending), "DeferredValue(7)");
    }
}
