//! Cancellable promises
//!
//! A [`Deferred`] is the settling side of an asynchronous operation and a
//! [`Promise`] is the read side handed to callers. Every promise can be
//! aborted: aborting cancels the operation's [`CancelToken`] and settles the
//! promise as [`Outcome::Cancelled`] if it was still pending. Operations check
//! their token at each resumption point and a settlement attempted after
//! cancellation is dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Shared cancellation flag checked by an in-flight operation
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Settlement state of a promise
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Pending,
    Resolved,
    Rejected,
    Cancelled,
}

/// Final value of a settled promise
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<T, E> {
    Resolved(T),
    Rejected(E),
    Cancelled,
}

impl<T, E> Outcome<T, E> {
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Resolved(_) => Status::Resolved,
            Self::Rejected(_) => Status::Rejected,
            Self::Cancelled => Status::Cancelled,
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Resolved(value) => Some(value),
            _ => None,
        }
    }
}

type Callback<T, E> = Box<dyn FnOnce(&Outcome<T, E>) + Send>;

struct Slot<T, E> {
    outcome: Option<Outcome<T, E>>,
    callbacks: Vec<Callback<T, E>>,
}

struct Shared<T, E> {
    slot: Mutex<Slot<T, E>>,
    settled: Condvar,
}

impl<T: Clone, E: Clone> Shared<T, E> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                outcome: None,
                callbacks: Vec::new(),
            }),
            settled: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T, E>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns false if the promise was already settled
    fn settle(&self, outcome: Outcome<T, E>) -> bool {
        let (outcome, callbacks) = {
            let mut slot = self.lock();
            if slot.outcome.is_some() {
                return false;
            }
            slot.outcome = Some(outcome.clone());
            (outcome, std::mem::take(&mut slot.callbacks))
        };
        self.settled.notify_all();

        for callback in callbacks {
            callback(&outcome);
        }
        true
    }

    fn on_settle(&self, callback: Callback<T, E>) {
        let settled = {
            let mut slot = self.lock();
            match &slot.outcome {
                Some(outcome) => outcome.clone(),
                None => {
                    slot.callbacks.push(callback);
                    return;
                }
            }
        };
        callback(&settled);
    }

    fn outcome(&self) -> Option<Outcome<T, E>> {
        self.lock().outcome.clone()
    }

    fn is_settled(&self) -> bool {
        self.lock().outcome.is_some()
    }
}

/// Aborts one operation and settles its promise as cancelled
#[derive(Clone)]
struct AbortHandle(Arc<dyn Fn() + Send + Sync>);

impl AbortHandle {
    fn run(&self) {
        (self.0)();
    }
}

/// Settling side of a promise
pub struct Deferred<T, E> {
    shared: Arc<Shared<T, E>>,
    token: CancelToken,
    abort: AbortHandle,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            token: self.token.clone(),
            abort: self.abort.clone(),
        }
    }
}

impl<T, E> Default for Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        let shared = Arc::new(Shared::new());
        let token = CancelToken::new();

        let abort = {
            let shared = Arc::clone(&shared);
            let token = token.clone();
            AbortHandle(Arc::new(move || {
                if shared.is_settled() {
                    return;
                }
                token.cancel();
                shared.settle(Outcome::Cancelled);
            }))
        };

        Self {
            shared,
            token,
            abort,
        }
    }

    /// Token the underlying operation should poll
    #[must_use]
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve unless already settled or cancelled
    pub fn resolve(&self, value: T) -> bool {
        !self.token.is_cancelled() && self.shared.settle(Outcome::Resolved(value))
    }

    /// Reject unless already settled or cancelled
    pub fn reject(&self, err: E) -> bool {
        !self.token.is_cancelled() && self.shared.settle(Outcome::Rejected(err))
    }

    /// Settle as cancelled without going through a promise
    pub fn cancel(&self) {
        self.abort.run();
    }

    #[must_use]
    pub fn promise(&self) -> Promise<T, E> {
        Promise {
            shared: Arc::clone(&self.shared),
            aborts: vec![self.abort.clone()],
        }
    }
}

/// Read side of a cancellable asynchronous value
pub struct Promise<T, E> {
    shared: Arc<Shared<T, E>>,
    aborts: Vec<AbortHandle>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            aborts: self.aborts.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E>
where
    T: Clone,
    E: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self
            .shared
            .outcome()
            .map_or(Status::Pending, |outcome| outcome.status());
        f.debug_struct("Promise").field("status", &status).finish()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Already resolved promise; abort is a no-op
    #[must_use]
    pub fn resolved(value: T) -> Self {
        let deferred = Deferred::new();
        deferred.resolve(value);
        deferred.promise()
    }

    /// Already rejected promise; abort is a no-op
    #[must_use]
    pub fn rejected(err: E) -> Self {
        let deferred = Deferred::new();
        deferred.reject(err);
        deferred.promise()
    }

    /// Cancel the operation behind this promise.
    ///
    /// Idempotent, and a no-op once the promise has settled.
    pub fn abort(&self) {
        if self.shared.is_settled() {
            return;
        }
        for abort in &self.aborts {
            abort.run();
        }
    }

    /// Also abort `other` when this promise is aborted
    #[must_use]
    pub fn with_abort_of<U, F>(mut self, other: &Promise<U, F>) -> Self {
        self.aborts.extend(other.aborts.iter().cloned());
        self
    }

    /// Derive a promise from the resolved value.
    ///
    /// The derived promise has its own abort; aborting it leaves this
    /// promise's operation running unless re-attached with
    /// [`Promise::with_abort_of`].
    pub fn then<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        let derived = Deferred::new();
        let settle = derived.clone();
        self.shared.on_settle(Box::new(move |outcome| match outcome {
            Outcome::Resolved(value) => match f(value.clone()) {
                Ok(mapped) => {
                    settle.resolve(mapped);
                }
                Err(err) => {
                    settle.reject(err);
                }
            },
            Outcome::Rejected(err) => {
                settle.reject(err.clone());
            }
            Outcome::Cancelled => settle.cancel(),
        }));
        derived.promise()
    }

    /// Run `f` on resolution
    pub fn done<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.shared.on_settle(Box::new(move |outcome| {
            if let Outcome::Resolved(value) = outcome {
                f(value);
            }
        }));
        self
    }

    /// Run `f` on rejection
    pub fn fail<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&E) + Send + 'static,
    {
        self.shared.on_settle(Box::new(move |outcome| {
            if let Outcome::Rejected(err) = outcome {
                f(err);
            }
        }));
        self
    }

    /// Run `f` on any settlement, cancellation included
    pub fn always<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&Outcome<T, E>) + Send + 'static,
    {
        self.shared.on_settle(Box::new(f));
        self
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.shared
            .outcome()
            .map_or(Status::Pending, |outcome| outcome.status())
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status() == Status::Pending
    }

    /// Outcome if already settled
    #[must_use]
    pub fn try_outcome(&self) -> Option<Outcome<T, E>> {
        self.shared.outcome()
    }

    /// Block until settled
    pub fn wait(&self) -> Outcome<T, E> {
        let mut slot = self.shared.lock();
        loop {
            if let Some(outcome) = &slot.outcome {
                return outcome.clone();
            }
            slot = self
                .shared
                .settled
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until settled or `timeout` elapses
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome<T, E>> {
        let slot = self.shared.lock();
        let (slot, _) = self
            .shared
            .settled
            .wait_timeout_while(slot, timeout, |slot| slot.outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.outcome.clone()
    }

    /// True if both handles observe the same settlement
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

/// Resolved promise with a no-op abort
#[must_use]
pub fn empty<E>() -> Promise<(), E>
where
    E: Clone + Send + 'static,
{
    Promise::resolved(())
}

/// Aggregate promises.
///
/// Resolves with every value in input order once all inputs resolve, rejects
/// with the first rejection, and is cancelled when any input is cancelled.
/// Aborting the aggregate aborts every input.
pub fn when<T, E>(promises: Vec<Promise<T, E>>) -> Promise<Vec<T>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let deferred = Deferred::new();
    if promises.is_empty() {
        deferred.resolve(Vec::new());
        return deferred.promise();
    }

    let values: Arc<Mutex<Vec<Option<T>>>> =
        Arc::new(Mutex::new((0..promises.len()).map(|_| None).collect()));
    let remaining = Arc::new(AtomicUsize::new(promises.len()));

    for (index, promise) in promises.iter().enumerate() {
        let deferred = deferred.clone();
        let values = Arc::clone(&values);
        let remaining = Arc::clone(&remaining);
        promise.always(move |outcome| match outcome {
            Outcome::Resolved(value) => {
                let collected = {
                    let mut values = values.lock().unwrap_or_else(PoisonError::into_inner);
                    values[index] = Some(value.clone());
                    if remaining.fetch_sub(1, Ordering::SeqCst) != 1 {
                        return;
                    }
                    values.drain(..).flatten().collect::<Vec<_>>()
                };
                deferred.resolve(collected);
            }
            Outcome::Rejected(err) => {
                deferred.reject(err.clone());
            }
            Outcome::Cancelled => deferred.cancel(),
        });
    }

    promises
        .iter()
        .fold(deferred.promise(), |aggregate, input| {
            aggregate.with_abort_of(input)
        })
}
