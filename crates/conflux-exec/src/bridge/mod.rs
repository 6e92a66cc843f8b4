//! Bridges between callback-style APIs and futures.

use std::{
    future::{Future, IntoFuture},
    panic::{self, AssertUnwindSafe},
};

use conflux_core::{FlowError, Settled, settlable};
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Completion callback handed to a callback-style API.
pub type Callback<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

/// Receives panics raised while starting a wrapped operation.
pub trait PanicSink: Send + Sync {
    fn report(&self, err: &FlowError);
}

impl<F> PanicSink for F
where
    F: Fn(&FlowError) + Send + Sync,
{
    fn report(&self, err: &FlowError) {
        (self)(err)
    }
}

/// Sink that records panics as error events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl PanicSink for LogSink {
    fn report(&self, err: &FlowError) {
        error!(error = %err, "wrapped operation panicked");
    }
}

/// Starts a callback-style operation and returns a future for its outcome.
///
/// `start` runs immediately. If the callback is dropped without being called
/// the future fails with [`FlowError::Abandoned`]. A panic in `start`
/// propagates to the caller.
pub fn wrap<T, E, F>(start: F) -> Settled<T, E>
where
    F: FnOnce(Callback<T, E>),
    T: Send + 'static,
    E: Send + 'static,
{
    let (settler, settled) = settlable();
    start(Box::new(move |outcome| {
        settler.settle(outcome);
    }));
    settled
}

/// Like [`wrap`], but a panic in `start` is reported to `sink` and turned
/// into a [`FlowError::Panicked`] rejection.
pub fn wrap_with_sink<T, E, F>(start: F, sink: &dyn PanicSink) -> Settled<T, E>
where
    F: FnOnce(Callback<T, E>),
    T: Send + 'static,
    E: From<FlowError> + Send + 'static,
{
    let (settler, settled) = settlable();
    let callback = settler.clone();

    let started = panic::catch_unwind(AssertUnwindSafe(move || {
        start(Box::new(move |outcome| {
            callback.settle(outcome);
        }))
    }));

    if let Err(payload) = started {
        let err = FlowError::from_panic(payload.as_ref());
        warn!(error = %err, "panic while starting wrapped operation");
        sink.report(&err);
        settler.reject(err.into());
    }
    settled
}

/// Drives `fut` on the runtime and passes its outcome to `callback`.
pub fn unwrap<F, T, E, C>(fut: F, callback: C) -> JoinHandle<()>
where
    F: IntoFuture<Output = Result<T, E>>,
    F::IntoFuture: Send + 'static,
    C: FnOnce(Result<T, E>) + Send + 'static,
{
    let fut = fut.into_future();
    tokio::spawn(async move { callback(fut.await) })
}

/// Turns an async function into a callback-style one.
///
/// Each call of the returned function drives `f(arg)` on the runtime and hands
/// the outcome to the callback given with that call.
pub fn unwrap_bind<A, F, Fut, T, E>(f: F) -> impl Fn(A, Callback<T, E>) -> JoinHandle<()>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    move |arg, callback| unwrap(f(arg), callback)
}
