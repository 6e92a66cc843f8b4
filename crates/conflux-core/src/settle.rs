//! Single-assignment futures.
//!
//! [`settlable`] returns a producer half ([`Settler`]) and a consumer half
//! ([`Settled`]). The first settlement wins; later calls are ignored and report
//! `false`. An error settles as a rejection iff it is present (`Some`).

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    task::{Context, Poll},
};

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::FlowError;

/// Creates a pending future and the handle that settles it.
pub fn settlable<T, E>() -> (Settler<T, E>, Settled<T, E>) {
    let (tx, rx) = oneshot::channel();
    let settler = Settler {
        slot: Arc::new(Mutex::new(Some(tx))),
    };
    (settler, Settled { rx })
}

/// Producer half. Cheap to clone; every clone settles the same future.
pub struct Settler<T, E> {
    slot: Arc<Mutex<Option<oneshot::Sender<Result<T, E>>>>>,
}

impl<T, E> Clone for Settler<T, E> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T, E> Settler<T, E> {
    /// Settles with `outcome`. Returns `false` if the future was already settled.
    pub fn settle(&self, outcome: Result<T, E>) -> bool {
        let tx = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match tx {
            Some(tx) => {
                // A dropped consumer still counts as settled.
                let _ = tx.send(outcome);
                true
            }
            None => {
                trace!("ignoring repeated settlement");
                false
            }
        }
    }

    /// Rejects with `err` when present, otherwise fulfils with `value`.
    pub fn settle_parts(&self, err: Option<E>, value: T) -> bool {
        match err {
            Some(err) => self.settle(Err(err)),
            None => self.settle(Ok(value)),
        }
    }

    #[inline]
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    #[inline]
    pub fn reject(&self, err: E) -> bool {
        self.settle(Err(err))
    }

    pub fn is_settled(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Consumer half; resolves to the settled outcome.
///
/// If every [`Settler`] is dropped while still pending the future fails with
/// [`FlowError::Abandoned`].
#[must_use = "a settled future does nothing unless awaited"]
pub struct Settled<T, E> {
    rx: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> Settled<T, E> {
    /// A future that is already rejected.
    pub fn rejected(err: E) -> Self {
        let (settler, settled) = settlable();
        settler.reject(err);
        settled
    }

    /// A future that is already fulfilled.
    pub fn resolved(value: T) -> Self {
        let (settler, settled) = settlable();
        settler.resolve(value);
        settled
    }
}

impl<T, E> Future for Settled<T, E>
where
    E: From<FlowError>,
{
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(FlowError::Abandoned.into())),
            Poll::Pending => Poll::Pending,
        }
    }
}
