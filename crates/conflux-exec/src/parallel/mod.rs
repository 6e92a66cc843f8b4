use std::{future::IntoFuture, panic};

use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

/// Outcome of [`parallel_with_errors`].
///
/// `data[i]` and `errs[i]` belong to input task `i`. `errs` is present only if
/// at least one task failed.
#[derive(Debug)]
pub struct AggregateResult<T, E> {
    pub data: Vec<Option<T>>,
    pub errs: Option<Vec<Option<E>>>,
    first_err: Option<usize>,
}

impl<T, E> AggregateResult<T, E> {
    /// Error of the failed task whose completion was observed first.
    pub fn first_err(&self) -> Option<&E> {
        let idx = self.first_err?;
        self.errs.as_ref()?.get(idx)?.as_ref()
    }

    /// Input index of the task behind [`first_err`](Self::first_err).
    #[inline]
    pub fn first_err_index(&self) -> Option<usize> {
        self.first_err
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.first_err.is_none()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All values in input order, or the first error.
    pub fn into_result(self) -> Result<Vec<T>, E> {
        if let (Some(idx), Some(mut errs)) = (self.first_err, self.errs)
            && let Some(err) = errs.get_mut(idx).and_then(Option::take)
        {
            return Err(err);
        }
        Ok(self.data.into_iter().flatten().collect())
    }
}

/// Set whose tasks are detached, not aborted, when it is dropped.
struct Detached<T: 'static>(JoinSet<T>);

impl<T: 'static> Drop for Detached<T> {
    fn drop(&mut self) {
        if !self.0.is_empty() {
            debug!(running = self.0.len(), "caller stopped waiting; detaching parallel tasks");
        }
        self.0.detach_all();
    }
}

/// Runs every task concurrently and waits for all of them.
///
/// Never short-circuits: successful values are kept next to the failures of
/// sibling tasks. A panicking task is resumed in the caller once the others
/// have settled. Dropping the returned future leaves started tasks running.
#[instrument(level = "debug", skip_all)]
pub async fn parallel_with_errors<I, F, T, E>(tasks: I) -> AggregateResult<T, E>
where
    I: IntoIterator<Item = F>,
    F: IntoFuture<Output = Result<T, E>>,
    F::IntoFuture: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let mut set = Detached(JoinSet::new());
    let mut count = 0;
    for (idx, task) in tasks.into_iter().enumerate() {
        let fut = task.into_future();
        set.0.spawn(async move { (idx, fut.await) });
        count += 1;
    }

    let mut data: Vec<Option<T>> = (0..count).map(|_| None).collect();
    let mut errs: Vec<Option<E>> = (0..count).map(|_| None).collect();
    let mut first_err = None;
    let mut panicked = None;

    while let Some(joined) = set.0.join_next().await {
        match joined {
            Ok((idx, Ok(value))) => data[idx] = Some(value),
            Ok((idx, Err(err))) => {
                first_err.get_or_insert(idx);
                errs[idx] = Some(err);
            }
            Err(e) if e.is_panic() => {
                if panicked.is_none() {
                    panicked = Some(e.into_panic());
                }
            }
            Err(e) => warn!(error = %e, "parallel task cancelled before settling"),
        }
    }

    if let Some(payload) = panicked {
        panic::resume_unwind(payload);
    }

    debug!(
        count,
        failed = errs.iter().filter(|e| e.is_some()).count(),
        "parallel tasks settled"
    );

    AggregateResult {
        data,
        errs: first_err.map(|_| errs),
        first_err,
    }
}

/// Like [`parallel_with_errors`] but fails with the first error, if any.
pub async fn parallel<I, F, T, E>(tasks: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: IntoFuture<Output = Result<T, E>>,
    F::IntoFuture: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    parallel_with_errors(tasks).await.into_result()
}
