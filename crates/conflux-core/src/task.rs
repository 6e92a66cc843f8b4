use std::{
    borrow::Cow,
    fmt,
    future::{Future, IntoFuture},
    pin::Pin,
};

/// Boxed, sendable future used wherever task types are erased.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type RunFn<T, E> = Box<dyn FnOnce() -> BoxFuture<Result<T, E>> + Send>;

/// Deferred unit of work.
///
/// Nothing runs until the task is invoked through [`Task::run`] or `.await`.
/// Arguments are captured by the closure at construction time.
///
/// ```
/// use conflux_core::Task;
///
/// # async fn demo() -> Result<(), anyhow::Error> {
/// let n = 20;
/// let task = Task::named("double", move || async move { Ok::<_, anyhow::Error>(n * 2) });
/// assert_eq!(task.await?, 40);
/// # Ok(())
/// # }
/// ```
pub struct Task<T, E> {
    name: Cow<'static, str>,
    run: RunFn<T, E>,
}

impl<T, E> Task<T, E>
where
    T: 'static,
    E: 'static,
{
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::named("task", f)
    }

    /// Task carrying a name used in tracing spans.
    pub fn named<F, Fut>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(move || Box::pin(f()) as BoxFuture<Result<T, E>>),
        }
    }

    /// Wraps an existing future. It is only polled once the task runs.
    pub fn from_future<Fut>(fut: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::new(move || fut)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the task.
    pub fn run(self) -> BoxFuture<Result<T, E>> {
        (self.run)()
    }
}

impl<T, E> IntoFuture for Task<T, E>
where
    T: 'static,
    E: 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = BoxFuture<Result<T, E>>;

    fn into_future(self) -> Self::IntoFuture {
        self.run()
    }
}

impl<T, E> fmt::Debug for Task<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("name", &self.name).finish()
    }
}
