use std::{
    fmt,
    future::Future,
    panic,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use conflux_core::{FlowError, Task, forever, sleep_for};
use tracing::{debug, instrument, warn};

use crate::config::TimeoutConfig;

const ARMED: u8 = 0;
const CLEARED: u8 = 1;
const FIRED: u8 = 2;

/// Side effect awaited before a timeout error is reported.
#[async_trait]
pub trait OnTimeout: Send + Sync {
    async fn on_timeout(&self);
}

#[async_trait]
impl<F, Fut> OnTimeout for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn on_timeout(&self) {
        (self)().await
    }
}

/// Races an action against a deadline.
///
/// The guard moves from armed to either cleared or fired exactly once; within
/// a run, the branch that loses never settles the race. The action always runs to
/// completion on its own task, even when its result is discarded.
pub struct ActionTimeout {
    duration: Duration,
    message: String,
    on_timeout: Option<Arc<dyn OnTimeout>>,
    guard: AtomicU8,
}

impl ActionTimeout {
    pub fn new(cfg: &TimeoutConfig) -> Self {
        Self {
            duration: cfg.duration(),
            message: cfg.message.clone(),
            on_timeout: None,
            guard: AtomicU8::new(ARMED),
        }
    }

    pub fn from_millis(timeout_ms: u64) -> Self {
        Self::new(&TimeoutConfig::new(timeout_ms))
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_on_timeout(mut self, hook: impl OnTimeout + 'static) -> Self {
        self.on_timeout = Some(Arc::new(hook));
        self
    }

    #[inline]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// `true` once the deadline branch won.
    pub fn has_fired(&self) -> bool {
        self.guard.load(Ordering::Acquire) == FIRED
    }

    /// Disarms the deadline. Returns `false` if it already fired or was cleared.
    pub fn clear_timeout(&self) -> bool {
        self.transition(CLEARED).is_ok()
    }

    fn transition(&self, to: u8) -> Result<(), u8> {
        self.guard
            .compare_exchange(ARMED, to, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
    }

    /// Runs `action`, failing with [`FlowError::Timeout`] if the deadline wins.
    ///
    /// Once the guard is cleared or has fired, later runs are not raced and
    /// resolve with the action's own outcome.
    #[instrument(
        level = "debug",
        skip_all,
        fields(task = action.name(), timeout_ms = u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX))
    )]
    pub async fn run<T, E>(&self, action: Task<T, E>) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<FlowError> + Send + 'static,
    {
        let handle = tokio::spawn(action.run());
        // Set only by this call's deadline branch.
        let fired_here = AtomicBool::new(false);

        let work = async {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
                Err(_) => Err(FlowError::Abandoned.into()),
            };
            match self.transition(CLEARED) {
                Ok(()) | Err(CLEARED) => outcome,
                Err(_) if !fired_here.load(Ordering::Acquire) => outcome,
                Err(_) => forever::<Result<T, E>>().await,
            }
        };

        let deadline = async {
            if self.guard.load(Ordering::Acquire) != ARMED {
                return forever::<Result<T, E>>().await;
            }
            sleep_for(self.duration).await;
            if self.transition(FIRED).is_err() {
                return forever::<Result<T, E>>().await;
            }
            fired_here.store(true, Ordering::Release);
            warn!(message = %self.message, "deadline elapsed before action completed");
            if let Some(hook) = &self.on_timeout {
                hook.on_timeout().await;
                debug!("timeout hook finished");
            }
            let err: E = FlowError::Timeout(self.message.clone()).into();
            Err(err)
        };

        tokio::select! {
            outcome = work => outcome,
            outcome = deadline => outcome,
        }
    }
}

impl fmt::Debug for ActionTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionTimeout")
            .field("duration", &self.duration)
            .field("message", &self.message)
            .field("has_hook", &self.on_timeout.is_some())
            .field("guard", &self.guard.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use anyhow::anyhow;
    use conflux_core::sleep;

    use super::*;

    fn delayed(ms: u64, value: &'static str) -> Task<&'static str, FlowError> {
        Task::new(move || async move {
            sleep(ms).await;
            Ok(value)
        })
    }

    #[tokio::test(start_paused = true)]
    async fn action_wins_before_deadline() {
        let timeout = ActionTimeout::from_millis(50);
        assert_eq!(timeout.run(delayed(5, "done")).await, Ok("done"));
        assert!(!timeout.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_wins_with_configured_message() {
        let cfg = TimeoutConfig::new(10).with_message("sync took too long");
        let timeout = ActionTimeout::new(&cfg);

        let err = timeout.run(delayed(100, "late")).await.unwrap_err();

        assert_eq!(err, FlowError::Timeout("sync took too long".into()));
        assert_eq!(err.to_string(), "sync took too long");
        assert!(timeout.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn default_message() {
        let err = ActionTimeout::from_millis(1)
            .run(delayed(20, "late"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "timed out");
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_timeout_never_fires() {
        let timeout = ActionTimeout::from_millis(10);
        assert!(timeout.clear_timeout());
        assert!(!timeout.clear_timeout());

        assert_eq!(timeout.run(delayed(100, "slow but fine")).await, Ok("slow but fine"));
        assert!(!timeout.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_while_running() {
        let timeout = Arc::new(ActionTimeout::from_millis(10));
        let clearer = Arc::clone(&timeout);
        tokio::spawn(async move {
            sleep(5).await;
            clearer.clear_timeout();
        });

        assert_eq!(timeout.run(delayed(50, "kept")).await, Ok("kept"));
    }

    #[tokio::test(start_paused = true)]
    async fn hook_runs_before_error_is_reported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let timeout = ActionTimeout::from_millis(10).with_on_timeout(move || {
            let counter = Arc::clone(&counter);
            async move {
                sleep(5).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let err = timeout.run(delayed(100, "late")).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hook_not_called_when_action_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let timeout = ActionTimeout::from_millis(50).with_on_timeout(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        timeout.run(delayed(5, "fast")).await.unwrap();
        sleep(100).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn action_keeps_running_after_timeout() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let action = Task::<(), FlowError>::new(move || async move {
            sleep(30).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        let timeout = ActionTimeout::from_millis(10);
        assert!(timeout.run(action).await.is_err());
        assert!(!finished.load(Ordering::SeqCst));

        sleep(50).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn action_error_propagates() {
        let timeout = ActionTimeout::from_millis(50);
        let err = timeout
            .run(Task::<(), anyhow::Error>::new(|| async { Err(anyhow!("action failed")) }))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "action failed");
    }

    struct Recorder(Arc<AtomicBool>);

    #[async_trait]
    impl OnTimeout for Recorder {
        async fn on_timeout(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn trait_object_hooks() {
        let fired = Arc::new(AtomicBool::new(false));
        let timeout = ActionTimeout::from_millis(1).with_on_timeout(Recorder(Arc::clone(&fired)));

        let err = timeout.run(delayed(10, "late")).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_after_firing_resolve_with_the_action() {
        let timeout = ActionTimeout::from_millis(10);
        assert!(timeout.run(delayed(50, "late")).await.unwrap_err().is_timeout());

        let next = tokio::time::timeout(Duration::from_secs(3600), timeout.run(delayed(5, "next")))
            .await
            .expect("second run must settle");
        assert_eq!(next, Ok("next"));

        let slow = tokio::time::timeout(Duration::from_secs(3600), timeout.run(delayed(100, "slow")))
            .await
            .expect("slow run must settle");
        assert_eq!(slow, Ok("slow"));
        assert!(timeout.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn runs_after_clearing_are_not_raced() {
        let timeout = ActionTimeout::from_millis(10);
        assert_eq!(timeout.run(delayed(1, "first")).await, Ok("first"));
        assert!(!timeout.clear_timeout());

        assert_eq!(timeout.run(delayed(40, "second")).await, Ok("second"));
        assert!(!timeout.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_run_settles_when_another_fires() {
        let timeout = Arc::new(ActionTimeout::from_millis(10));
        let racer = Arc::clone(&timeout);
        let fast = tokio::spawn(async move { racer.run(delayed(20, "fast")).await });

        let slow = timeout.run(delayed(30, "slow")).await;
        let fast = fast.await.unwrap();

        let outcomes = [fast, slow];
        assert_eq!(outcomes.iter().filter(|o| o.is_err()).count(), 1);
        assert!(outcomes.contains(&Ok("fast")) || outcomes.contains(&Ok("slow")));
    }
}
