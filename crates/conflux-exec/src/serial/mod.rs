//! Single-lane executor.
//!
//! Entries run one at a time, to completion, in submission order. The
//! background loop parks on a wake signal while the lane is empty and exits
//! after the stop sentinel is reached.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use conflux_core::{BoxFuture, FlowError, Settled, Settler, Task, settlable};
use tracing::{Instrument, debug, info_span, trace};

use crate::config::SerialConfig;

/// Settles an entry's future; invoked by the loop after the entry finished.
type Completion = Box<dyn FnOnce() + Send>;

enum Entry {
    Run {
        name: String,
        job: BoxFuture<Completion>,
    },
    Stop,
}

struct LaneState {
    queue: VecDeque<Entry>,
    /// Cleared once the stop sentinel has executed.
    running: bool,
    /// Cleared as soon as a stop is requested.
    accepting: bool,
    executing: bool,
    signal: Option<Settler<(), FlowError>>,
    stop_waiters: Vec<Settler<(), FlowError>>,
}

impl LaneState {
    fn push(&mut self, entry: Entry) {
        self.queue.push_back(entry);
        if let Some(signal) = self.signal.take() {
            signal.resolve(());
        }
    }

    fn request_stop(&mut self) -> bool {
        if !self.accepting {
            return false;
        }
        self.accepting = false;
        self.push(Entry::Stop);
        true
    }
}

struct Lane {
    state: Mutex<LaneState>,
}

impl Lane {
    fn lock(&self) -> MutexGuard<'_, LaneState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Step {
    Run(String, BoxFuture<Completion>),
    Park(Settled<(), FlowError>),
    Stop(Vec<Settler<(), FlowError>>),
}

/// Runs tasks strictly one after another.
///
/// A failing or panicking task only affects its own caller. Dropping the
/// executor requests a stop; already queued work still runs.
pub struct SerialExecutor {
    lane: Arc<Lane>,
}

impl SerialExecutor {
    /// # Panics
    /// Panics when called outside of a tokio runtime.
    pub fn new() -> Self {
        Self::with_config(SerialConfig::default())
    }

    /// # Panics
    /// Panics when called outside of a tokio runtime.
    pub fn with_config(cfg: SerialConfig) -> Self {
        let lane = Arc::new(Lane {
            state: Mutex::new(LaneState {
                queue: VecDeque::new(),
                running: true,
                accepting: true,
                executing: false,
                signal: None,
                stop_waiters: Vec::new(),
            }),
        });

        let span = info_span!("serial", lane = %cfg.name);
        tokio::spawn(run_lane(Arc::clone(&lane)).instrument(span));

        Self { lane }
    }

    /// Enqueues `task`; the returned future settles when that task finished.
    ///
    /// Once a stop was requested the future rejects with [`FlowError::Stopped`].
    pub fn run<T, E>(&self, task: Task<T, E>) -> Settled<T, E>
    where
        T: Send + 'static,
        E: From<FlowError> + Send + 'static,
    {
        let (settler, settled) = settlable();
        let mut st = self.lane.lock();
        if !st.accepting {
            drop(st);
            trace!(task = task.name(), "lane stopped; rejecting entry");
            settler.reject(FlowError::Stopped.into());
            return settled;
        }

        let name = task.name().to_string();
        let job: BoxFuture<Completion> = Box::pin(async move {
            let outcome = match tokio::spawn(task.run()).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => Err(FlowError::from_panic(e.into_panic().as_ref()).into()),
                Err(_) => Err(FlowError::Abandoned.into()),
            };
            Box::new(move || {
                settler.settle(outcome);
            }) as Completion
        });

        st.push(Entry::Run { name, job });
        settled
    }

    /// `true` while the lane is running and has queued or executing work.
    pub fn is_busy(&self) -> bool {
        let st = self.lane.lock();
        st.running && (!st.queue.is_empty() || st.executing)
    }

    /// Entries waiting to execute, including a pending stop sentinel.
    pub fn pending(&self) -> usize {
        self.lane.lock().queue.len()
    }

    pub fn is_running(&self) -> bool {
        self.lane.lock().running
    }

    /// Stops accepting work and resolves once everything queued before has run.
    pub fn stop(&self) -> Settled<(), FlowError> {
        let (settler, settled) = settlable();
        let mut st = self.lane.lock();
        if !st.running {
            settler.resolve(());
            return settled;
        }

        st.stop_waiters.push(settler);
        if st.request_stop() {
            debug!(pending = st.queue.len(), "stop requested");
        }
        settled
    }

    #[inline]
    pub fn destroy(&self) -> Settled<(), FlowError> {
        self.stop()
    }
}

impl Default for SerialExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SerialExecutor {
    fn drop(&mut self) {
        self.lane.lock().request_stop();
    }
}

async fn run_lane(lane: Arc<Lane>) {
    debug!("lane started");
    loop {
        let step = {
            let mut st = lane.lock();
            match st.queue.pop_front() {
                Some(Entry::Run { name, job }) => {
                    st.executing = true;
                    Step::Run(name, job)
                }
                Some(Entry::Stop) => {
                    st.running = false;
                    Step::Stop(std::mem::take(&mut st.stop_waiters))
                }
                None => {
                    let (signal, parked) = settlable();
                    st.signal = Some(signal);
                    Step::Park(parked)
                }
            }
        };

        match step {
            Step::Run(name, job) => {
                trace!(task = %name, "executing entry");
                let complete = job.await;
                lane.lock().executing = false;
                complete();
            }
            Step::Park(parked) => {
                trace!("lane idle");
                let _ = parked.await;
            }
            Step::Stop(waiters) => {
                for waiter in waiters {
                    waiter.resolve(());
                }
                break;
            }
        }
    }
    debug!("lane stopped");
}
