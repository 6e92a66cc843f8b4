//! Coordinators for groups of async tasks.
//!
//! | Primitive                 | Ordering                                   | Failure behaviour                          |
//! |---------------------------|--------------------------------------------|--------------------------------------------|
//! | [`parallel_with_errors`]  | all at once, index-stable results          | collects every error, never short-circuits |
//! | [`ParallelQueue`]         | FIFO dequeue, bounded worker loops         | first worker error is returned             |
//! | [`SerialExecutor`]        | strict FIFO, one task at a time            | each caller sees only its own outcome      |
//! | [`ActionTimeout`]         | action raced against a deadline            | synthetic `FlowError::Timeout`             |
//! | [`ignore_error`]          | n/a                                        | allow-listed errors become `None`          |
//!
//! Everything runs on tokio; constructors that spawn must be called inside a runtime.

mod config;
pub use config::{QueueConfig, SerialConfig, TimeoutConfig};

pub mod parallel;
pub use parallel::{AggregateResult, parallel, parallel_with_errors};

pub mod queue;
pub use queue::{ParallelQueue, ResultMap};

pub mod serial;
pub use serial::SerialExecutor;

pub mod timeout;
pub use timeout::{ActionTimeout, OnTimeout};

mod ignore;
pub use ignore::ignore_error;

pub mod bridge;

pub mod prelude {
    pub use crate::bridge::{Callback, PanicSink, unwrap_bind, wrap, wrap_with_sink};
    pub use crate::{
        ActionTimeout, AggregateResult, OnTimeout, ParallelQueue, QueueConfig, SerialConfig,
        SerialExecutor, TimeoutConfig, ignore_error, parallel, parallel_with_errors,
    };
    pub use conflux_core::prelude::*;
}
