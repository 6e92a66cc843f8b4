mod error;
pub use error::{FlowError, FlowResult, error_to_string};

pub mod settle;
pub use settle::{Settled, Settler, settlable};

pub mod task;
pub use task::{BoxFuture, Task};

pub mod time;
pub use time::{forever, sleep, sleep_for};

/// Timeout value in milliseconds.
pub type TimeoutMs = u64;

pub mod prelude {
    pub use crate::error::{FlowError, FlowResult, error_to_string};
    pub use crate::settle::{Settled, Settler, settlable};
    pub use crate::task::Task;
    pub use crate::time::{forever, sleep, sleep_for};
}
