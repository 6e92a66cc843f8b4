use std::{any::TypeId, fmt::Display};

use thiserror::Error;

/// Fallback text for errors whose display form is empty.
const UNKNOWN: &str = "<unknown>";

/// Errors synthesised by the coordinators themselves.
///
/// Task failures keep the caller's error type; coordinators that need to report
/// their own conditions require `E: From<FlowError>`, which holds for `FlowError`,
/// `anyhow::Error` and any enum carrying a `#[from] FlowError` variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Deadline elapsed; carries the configured message verbatim.
    #[error("{0}")]
    Timeout(String),
    #[error("executor stopped")]
    Stopped,
    #[error("future dropped before it was settled")]
    Abandoned,
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl FlowError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FlowError::Timeout(_))
    }

    /// Builds a `Panicked` error from a panic payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| UNKNOWN.to_string());
        FlowError::Panicked(msg)
    }
}

pub type FlowResult<T> = Result<T, FlowError>;

/// Renders an error of any shape as text for matching.
///
/// Strings render as themselves, empty ones included. Error types render as
/// their message; an error with an empty message becomes `"<unknown>"`.
pub fn error_to_string<E>(err: &E) -> String
where
    E: Display + ?Sized + 'static,
{
    let text = err.to_string();
    if text.is_empty() && !is_string::<E>() {
        return UNKNOWN.to_string();
    }
    text
}

fn is_string<E: ?Sized + 'static>() -> bool {
    let id = TypeId::of::<E>();
    id == TypeId::of::<str>()
        || id == TypeId::of::<&'static str>()
        || id == TypeId::of::<String>()
        || id == TypeId::of::<Box<str>>()
}
