use thiserror::Error;

/// Harness-level errors.
///
/// None of these describe the device under test: a device that lacks a
/// capability produces [`TestStatus::NotSupported`](crate::TestStatus) and a
/// device that computes the wrong answer produces
/// [`TestStatus::Fail`](crate::TestStatus). An `Error` means the harness itself
/// cannot continue.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An impossible combination reached the generator or the reference model.
    #[error("internal error: {0}")]
    Internal(String),
    /// The registration tree tried to build a case that makes no sense, e.g.
    /// a bitwise operation on a float format.
    #[error("invalid test case: {0}")]
    InvalidCase(String),
    #[error("device lost: {0}")]
    DeviceLost(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Fatal errors abort the whole run instead of failing one case.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::DeviceLost(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
