use std::collections::TryReserveError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Allocation failed while reserving {bytes} bytes")]
    AllocationFailed {
        bytes: usize,
        #[source]
        source: TryReserveError,
    },
}

impl Error {
    pub(crate) fn allocation<T>(count: usize, source: TryReserveError) -> Self {
        Error::AllocationFailed {
            bytes: count.saturating_mul(std::mem::size_of::<T>()),
            source,
        }
    }

    pub fn is_allocation_failure(&self) -> bool {
        matches!(self, Error::AllocationFailed { .. })
    }
}
