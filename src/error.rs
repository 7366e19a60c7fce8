use thiserror::Error;

/// Failure reported by (or while talking to) the execution gateway.
/// The engine treats every variant as "no state change".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("gateway call timed out after {0}ms")]
    Timeout(u64),

    #[error("unknown position handle {0}")]
    UnknownHandle(u64),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// Performance store read/write failure.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("performance store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("performance store format error: {0}")]
    Format(#[from] serde_json::Error),
}

pub type ExecResult<T> = std::result::Result<T, ExecutionError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_readable() {
        assert_eq!(
            ExecutionError::Timeout(250).to_string(),
            "gateway call timed out after 250ms"
        );
        let err: StoreError = serde_json::from_str::<Vec<u8>>("{").unwrap_err().into();
        assert!(err.to_string().starts_with("performance store format error"));
    }
}
