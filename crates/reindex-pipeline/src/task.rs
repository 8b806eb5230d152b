//! Helpers for running blocking collaborator calls off the async workers.

use tokio::task::JoinError;

use crate::error::ReindexError;

/// Run `f` on the blocking thread pool. A panic becomes `WorkerPanic`.
pub async fn run_blocking<T, F>(f: F) -> Result<T, ReindexError>
where
    F: FnOnce() -> Result<T, ReindexError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(join_error)?
}

pub fn join_error(err: JoinError) -> ReindexError {
    if err.is_panic() {
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        ReindexError::WorkerPanic(message)
    } else {
        ReindexError::WorkerPanic(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_blocking_returns_value() {
        let value = run_blocking(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_blocking_maps_panic() {
        let result: Result<(), ReindexError> = run_blocking(|| panic!("loader exploded")).await;
        match result {
            Err(ReindexError::WorkerPanic(msg)) => assert_eq!(msg, "loader exploded"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
