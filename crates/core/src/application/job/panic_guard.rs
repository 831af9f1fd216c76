// Fault isolation for task code: a panicking task must not take the
// scheduler down
use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, UnwindSafe};
use tracing::error;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed successfully
    Success(T),
    /// Execution panicked
    Panicked(String),
}

/// Extract a readable message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Execute a closure with panic isolation
///
/// # Example
/// ```text
/// let result = execute_guarded(|| factory(&config));
/// ```
pub fn execute_guarded<F, T>(f: F) -> PanicGuardResult<T>
where
    F: FnOnce() -> T + UnwindSafe,
{
    match catch_unwind(f) {
        Ok(result) => PanicGuardResult::Success(result),
        Err(payload) => {
            let panic_msg = panic_message(payload.as_ref());
            error!(panic_msg = %panic_msg, "Guarded call panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}

/// Execute a future on its own tokio task so a panic surfaces as a
/// `JoinError` instead of unwinding through the caller
pub async fn execute_guarded_async<F, T>(future: F) -> PanicGuardResult<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(future).await {
        Ok(result) => PanicGuardResult::Success(result),
        Err(join_err) if join_err.is_panic() => {
            let payload = join_err.into_panic();
            let panic_msg = panic_message(payload.as_ref());
            error!(panic_msg = %panic_msg, "Task panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
        Err(join_err) => PanicGuardResult::Panicked(format!("Task aborted: {}", join_err)),
    }
}
