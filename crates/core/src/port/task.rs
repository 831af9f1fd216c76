// Task Port
// The unit of work a job runs. Implementations are supplied by users and
// resolved by task type through the registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use super::cancel::CancelToken;
use crate::domain::{JobArguments, JobConfiguration, JobStatus};

/// Errors a task reports as its outcome
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Task canceled")]
    Canceled,

    #[error("Task construction failed: {0}")]
    Construction(String),
}

/// `Ok(None)`: success without a value.
/// `Ok(Some(v))`: success, `v` becomes the job's result text.
/// `Err(e)`: the run ends in `Error` with `e` as the result text.
pub type TaskResult = Result<Option<serde_json::Value>, TaskError>;

/// Builds a task instance for a job configuration
pub type TaskFactory =
    Arc<dyn Fn(&JobConfiguration) -> Result<Arc<dyn Task>, TaskError> + Send + Sync>;

/// Called by a task with interim status text
pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[async_trait]
pub trait Task: Send + Sync {
    /// Execute one run. Long-running tasks should watch `ctx.cancel_token()`.
    async fn run(&self, ctx: &TaskContext) -> TaskResult;

    /// Cooperative cancellation hook, invoked when the job is stopped with
    /// cancel while this instance is running
    fn cancel(&self) {}
}

/// Everything a task sees about the run it is executing
#[derive(Clone)]
pub struct TaskContext {
    job_name: String,
    description: String,
    arguments: JobArguments,
    last_run_time: Option<DateTime<Utc>>,
    last_status: JobStatus,
    cancel: CancelToken,
    progress: Option<ProgressCallback>,
}

impl TaskContext {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            description: String::new(),
            arguments: JobArguments::new(),
            last_run_time: None,
            last_status: JobStatus::None,
            cancel: CancelToken::never(),
            progress: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_arguments(mut self, arguments: JobArguments) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_last_run(mut self, last_run_time: Option<DateTime<Utc>>, last_status: JobStatus) -> Self {
        self.last_run_time = last_run_time;
        self.last_status = last_status;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn arguments(&self) -> &JobArguments {
        &self.arguments
    }

    pub fn argument(&self, key: &str) -> Option<&serde_json::Value> {
        self.arguments.get(key)
    }

    pub fn argument_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }

    pub fn last_run_time(&self) -> Option<DateTime<Utc>> {
        self.last_run_time
    }

    pub fn last_status(&self) -> JobStatus {
        self.last_status
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Replace the job's last-result text while the run is in progress;
    /// ignored once the run has returned
    pub fn update_status(&self, text: &str) {
        if let Some(progress) = &self.progress {
            progress(text);
        }
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock task behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Return `Ok(None)`
        Success,
        /// Return `Ok(Some(value))`
        Value(serde_json::Value),
        /// Report each progress text, then return `Ok(None)`
        Progress(Vec<String>),
        /// Return `Err(TaskError::Failed)`
        Fail(String),
        /// Panic with message (for fault isolation testing)
        Panic(String),
        /// Run until cancelled, then return `Ok(Some("canceled"))`
        UntilCancelled,
        /// Sleep without looking at the cancel token, then succeed
        Sleep(Duration),
    }

    /// Counters shared by every instance a `MockTaskFactory` builds
    #[derive(Debug, Default)]
    pub struct MockTaskProbe {
        pub constructions: AtomicUsize,
        pub runs: AtomicUsize,
        pub cancels: AtomicUsize,
    }

    impl MockTaskProbe {
        pub fn constructions(&self) -> usize {
            self.constructions.load(Ordering::SeqCst)
        }

        pub fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }

        pub fn cancels(&self) -> usize {
            self.cancels.load(Ordering::SeqCst)
        }
    }

    /// Mock Task for testing
    pub struct MockTask {
        behavior: MockBehavior,
        probe: Arc<MockTaskProbe>,
    }

    impl MockTask {
        pub fn new(behavior: MockBehavior, probe: Arc<MockTaskProbe>) -> Self {
            Self { behavior, probe }
        }
    }

    #[async_trait]
    impl Task for MockTask {
        async fn run(&self, ctx: &TaskContext) -> TaskResult {
            self.probe.runs.fetch_add(1, Ordering::SeqCst);

            match &self.behavior {
                MockBehavior::Success => Ok(None),
                MockBehavior::Value(value) => Ok(Some(value.clone())),
                MockBehavior::Progress(steps) => {
                    for step in steps {
                        ctx.update_status(step);
                    }
                    Ok(None)
                }
                MockBehavior::Fail(msg) => Err(TaskError::Failed(msg.clone())),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for fault isolation testing
                }
                MockBehavior::UntilCancelled => {
                    ctx.cancel_token().cancelled().await;
                    Ok(Some(serde_json::json!("canceled")))
                }
                MockBehavior::Sleep(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(None)
                }
            }
        }

        fn cancel(&self) {
            self.probe.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Builds `MockTask`s with a switchable behavior
    pub struct MockTaskFactory {
        behavior: Mutex<MockBehavior>,
        probe: Arc<MockTaskProbe>,
    }

    impl MockTaskFactory {
        pub fn new(behavior: MockBehavior) -> Arc<Self> {
            Arc::new(Self {
                behavior: Mutex::new(behavior),
                probe: Arc::new(MockTaskProbe::default()),
            })
        }

        pub fn probe(&self) -> Arc<MockTaskProbe> {
            Arc::clone(&self.probe)
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        pub fn factory(self: &Arc<Self>) -> TaskFactory {
            let this = Arc::clone(self);
            Arc::new(move |_config: &JobConfiguration| {
                this.probe.constructions.fetch_add(1, Ordering::SeqCst);
                let behavior = this.behavior.lock().unwrap().clone();
                let task: Arc<dyn Task> = Arc::new(MockTask::new(behavior, Arc::clone(&this.probe)));
                Ok::<_, TaskError>(task)
            })
        }
    }
}
