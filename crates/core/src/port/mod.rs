// Port Layer - Interfaces for external collaborators

pub mod cancel;
pub mod config_provider;
pub mod history_provider;
pub mod id_provider; // For deterministic testing
pub mod lock_provider;
pub mod task;
pub mod task_provider;
pub mod time_provider;

// Re-exports
pub use cancel::{cancel_channel, CancelSender, CancelToken};
pub use config_provider::{ConfigProvider, StaticConfigProvider};
pub use history_provider::HistoryProvider;
pub use id_provider::IdProvider;
pub use lock_provider::{InMemoryLockProvider, LockProvider};
pub use task::{ProgressCallback, Task, TaskContext, TaskError, TaskFactory, TaskResult};
pub use task_provider::{StaticTaskProvider, TaskProvider};
pub use time_provider::TimeProvider;
