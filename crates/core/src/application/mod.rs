// Application Layer - scheduling use cases

pub mod job;
pub mod manager;
pub mod registry;
pub mod schedule;

// Re-exports
pub use job::{Job, JobEnvironment};
pub use manager::JobManager;
pub use registry::{JobBindings, Registry};
