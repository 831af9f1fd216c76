// Recur Infrastructure - System Adapters
// Implements: Task ("command" subprocess), TaskProvider (JSON job file)

pub mod command_task;
pub mod file_task_provider;

pub use command_task::{
    command_task_factory, default_env_allowlist, CommandSpec, CommandTask, COMMAND_TASK_TYPE,
};
pub use file_task_provider::FileTaskProvider;
