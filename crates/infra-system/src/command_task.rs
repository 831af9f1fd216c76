// Command task: runs one external program per job run
// Spawns isolated child processes with an allowlisted environment
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use recur_core::domain::{JobArguments, JobConfiguration};
use recur_core::port::{Task, TaskContext, TaskError, TaskFactory, TaskResult};

/// Registry key of the command task type
pub const COMMAND_TASK_TYPE: &str = "command";

/// Variables a child inherits from the scheduler's own environment
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &["PATH", "HOME", "USER", "LANG", "TZ"];

/// Time a child gets between SIGTERM and SIGKILL
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Job arguments understood by the command task
///
/// ```json
/// { "command": "tar", "args": ["-czf", "backup.tgz", "data"], "timeout_secs": 600 }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Set on top of the inherited environment
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl CommandSpec {
    pub fn from_arguments(arguments: &JobArguments) -> Result<Self, TaskError> {
        let object: serde_json::Map<String, serde_json::Value> = arguments
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let spec: CommandSpec = serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| TaskError::InvalidArguments(e.to_string()))?;

        if spec.command.trim().is_empty() {
            return Err(TaskError::InvalidArguments(
                "'command' must not be empty".to_string(),
            ));
        }
        Ok(spec)
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

pub struct CommandTask {
    spec: CommandSpec,
    env_allowlist: Arc<Vec<String>>,
    grace: Duration,
}

impl CommandTask {
    pub fn new(spec: CommandSpec, env_allowlist: Arc<Vec<String>>) -> Self {
        Self {
            spec,
            env_allowlist,
            grace: TERMINATE_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Keep only allowlisted variables of `source`
    fn inherited_env(
        &self,
        source: impl IntoIterator<Item = (String, String)>,
    ) -> HashMap<String, String> {
        source
            .into_iter()
            .filter(|(k, _)| self.env_allowlist.contains(k))
            .collect()
    }

    fn build_command(&self) -> Command {
        let mut command = Command::new(&self.spec.command);
        command
            .args(&self.spec.args)
            .env_clear()
            .envs(self.inherited_env(std::env::vars()))
            .envs(&self.spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.spec.working_dir {
            command.current_dir(dir);
        }
        command
    }

    /// SIGTERM, then wait out the grace period. Dropping the output future
    /// afterwards kills the child if it is still there.
    async fn terminate<F>(&self, pid: Option<u32>, output: Pin<&mut F>)
    where
        F: Future<Output = std::io::Result<Output>>,
    {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let Some(pid) = pid else {
                return;
            };
            info!(pid = pid, "Sending SIGTERM");
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!(pid = pid, error = %e, "SIGTERM failed");
            }
            if tokio::time::timeout(self.grace, output).await.is_err() {
                warn!(pid = pid, "Process did not exit after SIGTERM, killing");
            }
        }

        #[cfg(not(unix))]
        {
            let _ = (pid, output);
        }
    }
}

#[async_trait]
impl Task for CommandTask {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let spec = &self.spec;
        info!(
            job = %ctx.job_name(),
            command = %spec.command,
            args = ?spec.args,
            working_dir = ?spec.working_dir,
            "Starting command"
        );

        let child = self.build_command().spawn().map_err(|e| {
            TaskError::Failed(format!("Failed to spawn '{}': {}", spec.command, e))
        })?;
        let pid = child.id();

        let output = child.wait_with_output();
        tokio::pin!(output);

        let timeout = async {
            match spec.timeout() {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        let mut cancel = ctx.cancel_token();

        tokio::select! {
            result = &mut output => {
                let output = result.map_err(|e| TaskError::Failed(e.to_string()))?;
                interpret_output(&spec.command, output)
            }
            _ = cancel.cancelled() => {
                info!(job = %ctx.job_name(), "Command cancelled");
                self.terminate(pid, output.as_mut()).await;
                Err(TaskError::Canceled)
            }
            _ = timeout => {
                let secs = spec.timeout_secs.unwrap_or_default();
                warn!(job = %ctx.job_name(), timeout_secs = secs, "Command timed out");
                self.terminate(pid, output.as_mut()).await;
                Err(TaskError::Failed(format!("'{}' timed out after {}s", spec.command, secs)))
            }
        }
    }
}

/// Stdout on success, stderr on a non-zero exit
fn interpret_output(command: &str, output: Output) -> TaskResult {
    let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();

    if output.status.success() {
        debug!(command = %command, "Command succeeded");
        if stdout.is_empty() {
            return Ok(None);
        }
        return Ok(Some(serde_json::Value::String(stdout)));
    }

    let reason = match output.status.code() {
        Some(code) => format!("'{}' exited with code {}", command, code),
        None => format!("'{}' terminated by signal", command),
    };
    if stderr.is_empty() {
        Err(TaskError::Failed(reason))
    } else {
        Err(TaskError::Failed(format!("{}: {}", reason, stderr)))
    }
}

/// Factory for the `command` task type. Arguments are checked when the task
/// is constructed, so a bad job surfaces as a construction error.
pub fn command_task_factory(env_allowlist: Vec<String>) -> TaskFactory {
    let env_allowlist = Arc::new(env_allowlist);
    Arc::new(move |config: &JobConfiguration| {
        let spec = CommandSpec::from_arguments(&config.arguments)?;
        let task: Arc<dyn Task> = Arc::new(CommandTask::new(spec, Arc::clone(&env_allowlist)));
        Ok::<_, TaskError>(task)
    })
}

pub fn default_env_allowlist() -> Vec<String> {
    DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect()
}
