//! Command jobs run through the manager
#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use recur_core::application::{JobManager, Registry};
use recur_core::domain::{JobConfiguration, JobSchedule, JobStatus, SchedulerConfig};
use recur_core::port::StaticConfigProvider;
use recur_infra_system::{command_task_factory, default_env_allowlist, COMMAND_TASK_TYPE};

fn command_job(name: &str, command: &str, args: &[&str]) -> JobConfiguration {
    JobConfiguration::new(name, COMMAND_TASK_TYPE, JobSchedule::Interval { seconds: 3600 })
        .with_argument("command", serde_json::json!(command))
        .with_argument("args", serde_json::json!(args))
}

fn manager(jobs: Vec<JobConfiguration>) -> Arc<JobManager> {
    let mut registry = Registry::new();
    registry.register_task_factory(
        COMMAND_TASK_TYPE,
        command_task_factory(default_env_allowlist()),
    );
    let config = SchedulerConfig {
        jobs,
        stop_timeout_secs: 10,
        ..Default::default()
    };
    JobManager::new(Arc::new(StaticConfigProvider::new(config)), Arc::new(registry))
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_echo_output_becomes_result() {
    let manager = manager(vec![command_job("Greet", "echo", &["hello"])]);
    manager.start().await.unwrap();
    let job = manager.job("Greet").await.unwrap();

    manager.trigger("Greet").await.unwrap();
    wait_until("echo run", || job.last_status() != JobStatus::None).await;

    assert_eq!(job.last_status(), JobStatus::Completed);
    assert_eq!(job.last_result(), "hello");
    manager.stop().await;
}

#[tokio::test]
async fn test_failing_command_reports_stderr() {
    let manager = manager(vec![command_job(
        "Broken",
        "sh",
        &["-c", "echo 'disk full' >&2; exit 3"],
    )]);
    manager.start().await.unwrap();
    let job = manager.job("Broken").await.unwrap();

    job.run().await;

    assert_eq!(job.last_status(), JobStatus::Error);
    assert!(job.last_result().contains("exited with code 3"));
    assert!(job.last_result().contains("disk full"));
    assert_eq!(job.status(), JobStatus::Waiting);
    manager.stop().await;
}

#[tokio::test]
async fn test_missing_command_argument_is_error() {
    let manager = manager(vec![JobConfiguration::new(
        "Empty",
        COMMAND_TASK_TYPE,
        JobSchedule::Interval { seconds: 3600 },
    )]);
    manager.start().await.unwrap();
    let job = manager.job("Empty").await.unwrap();

    job.run().await;

    assert_eq!(job.last_status(), JobStatus::Error);
    manager.stop().await;
}

#[tokio::test]
async fn test_stop_terminates_running_command() {
    let manager = manager(vec![command_job("Sleeper", "sleep", &["30"])]);
    manager.start().await.unwrap();
    let job = manager.job("Sleeper").await.unwrap();

    manager.trigger("Sleeper").await.unwrap();
    wait_until("sleep to start", || job.status() == JobStatus::Running).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    assert!(manager.stop().await);

    assert!(started.elapsed() < Duration::from_secs(6));
    assert_eq!(job.status(), JobStatus::Stopped);
    assert_eq!(job.last_status(), JobStatus::Canceled);
    assert_eq!(manager.running_count(), 0);
}
