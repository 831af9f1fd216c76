//! Unit tests for the run-and-reschedule protocol

use super::*;
use crate::domain::JobSchedule;
use crate::port::history_provider::mocks::{FailingHistoryProvider, InMemoryHistoryProvider};
use crate::port::lock_provider::mocks::{DenyingLockProvider, FailingLockProvider};
use crate::port::task::mocks::{MockBehavior, MockTaskFactory};
use crate::port::time_provider::SystemTimeProvider;
use crate::port::InMemoryLockProvider;
use async_trait::async_trait;

fn env() -> JobEnvironment {
    JobEnvironment::new(Arc::new(SystemTimeProvider))
}

fn cleanup_config() -> JobConfiguration {
    JobConfiguration::new("Cleanup", "mock", JobSchedule::Interval { seconds: 30 })
}

fn bindings(factory: &Arc<MockTaskFactory>) -> JobBindings {
    JobBindings {
        factory: factory.factory(),
        lock_provider: Arc::new(InMemoryLockProvider::new()),
        history_provider: None,
    }
}

fn cleanup_job(behavior: MockBehavior) -> (Arc<Job>, Arc<MockTaskFactory>) {
    let factory = MockTaskFactory::new(behavior);
    let job = Job::new("job-1", cleanup_config(), bindings(&factory), env());
    (job, factory)
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn assert_about_30s_out(next: Option<DateTime<Utc>>) {
    let next = next.expect("next run must be set");
    let delta = next - Utc::now();
    assert!(
        delta > chrono::Duration::seconds(25) && delta <= chrono::Duration::seconds(30),
        "next run {:?} not ~30s out",
        delta
    );
}

#[tokio::test]
async fn test_cleanup_end_to_end() {
    let (job, factory) = cleanup_job(MockBehavior::Value(serde_json::json!("ok")));
    let mut events = job.env.subscribe();
    let probe = factory.probe();

    job.start();
    assert_eq!(job.status(), JobStatus::Waiting);
    assert_about_30s_out(job.next_run_at());

    job.run().await;

    assert_eq!(job.status(), JobStatus::Waiting);
    assert_eq!(job.last_status(), JobStatus::Completed);
    assert_eq!(job.last_result(), "ok");
    assert_about_30s_out(job.next_run_at());
    assert!(!job.is_busy());

    let started = events.recv().await.unwrap();
    assert_eq!(started.action, JobAction::Starting);
    let running = events.recv().await.unwrap();
    assert_eq!(running.action, JobAction::Running);
    assert_eq!(running.job_name.as_deref(), Some("Cleanup"));
    let completed = events.recv().await.unwrap();
    assert_eq!(completed.action, JobAction::Completed);
    let run = completed.run.unwrap();
    assert_eq!(run.status, JobStatus::Completed);
    assert_eq!(run.result, "ok");
    assert!(run.finished_at >= run.started_at);

    // Not keep-alive: the next access builds a fresh instance
    assert_eq!(probe.constructions(), 1);
    job.instance().unwrap();
    assert_eq!(probe.constructions(), 2);
}

#[tokio::test]
async fn test_keep_alive_reuses_instance() {
    let factory = MockTaskFactory::new(MockBehavior::Success);
    let job = Job::new(
        "job-1",
        cleanup_config().with_keep_alive(true),
        bindings(&factory),
        env(),
    );

    job.run().await;
    job.run().await;
    job.instance().unwrap();

    assert_eq!(factory.probe().runs(), 2);
    assert_eq!(factory.probe().constructions(), 1);
}

#[tokio::test]
async fn test_success_without_value_reports_completed() {
    let (job, _) = cleanup_job(MockBehavior::Success);
    job.run().await;

    assert_eq!(job.last_status(), JobStatus::Completed);
    assert_eq!(job.last_result(), DEFAULT_COMPLETED_RESULT);
}

#[tokio::test]
async fn test_progress_text_survives_empty_result() {
    let (job, _) = cleanup_job(MockBehavior::Progress(vec![
        "scanning".to_string(),
        "removed 3 files".to_string(),
    ]));
    job.run().await;

    assert_eq!(job.last_status(), JobStatus::Completed);
    assert_eq!(job.last_result(), "removed 3 files");
}

#[tokio::test]
async fn test_structured_value_is_rendered_as_json() {
    let (job, _) = cleanup_job(MockBehavior::Value(serde_json::json!({"removed": 3})));
    job.run().await;

    assert_eq!(job.last_result(), r#"{"removed":3}"#);
}

#[tokio::test]
async fn test_error_result_recorded() {
    let (job, _) = cleanup_job(MockBehavior::Fail("disk full".to_string()));
    job.start();
    job.run().await;

    assert_eq!(job.last_status(), JobStatus::Error);
    assert_eq!(job.last_result(), "disk full");
    assert_eq!(job.status(), JobStatus::Waiting);
    assert!(job.next_run_at().is_some());
}

#[tokio::test]
async fn test_panic_is_absorbed_and_job_keeps_running() {
    let (job, factory) = cleanup_job(MockBehavior::Panic("boom".to_string()));
    job.start();
    job.run().await;

    assert_eq!(job.last_status(), JobStatus::Error);
    assert_eq!(job.last_result(), "boom");
    assert_eq!(job.status(), JobStatus::Waiting);
    assert_eq!(job.env.running_count(), 0);

    factory.set_behavior(MockBehavior::Value(serde_json::json!("recovered")));
    job.run().await;
    assert_eq!(job.last_status(), JobStatus::Completed);
    assert_eq!(job.last_result(), "recovered");
}

#[tokio::test]
async fn test_factory_error_recorded_as_error() {
    let failing: TaskFactory = Arc::new(
        |_config: &JobConfiguration| -> Result<Arc<dyn Task>, TaskError> {
            Err(TaskError::Construction("no such binary".to_string()))
        },
    );
    let job = Job::new(
        "job-1",
        cleanup_config(),
        JobBindings {
            factory: failing,
            lock_provider: Arc::new(InMemoryLockProvider::new()),
            history_provider: None,
        },
        env(),
    );

    job.run().await;

    assert_eq!(job.last_status(), JobStatus::Error);
    assert!(job.last_result().contains("no such binary"));
    assert!(!job.is_busy());
}

#[tokio::test]
async fn test_lock_contention_cancels_run() {
    let factory = MockTaskFactory::new(MockBehavior::Success);
    let locks = Arc::new(DenyingLockProvider::default());
    let job = Job::new(
        "job-1",
        cleanup_config(),
        JobBindings {
            factory: factory.factory(),
            lock_provider: locks.clone(),
            history_provider: None,
        },
        env(),
    );

    job.start();
    job.run().await;

    assert_eq!(job.status(), JobStatus::Canceled);
    assert_eq!(job.last_result(), LOCK_NOT_ACQUIRED_RESULT);
    assert!(!job.is_busy());
    assert_eq!(factory.probe().runs(), 0);
    assert_eq!(locks.attempts.load(Ordering::SeqCst), 1);
    assert_about_30s_out(job.next_run_at());
}

#[tokio::test]
async fn test_lock_store_failure_treated_as_contention() {
    let factory = MockTaskFactory::new(MockBehavior::Success);
    let job = Job::new(
        "job-1",
        cleanup_config(),
        JobBindings {
            factory: factory.factory(),
            lock_provider: Arc::new(FailingLockProvider),
            history_provider: None,
        },
        env(),
    );

    job.run().await;

    assert_eq!(job.last_status(), JobStatus::Canceled);
    assert_eq!(factory.probe().runs(), 0);
}

#[tokio::test]
async fn test_lock_released_after_run() {
    let factory = MockTaskFactory::new(MockBehavior::Success);
    let locks = Arc::new(InMemoryLockProvider::new());
    let job = Job::new(
        "job-1",
        cleanup_config(),
        JobBindings {
            factory: factory.factory(),
            lock_provider: locks.clone(),
            history_provider: None,
        },
        env(),
    );

    job.run().await;

    assert!(!locks.is_held("Cleanup"));
}

#[tokio::test]
async fn test_run_async_twice_while_running_executes_once() {
    let (job, factory) = cleanup_job(MockBehavior::Sleep(Duration::from_millis(300)));
    let probe = factory.probe();

    job.run_async();
    wait_until("first run", || job.is_busy()).await;

    job.run_async();
    job.run_async();
    wait_until("run to finish", || !job.is_busy()).await;
    tokio::time::sleep(RUN_ASYNC_DELAY * 4).await;

    assert_eq!(probe.runs(), 1);
    assert_eq!(job.last_status(), JobStatus::Completed);
}

#[tokio::test]
async fn test_stop_with_cancel_signals_running_task() {
    let (job, factory) = cleanup_job(MockBehavior::UntilCancelled);
    let probe = factory.probe();

    job.start();
    job.run_async();
    wait_until("task to start", || probe.runs() == 1).await;
    assert_eq!(job.status(), JobStatus::Running);
    assert_eq!(job.env.running_count(), 1);

    job.stop(true);
    assert_eq!(job.status(), JobStatus::Stopped);
    assert_eq!(probe.cancels(), 1);

    wait_until("cancelled run to finish", || !job.is_busy()).await;
    assert_eq!(job.status(), JobStatus::Stopped);
    assert_eq!(job.last_result(), "canceled");
    assert_eq!(job.env.running_count(), 0);
    assert!(job.next_run_at().is_none());
}

#[tokio::test]
async fn test_stop_without_cancel_lets_run_finish() {
    let (job, factory) = cleanup_job(MockBehavior::Sleep(Duration::from_millis(100)));
    let probe = factory.probe();

    job.start();
    job.run_async();
    wait_until("task to start", || probe.runs() == 1).await;

    job.stop(false);
    assert_eq!(probe.cancels(), 0);

    wait_until("run to finish", || !job.is_busy()).await;
    assert_eq!(job.last_status(), JobStatus::Completed);
    assert_eq!(job.status(), JobStatus::Stopped);
    assert!(job.next_run_at().is_none());
}

#[tokio::test]
async fn test_start_is_noop_while_busy_and_rearms_after() {
    let (job, factory) = cleanup_job(MockBehavior::Sleep(Duration::from_millis(100)));
    let probe = factory.probe();

    job.run_async();
    wait_until("task to start", || probe.runs() == 1).await;
    job.start();
    assert_eq!(job.status(), JobStatus::Running);

    wait_until("run to finish", || !job.is_busy()).await;
    assert_eq!(job.status(), JobStatus::Waiting);
    assert_about_30s_out(job.next_run_at());
}

#[tokio::test]
async fn test_short_interval_fires_repeatedly() {
    let factory = MockTaskFactory::new(MockBehavior::Success);
    let job = Job::new(
        "job-1",
        JobConfiguration::new("Tick", "mock", JobSchedule::Interval { seconds: 1 }),
        bindings(&factory),
        env(),
    );
    let probe = factory.probe();

    job.start();
    wait_until("two fires", || probe.runs() >= 2).await;
    job.stop(false);
}

#[tokio::test]
async fn test_time_of_day_never_run_catches_up() {
    let factory = MockTaskFactory::new(MockBehavior::Success);
    let job = Job::new(
        "job-1",
        JobConfiguration::new("Nightly", "mock", JobSchedule::daily_at(2, 0, 0).unwrap()),
        bindings(&factory),
        env(),
    );

    job.start();
    let delta = job.next_run_at().unwrap() - Utc::now();
    assert!(delta <= chrono::Duration::seconds(10));
    assert!(delta > chrono::Duration::seconds(5));
    job.stop(false);
}

#[tokio::test]
async fn test_history_round_trip() {
    let history = Arc::new(InMemoryHistoryProvider::new());
    let factory = MockTaskFactory::new(MockBehavior::Value(serde_json::json!("ok")));
    let make_job = || {
        Job::new(
            "job-1",
            cleanup_config().with_history_provider("memory"),
            JobBindings {
                factory: factory.factory(),
                lock_provider: Arc::new(InMemoryLockProvider::new()),
                history_provider: Some(history.clone()),
            },
            env(),
        )
    };

    let first = make_job();
    first.run().await;
    assert_eq!(history.save_count(), 1);

    let second = make_job();
    assert_eq!(second.last_status(), JobStatus::None);
    second.restore_history().await;

    assert_eq!(second.last_result(), "ok");
    assert_eq!(second.last_status(), JobStatus::Completed);
    assert_eq!(second.last_run_started_at(), first.last_run_started_at());
    assert_eq!(second.last_run_finished_at(), first.last_run_finished_at());
}

#[tokio::test]
async fn test_history_failure_does_not_affect_run() {
    let history = Arc::new(FailingHistoryProvider::default());
    let factory = MockTaskFactory::new(MockBehavior::Success);
    let job = Job::new(
        "job-1",
        cleanup_config(),
        JobBindings {
            factory: factory.factory(),
            lock_provider: Arc::new(InMemoryLockProvider::new()),
            history_provider: Some(history.clone()),
        },
        env(),
    );

    job.restore_history().await;
    job.start();
    job.run().await;

    assert_eq!(history.saves.load(Ordering::SeqCst), 1);
    assert_eq!(job.last_status(), JobStatus::Completed);
    assert_eq!(job.status(), JobStatus::Waiting);
}

struct ContextRecorder {
    seen: Mutex<Vec<(String, Option<serde_json::Value>, JobStatus, bool)>>,
}

#[async_trait]
impl Task for ContextRecorder {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        self.seen.lock().unwrap().push((
            ctx.description().to_string(),
            ctx.argument("path").cloned(),
            ctx.last_status(),
            ctx.last_run_time().is_some(),
        ));
        Ok(None)
    }
}

#[tokio::test]
async fn test_context_carries_arguments_and_previous_outcome() {
    let recorder = Arc::new(ContextRecorder {
        seen: Mutex::new(Vec::new()),
    });
    let shared = recorder.clone();
    let factory: TaskFactory = Arc::new(
        move |_config: &JobConfiguration| -> Result<Arc<dyn Task>, TaskError> {
            let task: Arc<dyn Task> = shared.clone();
            Ok(task)
        },
    );
    let job = Job::new(
        "job-1",
        cleanup_config()
            .with_description("Remove temp files")
            .with_argument("path", serde_json::json!("/tmp")),
        JobBindings {
            factory,
            lock_provider: Arc::new(InMemoryLockProvider::new()),
            history_provider: None,
        },
        env(),
    );

    job.run().await;
    job.run().await;

    let seen = recorder.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[0],
        (
            "Remove temp files".to_string(),
            Some(serde_json::json!("/tmp")),
            JobStatus::None,
            false
        )
    );
    assert_eq!(seen[1].2, JobStatus::Completed);
    assert!(seen[1].3);
}

#[tokio::test]
async fn test_snapshot_reflects_state() {
    let (job, _) = cleanup_job(MockBehavior::Value(serde_json::json!("ok")));
    job.start();
    job.run().await;

    let snapshot = job.snapshot();
    assert_eq!(snapshot.id, "job-1");
    assert_eq!(snapshot.name, "Cleanup");
    assert_eq!(snapshot.status, JobStatus::Waiting);
    assert_eq!(snapshot.last_result, "ok");
    assert!(!snapshot.is_busy);
    assert!(snapshot.next_run_at.is_some());
}

/// Holds every history save open until released
#[derive(Default)]
struct GatedHistoryProvider {
    saving: AtomicBool,
    release: tokio::sync::Notify,
}

#[async_trait]
impl HistoryProvider for GatedHistoryProvider {
    async fn restore_history(&self, _job_name: &str) -> crate::error::Result<Option<JobHistory>> {
        Ok(None)
    }

    async fn save_history(&self, _history: &JobHistory) -> crate::error::Result<()> {
        self.saving.store(true, Ordering::SeqCst);
        self.release.notified().await;
        self.saving.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_status_shows_outcome_until_rearmed() {
    let cases = [
        (MockBehavior::Success, JobStatus::Completed),
        (MockBehavior::Fail("disk full".to_string()), JobStatus::Error),
    ];
    for (behavior, expected) in cases {
        let history = Arc::new(GatedHistoryProvider::default());
        let factory = MockTaskFactory::new(behavior);
        let job = Job::new(
            "job-1",
            cleanup_config(),
            JobBindings {
                factory: factory.factory(),
                lock_provider: Arc::new(InMemoryLockProvider::new()),
                history_provider: Some(history.clone()),
            },
            env(),
        );
        job.start();

        let run = tokio::spawn({
            let job = job.clone();
            async move { job.run().await }
        });
        wait_until("history save", || history.saving.load(Ordering::SeqCst)).await;

        assert_eq!(job.status(), expected);
        assert_eq!(job.last_status(), expected);
        assert!(job.is_busy());

        history.release.notify_one();
        run.await.unwrap();

        assert_eq!(job.status(), JobStatus::Waiting);
        assert_eq!(job.last_status(), expected);
        assert!(!job.is_busy());
    }
}

#[tokio::test]
async fn test_stale_timer_fire_is_ignored() {
    let (job, factory) = cleanup_job(MockBehavior::Success);
    job.start();
    let armed_for = job.next_run_at();
    let stale = job.timer_seq.load(Ordering::SeqCst) + 100;

    job.clone().fire(stale).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(factory.probe().runs(), 0);
    assert!(!job.is_busy());
    assert_eq!(job.next_run_at(), armed_for);
    assert!(job.lock_timer().is_some());
}

#[tokio::test]
async fn test_aborted_timer_fire_still_finishes_run() {
    let (job, factory) = cleanup_job(MockBehavior::Sleep(Duration::from_millis(200)));
    let probe = factory.probe();
    job.start();
    let seq = job
        .lock_timer()
        .as_ref()
        .map(|timer| timer.seq)
        .expect("timer armed");

    let fire = tokio::spawn(job.clone().fire(seq));
    wait_until("run to start", || probe.runs() == 1).await;
    fire.abort();

    wait_until("run to finish", || !job.is_busy()).await;
    assert_eq!(job.env.running_count(), 0);
    assert_eq!(job.last_status(), JobStatus::Completed);
    assert_eq!(job.status(), JobStatus::Waiting);

    // Lock was released and the gate is free
    job.run().await;
    assert_eq!(probe.runs(), 2);
    assert_eq!(job.last_status(), JobStatus::Completed);
}

#[tokio::test]
async fn test_dropped_run_future_still_finishes_run() {
    let (job, factory) = cleanup_job(MockBehavior::Sleep(Duration::from_millis(200)));
    let probe = factory.probe();
    job.start();

    let timed_out = tokio::time::timeout(Duration::from_millis(50), job.run()).await;
    assert!(timed_out.is_err());
    assert!(job.is_busy());

    wait_until("run to finish", || !job.is_busy()).await;
    assert_eq!(job.env.running_count(), 0);
    assert_eq!(job.last_status(), JobStatus::Completed);

    job.run().await;
    assert_eq!(probe.runs(), 2);
}

/// Keeps a clone of its run context past the end of the run
struct ContextKeeper {
    kept: Mutex<Option<TaskContext>>,
}

#[async_trait]
impl Task for ContextKeeper {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        ctx.update_status("working");
        *self.kept.lock().unwrap() = Some(ctx.clone());
        Ok(Some(serde_json::json!("done")))
    }
}

#[tokio::test]
async fn test_progress_after_run_is_ignored() {
    let keeper = Arc::new(ContextKeeper {
        kept: Mutex::new(None),
    });
    let shared = keeper.clone();
    let factory: TaskFactory = Arc::new(
        move |_config: &JobConfiguration| -> Result<Arc<dyn Task>, TaskError> {
            let task: Arc<dyn Task> = shared.clone();
            Ok(task)
        },
    );
    let job = Job::new(
        "job-1",
        cleanup_config(),
        JobBindings {
            factory,
            lock_provider: Arc::new(InMemoryLockProvider::new()),
            history_provider: None,
        },
        env(),
    );

    job.run().await;
    assert_eq!(job.last_result(), "done");

    let stale_ctx = keeper.kept.lock().unwrap().take().expect("context kept");
    stale_ctx.update_status("late write");

    assert_eq!(job.last_result(), "done");
}
