// Job - one independently timed unit of recurring work
//
// Owns its timer, its run-state and the run-and-reschedule protocol. Each
// armed timer is a one-shot tokio task; the protocol re-arms a fresh one
// after every run.

pub mod constants;
mod panic_guard;

use panic_guard::{execute_guarded, execute_guarded_async, PanicGuardResult};

use chrono::{DateTime, Local, Utc};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::registry::JobBindings;
use super::schedule;
use constants::*;
use crate::domain::{
    JobAction, JobConfiguration, JobEvent, JobHistory, JobId, JobLock, JobSnapshot, JobStatus,
    RunSummary,
};
use crate::port::{
    cancel_channel, CancelSender, HistoryProvider, LockProvider, Task, TaskContext, TaskError,
    TaskFactory, TaskResult, TimeProvider,
};

/// Collaborators shared by every job of a manager
#[derive(Clone)]
pub struct JobEnvironment {
    pub time_provider: Arc<dyn TimeProvider>,
    pub events: broadcast::Sender<JobEvent>,
    /// Jobs currently inside a run
    pub running: Arc<AtomicUsize>,
}

impl JobEnvironment {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            time_provider,
            events,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn running_count(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: JobEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[derive(Debug, Default)]
struct RunState {
    status: JobStatus,
    last_status: JobStatus,
    last_result: String,
    last_run_started_at: Option<DateTime<Utc>>,
    last_run_finished_at: Option<DateTime<Utc>>,
    next_run_at: Option<DateTime<Utc>>,
}

struct ArmedTimer {
    seq: u64,
    handle: JoinHandle<()>,
}

/// Cancellation handles for the run in progress
struct ActiveRun {
    cancel: CancelSender,
    task: Arc<dyn Task>,
}

pub struct Job {
    id: JobId,
    config: JobConfiguration,
    factory: TaskFactory,
    lock_provider: Arc<dyn LockProvider>,
    history_provider: Option<Arc<dyn HistoryProvider>>,
    env: JobEnvironment,

    /// Started and not stopped; completion only re-arms while set
    enabled: AtomicBool,
    busy: AtomicBool,
    run_gate: tokio::sync::Mutex<()>,
    state: Arc<RwLock<RunState>>,
    instance: Mutex<Option<Arc<dyn Task>>>,
    active_run: Mutex<Option<ActiveRun>>,
    timer: Mutex<Option<ArmedTimer>>,
    timer_seq: AtomicU64,
    this: Weak<Job>,
}

impl Job {
    pub fn new(
        id: impl Into<JobId>,
        config: JobConfiguration,
        bindings: JobBindings,
        env: JobEnvironment,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: id.into(),
            config,
            factory: bindings.factory,
            lock_provider: bindings.lock_provider,
            history_provider: bindings.history_provider,
            env,
            enabled: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            run_gate: tokio::sync::Mutex::new(()),
            state: Arc::new(RwLock::new(RunState::default())),
            instance: Mutex::new(None),
            active_run: Mutex::new(None),
            timer: Mutex::new(None),
            timer_seq: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn group(&self) -> &str {
        &self.config.group
    }

    pub fn description(&self) -> &str {
        &self.config.description
    }

    pub fn configuration(&self) -> &JobConfiguration {
        &self.config
    }

    pub fn status(&self) -> JobStatus {
        self.read_state().status
    }

    pub fn last_status(&self) -> JobStatus {
        self.read_state().last_status
    }

    pub fn last_result(&self) -> String {
        self.read_state().last_result.clone()
    }

    pub fn last_run_started_at(&self) -> Option<DateTime<Utc>> {
        self.read_state().last_run_started_at
    }

    pub fn last_run_finished_at(&self) -> Option<DateTime<Utc>> {
        self.read_state().last_run_finished_at
    }

    pub fn next_run_at(&self) -> Option<DateTime<Utc>> {
        self.read_state().next_run_at
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.read_state();
        JobSnapshot {
            id: self.id.clone(),
            name: self.config.name.clone(),
            group: self.config.group.clone(),
            description: self.config.description.clone(),
            status: state.status,
            last_status: state.last_status,
            last_result: state.last_result.clone(),
            last_run_started_at: state.last_run_started_at,
            last_run_finished_at: state.last_run_finished_at,
            next_run_at: state.next_run_at,
            is_busy: self.is_busy(),
        }
    }

    /// Arm the timer for the first fire and move to `Waiting`.
    ///
    /// While a run is in progress only the enabled flag is restored; the run
    /// re-arms on completion.
    pub fn start(&self) {
        self.enabled.store(true, Ordering::SeqCst);
        if self.is_busy() {
            debug!(job = %self.name(), "Start requested while running");
            return;
        }

        self.env.emit(JobEvent::job(self.name(), JobAction::Starting));
        self.write_state().status = JobStatus::Waiting;
        let delay = self.next_delay();
        self.arm(delay);

        info!(
            job = %self.name(),
            next_run_at = ?self.next_run_at(),
            "Job started"
        );
    }

    /// Disarm the timer. With `cancel`, a run in progress is asked to stop;
    /// it is never killed.
    pub fn stop(&self, cancel: bool) {
        self.enabled.store(false, Ordering::SeqCst);
        self.env.emit(JobEvent::job(self.name(), JobAction::Stopping));
        self.disarm();

        if cancel && self.is_busy() {
            if let Some(active) = self.lock_active_run().as_ref() {
                info!(job = %self.name(), "Cancelling running task");
                active.cancel.cancel();
                active.task.cancel();
            }
        }

        let mut state = self.write_state();
        state.status = JobStatus::Stopped;
        state.next_run_at = None;
        drop(state);

        info!(job = %self.name(), cancel = cancel, "Job stopped");
    }

    /// Execute now and wait for the run to finish. The protocol runs on its
    /// own task, so dropping this future does not abandon it half way.
    pub async fn run(&self) {
        if let Some(handle) = self.spawn_execute() {
            if let Err(e) = handle.await {
                error!(job = %self.name(), error = %e, "Run protocol aborted");
            }
        }
    }

    /// Schedule a near-immediate fire; a no-op for the protocol if the job
    /// is still busy when it fires
    pub fn run_async(&self) {
        debug!(job = %self.name(), "Out-of-band run requested");
        self.arm(RUN_ASYNC_DELAY);
    }

    /// Task instance, constructed on first access. Discarded after each run
    /// unless the job is keep-alive.
    pub fn instance(&self) -> Result<Arc<dyn Task>, TaskError> {
        let mut slot = self
            .instance
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(task) = slot.as_ref() {
            return Ok(Arc::clone(task));
        }

        let factory = Arc::clone(&self.factory);
        let config = &self.config;
        let task = match execute_guarded(AssertUnwindSafe(|| factory(config))) {
            PanicGuardResult::Success(result) => result?,
            PanicGuardResult::Panicked(msg) => return Err(TaskError::Construction(msg)),
        };

        debug!(job = %self.name(), task_type = %self.config.task_type, "Task instance constructed");
        *slot = Some(Arc::clone(&task));
        Ok(task)
    }

    /// Apply the persisted last-run outcome, if a history provider is bound
    pub async fn restore_history(&self) {
        let Some(provider) = &self.history_provider else {
            return;
        };

        match provider.restore_history(self.name()).await {
            Ok(Some(history)) => {
                let mut state = self.write_state();
                state.last_status = history.last_status;
                state.last_result = history.last_result;
                state.last_run_started_at = history.last_run_started_at;
                state.last_run_finished_at = history.last_run_finished_at;
                debug!(job = %self.name(), last_status = %state.last_status, "History restored");
            }
            Ok(None) => debug!(job = %self.name(), "No history recorded"),
            Err(e) => warn!(job = %self.name(), error = %e, "Failed to restore job history"),
        }
    }

    // ------------------------------------------------------------------
    // Run-and-reschedule protocol
    // ------------------------------------------------------------------

    async fn execute(&self) {
        let Ok(_gate) = self.run_gate.try_lock() else {
            debug!(job = %self.name(), "Run already in progress, skipping fire");
            return;
        };
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let Some(lock) = self.acquire_lock().await else {
            {
                let mut state = self.write_state();
                state.status = if self.is_enabled() {
                    JobStatus::Canceled
                } else {
                    JobStatus::Stopped
                };
                state.last_status = JobStatus::Canceled;
                state.last_result = LOCK_NOT_ACQUIRED_RESULT.to_string();
            }
            self.busy.store(false, Ordering::SeqCst);
            self.rearm();
            return;
        };

        let started_at = self.env.time_provider.now();
        let (previous_run, previous_status) = {
            let mut state = self.write_state();
            let previous = (state.last_run_started_at, state.last_status);
            state.status = JobStatus::Running;
            state.last_run_started_at = Some(started_at);
            previous
        };
        self.env.emit(JobEvent::job(self.name(), JobAction::Running));
        self.env.running.fetch_add(1, Ordering::SeqCst);
        info!(job = %self.name(), "Job running");

        let (status, result) = self.invoke(previous_run, previous_status).await;

        self.env.running.fetch_sub(1, Ordering::SeqCst);
        let finished_at = self.env.time_provider.now().max(started_at);
        {
            let mut state = self.write_state();
            if self.is_enabled() {
                state.status = status;
            }
            state.last_status = status;
            state.last_result = result.clone();
            state.last_run_finished_at = Some(finished_at);
        }
        if !self.config.keep_alive {
            self.discard_instance();
        }

        self.save_history().await;
        self.release_lock(lock).await;

        match status {
            JobStatus::Error => warn!(job = %self.name(), result = %result, "Job failed"),
            _ => info!(job = %self.name(), status = %status, result = %result, "Job completed"),
        }
        self.env.emit(JobEvent::completed(
            self.name(),
            RunSummary {
                started_at,
                finished_at,
                result,
                status,
            },
        ));

        self.write_state().status = if self.is_enabled() {
            JobStatus::Waiting
        } else {
            JobStatus::Stopped
        };
        self.rearm();
        self.busy.store(false, Ordering::SeqCst);
    }

    /// Build the context, run the task in isolation and interpret the outcome
    async fn invoke(
        &self,
        previous_run: Option<DateTime<Utc>>,
        previous_status: JobStatus,
    ) -> (JobStatus, String) {
        let task = match self.instance() {
            Ok(task) => task,
            Err(e) => {
                error!(job = %self.name(), error = %e, "Task construction failed");
                return (JobStatus::Error, e.to_string());
            }
        };

        let progress_reported = Arc::new(AtomicBool::new(false));
        // Cleared under the state lock once the run returns; a context the
        // task kept around cannot write into a later run
        let progress_live = Arc::new(AtomicBool::new(true));
        let progress = {
            let state = Arc::clone(&self.state);
            let reported = Arc::clone(&progress_reported);
            let live = Arc::clone(&progress_live);
            Arc::new(move |text: &str| {
                let mut state = state
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if !live.load(Ordering::SeqCst) {
                    return;
                }
                reported.store(true, Ordering::SeqCst);
                state.last_result = text.to_string();
            })
        };

        let (cancel, token) = cancel_channel();
        let ctx = TaskContext::new(self.name())
            .with_description(self.description())
            .with_arguments(self.config.arguments.clone())
            .with_last_run(previous_run, previous_status)
            .with_cancel_token(token)
            .with_progress(progress);

        *self.lock_active_run() = Some(ActiveRun {
            cancel,
            task: Arc::clone(&task),
        });

        let outcome = execute_guarded_async(async move { task.run(&ctx).await }).await;
        self.lock_active_run().take();
        {
            let _state = self.write_state();
            progress_live.store(false, Ordering::SeqCst);
        }

        match outcome {
            PanicGuardResult::Success(result) => {
                let fallback = if progress_reported.load(Ordering::SeqCst) {
                    Some(self.last_result())
                } else {
                    None
                };
                interpret(result, fallback)
            }
            PanicGuardResult::Panicked(msg) => (JobStatus::Error, msg),
        }
    }

    async fn acquire_lock(&self) -> Option<JobLock> {
        match self.lock_provider.acquire(self.name()).await {
            Ok(lock) if lock.is_acquired() => Some(lock),
            Ok(_) => {
                info!(job = %self.name(), "Job lock held elsewhere, skipping run");
                None
            }
            Err(e) => {
                warn!(job = %self.name(), error = %e, "Job lock acquisition failed");
                None
            }
        }
    }

    async fn release_lock(&self, lock: JobLock) {
        if let Err(e) = self.lock_provider.release(lock).await {
            error!(job = %self.name(), error = %e, "Failed to release job lock");
        }
    }

    async fn save_history(&self) {
        let Some(provider) = &self.history_provider else {
            return;
        };

        let history = {
            let state = self.read_state();
            JobHistory {
                job_name: self.config.name.clone(),
                last_status: state.last_status,
                last_result: state.last_result.clone(),
                last_run_started_at: state.last_run_started_at,
                last_run_finished_at: state.last_run_finished_at,
            }
        };

        if let Err(e) = provider.save_history(&history).await {
            error!(job = %self.name(), error = %e, "Failed to save job history");
        }
    }

    fn discard_instance(&self) {
        self.instance
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    // ------------------------------------------------------------------
    // Timer
    // ------------------------------------------------------------------

    /// Delay until the next nominal fire
    fn next_delay(&self) -> Duration {
        let now = self.env.time_provider.now();
        let last_run = self.last_run_started_at();
        let next = schedule::next_run_at(
            &self.config.schedule,
            now.with_timezone(&Local),
            last_run.map(|t| t.with_timezone(&Local)),
        );
        schedule::delay_until(&next.with_timezone(&Utc), &now)
    }

    fn rearm(&self) {
        if self.is_enabled() {
            let delay = self.next_delay();
            self.arm(delay);
        }
    }

    /// Replace any pending fire with one `delay` from now and record the new
    /// next-run time
    fn arm(&self, delay: Duration) {
        let job = self.this.clone();
        let next_run = self.env.time_provider.now()
            + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        let seq = self.timer_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let mut timer = self.lock_timer();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(job) = job.upgrade() {
                job.fire(seq).await;
            }
        });
        if let Some(previous) = timer.replace(ArmedTimer { seq, handle }) {
            previous.handle.abort();
        }
        drop(timer);

        self.write_state().next_run_at = Some(next_run);
        debug!(job = %self.name(), delay_ms = delay.as_millis() as u64, "Timer armed");
    }

    fn disarm(&self) {
        if let Some(previous) = self.lock_timer().take() {
            previous.handle.abort();
        }
    }

    async fn fire(self: Arc<Self>, seq: u64) {
        {
            // Detach, so re-arming from inside the run cannot abort it
            let mut timer = self.lock_timer();
            if timer.as_ref().map(|t| t.seq) != Some(seq) {
                debug!(job = %self.name(), seq = seq, "Stale timer fire ignored");
                return;
            }
            timer.take();
        }
        self.spawn_execute();
    }

    fn spawn_execute(&self) -> Option<JoinHandle<()>> {
        let job = self.this.upgrade()?;
        Some(tokio::spawn(async move { job.execute().await }))
    }

    // ------------------------------------------------------------------
    // Lock helpers
    // ------------------------------------------------------------------

    fn read_state(&self) -> RwLockReadGuard<'_, RunState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RunState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<ArmedTimer>> {
        self.timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_active_run(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active_run
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if let Some(timer) = self
            .timer
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            timer.handle.abort();
        }
    }
}

/// Map a task result onto the job's status and result text
fn interpret(result: TaskResult, progress_text: Option<String>) -> (JobStatus, String) {
    match result {
        Ok(None) => (
            JobStatus::Completed,
            progress_text.unwrap_or_else(|| DEFAULT_COMPLETED_RESULT.to_string()),
        ),
        Ok(Some(serde_json::Value::String(text))) => (JobStatus::Completed, text),
        Ok(Some(value)) => (JobStatus::Completed, value.to_string()),
        Err(e) => (JobStatus::Error, e.to_string()),
    }
}

#[cfg(test)]
mod tests;
