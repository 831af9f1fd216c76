// Job Manager - owns every job of the process
//
// All mutation of the job collection (initialize, start, stop, reload and
// provider polls) happens under one async mutex. Jobs carry their own
// synchronization, so status queries never wait on a run.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::job::constants::STOP_POLL_INTERVAL;
use super::job::{Job, JobEnvironment};
use super::registry::Registry;
use crate::domain::{
    DomainError, JobAction, JobConfiguration, JobEvent, JobSnapshot, SchedulerConfig,
};
use crate::error::Result;
use crate::port::id_provider::UuidProvider;
use crate::port::time_provider::SystemTimeProvider;
use crate::port::{ConfigProvider, IdProvider, TaskProvider, TimeProvider};

#[derive(Default)]
struct ManagerState {
    initialized: bool,
    started: bool,
    config: SchedulerConfig,
    jobs: BTreeMap<String, Arc<Job>>,
    /// Job names contributed by each task provider
    provider_jobs: HashMap<String, Vec<String>>,
    last_load: HashMap<String, DateTime<Utc>>,
    poll: Option<JoinHandle<()>>,
}

impl ManagerState {
    fn clear(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.abort();
        }
        self.jobs.clear();
        self.provider_jobs.clear();
        self.last_load.clear();
        self.initialized = false;
        self.started = false;
    }
}

pub struct JobManager {
    config_provider: Arc<dyn ConfigProvider>,
    registry: Arc<Registry>,
    id_provider: Arc<dyn IdProvider>,
    env: JobEnvironment,
    state: Mutex<ManagerState>,
    this: Weak<JobManager>,
}

impl JobManager {
    pub fn new(config_provider: Arc<dyn ConfigProvider>, registry: Arc<Registry>) -> Arc<Self> {
        Self::with_providers(
            config_provider,
            registry,
            Arc::new(SystemTimeProvider),
            Arc::new(UuidProvider),
        )
    }

    /// Manager with injected clock and id source
    pub fn with_providers(
        config_provider: Arc<dyn ConfigProvider>,
        registry: Arc<Registry>,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config_provider,
            registry,
            id_provider,
            env: JobEnvironment::new(time_provider),
            state: Mutex::new(ManagerState::default()),
            this: this.clone(),
        })
    }

    /// Load configuration and build every job. A no-op once initialized.
    ///
    /// Configuration faults (unknown task type or provider, invalid or
    /// duplicate job) are returned before any job exists.
    pub async fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.initialize_locked(&mut state).await
    }

    /// Initialize if needed, then start every job
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.initialize_locked(&mut state).await?;

        self.env.emit(JobEvent::manager(JobAction::ManagerStarting));
        for job in state.jobs.values() {
            job.start();
        }
        state.started = true;

        info!(jobs = state.jobs.len(), "Job manager started");
        Ok(())
    }

    /// Stop every job with cancellation, then wait up to the configured
    /// drain timeout for in-flight runs.
    ///
    /// Returns `false` when runs were still active at the deadline.
    pub async fn stop(&self) -> bool {
        let timeout = {
            let mut state = self.state.lock().await;
            self.env.emit(JobEvent::manager(JobAction::ManagerStopping));
            for job in state.jobs.values() {
                job.stop(true);
            }
            state.started = false;
            state.config.stop_timeout()
        };

        info!(timeout_secs = timeout.as_secs(), "Job manager stopping");
        self.drain(timeout).await
    }

    /// Stop and forget every job. With `start_after`, configuration is read
    /// again and the new job set started.
    pub async fn reload(&self, start_after: bool) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            for job in state.jobs.values() {
                job.stop(true);
            }
            state.clear();
        }
        info!(start_after = start_after, "Job manager reset");

        if start_after {
            self.start().await?;
        }
        Ok(())
    }

    /// Rebuild the jobs of every task provider that reports a change.
    ///
    /// Jobs of other providers and static jobs are left running. Returns the
    /// number of providers reloaded.
    pub async fn check_providers(&self) -> usize {
        let mut state = self.state.lock().await;
        if !state.initialized {
            return 0;
        }

        let mut reloaded = 0;
        for name in state.config.task_providers.clone() {
            let provider = match self.registry.task_provider(&name) {
                Ok(provider) => provider,
                Err(e) => {
                    warn!(provider = %name, error = %e, "Task provider disappeared");
                    continue;
                }
            };

            let last_load = state
                .last_load
                .get(&name)
                .copied()
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            if !provider.is_reload_required(last_load).await {
                continue;
            }

            match self
                .reload_provider(&mut state, &name, provider.as_ref())
                .await
            {
                Ok(count) => {
                    reloaded += 1;
                    info!(provider = %name, jobs = count, "Task provider reloaded");
                }
                Err(e) => {
                    error!(provider = %name, error = %e, "Task provider reload failed, keeping current jobs");
                }
            }
        }
        reloaded
    }

    /// Queue an immediate run of the named job
    pub async fn trigger(&self, name: &str) -> Result<()> {
        let job = {
            let state = self.state.lock().await;
            if !state.initialized {
                return Err(DomainError::InvalidState("job manager not initialized".to_string()).into());
            }
            state
                .jobs
                .get(name)
                .cloned()
                .ok_or_else(|| DomainError::JobNotFound(name.to_string()))?
        };
        job.run_async();
        Ok(())
    }

    pub async fn jobs_by_group(&self, group: &str) -> Vec<Arc<Job>> {
        let state = self.state.lock().await;
        state
            .jobs
            .values()
            .filter(|job| job.group() == group)
            .cloned()
            .collect()
    }

    pub async fn job(&self, name: &str) -> Option<Arc<Job>> {
        self.state.lock().await.jobs.get(name).cloned()
    }

    /// Every job, ordered by name
    pub async fn jobs(&self) -> Vec<Arc<Job>> {
        self.state.lock().await.jobs.values().cloned().collect()
    }

    pub async fn snapshots(&self) -> Vec<JobSnapshot> {
        let state = self.state.lock().await;
        state.jobs.values().map(|job| job.snapshot()).collect()
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.initialized
    }

    /// Jobs currently inside a run
    pub fn running_count(&self) -> usize {
        self.env.running_count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.env.subscribe()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn initialize_locked(&self, state: &mut ManagerState) -> Result<()> {
        if state.initialized {
            return Ok(());
        }

        let config = self.config_provider.load()?;
        let mut jobs = BTreeMap::new();
        for job_config in &config.jobs {
            let job = self.build_job(job_config.clone())?;
            insert_unique(&mut jobs, job)?;
        }

        let mut provider_jobs = HashMap::new();
        let mut last_load = HashMap::new();
        let mut poll_providers = false;
        for name in &config.task_providers {
            let provider = self.registry.task_provider(name)?;
            let loaded_at = self.env.time_provider.now();
            let mut names = Vec::new();
            for job_config in provider.get_jobs().await? {
                let job = self.build_job(job_config)?;
                names.push(job.name().to_string());
                insert_unique(&mut jobs, job)?;
            }

            debug!(provider = %name, jobs = names.len(), "Task provider loaded");
            provider_jobs.insert(name.clone(), names);
            last_load.insert(name.clone(), loaded_at);
            poll_providers |= provider.wants_reload_checks();
        }

        for job in jobs.values() {
            job.restore_history().await;
        }

        if poll_providers {
            state.poll = Some(self.spawn_poll(config.poll_interval()));
        }
        info!(
            jobs = jobs.len(),
            task_providers = config.task_providers.len(),
            polling = poll_providers,
            "Job manager initialized"
        );

        state.jobs = jobs;
        state.provider_jobs = provider_jobs;
        state.last_load = last_load;
        state.config = config;
        state.initialized = true;
        Ok(())
    }

    /// Replace the jobs of one provider. The provider is fetched first; if
    /// that fails its current jobs stay in place.
    async fn reload_provider(
        &self,
        state: &mut ManagerState,
        name: &str,
        provider: &dyn TaskProvider,
    ) -> Result<usize> {
        let loaded_at = self.env.time_provider.now();
        let configs = provider.get_jobs().await?;

        for previous in state.provider_jobs.remove(name).unwrap_or_default() {
            if let Some(job) = state.jobs.remove(&previous) {
                job.stop(true);
                debug!(job = %previous, provider = %name, "Job removed for reload");
            }
        }

        let mut names = Vec::new();
        for job_config in configs {
            let job_name = job_config.name.clone();
            let job = match self.build_job(job_config) {
                Ok(job) => job,
                Err(e) => {
                    error!(job = %job_name, provider = %name, error = %e, "Skipping invalid job");
                    continue;
                }
            };
            if state.jobs.contains_key(&job_name) {
                warn!(job = %job_name, provider = %name, "Skipping duplicate job");
                continue;
            }

            job.restore_history().await;
            if state.started {
                job.start();
            }
            names.push(job_name.clone());
            state.jobs.insert(job_name, job);
        }

        let count = names.len();
        state.provider_jobs.insert(name.to_string(), names);
        state.last_load.insert(name.to_string(), loaded_at);
        Ok(count)
    }

    fn build_job(&self, config: JobConfiguration) -> Result<Arc<Job>> {
        let bindings = self.registry.bind(&config)?;
        Ok(Job::new(
            self.id_provider.generate_id(),
            config,
            bindings,
            self.env.clone(),
        ))
    }

    fn spawn_poll(&self, period: Duration) -> JoinHandle<()> {
        let manager = self.this.clone();
        tokio::spawn(async move {
            debug!(period_secs = period.as_secs(), "Task provider polling started");
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            tick.tick().await;

            loop {
                tick.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.check_providers().await;
            }
        })
    }

    async fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let running = self.running_count();
            if running == 0 {
                info!("Job manager stopped");
                return true;
            }
            if Instant::now() >= deadline {
                warn!(running = running, "Stop timeout reached with runs in progress");
                return false;
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        if let Some(poll) = self.state.get_mut().poll.take() {
            poll.abort();
        }
    }
}

fn insert_unique(jobs: &mut BTreeMap<String, Arc<Job>>, job: Arc<Job>) -> Result<()> {
    let name = job.name().to_string();
    if jobs.contains_key(&name) {
        return Err(DomainError::DuplicateJob(name).into());
    }
    jobs.insert(name, job);
    Ok(())
}
