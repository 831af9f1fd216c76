// Registry - explicit name -> implementation mapping for tasks and providers
//
// Resolved once per job when the manager loads its configuration; an unknown
// name is a configuration fault.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::job::constants::DEFAULT_LOCK_PROVIDER;
use crate::domain::{DomainError, JobConfiguration};
use crate::port::{
    HistoryProvider, InMemoryLockProvider, LockProvider, Task, TaskError, TaskFactory,
    TaskProvider,
};

/// Implementations bound to a single job configuration
#[derive(Clone)]
pub struct JobBindings {
    pub factory: TaskFactory,
    pub lock_provider: Arc<dyn LockProvider>,
    pub history_provider: Option<Arc<dyn HistoryProvider>>,
}

pub struct Registry {
    tasks: HashMap<String, TaskFactory>,
    lock_providers: HashMap<String, Arc<dyn LockProvider>>,
    history_providers: HashMap<String, Arc<dyn HistoryProvider>>,
    task_providers: HashMap<String, Arc<dyn TaskProvider>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Empty registry with the in-process lock provider under "memory"
    pub fn new() -> Self {
        let mut lock_providers: HashMap<String, Arc<dyn LockProvider>> = HashMap::new();
        lock_providers.insert(
            DEFAULT_LOCK_PROVIDER.to_string(),
            Arc::new(InMemoryLockProvider::new()),
        );

        Self {
            tasks: HashMap::new(),
            lock_providers,
            history_providers: HashMap::new(),
            task_providers: HashMap::new(),
        }
    }

    /// Register a task factory for `task_type`
    pub fn register_task<F>(&mut self, task_type: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&JobConfiguration) -> Result<Arc<dyn Task>, TaskError> + Send + Sync + 'static,
    {
        self.register_task_factory(task_type, Arc::new(factory))
    }

    pub fn register_task_factory(
        &mut self,
        task_type: impl Into<String>,
        factory: TaskFactory,
    ) -> &mut Self {
        let task_type = task_type.into();
        if self.tasks.insert(task_type.clone(), factory).is_some() {
            warn!(task_type = %task_type, "Task factory replaced");
        }
        self
    }

    pub fn register_lock_provider(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn LockProvider>,
    ) -> &mut Self {
        let name = name.into();
        debug!(provider = %name, "Registering lock provider");
        self.lock_providers.insert(name, provider);
        self
    }

    pub fn register_history_provider(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn HistoryProvider>,
    ) -> &mut Self {
        let name = name.into();
        debug!(provider = %name, "Registering history provider");
        self.history_providers.insert(name, provider);
        self
    }

    pub fn register_task_provider(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn TaskProvider>,
    ) -> &mut Self {
        let name = name.into();
        debug!(provider = %name, "Registering task provider");
        self.task_providers.insert(name, provider);
        self
    }

    pub fn task_factory(&self, task_type: &str) -> Result<TaskFactory, DomainError> {
        self.tasks
            .get(task_type)
            .cloned()
            .ok_or_else(|| DomainError::UnknownTaskType(task_type.to_string()))
    }

    /// `None` selects the built-in in-process provider
    pub fn lock_provider(&self, name: Option<&str>) -> Result<Arc<dyn LockProvider>, DomainError> {
        let name = name.unwrap_or(DEFAULT_LOCK_PROVIDER);
        self.lock_providers
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::UnknownProvider {
                kind: "lock",
                name: name.to_string(),
            })
    }

    /// `None` means the job keeps no history
    pub fn history_provider(
        &self,
        name: Option<&str>,
    ) -> Result<Option<Arc<dyn HistoryProvider>>, DomainError> {
        match name {
            None => Ok(None),
            Some(name) => self
                .history_providers
                .get(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| DomainError::UnknownProvider {
                    kind: "history",
                    name: name.to_string(),
                }),
        }
    }

    pub fn task_provider(&self, name: &str) -> Result<Arc<dyn TaskProvider>, DomainError> {
        self.task_providers
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::UnknownProvider {
                kind: "task",
                name: name.to_string(),
            })
    }

    /// Resolve everything a job configuration refers to
    pub fn bind(&self, config: &JobConfiguration) -> Result<JobBindings, DomainError> {
        config.validate()?;
        Ok(JobBindings {
            factory: self.task_factory(&config.task_type)?,
            lock_provider: self.lock_provider(config.lock_provider.as_deref())?,
            history_provider: self.history_provider(config.history_provider.as_deref())?,
        })
    }
}
