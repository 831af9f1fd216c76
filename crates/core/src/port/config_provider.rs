// Configuration Provider Port

use crate::domain::SchedulerConfig;
use crate::error::Result;

/// Supplies the scheduler configuration; read on every initialize
pub trait ConfigProvider: Send + Sync {
    fn load(&self) -> Result<SchedulerConfig>;
}

/// Configuration held in memory (composition roots and tests)
pub struct StaticConfigProvider {
    config: SchedulerConfig,
}

impl StaticConfigProvider {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn load(&self) -> Result<SchedulerConfig> {
        Ok(self.config.clone())
    }
}
