// Recur Infrastructure - SQLite Adapter
// Implements: HistoryProvider, LockProvider (cross-process)

mod connection;
mod error;
mod history_provider;
mod lock_provider;
mod migration;

pub use connection::create_pool;
pub use history_provider::SqliteHistoryProvider;
pub use lock_provider::{SqliteLockProvider, DEFAULT_LOCK_TTL};
pub use migration::run_migrations;
