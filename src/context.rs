use std::sync::Arc;
use std::time::Instant;
use tokio_rusqlite::Connection;

use crate::config::AppConfig;
use crate::core::notifications::create_notifier;
use crate::core::{
    ArtifactStore, JobCoordinator, PersistenceWriter, RemoteSessionExecutor, TaskExecutor,
};
use crate::db::SqliteStore;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub db: Connection,
    pub artifacts: ArtifactStore,
    pub coordinator: Arc<JobCoordinator>,
    pub started_at: Instant,
}

impl AppContext {
    /// Wire the coordinator to SQLite and real SSH sessions.
    pub fn new(config: AppConfig, db: Connection) -> Self {
        let artifacts = ArtifactStore::new(&config.backup_directory);
        let executor = Arc::new(RemoteSessionExecutor::from_config(
            &config.session,
            artifacts.clone(),
        ));
        Self::with_executor(config, db, artifacts, executor)
    }

    /// Same wiring with a caller-supplied executor.
    pub fn with_executor(
        config: AppConfig,
        db: Connection,
        artifacts: ArtifactStore,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        let store = Arc::new(SqliteStore::new(db.clone()));
        let coordinator = JobCoordinator::new(store.clone(), executor, PersistenceWriter::new(store))
            .with_max_concurrency(config.max_concurrency)
            .with_notifier(create_notifier(&config.notifications));

        Self {
            config: Arc::new(config),
            db,
            artifacts,
            coordinator: Arc::new(coordinator),
            started_at: Instant::now(),
        }
    }
}
