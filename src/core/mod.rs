pub mod aggregator;
pub mod artifact;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod notifications;
pub mod persistence;
pub mod session;

pub use aggregator::ResultAggregator;
pub use artifact::ArtifactStore;
pub use coordinator::{DeviceRegistry, JobCoordinator};
pub use error::{JobError, SessionError};
pub use models::{
    BackupFailure, BackupRecord, BackupSuccess, CredentialProfile, Device, DeviceOutcome,
    FailureKind, JobRequest, JobResult, TaskDescriptor,
};
pub use persistence::{BackupStore, PersistenceWriter};
pub use session::{RemoteSessionExecutor, TaskExecutor};
