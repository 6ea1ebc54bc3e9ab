use thiserror::Error;

#[derive(Error, Debug)]
pub enum WharfError {
    #[error("Invalid entry point '{reference}': {reason}")]
    InvalidEntryPoint { reference: String, reason: String },

    #[error("Invalid bind address '{address}': {reason}")]
    InvalidBindAddress { address: String, reason: String },

    #[error("Invalid worker count: {count}")]
    InvalidWorkerCount { count: usize },

    #[error("Manifest error in {path}: {reason}")]
    ManifestError { path: String, reason: String },

    #[error("Requirement '{name}' is not pinned to an exact version (closed-world build requires '==')")]
    UnpinnedRequirement { name: String },

    #[error("Docker error: {message}")]
    DockerError { message: String },

    #[error("Build failed at step '{step}': {detail}")]
    BuildStepFailed { step: String, detail: String },

    #[error("Failed to spawn worker: {reason}")]
    WorkerSpawnError { reason: String },

    #[error("{crashed} of {total} workers exited without a shutdown request")]
    WorkersFailed { crashed: usize, total: usize },

    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
