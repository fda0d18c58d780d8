use thiserror::Error;

/// Errors produced while loading, constructing, or querying a simulation.
///
/// Structural errors ([`MalformedSpec`](SimError::MalformedSpec), the
/// `serde_yaml`/`io` conversions) are fatal at construction time. Runtime
/// unsatisfiability (a task that can never fit the cluster) is *not* an
/// error here — it surfaces as a deadlocked terminal snapshot instead.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("malformed spec: {0}")]
    MalformedSpec(String),

    #[error("priority queue is empty")]
    QueueEmpty,

    #[error("time {0} not found in history")]
    TimeNotFound(i64),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
