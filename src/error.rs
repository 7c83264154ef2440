use thiserror::Error;

/// Errors raised by the priority subsystem.
///
/// Disposition follows spec: `Fatal` variants abort `init`, `Configuration`
/// degrades a feature rather than failing, and the rest are tick- or
/// job-scoped and are logged by the caller rather than propagated further.
#[derive(Error, Debug)]
pub enum PriorityError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(String),

    #[error("configuration incompatible: {0}")]
    Configuration(String),

    #[error("degenerate decay factor")]
    DegenerateDecayFactor,

    #[error("association not found: {0}")]
    AssociationNotFound(u32),

    #[error("qos not found: {0}")]
    QosNotFound(u32),

    #[error("decay loop already running")]
    AlreadyRunning,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, PriorityError>;
