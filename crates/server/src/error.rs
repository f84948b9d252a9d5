//! The engine's error taxonomy (`spec.md` §7). HTTP handlers match on this
//! to pick a status code; everything else crossing a component boundary
//! (I/O, `bollard`, `sqlx`) is wrapped in `anyhow::Error` at the call site.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("user '{0}' already has an active session")]
    DuplicateUser(String),

    #[error("no free GPU slice available for the request")]
    GpuExhausted,

    #[error("GPU UUID '{0}' is not known to this host")]
    GpuUnknown(String),

    #[error("GPU UUID '{0}' is already held")]
    GpuBusy(String),

    #[error("no free host port available in the configured range")]
    PortExhausted,

    #[error("no free IP address available in the configured subnet range")]
    IpExhausted,

    #[error("session '{0}' was not found")]
    NotFound(String),

    #[error("request validation failed: {0}")]
    Validation(String),

    #[error("container runtime fault: {0}")]
    RuntimeFault(#[from] anyhow::Error),

    #[error("persistence fault: {0}")]
    PersistenceFault(String),
}

impl EngineError {
    /// HTTP status code per `spec.md` §6/§7's error taxonomy.
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::DuplicateUser(_)
            | EngineError::GpuExhausted
            | EngineError::GpuUnknown(_)
            | EngineError::GpuBusy(_)
            | EngineError::PortExhausted
            | EngineError::IpExhausted
            | EngineError::RuntimeFault(_)
            | EngineError::PersistenceFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
