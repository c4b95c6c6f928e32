use thiserror::Error;

/// Service-level error taxonomy.
///
/// `Unauthenticated` deliberately carries no detail: credential, token, and
/// session failures are collapsed into it at the auth boundary so callers
/// cannot distinguish which check failed. The specific reason is logged
/// internally where the failure occurs.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid credentials or session")]
    Unauthenticated,

    #[error("insufficient permission")]
    Forbidden,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("policy engine error: {0}")]
    Policy(#[from] casbin::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
