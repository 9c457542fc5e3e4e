#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// A uniqueness or bind-once rule rejected the write.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

impl RepositoryError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, RepositoryError::ConstraintViolation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}
