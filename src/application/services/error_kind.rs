use std::fmt;

/// Coarse classification shared by every service error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Forbidden,
    NotFound,
    Conflict,
    Upstream,
    UpstreamFormat,
    Timeout,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Upstream => "upstream",
            ErrorKind::UpstreamFormat => "upstream_format",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Storage => "storage",
        }
    }

    /// Whether retrying the same call unchanged can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Upstream | ErrorKind::Timeout | ErrorKind::Storage
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
