//! Purpose: Single error type shared by the API client, the core read/write loops and the jobs.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`.
//! Role: Builder-style error carrying the remote context (spreadsheet, range, HTTP status).
//! Invariants: `ErrorKind` alone decides whether a failure is retried.
//! Invariants: Exit codes are stable once published.
use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    NotFound,
    Permission,
    Auth,
    RateLimited,
    Unavailable,
    Io,
    Structure,
    Exhausted,
}

impl ErrorKind {
    /// Transport failures, 5xx and rate limiting are worth another attempt;
    /// everything else fails the same way the next time.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::Unavailable | ErrorKind::Io
        )
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    spreadsheet: Option<String>,
    range: Option<String>,
    status: Option<u16>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            spreadsheet: None,
            range: None,
            status: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn spreadsheet(&self) -> Option<&str> {
        self.spreadsheet.as_deref()
    }

    pub fn range(&self) -> Option<&str> {
        self.range.as_deref()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_spreadsheet(mut self, spreadsheet: impl Into<String>) -> Self {
        self.spreadsheet = Some(spreadsheet.into());
        self
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(status) = self.status {
            write!(f, " (status: {status})")?;
        }
        if let Some(spreadsheet) = &self.spreadsheet {
            write!(f, " (spreadsheet: {spreadsheet})")?;
        }
        if let Some(range) = &self.range {
            write!(f, " (range: {range})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Permission => 4,
        ErrorKind::Auth => 5,
        ErrorKind::RateLimited => 6,
        ErrorKind::Unavailable => 7,
        ErrorKind::Io => 8,
        ErrorKind::Structure => 9,
        ErrorKind::Exhausted => 10,
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, to_exit_code};

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::Usage, 2),
            (ErrorKind::NotFound, 3),
            (ErrorKind::Permission, 4),
            (ErrorKind::Auth, 5),
            (ErrorKind::RateLimited, 6),
            (ErrorKind::Unavailable, 7),
            (ErrorKind::Io, 8),
            (ErrorKind::Structure, 9),
            (ErrorKind::Exhausted, 10),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn only_transient_kinds_are_retryable() {
        assert!(ErrorKind::Unavailable.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::Io.is_retryable());
        assert!(!ErrorKind::Permission.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::Auth.is_retryable());
        assert!(!ErrorKind::Exhausted.is_retryable());
    }

    #[test]
    fn display_includes_remote_context() {
        let err = Error::new(ErrorKind::Unavailable)
            .with_message("backend error")
            .with_status(503)
            .with_spreadsheet("abc")
            .with_range("Data!A1:E10");
        assert_eq!(
            err.to_string(),
            "Unavailable: backend error (status: 503) (spreadsheet: abc) (range: Data!A1:E10)"
        );
    }
}
