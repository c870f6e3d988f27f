// SPDX-License-Identifier: Apache-2.0

//! Status codes reported by the YDB server and by the client transport.

use std::fmt;

/// Result type returned by every remote collaborator
pub type RemoteResult<T> = Result<T, Status>;

/// Status code of a single remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    // Server side codes
    Success,
    BadRequest,
    Unauthorized,
    InternalError,
    Aborted,
    Unavailable,
    Overloaded,
    SchemeError,
    GenericError,
    Timeout,
    BadSession,
    PreconditionFailed,
    AlreadyExists,
    NotFound,
    SessionExpired,
    Cancelled,
    Undetermined,
    Unsupported,
    SessionBusy,

    // Client and transport side codes
    TransportUnavailable,
    ClientResourceExhausted,
    ClientDeadlineExceeded,
    ClientInternalError,
    ClientCancelled,
    ClientUnauthenticated,
    ClientCallUnimplemented,

    /// Code this client does not know about
    Unknown(u32),
}

impl StatusCode {
    /// Whether a failure with this code may be retried locally.
    ///
    /// Unknown codes are never retried.
    pub fn is_retryable(self) -> bool {
        match self {
            StatusCode::ClientDeadlineExceeded
            | StatusCode::ClientResourceExhausted
            | StatusCode::TransportUnavailable
            | StatusCode::Unavailable
            | StatusCode::Overloaded => true,

            StatusCode::Success
            | StatusCode::BadRequest
            | StatusCode::Unauthorized
            | StatusCode::InternalError
            | StatusCode::Aborted
            | StatusCode::SchemeError
            | StatusCode::GenericError
            | StatusCode::Timeout
            | StatusCode::BadSession
            | StatusCode::PreconditionFailed
            | StatusCode::AlreadyExists
            | StatusCode::NotFound
            | StatusCode::SessionExpired
            | StatusCode::Cancelled
            | StatusCode::Undetermined
            | StatusCode::Unsupported
            | StatusCode::SessionBusy
            | StatusCode::ClientInternalError
            | StatusCode::ClientCancelled
            | StatusCode::ClientUnauthenticated
            | StatusCode::ClientCallUnimplemented
            | StatusCode::Unknown(_) => false,
        }
    }

    /// Whether the code was produced by the transport rather than the server
    pub fn is_transport_error(self) -> bool {
        matches!(
            self,
            StatusCode::TransportUnavailable
                | StatusCode::ClientResourceExhausted
                | StatusCode::ClientDeadlineExceeded
                | StatusCode::ClientInternalError
                | StatusCode::ClientCancelled
                | StatusCode::ClientUnauthenticated
                | StatusCode::ClientCallUnimplemented
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Unknown(code) => write!(f, "UNKNOWN({})", code),
            other => {
                let name = format!("{:?}", other);
                let mut out = String::with_capacity(name.len() + 4);
                for (i, ch) in name.chars().enumerate() {
                    if ch.is_ascii_uppercase() && i > 0 {
                        out.push('_');
                    }
                    out.push(ch.to_ascii_uppercase());
                }
                f.write_str(&out)
            }
        }
    }
}

/// Failed (or successful) remote status with the issues reported alongside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: StatusCode,
    pub issues: Vec<String>,
}

impl Status {
    pub fn new(code: StatusCode) -> Self {
        Self {
            code,
            issues: vec![],
        }
    }

    pub fn with_issue(code: StatusCode, issue: impl Into<String>) -> Self {
        Self {
            code,
            issues: vec![issue.into()],
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if !self.issues.is_empty() {
            write!(f, ", issues: [{}]", self.issues.join("; "))?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {}
