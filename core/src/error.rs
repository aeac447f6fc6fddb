use thiserror::Error;

pub type Result<T> = std::result::Result<T, SandboxErr>;

/// Failure taxonomy the outer envelope layer renders from. Each component
/// classifies only the failures it understands; anything else collapses to
/// `Internal`, whose raw message is kept for logs but never shown to callers.
#[derive(Debug, Error)]
pub enum SandboxErr {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl SandboxErr {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Message safe to hand to callers. Internal failures are sanitized so
    /// transport and OS-level error text never leaks through the envelope.
    pub fn envelope_message(&self) -> &str {
        match self {
            Self::NotFound(message) | Self::BadRequest(message) => message,
            Self::Internal(_) => "internal error, please retry later",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_message_is_sanitized_for_callers() {
        let err = SandboxErr::internal("read /proc/1/mem: permission denied");
        assert_eq!(err.envelope_message(), "internal error, please retry later");
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn caller_errors_keep_their_message() {
        let err = SandboxErr::not_found("unknown shell session: abc");
        assert_eq!(err.envelope_message(), "unknown shell session: abc");
    }
}
