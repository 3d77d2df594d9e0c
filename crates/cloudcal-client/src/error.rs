//! Error types for account and calendar operations.
//!
//! Every fallible path in this crate reports a [`ClientError`]: a coarse
//! [`ClientErrorCode`] for dispatch (re-prompt the user, re-authenticate,
//! give up) plus a message and optional underlying cause.

use std::fmt;
use thiserror::Error;

/// The category of a client error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientErrorCode {
    /// The service rejected the primary credentials (401 on sign-in).
    InvalidCredentials,
    /// The service rejected a second-factor code.
    CodeRejected,
    /// The service answered, but outside its contract: missing handshake
    /// secrets, missing cookies, missing required response fields.
    Protocol,
    /// The session cookies are no longer honored (421); re-authentication
    /// may recover it.
    StaleSession,
    /// Stale-session recovery hit its ceiling; no further silent logins.
    RetryExhausted,
    /// The write was based on an outdated collection tag.
    WriteConflict,
    /// Connection failure, timeout, or a malformed relay exchange.
    Transport,
    /// Trust-token store or credential vault failure.
    Storage,
    /// Missing or invalid configuration.
    Config,
    /// The event violates a local invariant (inverted dates, no collection).
    InvalidEvent,
    /// Unexpected internal state.
    Internal,
}

impl ClientErrorCode {
    /// True when the operation may succeed after recovery the caller can
    /// drive (re-login for a stale session, plain retry for transport).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::StaleSession | Self::Transport)
    }

    /// True when only new user input (password or code) can move things
    /// forward.
    pub fn requires_new_input(&self) -> bool {
        matches!(self, Self::InvalidCredentials | Self::CodeRejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::CodeRejected => "code_rejected",
            Self::Protocol => "protocol",
            Self::StaleSession => "stale_session",
            Self::RetryExhausted => "retry_exhausted",
            Self::WriteConflict => "write_conflict",
            Self::Transport => "transport",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::InvalidEvent => "invalid_event",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ClientErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error from the account client or one of its stores.
#[derive(Debug, Error)]
pub struct ClientError {
    code: ClientErrorCode,
    message: String,
    /// The account the operation ran for, when known.
    account: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ClientError {
    pub fn new(code: ClientErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            account: None,
            source: None,
        }
    }

    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCode::InvalidCredentials, message)
    }

    pub fn code_rejected(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCode::CodeRejected, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCode::Protocol, message)
    }

    pub fn stale_session(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCode::StaleSession, message)
    }

    pub fn retry_exhausted(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCode::RetryExhausted, message)
    }

    pub fn write_conflict(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCode::WriteConflict, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCode::Transport, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCode::Storage, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCode::Config, message)
    }

    pub fn invalid_event(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCode::InvalidEvent, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCode::Internal, message)
    }

    /// Tags the error with the account it happened for.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Attaches the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ClientErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// See [`ClientErrorCode::is_recoverable`].
    pub fn is_recoverable(&self) -> bool {
        self.code.is_recoverable()
    }

    /// See [`ClientErrorCode::requires_new_input`].
    pub fn requires_new_input(&self) -> bool {
        self.code.requires_new_input()
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref account) = self.account {
            write!(f, "[{}] ", account)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
