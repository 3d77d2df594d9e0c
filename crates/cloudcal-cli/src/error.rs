//! CLI error type.

use std::fmt;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub enum CliError {
    /// Configuration file or flag problem.
    Config(String),
    /// The session needs an interactive login first.
    Auth(String),
    /// Invalid command-line input.
    Input(String),
    /// Output rendering failure (JSON or TOML).
    Render(String),
    /// Error from the account client.
    Client(cloudcal_client::ClientError),
    /// Terminal or file IO failure.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Auth(msg) => write!(f, "{msg}"),
            Self::Input(msg) => write!(f, "invalid input: {msg}"),
            Self::Render(msg) => write!(f, "failed to render output: {msg}"),
            Self::Client(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Client(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<cloudcal_client::ClientError> for CliError {
    fn from(err: cloudcal_client::ClientError) -> Self {
        Self::Client(err)
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
