use std::fmt;
use std::str::Utf8Error;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error produced by the SIP or SDP parsers.
#[derive(Debug, PartialEq, Eq, Error)]
pub struct SipParserError {
    /// Message in error
    pub message: String,
}

impl fmt::Display for SipParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl SipParserError {
    pub fn new<T>(s: T) -> Self
    where
        T: AsRef<str>,
    {
        Self {
            message: s.as_ref().to_string(),
        }
    }
}

impl From<&str> for SipParserError {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SipParserError {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Utf8Error> for SipParserError {
    fn from(value: Utf8Error) -> Self {
        SipParserError {
            message: format!("{:#?}", value),
        }
    }
}

impl From<crate::scanner::ScanError> for SipParserError {
    fn from(err: crate::scanner::ScanError) -> Self {
        SipParserError {
            message: format!(
                "Failed to parse at line:{} column:{} kind:{:?}",
                err.line, err.col, err.kind,
            ),
        }
    }
}

impl From<crate::scanner::ScanError> for Error {
    fn from(err: crate::scanner::ScanError) -> Self {
        Error::ParseError(err.into())
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Error::ParseError(value.into())
    }
}

impl From<std::fmt::Error> for Error {
    fn from(value: std::fmt::Error) -> Self {
        Self::FmtError(value)
    }
}

/// The error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    ParseError(#[from] SipParserError),

    #[error("Missing required '{0}' header")]
    MissingRequiredHeader(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Timer B or F elapsed before a final response arrived.
    #[error("Transaction timed out")]
    Timeout,

    /// The transport failed while sending or retransmitting.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// A challenge carried a nonce that could not be accepted
    /// (neither stale nor a permitted new vector).
    #[error("Stale or unacceptable nonce in challenge")]
    BadNonce,

    /// A response arrived with no matching client transaction.
    #[error("No matching transaction")]
    NoTransaction,

    /// API misuse, e.g. sending on a terminated dialog.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Fmt Error")]
    FmtError(std::fmt::Error),
}
