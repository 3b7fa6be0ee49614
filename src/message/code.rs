use std::fmt;

/// A SIP status code.
///
/// Common codes get a named variant; everything else in the
/// valid 100..=699 range is carried by [`StatusCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// `Trying` status code.
    Trying,
    /// `Ringing` status code.
    Ringing,
    /// `Session Progress` status code.
    SessionProgress,
    /// `OK` status code.
    Ok,
    /// `Accepted` status code.
    Accepted,
    /// `Moved Temporarily` status code.
    MovedTemporarily,
    /// `Bad Request` status code.
    BadRequest,
    /// `Unauthorized` status code.
    Unauthorized,
    /// `Forbidden` status code.
    Forbidden,
    /// `Not Found` status code.
    NotFound,
    /// `Proxy Authentication Required` status code.
    ProxyAuthenticationRequired,
    /// `Request Timeout` status code.
    RequestTimeout,
    /// `Extension Required` status code.
    ExtensionRequired,
    /// `Interval Too Brief` status code.
    IntervalTooBrief,
    /// `Temporarily Unavailable` status code.
    TemporarilyUnavailable,
    /// `Call/Transaction Does Not Exist` status code.
    CallOrTransactionDoesNotExist,
    /// `Busy Here` status code.
    BusyHere,
    /// `Request Terminated` status code.
    RequestTerminated,
    /// `Security Agreement Required` status code (RFC 3329).
    SecurityAgreementRequired,
    /// `Server Internal Error` status code.
    ServerInternalError,
    /// `Not Implemented` status code.
    NotImplemented,
    /// `Service Unavailable` status code.
    ServiceUnavailable,
    /// `Busy Everywhere` status code.
    BusyEverywhere,
    /// `Decline` status code.
    Decline,
    /// Any other status code in 100..=699.
    Other(i32),
}

impl StatusCode {
    /// Returns the numeric value of this status code.
    pub const fn into_i32(self) -> i32 {
        match self {
            StatusCode::Trying => 100,
            StatusCode::Ringing => 180,
            StatusCode::SessionProgress => 183,
            StatusCode::Ok => 200,
            StatusCode::Accepted => 202,
            StatusCode::MovedTemporarily => 302,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::ProxyAuthenticationRequired => 407,
            StatusCode::RequestTimeout => 408,
            StatusCode::ExtensionRequired => 421,
            StatusCode::IntervalTooBrief => 423,
            StatusCode::TemporarilyUnavailable => 480,
            StatusCode::CallOrTransactionDoesNotExist => 481,
            StatusCode::BusyHere => 486,
            StatusCode::RequestTerminated => 487,
            StatusCode::SecurityAgreementRequired => 494,
            StatusCode::ServerInternalError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::ServiceUnavailable => 503,
            StatusCode::BusyEverywhere => 600,
            StatusCode::Decline => 603,
            StatusCode::Other(code) => code,
        }
    }

    /// Returns the default reason phrase for this status code.
    pub fn reason(&self) -> &'static str {
        match self.into_i32() {
            100 => "Trying",
            180 => "Ringing",
            183 => "Session Progress",
            200 => "OK",
            202 => "Accepted",
            302 => "Moved Temporarily",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            407 => "Proxy Authentication Required",
            408 => "Request Timeout",
            421 => "Extension Required",
            423 => "Interval Too Brief",
            480 => "Temporarily Unavailable",
            481 => "Call/Transaction Does Not Exist",
            486 => "Busy Here",
            487 => "Request Terminated",
            494 => "Security Agreement Required",
            500 => "Server Internal Error",
            501 => "Not Implemented",
            503 => "Service Unavailable",
            600 => "Busy Everywhere",
            603 => "Decline",
            _ => "Unknown",
        }
    }

    /// Returns `true` if this is a provisional (1xx) code.
    pub const fn is_provisional(&self) -> bool {
        matches!(self.into_i32(), 100..=199)
    }

    /// Returns `true` if this is a final (2xx..=6xx) code.
    pub const fn is_final(&self) -> bool {
        matches!(self.into_i32(), 200..=699)
    }

    /// Returns `true` if this is a success (2xx) code.
    pub const fn is_success(&self) -> bool {
        matches!(self.into_i32(), 200..=299)
    }
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        match code {
            100 => StatusCode::Trying,
            180 => StatusCode::Ringing,
            183 => StatusCode::SessionProgress,
            200 => StatusCode::Ok,
            202 => StatusCode::Accepted,
            302 => StatusCode::MovedTemporarily,
            400 => StatusCode::BadRequest,
            401 => StatusCode::Unauthorized,
            403 => StatusCode::Forbidden,
            404 => StatusCode::NotFound,
            407 => StatusCode::ProxyAuthenticationRequired,
            408 => StatusCode::RequestTimeout,
            421 => StatusCode::ExtensionRequired,
            423 => StatusCode::IntervalTooBrief,
            480 => StatusCode::TemporarilyUnavailable,
            481 => StatusCode::CallOrTransactionDoesNotExist,
            486 => StatusCode::BusyHere,
            487 => StatusCode::RequestTerminated,
            494 => StatusCode::SecurityAgreementRequired,
            500 => StatusCode::ServerInternalError,
            501 => StatusCode::NotImplemented,
            503 => StatusCode::ServiceUnavailable,
            600 => StatusCode::BusyEverywhere,
            603 => StatusCode::Decline,
            other => StatusCode::Other(other),
        }
    }
}

impl From<&[u8]> for StatusCode {
    fn from(digits: &[u8]) -> Self {
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<i32>().ok())
            .map(StatusCode::from)
            .unwrap_or(StatusCode::Other(0))
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.into_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        assert_eq!(StatusCode::from(200), StatusCode::Ok);
        assert_eq!(StatusCode::Ok.into_i32(), 200);
        assert_eq!(StatusCode::from(299), StatusCode::Other(299));
        assert_eq!(StatusCode::Other(299).into_i32(), 299);
    }

    #[test]
    fn test_classes() {
        assert!(StatusCode::Trying.is_provisional());
        assert!(StatusCode::Ringing.is_provisional());
        assert!(StatusCode::Ok.is_final());
        assert!(StatusCode::Ok.is_success());
        assert!(StatusCode::BusyHere.is_final());
        assert!(!StatusCode::BusyHere.is_success());
    }
}
