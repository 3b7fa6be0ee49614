use std::fmt;

use crate::error::Result;
use crate::macros::parse_error;
use crate::scanner::{is_space, Scanner};

/// The `t=` line (Timing).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionTime {
    /// The session start time, in NTP seconds; 0 for unbounded.
    pub start: u64,
    /// The session stop time, in NTP seconds; 0 for unbounded.
    pub stop: u64,
}

impl SessionTime {
    /*
     * time-field =  "t=" start-time SP stop-time CRLF
     */
    pub(crate) fn parse(value: &[u8]) -> Result<SessionTime> {
        let mut scanner = Scanner::new(value);

        let Ok(start) = scanner.read_u64() else {
            return parse_error!("\"t=\" start time is not a number");
        };

        scanner.read_while(is_space);

        let Ok(stop) = scanner.read_u64() else {
            return parse_error!("\"t=\" stop time is not a number");
        };

        Ok(SessionTime { start, stop })
    }

    /// Parses a `t=` line value from a raw byte slice.
    pub fn from_bytes(value: &[u8]) -> Result<SessionTime> {
        Self::parse(value)
    }
}

impl fmt::Display for SessionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.start, self.stop)
    }
}
