use std::fmt;

use crate::error::Result;
use crate::macros::parse_error;
use crate::scanner::{is_newline, is_space, Scanner};

/// The `c=` line (Connection Data).
///
/// Exactly three whitespace-separated tokens: the network type, the
/// address type, and the connection address (which may carry a TTL or
/// address-count suffix).
///
/// # Examples
///
/// ```
/// # use imsua::sdp::Connection;
/// let c = Connection::from_bytes(b"IN IP4 10.0.0.1\r\n").unwrap();
///
/// assert_eq!(c.nettype, "IN");
/// assert_eq!(c.addrtype, "IP4");
/// assert_eq!(c.addr, "10.0.0.1");
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Connection {
    /// The network type, `IN` for Internet.
    pub nettype: String,
    /// The address type, `IP4` or `IP6`.
    pub addrtype: String,
    /// The connection address.
    pub addr: String,
}

impl Connection {
    /*
     * connection-field =  "c=" nettype SP addrtype SP
     *                     connection-address CRLF
     */
    pub(crate) fn parse(value: &[u8]) -> Result<Connection> {
        let mut scanner = Scanner::new(value);

        scanner.read_while(is_space);
        let nettype = scanner.read_while(|b| !is_space(b) && !is_newline(b));
        scanner.read_while(is_space);
        let addrtype = scanner.read_while(|b| !is_space(b) && !is_newline(b));
        scanner.read_while(is_space);
        let addr = scanner.read_while(|b| !is_space(b) && !is_newline(b));

        // Trailing CRLF is tolerated; anything else is not.
        scanner.read_while(is_space);
        scanner.read_while(is_newline);
        if !scanner.is_eof() {
            return parse_error!("Trailing data after \"c=\" line");
        }

        if nettype.is_empty() || addrtype.is_empty() || addr.is_empty() {
            return parse_error!("\"c=\" line needs exactly three tokens");
        }

        Ok(Connection {
            nettype: String::from_utf8_lossy(nettype).into_owned(),
            addrtype: String::from_utf8_lossy(addrtype).into_owned(),
            addr: String::from_utf8_lossy(addr).into_owned(),
        })
    }

    /// Parses a `c=` line value from a raw byte slice.
    pub fn from_bytes(value: &[u8]) -> Result<Connection> {
        Self::parse(value)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.nettype, self.addrtype, self.addr)
    }
}
