use std::fmt;

use crate::error::Result;
use crate::macros::parse_error;
use crate::scanner::{is_newline, is_space, Scanner};

/// The `o=` line (Origin).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Origin {
    /// The originating user's login, or `-`.
    pub username: String,
    /// The session identifier.
    pub sess_id: u64,
    /// The session version, bumped on every modification.
    pub sess_version: u64,
    /// The network type, `IN` for Internet.
    pub nettype: String,
    /// The address type, `IP4` or `IP6`.
    pub addrtype: String,
    /// The unicast address the session was created on.
    pub addr: String,
}

impl Origin {
    /*
     * origin-field =  "o=" username SP sess-id SP sess-version SP
     *                 nettype SP addrtype SP unicast-address CRLF
     */
    pub(crate) fn parse(value: &[u8]) -> Result<Origin> {
        fn token<'a>(scanner: &mut Scanner<'a>) -> &'a [u8] {
            scanner.read_while(is_space);
            scanner.read_while(|b| !is_space(b) && !is_newline(b))
        }

        let mut scanner = Scanner::new(value);

        let username = token(&mut scanner);
        let sess_id = token(&mut scanner);
        let sess_version = token(&mut scanner);
        let nettype = token(&mut scanner);
        let addrtype = token(&mut scanner);
        let addr = token(&mut scanner);

        if addr.is_empty() {
            return parse_error!("\"o=\" line needs six tokens");
        }

        let parse_u64 = |digits: &[u8]| {
            std::str::from_utf8(digits)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
        };

        let Some(sess_id) = parse_u64(sess_id) else {
            return parse_error!("\"o=\" sess-id is not a number");
        };
        let Some(sess_version) = parse_u64(sess_version) else {
            return parse_error!("\"o=\" sess-version is not a number");
        };

        Ok(Origin {
            username: String::from_utf8_lossy(username).into_owned(),
            sess_id,
            sess_version,
            nettype: String::from_utf8_lossy(nettype).into_owned(),
            addrtype: String::from_utf8_lossy(addrtype).into_owned(),
            addr: String::from_utf8_lossy(addr).into_owned(),
        })
    }

    /// Parses an `o=` line value from a raw byte slice.
    pub fn from_bytes(value: &[u8]) -> Result<Origin> {
        Self::parse(value)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.username, self.sess_id, self.sess_version, self.nettype, self.addrtype, self.addr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let o = Origin::parse(b"jdoe 2890844526 2890842807 IN IP4 10.47.16.5\r\n").unwrap();

        assert_eq!(o.username, "jdoe");
        assert_eq!(o.sess_id, 2890844526);
        assert_eq!(o.sess_version, 2890842807);
        assert_eq!(o.nettype, "IN");
        assert_eq!(o.addrtype, "IP4");
        assert_eq!(o.addr, "10.47.16.5");
    }

    #[test]
    fn test_missing_tokens_is_an_error() {
        assert!(Origin::parse(b"jdoe 2890844526\r\n").is_err());
    }
}
